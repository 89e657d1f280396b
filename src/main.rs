mod app;
mod auth;
mod config;
mod db;
mod error;
mod media;
mod posts;
mod state;
mod users;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let env_filter = std::env::var("RUST_LOG")
        .unwrap_or_else(|_| "atlas_api=debug,axum=info,tower_http=info".to_string());
    let json_logs = std::env::var("LOG_FORMAT")
        .map(|v| v == "json")
        .unwrap_or(false);

    if json_logs {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(false)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(env_filter).init();
    }

    let state = state::AppState::init()?;

    if let Some(pool) = &state.db {
        if let Err(e) = db::ensure_schema(pool).await {
            tracing::warn!(error = %e, "schema bootstrap failed; continuing in degraded mode");
        }
    }

    let app = app::build_app(state);
    app::serve(app).await
}
