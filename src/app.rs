use std::net::SocketAddr;

use axum::{middleware, routing::get, Json, Router};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::auth::extractors::{redirect_unauthenticated, SessionUser};
use crate::state::AppState;
use crate::{auth, media, posts, users};

/// Minimal dashboard payload; rendering is the client's job, the server only
/// gates the path and confirms the session.
async fn dashboard_overview(SessionUser(claims): SessionUser) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "user": { "id": claims.sub, "email": claims.email }
    }))
}

pub fn build_app(state: AppState) -> Router {
    let dashboard = Router::new()
        .route("/", get(dashboard_overview))
        .route("/*section", get(dashboard_overview))
        .layer(middleware::from_fn(redirect_unauthenticated));

    Router::new()
        .merge(auth::router())
        .merge(posts::router())
        .merge(users::router())
        .merge(media::router())
        .nest("/dashboard", dashboard)
        .route("/health", get(|| async { "ok" }))
        .with_state(state)
        .layer(CorsLayer::permissive())
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(|req: &axum::http::Request<_>| {
                    let method = req.method().clone();
                    let uri = req.uri().clone();
                    tracing::info_span!("http_request", %method, uri = %uri)
                })
                .on_response(
                    |res: &axum::http::Response<_>,
                     _latency: std::time::Duration,
                     span: &tracing::Span| {
                        let status = res.status();
                        span.record("status", tracing::field::display(status));
                        if status.is_server_error() {
                            tracing::error!(%status, "response");
                        } else {
                            tracing::info!(%status, "response");
                        }
                    },
                ),
        )
}

pub async fn serve(app: Router) -> anyhow::Result<()> {
    let addr: SocketAddr = format!(
        "{}:{}",
        std::env::var("APP_HOST").unwrap_or_else(|_| "0.0.0.0".into()),
        std::env::var("APP_PORT").unwrap_or_else(|_| "8080".into())
    )
    .parse()?;

    tracing::info!("listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}
