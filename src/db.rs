use sqlx::PgPool;

use crate::error::ApiError;

/// Unique-constraint violation (Postgres error 23505), e.g. duplicate email.
pub fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db) if db.code().as_deref() == Some("23505"))
}

/// True when the error means the store could not be reached at all, as
/// opposed to rejecting a well-formed query.
pub fn is_unreachable(err: &sqlx::Error) -> bool {
    matches!(
        err,
        sqlx::Error::Io(_) | sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed
    )
}

/// Map a store failure onto the API surface: unreachable becomes 503, the
/// rest is an internal error.
pub fn store_error(err: sqlx::Error) -> ApiError {
    if is_unreachable(&err) {
        ApiError::ServiceUnavailable("Database connection unavailable".into())
    } else {
        ApiError::Internal(err.into())
    }
}

/// Create the tables and indexes this app needs if they are missing.
///
/// Failure is reported to the caller but is not fatal for the process: the
/// auth flows keep working in degraded mode and the post routes answer 503
/// until the store comes back.
pub async fn ensure_schema(pool: &PgPool) -> Result<(), sqlx::Error> {
    tracing::info!("ensuring database schema");

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS users (
            id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
            name TEXT NOT NULL,
            email TEXT NOT NULL UNIQUE,
            password_hash TEXT,
            provider TEXT NOT NULL DEFAULT 'email',
            google_id TEXT UNIQUE,
            profile_picture TEXT,
            avatar TEXT,
            bio TEXT NOT NULL DEFAULT '',
            is_verified BOOLEAN NOT NULL DEFAULT false,
            created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
            updated_at TIMESTAMPTZ NOT NULL DEFAULT now()
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS posts (
            id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
            title TEXT NOT NULL,
            content TEXT NOT NULL,
            cover_image TEXT,
            tags TEXT[] NOT NULL DEFAULT '{}',
            author_name TEXT NOT NULL DEFAULT 'Anonymous',
            author_id TEXT NOT NULL,
            status TEXT NOT NULL DEFAULT 'published',
            created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
            updated_at TIMESTAMPTZ NOT NULL DEFAULT now()
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_users_created_at ON users (created_at DESC)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_users_provider ON users (provider)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_posts_created_at ON posts (created_at DESC)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_posts_status ON posts (status)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_posts_author_id ON posts (author_id)")
        .execute(pool)
        .await?;

    tracing::info!("database schema ready");
    Ok(())
}
