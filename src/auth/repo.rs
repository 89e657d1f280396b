use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};
use time::OffsetDateTime;
use uuid::Uuid;

/// User record in the database.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct User {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: Option<String>, // absent for provider = google
    pub provider: String,
    pub google_id: Option<String>,
    pub profile_picture: Option<String>,
    pub avatar: Option<String>,
    pub bio: String,
    pub is_verified: bool,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

const USER_COLUMNS: &str = "id, name, email, password_hash, provider, google_id, \
     profile_picture, avatar, bio, is_verified, created_at, updated_at";

impl User {
    /// Canonical lookup. Emails are normalized (lowercased, trimmed) before
    /// every write, so a single exact match suffices.
    pub async fn find_by_email(db: &PgPool, email: &str) -> Result<Option<User>, sqlx::Error> {
        sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE email = $1"
        ))
        .bind(email)
        .fetch_optional(db)
        .await
    }

    /// Create an email-provider user with a hashed password.
    pub async fn create_email_user(
        db: &PgPool,
        name: &str,
        email: &str,
        password_hash: &str,
    ) -> Result<User, sqlx::Error> {
        sqlx::query_as::<_, User>(&format!(
            "INSERT INTO users (name, email, password_hash, provider) \
             VALUES ($1, $2, $3, 'email') \
             RETURNING {USER_COLUMNS}"
        ))
        .bind(name)
        .bind(email)
        .bind(password_hash)
        .fetch_one(db)
        .await
    }

    /// Create a user from a verified Google identity.
    pub async fn create_google_user(
        db: &PgPool,
        name: &str,
        email: &str,
        google_id: &str,
        picture: Option<&str>,
    ) -> Result<User, sqlx::Error> {
        sqlx::query_as::<_, User>(&format!(
            "INSERT INTO users (name, email, provider, google_id, profile_picture) \
             VALUES ($1, $2, 'google', $3, $4) \
             RETURNING {USER_COLUMNS}"
        ))
        .bind(name)
        .bind(email)
        .bind(google_id)
        .bind(picture)
        .fetch_one(db)
        .await
    }

    /// Link a Google identity onto an existing record. Only fires when the
    /// record has no google_id yet, which makes repeated linking a no-op.
    pub async fn link_google_identity(
        db: &PgPool,
        id: Uuid,
        google_id: &str,
        picture: Option<&str>,
    ) -> Result<User, sqlx::Error> {
        sqlx::query_as::<_, User>(&format!(
            "UPDATE users SET \
                google_id = COALESCE(google_id, $2), \
                profile_picture = COALESCE(profile_picture, $3), \
                updated_at = now() \
             WHERE id = $1 \
             RETURNING {USER_COLUMNS}"
        ))
        .bind(id)
        .bind(google_id)
        .bind(picture)
        .fetch_one(db)
        .await
    }

    /// Partial profile update. `None` leaves a field untouched; for the
    /// avatar, `Some(None)` clears both avatar columns.
    pub async fn update_profile(
        db: &PgPool,
        id: Uuid,
        name: Option<&str>,
        email: Option<&str>,
        avatar: Option<Option<&str>>,
        password_hash: Option<&str>,
    ) -> Result<User, sqlx::Error> {
        let set_avatar = avatar.is_some();
        let avatar_value = avatar.flatten();
        sqlx::query_as::<_, User>(&format!(
            "UPDATE users SET \
                name = COALESCE($2, name), \
                email = COALESCE($3, email), \
                avatar = CASE WHEN $4 THEN $5 ELSE avatar END, \
                profile_picture = CASE WHEN $4 THEN $5 ELSE profile_picture END, \
                password_hash = COALESCE($6, password_hash), \
                updated_at = now() \
             WHERE id = $1 \
             RETURNING {USER_COLUMNS}"
        ))
        .bind(id)
        .bind(name)
        .bind(email)
        .bind(set_avatar)
        .bind(avatar_value)
        .bind(password_hash)
        .fetch_one(db)
        .await
    }
}
