use axum::{extract::State, routing::put, Json, Router};
use tracing::{info, instrument, warn};

use crate::{
    auth::{
        dto::PublicUser,
        repo::User,
        services::{hash_password, is_valid_email},
    },
    db::{is_unique_violation, store_error},
    error::ApiError,
    state::AppState,
    users::dto::{UpdateUserRequest, UpdateUserResponse},
};

pub fn user_routes() -> Router<AppState> {
    Router::new().route("/users/update", put(update_user))
}

/// Partial profile update. Emails are normalized before storage everywhere,
/// so one exact lookup on the normalized current email is sufficient.
#[instrument(skip(state, payload))]
pub async fn update_user(
    State(state): State<AppState>,
    Json(payload): Json<UpdateUserRequest>,
) -> Result<Json<UpdateUserResponse>, ApiError> {
    let current_email = payload.current_email.trim().to_lowercase();
    if current_email.is_empty() {
        return Err(ApiError::BadRequest("Valid currentEmail is required".into()));
    }
    if !is_valid_email(&current_email) {
        return Err(ApiError::BadRequest("Invalid current email format".into()));
    }

    let db = state
        .db
        .as_ref()
        .ok_or_else(|| ApiError::ServiceUnavailable("Database connection unavailable".into()))?;

    let user = User::find_by_email(db, &current_email)
        .await
        .map_err(store_error)?
        .ok_or_else(|| {
            warn!(email = %current_email, "profile update for unknown user");
            ApiError::NotFound("User not found. Please check your email address.".into())
        })?;

    let mut new_email: Option<String> = None;
    if let Some(email) = payload.email.as_deref() {
        let normalized = email.trim().to_lowercase();
        if !is_valid_email(&normalized) {
            return Err(ApiError::BadRequest("Invalid email format".into()));
        }
        if normalized != user.email {
            if User::find_by_email(db, &normalized)
                .await
                .map_err(store_error)?
                .is_some()
            {
                return Err(ApiError::Conflict("Email already in use".into()));
            }
            new_email = Some(normalized);
        }
    }

    let mut new_name: Option<String> = None;
    if let Some(name) = payload.name.as_deref() {
        let trimmed = name.trim();
        if trimmed.chars().count() > 100 {
            return Err(ApiError::BadRequest(
                "Name must be 100 characters or less".into(),
            ));
        }
        if !trimmed.is_empty() {
            new_name = Some(trimmed.to_string());
        }
    }

    // Some(None) clears the avatar; both avatar columns stay in sync.
    let mut new_avatar: Option<Option<String>> = None;
    if let Some(avatar) = payload.avatar.as_deref() {
        let trimmed = avatar.trim();
        if trimmed.is_empty() {
            new_avatar = Some(None);
        } else {
            url::Url::parse(trimmed)
                .map_err(|_| ApiError::BadRequest("Invalid avatar URL format".into()))?;
            new_avatar = Some(Some(trimmed.to_string()));
        }
    }

    let mut new_password_hash: Option<String> = None;
    if let Some(password) = payload.password.as_deref() {
        if !password.is_empty() {
            if password.len() < 6 {
                return Err(ApiError::BadRequest(
                    "Password must be at least 6 characters".into(),
                ));
            }
            if password.len() > 128 {
                return Err(ApiError::BadRequest(
                    "Password must be 128 characters or less".into(),
                ));
            }
            new_password_hash = Some(hash_password(password.to_string()).await?);
        }
    }

    let changed = new_email.is_some()
        || new_name.is_some()
        || new_avatar.is_some()
        || new_password_hash.is_some();

    let user = if changed {
        let updated = User::update_profile(
            db,
            user.id,
            new_name.as_deref(),
            new_email.as_deref(),
            new_avatar
                .as_ref()
                .map(|opt| opt.as_deref()),
            new_password_hash.as_deref(),
        )
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                ApiError::Conflict("Email already exists".into())
            } else {
                store_error(e)
            }
        })?;
        info!(user_id = %updated.id, "profile updated");
        updated
    } else {
        user
    };

    Ok(Json(UpdateUserResponse {
        success: true,
        user: PublicUser::from(&user),
        changed,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{header, Request, StatusCode};
    use tower::ServiceExt;

    fn app() -> Router {
        user_routes().with_state(AppState::fake())
    }

    async fn put_json(json: serde_json::Value) -> (StatusCode, serde_json::Value) {
        let res = app()
            .oneshot(
                Request::put("/users/update")
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(json.to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();
        let status = res.status();
        let bytes = axum::body::to_bytes(res.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn missing_current_email_is_rejected_up_front() {
        let (status, body) = put_json(serde_json::json!({ "name": "Jane" })).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["message"], "Valid currentEmail is required");
    }

    #[tokio::test]
    async fn malformed_current_email_is_rejected_up_front() {
        let (status, body) =
            put_json(serde_json::json!({ "currentEmail": "not-an-email" })).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["message"], "Invalid current email format");
    }

    #[tokio::test]
    async fn update_without_store_is_unavailable() {
        let (status, _) =
            put_json(serde_json::json!({ "currentEmail": "jane@example.com" })).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    }
}
