use axum::{
    async_trait,
    extract::{FromRef, FromRequestParts, Request},
    http::request::Parts,
    middleware::Next,
    response::{IntoResponse, Redirect, Response},
};
use axum_extra::extract::cookie::CookieJar;

use crate::auth::cookie::SESSION_COOKIE;
use crate::auth::dto::{Claims, JwtKeys};
use crate::error::ApiError;
use crate::state::AppState;

/// Extracts and validates the session cookie, returning the token claims.
pub struct SessionUser(pub Claims);

#[async_trait]
impl FromRequestParts<AppState> for SessionUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let jar = CookieJar::from_headers(&parts.headers);
        let token = jar
            .get(SESSION_COOKIE)
            .map(|c| c.value().to_string())
            .ok_or(ApiError::NotAuthenticated)?;

        let keys = JwtKeys::from_ref(state);
        let claims = keys.verify(&token).map_err(|_| ApiError::InvalidToken)?;
        Ok(SessionUser(claims))
    }
}

/// Dashboard gate: a presence-only check on the session cookie. The token is
/// not verified here; handlers behind the gate do that themselves.
pub async fn redirect_unauthenticated(req: Request, next: Next) -> Response {
    let jar = CookieJar::from_headers(req.headers());
    if jar.get(SESSION_COOKIE).is_none() {
        return Redirect::temporary("/login").into_response();
    }
    next.run(req).await
}
