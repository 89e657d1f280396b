use axum_extra::extract::cookie::{Cookie, SameSite};
use time::OffsetDateTime;

/// Name of the session cookie carrying the signed token.
pub const SESSION_COOKIE: &str = "atlas_token";

const SESSION_MAX_AGE: time::Duration = time::Duration::days(7);

/// Session cookie set on every successful authentication.
pub fn session_cookie(token: String, production: bool) -> Cookie<'static> {
    Cookie::build((SESSION_COOKIE, token))
        .http_only(true)
        .secure(production)
        .same_site(SameSite::Strict)
        .path("/")
        .max_age(SESSION_MAX_AGE)
        .build()
}

/// Replacement cookie that clears the session: empty value, already expired.
pub fn clear_session_cookie(production: bool) -> Cookie<'static> {
    Cookie::build((SESSION_COOKIE, ""))
        .http_only(true)
        .secure(production)
        .same_site(SameSite::Strict)
        .path("/")
        .max_age(time::Duration::ZERO)
        .expires(OffsetDateTime::UNIX_EPOCH)
        .build()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_cookie_carries_the_contracted_attributes() {
        let cookie = session_cookie("tok".into(), true);
        assert_eq!(cookie.name(), SESSION_COOKIE);
        assert_eq!(cookie.value(), "tok");
        assert_eq!(cookie.http_only(), Some(true));
        assert_eq!(cookie.secure(), Some(true));
        assert_eq!(cookie.same_site(), Some(SameSite::Strict));
        assert_eq!(cookie.path(), Some("/"));
        assert_eq!(cookie.max_age(), Some(SESSION_MAX_AGE));
    }

    #[test]
    fn secure_flag_follows_environment() {
        assert_eq!(session_cookie("tok".into(), false).secure(), Some(false));
    }

    #[test]
    fn clear_cookie_expires_immediately() {
        let cookie = clear_session_cookie(false);
        assert_eq!(cookie.value(), "");
        assert_eq!(cookie.max_age(), Some(time::Duration::ZERO));
    }
}
