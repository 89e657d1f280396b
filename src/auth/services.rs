use axum::extract::FromRef;
use bcrypt::DEFAULT_COST;
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use lazy_static::lazy_static;
use regex::Regex;
use time::OffsetDateTime;
use tracing::{debug, error};
use uuid::Uuid;

use crate::auth::dto::{Claims, JwtKeys, PublicUser, SignupRequest};
use crate::auth::repo::User;
use crate::state::AppState;

pub(crate) fn is_valid_email(email: &str) -> bool {
    lazy_static! {
        static ref EMAIL_RE: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
    }
    EMAIL_RE.is_match(email)
}

/// Collects every violated signup rule instead of stopping at the first.
pub fn validate_signup(payload: &SignupRequest) -> Vec<String> {
    let mut errors = Vec::new();
    let name_chars = payload.name.trim().chars().count();
    if name_chars < 2 {
        errors.push("Name must be at least 2 characters long".to_string());
    }
    if name_chars > 50 {
        errors.push("Name must be 50 characters or less".to_string());
    }
    if !is_valid_email(payload.email.trim()) {
        errors.push("Please provide a valid email address".to_string());
    }
    if payload.password.len() < 6 {
        errors.push("Password must be at least 6 characters long".to_string());
    }
    errors
}

/// bcrypt is deliberately CPU-bound; run it off the async executor.
pub async fn hash_password(plain: String) -> anyhow::Result<String> {
    tokio::task::spawn_blocking(move || bcrypt::hash(plain, DEFAULT_COST))
        .await
        .map_err(|e| {
            error!(error = %e, "hash task panicked");
            anyhow::anyhow!("password hashing failed")
        })?
        .map_err(|e| {
            error!(error = %e, "bcrypt hash error");
            anyhow::anyhow!(e.to_string())
        })
}

pub async fn verify_password(plain: String, hash: String) -> anyhow::Result<bool> {
    tokio::task::spawn_blocking(move || bcrypt::verify(plain, &hash))
        .await
        .map_err(|e| {
            error!(error = %e, "verify task panicked");
            anyhow::anyhow!("password verification failed")
        })?
        .map_err(|e| {
            error!(error = %e, "bcrypt verify error");
            anyhow::anyhow!(e.to_string())
        })
}

impl FromRef<AppState> for JwtKeys {
    fn from_ref(state: &AppState) -> Self {
        let secret = state.config.jwt.secret.as_bytes();
        Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
            ttl: time::Duration::days(state.config.jwt.ttl_days),
        }
    }
}

impl JwtKeys {
    fn issue_with_ttl(
        &self,
        subject: &str,
        email: &str,
        ttl: time::Duration,
    ) -> anyhow::Result<String> {
        let now = OffsetDateTime::now_utc();
        let claims = Claims {
            sub: subject.to_string(),
            email: email.to_string(),
            iat: now.unix_timestamp() as usize,
            exp: (now + ttl).unix_timestamp() as usize,
        };
        let token = encode(&Header::default(), &claims, &self.encoding)?;
        debug!(subject = %subject, "session token issued");
        Ok(token)
    }

    pub fn issue(&self, subject: &str, email: &str) -> anyhow::Result<String> {
        self.issue_with_ttl(subject, email, self.ttl)
    }

    pub fn verify(&self, token: &str) -> anyhow::Result<Claims> {
        let data = decode::<Claims>(token, &self.decoding, &Validation::default())?;
        debug!(subject = %data.claims.sub, "session token verified");
        Ok(data.claims)
    }
}

/// Result of an authentication attempt. A `Degraded` identity exists only in
/// the token that is about to be minted; it is never written to the store.
pub enum AuthOutcome {
    Persisted(User),
    Degraded {
        id: String,
        name: String,
        email: String,
        avatar: Option<String>,
    },
}

impl AuthOutcome {
    pub fn synthetic(prefix: &str, name: String, email: String, avatar: Option<String>) -> Self {
        Self::Degraded {
            id: format!("{}-{}", prefix, Uuid::new_v4()),
            name,
            email,
            avatar,
        }
    }

    pub fn is_persisted(&self) -> bool {
        matches!(self, Self::Persisted(_))
    }

    /// (subject id, email) pair the session token is issued for.
    pub fn subject(&self) -> (String, String) {
        match self {
            Self::Persisted(user) => (user.id.to_string(), user.email.clone()),
            Self::Degraded { id, email, .. } => (id.clone(), email.clone()),
        }
    }

    pub fn public_user(&self) -> PublicUser {
        match self {
            Self::Persisted(user) => PublicUser::from(user),
            Self::Degraded {
                id,
                name,
                email,
                avatar,
            } => PublicUser {
                id: id.clone(),
                name: name.clone(),
                email: email.clone(),
                avatar: avatar.clone(),
            },
        }
    }
}

/// Display name for a session that only has token claims to go on.
pub fn name_from_email(email: &str) -> String {
    email
        .split('@')
        .next()
        .filter(|s| !s.is_empty())
        .unwrap_or("User")
        .to_string()
}


#[cfg(test)]
mod jwt_tests {
    use super::*;

    fn make_keys() -> JwtKeys {
        let state = AppState::fake();
        JwtKeys::from_ref(&state)
    }

    #[test]
    fn issue_and_verify_roundtrip() {
        let keys = make_keys();
        let token = keys.issue("user-1", "jane@example.com").expect("issue");
        let claims = keys.verify(&token).expect("verify");
        assert_eq!(claims.sub, "user-1");
        assert_eq!(claims.email, "jane@example.com");
        assert!(claims.exp > claims.iat);
    }

    #[test]
    fn verify_rejects_tampered_token() {
        let keys = make_keys();
        let mut token = keys.issue("user-1", "jane@example.com").expect("issue");
        let last = token.pop().expect("token is not empty");
        token.push(if last == 'A' { 'B' } else { 'A' });
        assert!(keys.verify(&token).is_err());
    }

    #[test]
    fn verify_rejects_expired_token() {
        let keys = make_keys();
        // Aged past the validator's 60s default leeway.
        let token = keys
            .issue_with_ttl("user-1", "jane@example.com", time::Duration::minutes(-2))
            .expect("issue");
        assert!(keys.verify(&token).is_err());
    }

    #[test]
    fn fresh_token_is_accepted_near_expiry_boundary() {
        let keys = make_keys();
        let token = keys
            .issue_with_ttl("user-1", "jane@example.com", time::Duration::minutes(2))
            .expect("issue");
        assert!(keys.verify(&token).is_ok());
    }
}

#[cfg(test)]
mod validation_tests {
    use super::*;

    #[test]
    fn validate_signup_collects_all_violations() {
        let payload = SignupRequest {
            name: "J".into(),
            email: "not-an-email".into(),
            password: "123".into(),
        };
        let errors = validate_signup(&payload);
        assert_eq!(errors.len(), 3);
    }

    #[test]
    fn validate_signup_accepts_well_formed_payload() {
        let payload = SignupRequest {
            name: "Jane Doe".into(),
            email: "jane@example.com".into(),
            password: "hunter22".into(),
        };
        assert!(validate_signup(&payload).is_empty());
    }

    #[test]
    fn email_pattern_rejects_spaces_and_missing_parts() {
        assert!(is_valid_email("jane@example.com"));
        assert!(!is_valid_email("jane@example"));
        assert!(!is_valid_email("jane @example.com"));
        assert!(!is_valid_email("@example.com"));
    }

    #[test]
    fn name_from_email_uses_local_part() {
        assert_eq!(name_from_email("jane@example.com"), "jane");
        assert_eq!(name_from_email("@example.com"), "User");
    }
}
