use axum::{
    extract::{FromRef, Query, State},
    response::{IntoResponse, Redirect, Response},
    Json,
};
use axum_extra::extract::cookie::CookieJar;
use jsonwebtoken::{decode, decode_header, Algorithm, DecodingKey, Validation};
use serde::Deserialize;
use tracing::{info, instrument, warn};

use crate::{
    auth::{
        cookie::session_cookie,
        dto::{AuthResponse, GoogleTokenRequest, JwtKeys},
        handlers::establish_session,
        repo::User,
        services::{name_from_email, AuthOutcome},
    },
    config::GoogleConfig,
    error::ApiError,
    state::AppState,
};

const GOOGLE_AUTH_URL: &str = "https://accounts.google.com/o/oauth2/v2/auth";
const GOOGLE_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
const GOOGLE_CERTS_URL: &str = "https://www.googleapis.com/oauth2/v3/certs";

#[derive(Debug, Deserialize)]
pub struct GoogleCallbackQuery {
    pub code: Option<String>,
    pub error: Option<String>,
}

/// Identity extracted from a verified Google ID token.
#[derive(Debug)]
pub struct GoogleIdentity {
    pub google_id: String,
    pub email: Option<String>,
    pub name: Option<String>,
    pub picture: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GoogleClaims {
    sub: String,
    email: Option<String>,
    name: Option<String>,
    picture: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TokenExchange {
    id_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Jwk {
    kid: String,
    n: String,
    e: String,
}

#[derive(Debug, Deserialize)]
struct Jwks {
    keys: Vec<Jwk>,
}

fn consent_url(cfg: &GoogleConfig, redirect_uri: &str) -> anyhow::Result<String> {
    let url = url::Url::parse_with_params(
        GOOGLE_AUTH_URL,
        &[
            ("client_id", cfg.client_id.as_str()),
            ("redirect_uri", redirect_uri),
            ("response_type", "code"),
            ("scope", "openid email profile"),
            ("access_type", "offline"),
        ],
    )?;
    Ok(url.into())
}

/// Exchange an authorization code for the ID token at Google's token endpoint.
async fn exchange_code(
    http: &reqwest::Client,
    cfg: &GoogleConfig,
    code: &str,
    redirect_uri: &str,
) -> anyhow::Result<String> {
    let resp = http
        .post(GOOGLE_TOKEN_URL)
        .form(&[
            ("code", code),
            ("client_id", cfg.client_id.as_str()),
            ("client_secret", cfg.client_secret.as_str()),
            ("redirect_uri", redirect_uri),
            ("grant_type", "authorization_code"),
        ])
        .send()
        .await?;
    if !resp.status().is_success() {
        anyhow::bail!("token endpoint returned {}", resp.status());
    }
    let body: TokenExchange = resp.json().await?;
    body.id_token
        .ok_or_else(|| anyhow::anyhow!("no id_token in token response"))
}

/// Verify an ID token against Google's published keys and our client id.
async fn verify_id_token(
    http: &reqwest::Client,
    client_id: &str,
    id_token: &str,
) -> anyhow::Result<GoogleIdentity> {
    let header = decode_header(id_token)?;
    let kid = header
        .kid
        .ok_or_else(|| anyhow::anyhow!("id_token has no key id"))?;

    let jwks: Jwks = http.get(GOOGLE_CERTS_URL).send().await?.json().await?;
    let jwk = jwks
        .keys
        .into_iter()
        .find(|k| k.kid == kid)
        .ok_or_else(|| anyhow::anyhow!("no matching key for id_token"))?;

    let key = DecodingKey::from_rsa_components(&jwk.n, &jwk.e)?;
    let mut validation = Validation::new(Algorithm::RS256);
    validation.set_audience(&[client_id]);
    validation.set_issuer(&["accounts.google.com", "https://accounts.google.com"]);

    let data = decode::<GoogleClaims>(id_token, &key, &validation)?;
    Ok(GoogleIdentity {
        google_id: data.claims.sub,
        email: data.claims.email,
        name: data.claims.name,
        picture: data.claims.picture,
    })
}

/// Create or link the account for a verified Google identity. Linking only
/// fills an empty google_id, so repeating it changes nothing. Store trouble
/// degrades to a synthetic identity like the other auth flows.
async fn upsert_google_user(state: &AppState, identity: &GoogleIdentity, email: &str) -> AuthOutcome {
    let display_name = identity
        .name
        .clone()
        .unwrap_or_else(|| name_from_email(email));

    if let Some(db) = &state.db {
        match User::find_by_email(db, email).await {
            Ok(Some(user)) => {
                if user.google_id.is_some() {
                    return AuthOutcome::Persisted(user);
                }
                match User::link_google_identity(
                    db,
                    user.id,
                    &identity.google_id,
                    identity.picture.as_deref(),
                )
                .await
                {
                    Ok(updated) => {
                        info!(user_id = %updated.id, "linked google identity to existing user");
                        return AuthOutcome::Persisted(updated);
                    }
                    Err(e) => warn!(error = %e, "store unavailable while linking google identity"),
                }
            }
            Ok(None) => {
                match User::create_google_user(
                    db,
                    &display_name,
                    email,
                    &identity.google_id,
                    identity.picture.as_deref(),
                )
                .await
                {
                    Ok(user) => {
                        info!(user_id = %user.id, email = %email, "new google user created");
                        return AuthOutcome::Persisted(user);
                    }
                    Err(e) => warn!(error = %e, "store unavailable while creating google user"),
                }
            }
            Err(e) => warn!(error = %e, "store unavailable during google signin"),
        }
    }

    AuthOutcome::synthetic(
        "google-dev",
        display_name,
        email.to_string(),
        identity.picture.clone(),
    )
}

fn callback_redirect_uri(state: &AppState, cfg: &GoogleConfig) -> String {
    cfg.redirect_uri
        .clone()
        .unwrap_or_else(|| format!("{}/auth/google", state.config.public_url))
}

/// GET /auth/google: the browser redirect dance. No code yet means "send the
/// user to Google's consent screen"; a code means "finish the exchange, set
/// the session cookie and bounce back to the client callback page".
#[instrument(skip(state, jar, query))]
pub async fn google_redirect(
    State(state): State<AppState>,
    jar: CookieJar,
    Query(query): Query<GoogleCallbackQuery>,
) -> Result<Response, ApiError> {
    let Some(cfg) = state.config.google.clone() else {
        return Err(ApiError::Config(
            "Google OAuth not configured. Please check environment variables.".into(),
        ));
    };
    let public_url = state.config.public_url.clone();

    if let Some(error) = query.error {
        warn!(error = %error, "google oauth returned an error");
        return Ok(Redirect::temporary(&format!("{public_url}/login?error=oauth_error"))
            .into_response());
    }

    let redirect_uri = callback_redirect_uri(&state, &cfg);

    let Some(code) = query.code else {
        let url = consent_url(&cfg, &redirect_uri)?;
        return Ok(Redirect::temporary(&url).into_response());
    };

    let http = reqwest::Client::new();
    let identity = match async {
        let id_token = exchange_code(&http, &cfg, &code, &redirect_uri).await?;
        verify_id_token(&http, &cfg.client_id, &id_token).await
    }
    .await
    {
        Ok(identity) => identity,
        Err(e) => {
            warn!(error = %e, "google oauth exchange failed");
            return Ok(
                Redirect::temporary(&format!("{public_url}/login?error=oauth_failed"))
                    .into_response(),
            );
        }
    };

    let Some(email) = identity
        .email
        .as_deref()
        .map(|e| e.trim().to_lowercase())
        .filter(|e| !e.is_empty())
    else {
        return Ok(
            Redirect::temporary(&format!("{public_url}/login?error=no_email")).into_response(),
        );
    };

    let outcome = upsert_google_user(&state, &identity, &email).await;
    let keys = JwtKeys::from_ref(&state);
    let (subject, email) = outcome.subject();
    let token = keys.issue(&subject, &email)?;
    let jar = jar.add(session_cookie(token, state.config.production));

    Ok((jar, Redirect::temporary(&format!("{public_url}/auth/callback"))).into_response())
}

/// POST /auth/google: non-browser callers present an already-obtained ID
/// token and get JSON back instead of a redirect.
#[instrument(skip(state, jar, payload))]
pub async fn google_token(
    State(state): State<AppState>,
    jar: CookieJar,
    Json(payload): Json<GoogleTokenRequest>,
) -> Result<(CookieJar, Json<AuthResponse>), ApiError> {
    let Some(cfg) = state.config.google.clone() else {
        return Err(ApiError::Config(
            "Google OAuth not configured. Please check environment variables.".into(),
        ));
    };
    if payload.id_token.is_empty() {
        return Err(ApiError::BadRequest("ID token is required".into()));
    }

    let http = reqwest::Client::new();
    let identity = verify_id_token(&http, &cfg.client_id, &payload.id_token)
        .await
        .map_err(|e| {
            warn!(error = %e, "google id token rejected");
            ApiError::InvalidToken
        })?;

    let Some(email) = identity
        .email
        .as_deref()
        .map(|e| e.trim().to_lowercase())
        .filter(|e| !e.is_empty())
    else {
        return Err(ApiError::BadRequest("No email found in Google token".into()));
    };

    let outcome = upsert_google_user(&state, &identity, &email).await;
    let message = if outcome.is_persisted() {
        "Google authentication successful"
    } else {
        "Google authentication successful (fallback mode)"
    };
    establish_session(&state, jar, &outcome, message)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{AppConfig, JwtConfig};
    use axum::body::Body;
    use axum::http::{header, Request, StatusCode};
    use axum::routing::get;
    use axum::Router;
    use std::sync::Arc;
    use tower::ServiceExt;

    fn state_with_google(google: Option<GoogleConfig>) -> AppState {
        AppState {
            db: None,
            config: Arc::new(AppConfig {
                database_url: None,
                jwt: JwtConfig {
                    secret: "test-secret".into(),
                    ttl_days: 7,
                },
                google,
                media: None,
                public_url: "http://localhost:3000".into(),
                production: false,
            }),
            media: None,
        }
    }

    fn router(state: AppState) -> Router {
        Router::new()
            .route("/auth/google", get(google_redirect).post(google_token))
            .with_state(state)
    }

    #[tokio::test]
    async fn get_without_config_is_an_operator_error() {
        let res = router(state_with_google(None))
            .oneshot(
                Request::get("/auth/google")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn get_without_code_redirects_to_consent_screen() {
        let state = state_with_google(Some(GoogleConfig {
            client_id: "client-123".into(),
            client_secret: "secret".into(),
            redirect_uri: None,
        }));
        let res = router(state)
            .oneshot(
                Request::get("/auth/google")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(res.status(), StatusCode::TEMPORARY_REDIRECT);
        let location = res
            .headers()
            .get(header::LOCATION)
            .and_then(|v| v.to_str().ok())
            .unwrap();
        assert!(location.starts_with("https://accounts.google.com/o/oauth2/v2/auth"));
        assert!(location.contains("client_id=client-123"));
        assert!(location.contains("response_type=code"));
    }

    #[tokio::test]
    async fn get_with_provider_error_bounces_back_to_login() {
        let state = state_with_google(Some(GoogleConfig {
            client_id: "client-123".into(),
            client_secret: "secret".into(),
            redirect_uri: None,
        }));
        let res = router(state)
            .oneshot(
                Request::get("/auth/google?error=access_denied")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(res.status(), StatusCode::TEMPORARY_REDIRECT);
        let location = res
            .headers()
            .get(header::LOCATION)
            .and_then(|v| v.to_str().ok())
            .unwrap();
        assert_eq!(location, "http://localhost:3000/login?error=oauth_error");
    }

    #[test]
    fn consent_url_encodes_scopes() {
        let cfg = GoogleConfig {
            client_id: "abc".into(),
            client_secret: "s".into(),
            redirect_uri: None,
        };
        let url = consent_url(&cfg, "http://localhost:3000/auth/google").unwrap();
        assert!(url.contains("scope=openid+email+profile") || url.contains("scope=openid%20email%20profile"));
        assert!(url.contains("access_type=offline"));
    }
}
