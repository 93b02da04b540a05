use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use axum::{
    extract::{FromRef, FromRequestParts},
    http::{HeaderMap, StatusCode, header, request::Parts},
};
use jsonwebtoken::{Algorithm, DecodingKey, Validation, decode};
use moka::sync::Cache;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    config::AppConfig,
    error::BackendError,
    models::{AuthSession, SessionUser},
};

/// Name of the cookie that carries the access token after an admin login.
pub const SESSION_COOKIE: &str = "agency_session";

/// Audience the backend stamps on user access tokens.
const TOKEN_AUDIENCE: &str = "authenticated";

/// AuthProvider
///
/// The auth half of the backend collaborator (GoTrue in production).
#[async_trait]
pub trait AuthProvider: Send + Sync {
    /// Email + password sign-in. Fails with the backend's message on bad credentials.
    async fn sign_in(&self, email: &str, password: &str) -> Result<AuthSession, BackendError>;

    async fn sign_up(&self, email: &str, password: &str) -> Result<SessionUser, BackendError>;

    /// Revokes the session behind `access_token`.
    async fn sign_out(&self, access_token: &str) -> Result<(), BackendError>;

    /// The identity behind `access_token`; `Unauthorized` when the session is unknown or expired.
    async fn current_user(&self, access_token: &str) -> Result<SessionUser, BackendError>;
}

pub type AuthState = Arc<dyn AuthProvider>;

/// Claims
///
/// The subset of the backend's access-token payload this service reads.
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    /// The user id (auth.users.id).
    pub sub: Uuid,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    pub exp: usize,
    pub iat: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aud: Option<String>,
}

/// session_token
///
/// The access token presented with a request: `Authorization: Bearer` first,
/// then the session cookie.
pub fn session_token(headers: &HeaderMap) -> Option<String> {
    let bearer = headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty());
    if let Some(token) = bearer {
        return Some(token.to_string());
    }

    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, value)| *name == SESSION_COOKIE && !value.is_empty())
        .map(|(_, value)| value.to_string())
}

/// decode_session_token
///
/// Verifies an HS256 access token locally (signature, expiry, audience) and
/// returns the identity it names.
pub fn decode_session_token(token: &str, secret: &str) -> Result<SessionUser, BackendError> {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.validate_exp = true;
    validation.set_audience(&[TOKEN_AUDIENCE]);

    let data = decode::<Claims>(token, &DecodingKey::from_secret(secret.as_bytes()), &validation)
        .map_err(|err| {
            tracing::debug!("rejected access token: {:?}", err.kind());
            BackendError::Unauthorized
        })?;

    Ok(SessionUser {
        id: data.claims.sub,
        email: data.claims.email,
    })
}

/// resolve_session
///
/// Who is behind `token`. With a JWT secret configured the token is checked
/// locally; otherwise the auth collaborator is asked.
pub async fn resolve_session(
    token: &str,
    jwt_secret: Option<&str>,
    auth: &dyn AuthProvider,
) -> Result<SessionUser, BackendError> {
    match jwt_secret {
        Some(secret) => decode_session_token(token, secret),
        None => auth.current_user(token).await,
    }
}

/// RevokedSessions
///
/// Access tokens signed out through this service. A locally verified token
/// stays cryptographically valid until `exp`, so logout records it here and
/// session resolution refuses it until it would have expired anyway.
#[derive(Clone)]
pub struct RevokedSessions {
    tokens: Cache<String, ()>,
}

impl RevokedSessions {
    /// `max_token_lifetime` bounds how long an entry is kept.
    pub fn new(max_token_lifetime: Duration, max_capacity: u64) -> Self {
        Self {
            tokens: Cache::builder()
                .time_to_live(max_token_lifetime)
                .max_capacity(max_capacity)
                .build(),
        }
    }

    pub fn revoke(&self, access_token: &str) {
        self.tokens.insert(access_token.to_string(), ());
    }

    pub fn is_revoked(&self, access_token: &str) -> bool {
        self.tokens.contains_key(access_token)
    }
}

/// SessionUser extractor
///
/// Resolves the caller's identity for handlers that need one.
///
/// Rejection: `401 Unauthorized` when no token is presented or it does not resolve.
impl<S> FromRequestParts<S> for SessionUser
where
    S: Send + Sync,
    AuthState: FromRef<S>,
    AppConfig: FromRef<S>,
    RevokedSessions: FromRef<S>,
{
    type Rejection = StatusCode;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        // 1. Dependency Resolution
        // The auth collaborator, the JWT secret (if any) and the logout list.
        let auth = AuthState::from_ref(state);
        let config = AppConfig::from_ref(state);
        let revoked = RevokedSessions::from_ref(state);

        // 2. Token Extraction
        // Bearer header first, then the session cookie.
        let token = session_token(&parts.headers).ok_or(StatusCode::UNAUTHORIZED)?;

        // 3. Revocation Check
        // Tokens signed out here are refused even while their signature is still valid.
        if revoked.is_revoked(&token) {
            return Err(StatusCode::UNAUTHORIZED);
        }

        // 4. Identity Resolution
        // Local HS256 verification when a secret is configured, else the auth service.
        resolve_session(&token, config.jwt_secret.as_deref(), auth.as_ref())
            .await
            .map_err(|err| match err {
                BackendError::Unauthorized => StatusCode::UNAUTHORIZED,
                other => {
                    tracing::error!("session lookup failed: {}", other);
                    StatusCode::UNAUTHORIZED
                }
            })
    }
}

/// AdminSession
///
/// Placed in the request extensions by the admin gate once the caller is known
/// to be an admin. Handlers behind the gate read it with `Extension`.
#[derive(Debug, Clone)]
pub struct AdminSession {
    pub user: SessionUser,
    pub access_token: String,
}

/// `Set-Cookie` value that stores the access token for `max_age` seconds.
pub fn session_cookie(access_token: &str, max_age: u64, secure: bool) -> String {
    let mut cookie = format!(
        "{SESSION_COOKIE}={access_token}; Path=/; HttpOnly; SameSite=Lax; Max-Age={max_age}"
    );
    if secure {
        cookie.push_str("; Secure");
    }
    cookie
}

/// `Set-Cookie` value that removes the session cookie.
pub fn clear_cookie(secure: bool) -> String {
    session_cookie("", 0, secure)
}
