// Session resolution: access-token verification and request extractors

use std::convert::Infallible;

use axum::{
    extract::FromRequestParts,
    http::{header, request::Parts, HeaderMap},
};
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::middleware::rate_limiter::ANONYMOUS_IDENTIFIER;
use crate::models::AppState;
use crate::types::AppError;

/// Cookie the browser client stores the access token in.
pub const SESSION_COOKIE: &str = "sb-access-token";

/// Audience the auth service puts on user access tokens.
pub const TOKEN_AUDIENCE: &str = "authenticated";

/// Access token claims issued by the auth service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub exp: usize,
    pub aud: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub role: Option<String>,
}

/// The authenticated caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub user_id: Uuid,
    pub email: Option<String>,
}

pub fn verify_jwt(secret: &str, token: &str) -> anyhow::Result<Identity> {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.set_audience(&[TOKEN_AUDIENCE]);

    let data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &validation,
    )?;

    let user_id = Uuid::parse_str(&data.claims.sub)?;
    Ok(Identity {
        user_id,
        email: data.claims.email,
    })
}

/// Pulls the session token from `Authorization: Bearer ...`, falling back to
/// the session cookie.
pub fn session_token(headers: &HeaderMap) -> Option<String> {
    let bearer = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty());

    if let Some(token) = bearer {
        return Some(token.to_string());
    }

    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, value)| *name == SESSION_COOKIE && !value.is_empty())
        .map(|(_, value)| value.to_string())
}

/// Rate-limit identifier for a request: a digest of the session token, or
/// the shared anonymous bucket.
pub fn client_identifier(headers: &HeaderMap) -> String {
    match session_token(headers) {
        Some(token) => hex::encode(Sha256::digest(token.as_bytes())),
        None => ANONYMOUS_IDENTIFIER.to_string(),
    }
}

/// Extractor that requires a valid session.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub identity: Identity,
    pub token: String,
}

impl FromRequestParts<AppState> for AuthUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let token = session_token(&parts.headers).ok_or(AppError::Unauthenticated)?;

        let identity = verify_jwt(&state.config.auth.jwt_secret, &token).map_err(|e| {
            tracing::debug!(error = %e, "Rejected access token");
            AppError::Unauthenticated
        })?;

        Ok(AuthUser { identity, token })
    }
}

/// Extractor that resolves a session when one is present and valid.
#[derive(Debug, Clone)]
pub struct MaybeAuthUser(pub Option<AuthUser>);

impl MaybeAuthUser {
    pub fn identity(&self) -> Option<&Identity> {
        self.0.as_ref().map(|u| &u.identity)
    }
}

impl FromRequestParts<AppState> for MaybeAuthUser {
    type Rejection = Infallible;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        Ok(MaybeAuthUser(
            AuthUser::from_request_parts(parts, state).await.ok(),
        ))
    }
}

/// Extractor yielding the rate-limit identifier. Never rejects.
#[derive(Debug, Clone)]
pub struct ClientIdentifier(pub String);

impl<S: Send + Sync> FromRequestParts<S> for ClientIdentifier {
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(ClientIdentifier(client_identifier(&parts.headers)))
    }
}
