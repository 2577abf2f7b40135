//! Auth service client.
//!
//! Sign-up, sign-in and sign-out go to the hosted auth service's REST API
//! (GoTrue-compatible). Identifying the caller on every request does not
//! hit the network: access tokens are verified locally, see
//! [`crate::middleware::auth`].

use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::AuthConfig;
use crate::types::AppError;

#[derive(Debug, Error)]
pub enum AuthClientError {
    #[error("Auth service request failed: {0}")]
    RequestFailed(String),

    #[error("{message}")]
    Rejected { status: u16, message: String },

    #[error("Failed to parse auth service response: {0}")]
    ParseError(String),

    #[error("Please confirm your email address before logging in.")]
    EmailNotConfirmed,
}

impl From<AuthClientError> for AppError {
    fn from(e: AuthClientError) -> Self {
        match e {
            AuthClientError::Rejected { status, message } => AppError::AuthService { status, message },
            AuthClientError::EmailNotConfirmed => AppError::AuthService {
                status: 403,
                message: e.to_string(),
            },
            AuthClientError::RequestFailed(_) | AuthClientError::ParseError(_) => {
                warn!(error = %e, "Auth service unavailable");
                AppError::AuthService {
                    status: 503,
                    message: "Authentication service unavailable. Please try again later.".to_string(),
                }
            }
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthUserRecord {
    pub id: Uuid,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub email_confirmed_at: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    pub expires_in: i64,
    pub user: AuthUserRecord,
}

/// Outcome of a sign-up. With email confirmation enabled the service
/// returns the bare user and no session.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SignUpResponse {
    Session(Session),
    User(AuthUserRecord),
}

impl SignUpResponse {
    pub fn user(&self) -> &AuthUserRecord {
        match self {
            SignUpResponse::Session(session) => &session.user,
            SignUpResponse::User(user) => user,
        }
    }

    pub fn requires_confirmation(&self) -> bool {
        self.user().email_confirmed_at.is_none()
    }
}

#[derive(Serialize)]
struct PasswordCredentials<'a> {
    email: &'a str,
    password: &'a str,
}

#[derive(Deserialize, Default)]
struct AuthErrorBody {
    #[serde(default)]
    msg: Option<String>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    error_description: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

impl AuthErrorBody {
    fn into_message(self) -> Option<String> {
        self.msg
            .or(self.message)
            .or(self.error_description)
            .or(self.error)
    }
}

pub struct AuthClient {
    client: Client,
    base_url: String,
    anon_key: String,
}

impl AuthClient {
    pub fn new(config: &AuthConfig) -> Self {
        Self {
            client: Client::new(),
            base_url: config.supabase_url.trim_end_matches('/').to_string(),
            anon_key: config.anon_key.clone(),
        }
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/auth/v1/{}", self.base_url, path)
    }

    async fn rejected(response: reqwest::Response) -> AuthClientError {
        let status = response.status();
        let body: AuthErrorBody = response.json().await.unwrap_or_default();
        let message = body.into_message().unwrap_or_else(|| {
            status
                .canonical_reason()
                .unwrap_or("Authentication failed")
                .to_string()
        });
        AuthClientError::Rejected {
            status: status.as_u16(),
            message,
        }
    }

    pub async fn sign_up(&self, email: &str, password: &str) -> Result<SignUpResponse, AuthClientError> {
        debug!(email, "Signing up");
        let response = self
            .client
            .post(self.endpoint("signup"))
            .header("apikey", &self.anon_key)
            .json(&PasswordCredentials { email, password })
            .send()
            .await
            .map_err(|e| AuthClientError::RequestFailed(e.to_string()))?;

        if !response.status().is_success() {
            return Err(Self::rejected(response).await);
        }

        let created: SignUpResponse = response
            .json()
            .await
            .map_err(|e| AuthClientError::ParseError(e.to_string()))?;
        info!(user_id = %created.user().id, "User signed up");
        Ok(created)
    }

    /// Password sign-in. Users who have not confirmed their email are
    /// refused even when the service issues a session.
    pub async fn sign_in(&self, email: &str, password: &str) -> Result<Session, AuthClientError> {
        debug!(email, "Signing in");
        let response = self
            .client
            .post(self.endpoint("token"))
            .query(&[("grant_type", "password")])
            .header("apikey", &self.anon_key)
            .json(&PasswordCredentials { email, password })
            .send()
            .await
            .map_err(|e| AuthClientError::RequestFailed(e.to_string()))?;

        if !response.status().is_success() {
            return Err(Self::rejected(response).await);
        }

        let session: Session = response
            .json()
            .await
            .map_err(|e| AuthClientError::ParseError(e.to_string()))?;

        if session.user.email_confirmed_at.is_none() {
            return Err(AuthClientError::EmailNotConfirmed);
        }

        info!(user_id = %session.user.id, "User signed in");
        Ok(session)
    }

    pub async fn sign_out(&self, access_token: &str) -> Result<(), AuthClientError> {
        let response = self
            .client
            .post(self.endpoint("logout"))
            .header("apikey", &self.anon_key)
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(|e| AuthClientError::RequestFailed(e.to_string()))?;

        // An already-invalid session is as signed out as it gets
        if response.status().is_success() || response.status() == StatusCode::UNAUTHORIZED {
            return Ok(());
        }
        Err(Self::rejected(response).await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;

    fn client_for(server: &mockito::ServerGuard) -> AuthClient {
        AuthClient::new(&AuthConfig {
            supabase_url: server.url(),
            anon_key: "anon-key".to_string(),
            jwt_secret: "secret".to_string(),
        })
    }

    fn session_body(user_id: Uuid, confirmed: bool) -> String {
        serde_json::json!({
            "access_token": "access",
            "token_type": "bearer",
            "expires_in": 3600,
            "refresh_token": "refresh",
            "user": {
                "id": user_id,
                "email": "voter@example.com",
                "email_confirmed_at": if confirmed { Some("2024-01-01T00:00:00Z") } else { None },
            }
        })
        .to_string()
    }

    #[tokio::test]
    async fn test_sign_in_returns_session() {
        let mut server = mockito::Server::new_async().await;
        let user_id = Uuid::new_v4();
        let mock = server
            .mock("POST", "/auth/v1/token")
            .match_query(Matcher::UrlEncoded("grant_type".into(), "password".into()))
            .match_header("apikey", "anon-key")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(session_body(user_id, true))
            .create_async()
            .await;

        let session = client_for(&server)
            .sign_in("voter@example.com", "hunter22")
            .await
            .unwrap();

        assert_eq!(session.user.id, user_id);
        assert_eq!(session.access_token, "access");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_sign_in_requires_confirmed_email() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/auth/v1/token")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(session_body(Uuid::new_v4(), false))
            .create_async()
            .await;

        let err = client_for(&server)
            .sign_in("voter@example.com", "hunter22")
            .await
            .unwrap_err();
        assert!(matches!(err, AuthClientError::EmailNotConfirmed));
    }

    #[tokio::test]
    async fn test_rejection_carries_service_message() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/auth/v1/token")
            .match_query(Matcher::Any)
            .with_status(400)
            .with_body(r#"{"error":"invalid_grant","error_description":"Invalid login credentials"}"#)
            .create_async()
            .await;

        let err = client_for(&server)
            .sign_in("voter@example.com", "wrong-password")
            .await
            .unwrap_err();
        match err {
            AuthClientError::Rejected { status, message } => {
                assert_eq!(status, 400);
                assert_eq!(message, "Invalid login credentials");
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_sign_up_without_session() {
        let mut server = mockito::Server::new_async().await;
        let user_id = Uuid::new_v4();
        server
            .mock("POST", "/auth/v1/signup")
            .with_status(200)
            .with_body(
                serde_json::json!({ "id": user_id, "email": "new@example.com" }).to_string(),
            )
            .create_async()
            .await;

        let created = client_for(&server)
            .sign_up("new@example.com", "hunter22")
            .await
            .unwrap();
        assert_eq!(created.user().id, user_id);
        assert!(created.requires_confirmation());
    }

    #[tokio::test]
    async fn test_sign_out_tolerates_expired_session() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/auth/v1/logout")
            .match_header("authorization", "Bearer stale")
            .with_status(401)
            .create_async()
            .await;

        client_for(&server).sign_out("stale").await.unwrap();
        mock.assert_async().await;
    }
}
