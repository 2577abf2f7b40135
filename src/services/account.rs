// Sign-up, sign-in and sign-out against the auth service

use crate::auth::{Session, SignUpResponse};
use crate::models::AppState;
use crate::types::AppResult;
use crate::validation::{validate_input, CredentialsInput};

pub async fn sign_up(state: &AppState, email: &str, password: &str) -> AppResult<SignUpResponse> {
    validate_input(&CredentialsInput { email, password })?;
    Ok(state.auth.sign_up(email.trim(), password).await?)
}

pub async fn sign_in(state: &AppState, email: &str, password: &str) -> AppResult<Session> {
    validate_input(&CredentialsInput { email, password })?;
    Ok(state.auth.sign_in(email.trim(), password).await?)
}

pub async fn sign_out(state: &AppState, access_token: &str) -> AppResult<()> {
    Ok(state.auth.sign_out(access_token).await?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::test_support::{test_state_with, TEST_SECRET};
    use crate::types::AppError;

    #[tokio::test]
    async fn test_invalid_credentials_never_reach_the_service() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/auth/v1/signup")
            .expect(0)
            .create_async()
            .await;

        let mut config = Config::for_local(TEST_SECRET);
        config.auth.supabase_url = server.url();
        let (state, _store) = test_state_with(config);

        let err = sign_up(&state, "not-an-email", "hunter22").await.unwrap_err();
        assert!(matches!(err, AppError::Validation(msg) if msg == "Invalid email address."));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_unconfirmed_sign_in_is_reported() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/auth/v1/token")
            .match_query(mockito::Matcher::Any)
            .with_status(200)
            .with_body(
                serde_json::json!({
                    "access_token": "a",
                    "expires_in": 3600,
                    "user": { "id": uuid::Uuid::new_v4(), "email": "x@example.com" }
                })
                .to_string(),
            )
            .create_async()
            .await;

        let mut config = Config::for_local(TEST_SECRET);
        config.auth.supabase_url = server.url();
        let (state, _store) = test_state_with(config);

        let err = sign_in(&state, "x@example.com", "hunter22").await.unwrap_err();
        match err {
            AppError::AuthService { message, .. } => assert_eq!(
                message,
                "Please confirm your email address before logging in."
            ),
            other => panic!("unexpected error: {:?}", other),
        }
    }
}
