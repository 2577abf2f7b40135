// Session endpoints. Sign-in also sets the session cookie so browser
// clients need not handle the token themselves.

use axum::{
    extract::State,
    http::header::SET_COOKIE,
    response::{AppendHeaders, IntoResponse},
    routing::post,
    Json, Router,
};
use serde_json::json;

use super::extract::AppJson;
use crate::middleware::auth::{AuthUser, SESSION_COOKIE};
use crate::models::{AppState, CredentialsRequest, SuccessResponse};
use crate::services::account;
use crate::types::AppResult;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/auth/signup", post(sign_up))
        .route("/api/auth/login", post(sign_in))
        .route("/api/auth/logout", post(sign_out))
}

fn session_cookie(token: &str, max_age_secs: i64) -> String {
    format!(
        "{}={}; Path=/; HttpOnly; SameSite=Lax; Max-Age={}",
        SESSION_COOKIE,
        token,
        max_age_secs.max(0)
    )
}

async fn sign_up(
    State(state): State<AppState>,
    AppJson(request): AppJson<CredentialsRequest>,
) -> AppResult<impl IntoResponse> {
    let created = account::sign_up(&state, &request.email, &request.password).await?;

    Ok(Json(json!({
        "success": true,
        "userId": created.user().id,
        "requiresConfirmation": created.requires_confirmation(),
    })))
}

async fn sign_in(
    State(state): State<AppState>,
    AppJson(request): AppJson<CredentialsRequest>,
) -> AppResult<impl IntoResponse> {
    let session = account::sign_in(&state, &request.email, &request.password).await?;
    let cookie = session_cookie(&session.access_token, session.expires_in);

    Ok((AppendHeaders([(SET_COOKIE, cookie)]), Json(session)))
}

async fn sign_out(
    State(state): State<AppState>,
    user: AuthUser,
) -> AppResult<impl IntoResponse> {
    account::sign_out(&state, &user.token).await?;

    Ok((
        AppendHeaders([(SET_COOKIE, session_cookie("", 0))]),
        Json(SuccessResponse::ok()),
    ))
}
