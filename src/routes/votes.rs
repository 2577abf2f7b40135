use axum::{
    extract::State,
    routing::{get, post},
    Json, Router,
};

use super::extract::{AppJson, AppPath};
use crate::middleware::auth::{AuthUser, ClientIdentifier, MaybeAuthUser};
use crate::models::{AppState, SuccessResponse, VoteRequest, VoteStatus};
use crate::services::votes;
use crate::types::AppResult;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/polls/{poll_id}/votes", post(submit_vote))
        .route("/api/polls/{poll_id}/votes/me", get(has_voted))
}

async fn submit_vote(
    State(state): State<AppState>,
    user: MaybeAuthUser,
    ClientIdentifier(identifier): ClientIdentifier,
    AppPath(poll_id): AppPath<String>,
    AppJson(request): AppJson<VoteRequest>,
) -> AppResult<Json<SuccessResponse>> {
    votes::submit_vote(
        &state,
        user.identity(),
        &identifier,
        &poll_id,
        &request.option_id,
    )
    .await?;
    Ok(Json(SuccessResponse::ok()))
}

async fn has_voted(
    State(state): State<AppState>,
    user: AuthUser,
    AppPath(poll_id): AppPath<String>,
) -> AppResult<Json<VoteStatus>> {
    Ok(Json(votes::has_voted(&state, Some(&user.identity), &poll_id).await?))
}
