use axum::{
    extract::State,
    http::StatusCode,
    routing::get,
    Json, Router,
};

use super::extract::{AppJson, AppPath, AppQuery};
use crate::middleware::auth::{AuthUser, ClientIdentifier, MaybeAuthUser};
use crate::models::{
    AppState, CreatePollRequest, CreatePollResponse, PageQuery, PollPage, PollResults,
    PollWithOptions, ShareLinkResponse, SuccessResponse,
};
use crate::services::polls;
use crate::types::AppResult;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/polls", get(list_my_polls).post(create_poll))
        .route("/api/polls/{poll_id}", get(get_poll).delete(delete_poll))
        .route("/api/polls/{poll_id}/results", get(poll_results))
        .route("/api/polls/{poll_id}/share", get(share_link))
}

async fn list_my_polls(
    State(state): State<AppState>,
    user: AuthUser,
    AppQuery(query): AppQuery<PageQuery>,
) -> AppResult<Json<PollPage>> {
    let page = polls::list_my_polls(&state, Some(&user.identity), &query).await?;
    Ok(Json(page))
}

async fn create_poll(
    State(state): State<AppState>,
    user: MaybeAuthUser,
    ClientIdentifier(identifier): ClientIdentifier,
    AppJson(request): AppJson<CreatePollRequest>,
) -> AppResult<(StatusCode, Json<CreatePollResponse>)> {
    let created = polls::create_poll(
        &state,
        user.identity(),
        &identifier,
        &request.question,
        &request.options,
    )
    .await?;
    Ok((StatusCode::CREATED, Json(created)))
}

async fn get_poll(
    State(state): State<AppState>,
    AppPath(poll_id): AppPath<String>,
) -> AppResult<Json<PollWithOptions>> {
    Ok(Json(polls::get_poll(&state, &poll_id).await?))
}

async fn delete_poll(
    State(state): State<AppState>,
    user: MaybeAuthUser,
    ClientIdentifier(identifier): ClientIdentifier,
    AppPath(poll_id): AppPath<String>,
) -> AppResult<Json<SuccessResponse>> {
    polls::delete_poll(&state, user.identity(), &identifier, &poll_id).await?;
    Ok(Json(SuccessResponse::ok()))
}

async fn poll_results(
    State(state): State<AppState>,
    AppPath(poll_id): AppPath<String>,
) -> AppResult<Json<PollResults>> {
    Ok(Json(polls::poll_results(&state, &poll_id).await?))
}

async fn share_link(
    State(state): State<AppState>,
    AppPath(poll_id): AppPath<String>,
) -> AppResult<Json<ShareLinkResponse>> {
    Ok(Json(polls::share_link(&state, &poll_id).await?))
}
