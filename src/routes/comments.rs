use axum::{
    extract::State,
    http::StatusCode,
    routing::{delete, get},
    Json, Router,
};

use super::extract::{AppJson, AppPath};
use crate::middleware::auth::AuthUser;
use crate::models::{AppState, Comment, CommentRequest, SuccessResponse};
use crate::services::comments;
use crate::types::AppResult;

pub fn router() -> Router<AppState> {
    Router::new()
        .route(
            "/api/polls/{poll_id}/comments",
            get(list_comments).post(submit_comment),
        )
        .route("/api/comments/{comment_id}", delete(delete_comment))
}

async fn list_comments(
    State(state): State<AppState>,
    AppPath(poll_id): AppPath<String>,
) -> AppResult<Json<Vec<Comment>>> {
    Ok(Json(comments::list_comments(&state, &poll_id).await?))
}

async fn submit_comment(
    State(state): State<AppState>,
    user: AuthUser,
    AppPath(poll_id): AppPath<String>,
    AppJson(request): AppJson<CommentRequest>,
) -> AppResult<(StatusCode, Json<Comment>)> {
    let comment =
        comments::submit_comment(&state, Some(&user.identity), &poll_id, &request.content).await?;
    Ok((StatusCode::CREATED, Json(comment)))
}

async fn delete_comment(
    State(state): State<AppState>,
    user: AuthUser,
    AppPath(comment_id): AppPath<String>,
) -> AppResult<Json<SuccessResponse>> {
    comments::delete_comment(&state, Some(&user.identity), &comment_id).await?;
    Ok(Json(SuccessResponse::ok()))
}
