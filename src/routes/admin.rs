use axum::{
    extract::State,
    routing::{get, put},
    Json, Router,
};

use super::extract::{AppJson, AppPath};
use crate::middleware::auth::AuthUser;
use crate::models::{AppState, SuccessResponse, UpdateRoleRequest, UserProfile};
use crate::services::admin;
use crate::types::AppResult;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/admin/users", get(list_users))
        .route("/api/admin/users/{user_id}/role", put(update_user_role))
}

async fn list_users(
    State(state): State<AppState>,
    user: AuthUser,
) -> AppResult<Json<Vec<UserProfile>>> {
    Ok(Json(admin::list_users(&state, Some(&user.identity)).await?))
}

async fn update_user_role(
    State(state): State<AppState>,
    user: AuthUser,
    AppPath(user_id): AppPath<String>,
    AppJson(request): AppJson<UpdateRoleRequest>,
) -> AppResult<Json<SuccessResponse>> {
    admin::update_user_role(&state, Some(&user.identity), &user_id, &request.role).await?;
    Ok(Json(SuccessResponse::ok()))
}
