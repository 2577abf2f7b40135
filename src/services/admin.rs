use tracing::info;

use crate::middleware::auth::Identity;
use crate::models::{AppState, Role, UserProfile};
use crate::services::{is_admin, require_caller};
use crate::types::{AppError, AppResult};
use crate::validation::{parse_id, validate_input, RoleInput};

pub async fn update_user_role(
    state: &AppState,
    caller: Option<&Identity>,
    user_id: &str,
    role: &str,
) -> AppResult<()> {
    validate_input(&RoleInput { user_id, role })?;
    let caller = require_caller(caller)?;

    if !is_admin(state, caller.user_id).await? {
        return Err(AppError::Forbidden("Admin access required".to_string()));
    }

    let user_id = parse_id(user_id)?;
    let role = Role::from_id(role)
        .ok_or_else(|| AppError::Validation("Role must be 'admin' or 'default'".to_string()))?;

    if !state.store.set_user_role(user_id, role).await? {
        return Err(AppError::NotFound("user".to_string()));
    }

    info!(%user_id, %role, changed_by = %caller.user_id, "User role updated");
    Ok(())
}

pub async fn list_users(state: &AppState, caller: Option<&Identity>) -> AppResult<Vec<UserProfile>> {
    let caller = require_caller(caller)?;
    if !is_admin(state, caller.user_id).await? {
        return Err(AppError::Forbidden("Admin access required".to_string()));
    }
    Ok(state.store.list_users().await?)
}
