//! Application operations.
//!
//! Every mutating operation follows the same order: validate input, apply
//! its rate limit, resolve the caller, then touch the store. Nothing is
//! written before all three checks pass.

pub mod account;
pub mod admin;
pub mod comments;
pub mod polls;
pub mod votes;

use uuid::Uuid;

use crate::middleware::auth::Identity;
use crate::models::{AppState, Role};
use crate::types::{AppError, AppResult};

pub fn require_caller(caller: Option<&Identity>) -> AppResult<&Identity> {
    caller.ok_or(AppError::Unauthenticated)
}

/// Users without a profile row are treated as regular users.
pub async fn is_admin(state: &AppState, user_id: Uuid) -> AppResult<bool> {
    let role = state.store.user_role(user_id).await?;
    Ok(role == Some(Role::Admin))
}
