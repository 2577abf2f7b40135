//! API Routes
//!
//! - `/api/health` - Health check
//! - `/api/auth/*` - Sign-up, sign-in, sign-out
//! - `/api/polls` - Poll creation, listing, results, sharing, deletion
//! - `/api/polls/{poll_id}/votes` - Voting, and the caller's own vote
//! - `/api/polls/{poll_id}/comments`, `/api/comments/{comment_id}` - Comments
//! - `/api/admin/*` - User listing and role management

pub mod admin;
pub mod auth;
pub mod comments;
pub mod extract;
pub mod health;
pub mod polls;
pub mod votes;

use axum::Router;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::middleware::cors::apply_cors;
use crate::models::AppState;

/// Create the main application router
pub fn create_router(state: AppState) -> Router {
    info!("Creating application router");

    let api_router = Router::new()
        .merge(health::router())
        .merge(auth::router())
        .merge(polls::router())
        .merge(votes::router())
        .merge(comments::router())
        .merge(admin::router())
        .layer(TraceLayer::new_for_http());

    let server_config = state.config.server.clone();
    apply_cors(api_router.with_state(state), &server_config)
}
