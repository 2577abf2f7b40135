use async_trait::async_trait;
use sqlx::postgres::{PgPool, PgPoolOptions};
use uuid::Uuid;

use crate::config::DatabaseConfig;
use crate::models::{Comment, Poll, PollOption, Role, UserProfile, VoteRecord};
use anyhow::Result;

pub use memory::*;
pub use operations::*;
pub use pool::*;

pub mod memory;
pub mod operations;
pub mod pool;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// A uniqueness constraint rejected the write.
    #[error("Unique constraint violated: {0}")]
    Conflict(String),

    #[error("Store unavailable: {0}")]
    Backend(String),
}

impl From<sqlx::Error> for StoreError {
    fn from(e: sqlx::Error) -> Self {
        if let sqlx::Error::Database(db) = &e {
            if db.is_unique_violation() {
                return StoreError::Conflict(
                    db.constraint().unwrap_or("unique").to_string(),
                );
            }
        }
        StoreError::Backend(e.to_string())
    }
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Persistence operations used by the services.
///
/// Single-row lookups return `Ok(None)` when nothing matches; `Err` always
/// means the store itself failed.
#[async_trait]
pub trait PollStore: Send + Sync {
    async fn insert_poll(&self, owner: Uuid, question: &str) -> StoreResult<Poll>;

    async fn insert_options(&self, poll_id: Uuid, texts: &[String]) -> StoreResult<Vec<PollOption>>;

    /// Removes the poll row only. Used to undo a half-created poll.
    async fn delete_poll_row(&self, poll_id: Uuid) -> StoreResult<()>;

    /// Removes the poll with its votes, comments and options.
    async fn delete_poll_cascade(&self, poll_id: Uuid) -> StoreResult<()>;

    async fn get_poll(&self, poll_id: Uuid) -> StoreResult<Option<Poll>>;

    /// Options ordered by creation time.
    async fn list_options(&self, poll_id: Uuid) -> StoreResult<Vec<PollOption>>;

    /// Newest first, with the total number of polls the owner has.
    async fn polls_by_owner(&self, owner: Uuid, offset: i64, limit: i64) -> StoreResult<(Vec<Poll>, i64)>;

    async fn find_vote(&self, poll_id: Uuid, user_id: Uuid) -> StoreResult<Option<VoteRecord>>;

    /// Inserts the vote and bumps the option's counter as one unit: either
    /// both land or neither does. Fails with `StoreError::Conflict` if the
    /// user already voted on the poll.
    async fn record_vote(&self, poll_id: Uuid, option_id: Uuid, user_id: Uuid) -> StoreResult<VoteRecord>;

    async fn insert_comment(&self, poll_id: Uuid, user_id: Uuid, content: &str) -> StoreResult<Comment>;

    /// Comments ordered oldest first.
    async fn list_comments(&self, poll_id: Uuid) -> StoreResult<Vec<Comment>>;

    async fn get_comment(&self, comment_id: Uuid) -> StoreResult<Option<Comment>>;

    async fn delete_comment(&self, comment_id: Uuid) -> StoreResult<()>;

    async fn user_role(&self, user_id: Uuid) -> StoreResult<Option<Role>>;

    /// Every profile, ordered by email.
    async fn list_users(&self) -> StoreResult<Vec<UserProfile>>;

    /// Returns false when the user does not exist.
    async fn set_user_role(&self, user_id: Uuid, role: Role) -> StoreResult<bool>;

    async fn ping(&self) -> StoreResult<()>;
}

pub async fn create_pool(config: &DatabaseConfig, url: &str) -> Result<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .min_connections(config.min_connections)
        .connect(url)
        .await?;

    // Test connection
    sqlx::query("SELECT 1")
        .fetch_one(&pool)
        .await?;

    Ok(pool)
}
