use std::sync::Arc;

use crate::auth::AuthClient;
use crate::cache::QueryCache;
use crate::config::Config;
use crate::db::PollStore;
use crate::middleware::rate_limiter::RateLimiter;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn PollStore>,
    pub config: Config,
    pub rate_limiter: RateLimiter,
    pub cache: QueryCache,
    pub auth: Arc<AuthClient>,
}

impl AppState {
    pub fn new(store: Arc<dyn PollStore>, config: Config) -> Self {
        let rate_limiter = RateLimiter::new(config.rate_limit.cleanup_probability);
        let cache = QueryCache::with_max_entries(
            std::time::Duration::from_secs(config.cache.ttl_secs),
            config.cache.max_entries,
        );
        let auth = Arc::new(AuthClient::new(&config.auth));
        Self {
            store,
            config,
            rate_limiter,
            cache,
            auth,
        }
    }
}

// Rows
// Note: FromRow is needed for runtime query_as (without DATABASE_URL at compile time)

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize, sqlx::FromRow)]
pub struct Poll {
    pub id: uuid::Uuid,
    pub question: String,
    pub user_id: uuid::Uuid,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize, sqlx::FromRow)]
pub struct PollOption {
    pub id: uuid::Uuid,
    pub poll_id: uuid::Uuid,
    pub text: String,
    /// Denormalized vote counter, only ever changed by atomic increment.
    pub votes: i32,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize, sqlx::FromRow)]
pub struct VoteRecord {
    pub id: uuid::Uuid,
    pub poll_id: uuid::Uuid,
    pub option_id: uuid::Uuid,
    pub user_id: uuid::Uuid,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize, sqlx::FromRow)]
pub struct Comment {
    pub id: uuid::Uuid,
    pub poll_id: uuid::Uuid,
    pub user_id: uuid::Uuid,
    pub content: String,
    pub created_at: chrono::DateTime<chrono::Utc>,
    /// Author email, "Anonymous" when the profile is missing
    pub user_email: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Default,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::Admin => write!(f, "admin"),
            Role::Default => write!(f, "default"),
        }
    }
}

impl Role {
    pub fn from_id(id: &str) -> Option<Self> {
        match id {
            "admin" => Some(Role::Admin),
            "default" => Some(Role::Default),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct UserProfile {
    pub id: uuid::Uuid,
    pub email: Option<String>,
    pub role: Role,
}

// Read models

#[derive(Debug, Clone, serde::Serialize)]
pub struct PollWithOptions {
    #[serde(flatten)]
    pub poll: Poll,
    pub options: Vec<PollOption>,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct OptionResult {
    pub id: uuid::Uuid,
    pub text: String,
    pub votes: i64,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct PollResults {
    pub poll_id: uuid::Uuid,
    pub question: String,
    pub options: Vec<OptionResult>,
    pub total_votes: i64,
}

/// Whether the caller has a vote on a poll, and for which option.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct VoteStatus {
    pub has_voted: bool,
    pub option_id: Option<uuid::Uuid>,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct PollPage {
    pub polls: Vec<Poll>,
    pub total_count: i64,
    pub page: u32,
    pub page_size: u32,
}

// API Request/Response types

#[derive(Debug, Clone, serde::Deserialize)]
pub struct CreatePollRequest {
    pub question: String,
    pub options: Vec<String>,
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct VoteRequest {
    pub option_id: String,
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct CommentRequest {
    pub content: String,
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct CredentialsRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct UpdateRoleRequest {
    pub role: String,
}

#[derive(Debug, Clone, Default, serde::Deserialize)]
pub struct PageQuery {
    pub page: Option<u32>,
    pub page_size: Option<u32>,
}

#[derive(Debug, Clone, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatePollResponse {
    pub success: bool,
    pub poll_id: uuid::Uuid,
    pub share_url: String,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct SuccessResponse {
    pub success: bool,
}

impl SuccessResponse {
    pub fn ok() -> Self {
        Self { success: true }
    }
}

#[derive(Debug, Clone, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ShareLinkResponse {
    pub poll_id: uuid::Uuid,
    pub url: String,
}

#[derive(Debug, serde::Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: String,
    pub database: String,
    pub rate_limit_windows: usize,
}
