//! Fixed-window request limiter.
//!
//! Counters live in process memory, keyed by action category, client
//! identifier and window bucket (`floor(now / window_ms)`). Bucketing keeps
//! each check O(1) at the cost of allowing up to `2 * max` requests across a
//! bucket boundary, which is fine for abuse mitigation.
//!
//! State is local to one process and is lost on restart. Behind a load
//! balancer each instance enforces its own budget.

use std::sync::Arc;

use dashmap::DashMap;
use rand::Rng;
use serde::Serialize;
use tracing::debug;

use crate::types::{AppError, AppResult};

/// Identifier used when no session token can be resolved. All such
/// callers share one budget.
pub const ANONYMOUS_IDENTIFIER: &str = "anonymous";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RateLimitAction {
    Vote,
    PollCreation,
    PollDeletion,
}

impl std::fmt::Display for RateLimitAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RateLimitAction::Vote => write!(f, "vote"),
            RateLimitAction::PollCreation => write!(f, "poll_creation"),
            RateLimitAction::PollDeletion => write!(f, "poll_deletion"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    pub action: RateLimitAction,
    /// Window length in milliseconds, must be > 0.
    pub window_ms: u64,
    /// Requests allowed per window, must be > 0.
    pub max: u32,
    pub message: String,
}

impl RateLimitConfig {
    pub fn vote() -> Self {
        Self {
            action: RateLimitAction::Vote,
            window_ms: 60_000,
            max: 10,
            message: "Too many votes. Please try again later.".to_string(),
        }
    }

    pub fn poll_creation() -> Self {
        Self {
            action: RateLimitAction::PollCreation,
            window_ms: 60_000,
            max: 3,
            message: "Too many polls created. Please try again later.".to_string(),
        }
    }

    pub fn poll_deletion() -> Self {
        Self {
            action: RateLimitAction::PollDeletion,
            window_ms: 60_000,
            max: 5,
            message: "Too many poll deletions. Please try again later.".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RateLimitDecision {
    pub allowed: bool,
    pub remaining: u32,
    /// Epoch milliseconds after which the window no longer applies.
    pub reset_time: i64,
}

#[derive(Debug, Clone, Copy)]
struct WindowEntry {
    count: u32,
    reset_time: i64,
}

#[derive(Clone)]
pub struct RateLimiter {
    windows: Arc<DashMap<String, WindowEntry>>,
    cleanup_probability: f64,
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new(0.01)
    }
}

impl RateLimiter {
    pub fn new(cleanup_probability: f64) -> Self {
        Self {
            windows: Arc::new(DashMap::new()),
            cleanup_probability: cleanup_probability.clamp(0.0, 1.0),
        }
    }

    pub fn check_and_consume(&self, identifier: &str, config: &RateLimitConfig) -> RateLimitDecision {
        self.check_and_consume_at(identifier, config, chrono::Utc::now().timestamp_millis())
    }

    pub fn check_and_consume_at(
        &self,
        identifier: &str,
        config: &RateLimitConfig,
        now_ms: i64,
    ) -> RateLimitDecision {
        let window_ms = config.window_ms.max(1) as i64;
        let max = config.max.max(1);
        let key = format!(
            "{}:{}:{}",
            config.action,
            identifier,
            now_ms.div_euclid(window_ms)
        );

        // The entry guard holds the shard lock, so read-check-increment is
        // atomic for this key.
        let mut entry = self.windows.entry(key).or_insert(WindowEntry {
            count: 0,
            reset_time: now_ms + window_ms,
        });

        if entry.count == 0 || now_ms > entry.reset_time {
            entry.count = 1;
            entry.reset_time = now_ms + window_ms;
            return RateLimitDecision {
                allowed: true,
                remaining: max - 1,
                reset_time: entry.reset_time,
            };
        }

        if entry.count >= max {
            return RateLimitDecision {
                allowed: false,
                remaining: 0,
                reset_time: entry.reset_time,
            };
        }

        entry.count += 1;
        RateLimitDecision {
            allowed: true,
            remaining: max - entry.count,
            reset_time: entry.reset_time,
        }
    }

    /// Drops every window whose reset time has passed.
    pub fn cleanup(&self) {
        self.cleanup_at(chrono::Utc::now().timestamp_millis());
    }

    pub fn cleanup_at(&self, now_ms: i64) {
        let before = self.windows.len();
        self.windows.retain(|_, entry| now_ms <= entry.reset_time);
        debug!(
            removed = before.saturating_sub(self.windows.len()),
            remaining = self.windows.len(),
            "Rate limiter cleanup"
        );
    }

    pub fn tracked_windows(&self) -> usize {
        self.windows.len()
    }

    /// Checks the limit for `identifier`, occasionally sweeping expired
    /// windows first. A rejection carries the configured message.
    pub fn rate_limit(&self, identifier: &str, config: &RateLimitConfig) -> AppResult<RateLimitDecision> {
        if self.cleanup_probability > 0.0 && rand::thread_rng().gen_bool(self.cleanup_probability) {
            self.cleanup();
        }

        let decision = self.check_and_consume(identifier, config);
        if decision.allowed {
            debug!(
                action = %config.action,
                remaining = decision.remaining,
                "Rate limit check passed"
            );
            Ok(decision)
        } else {
            let message = if config.message.is_empty() {
                "Rate limit exceeded. Please try again later.".to_string()
            } else {
                config.message.clone()
            };
            Err(AppError::RateLimited(message))
        }
    }
}
