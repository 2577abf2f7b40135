//! Memoized read results with tag-based invalidation.
//!
//! Entries expire after the configured TTL. Writers call
//! [`QueryCache::invalidate_tag`] so the next read recomputes.

use std::any::Any;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

pub const POLLS_TAG: &str = "polls";
pub const COMMENTS_TAG: &str = "comments";

pub fn poll_tag(poll_id: Uuid) -> String {
    format!("poll:{}", poll_id)
}

pub fn comments_tag(poll_id: Uuid) -> String {
    format!("comments:{}", poll_id)
}

/// Upper bound on stored entries when none is configured.
pub const DEFAULT_MAX_ENTRIES: usize = 10_000;

struct CacheEntry {
    value: Arc<dyn Any + Send + Sync>,
    tags: Vec<String>,
    created_at: Instant,
    seq: u64,
}

#[derive(Default)]
struct CacheState {
    entries: HashMap<String, CacheEntry>,
    /// Bumped by every invalidation. A load that started under an older
    /// epoch may have read pre-write data and is not stored.
    epoch: u64,
    next_seq: u64,
}

#[derive(Clone)]
pub struct QueryCache {
    inner: Arc<RwLock<CacheState>>,
    ttl: Duration,
    max_entries: usize,
}

impl QueryCache {
    pub fn new(ttl: Duration) -> Self {
        Self::with_max_entries(ttl, DEFAULT_MAX_ENTRIES)
    }

    pub fn with_max_entries(ttl: Duration, max_entries: usize) -> Self {
        Self {
            inner: Arc::new(RwLock::new(CacheState::default())),
            ttl,
            max_entries: max_entries.max(1),
        }
    }

    fn is_expired(&self, entry: &CacheEntry) -> bool {
        entry.created_at.elapsed() >= self.ttl
    }

    /// Returns a live entry. An expired one is removed on the way out.
    pub async fn get<T>(&self, key: &str) -> Option<T>
    where
        T: Clone + Send + Sync + 'static,
    {
        {
            let guard = self.inner.read().await;
            match guard.entries.get(key) {
                None => return None,
                Some(entry) if !self.is_expired(entry) => {
                    return entry.value.downcast_ref::<T>().cloned();
                }
                Some(_) => {}
            }
        }

        let mut guard = self.inner.write().await;
        if guard.entries.get(key).is_some_and(|e| self.is_expired(e)) {
            guard.entries.remove(key);
        }
        None
    }

    pub async fn insert<T>(&self, key: &str, tags: &[String], value: T)
    where
        T: Send + Sync + 'static,
    {
        let mut guard = self.inner.write().await;
        self.store(&mut guard, key, tags, value);
    }

    fn store<T>(&self, state: &mut CacheState, key: &str, tags: &[String], value: T)
    where
        T: Send + Sync + 'static,
    {
        state.entries.retain(|_, entry| !self.is_expired(entry));

        if state.entries.len() >= self.max_entries && !state.entries.contains_key(key) {
            let oldest = state
                .entries
                .iter()
                .min_by_key(|(_, entry)| entry.seq)
                .map(|(k, _)| k.clone());
            if let Some(oldest) = oldest {
                state.entries.remove(&oldest);
            }
        }

        state.next_seq += 1;
        let seq = state.next_seq;
        state.entries.insert(
            key.to_string(),
            CacheEntry {
                value: Arc::new(value),
                tags: tags.to_vec(),
                created_at: Instant::now(),
                seq,
            },
        );
    }

    /// Returns the memoized value for `key`, or runs `load` and caches a
    /// successful result under `tags`. Errors are never cached, and neither
    /// is a result whose load overlapped an invalidation.
    pub async fn get_or_load<T, E, F, Fut>(&self, key: &str, tags: &[String], load: F) -> Result<T, E>
    where
        T: Clone + Send + Sync + 'static,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        if let Some(hit) = self.get::<T>(key).await {
            debug!(key, "Cache hit");
            return Ok(hit);
        }

        debug!(key, "Cache miss");
        let started_at = self.inner.read().await.epoch;
        let value = load().await?;

        let mut guard = self.inner.write().await;
        if guard.epoch == started_at {
            self.store(&mut guard, key, tags, value.clone());
        } else {
            debug!(key, "Invalidated during load, result not cached");
        }
        Ok(value)
    }

    pub async fn invalidate_tag(&self, tag: &str) {
        let mut guard = self.inner.write().await;
        guard.epoch += 1;
        let before = guard.entries.len();
        guard.entries.retain(|_, entry| !entry.tags.iter().any(|t| t == tag));
        debug!(tag, removed = before - guard.entries.len(), "Cache invalidated");
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.entries.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.entries.is_empty()
    }
}
