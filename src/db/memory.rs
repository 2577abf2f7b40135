// In-process store used when no DATABASE_URL is configured, and by tests.
// Mirrors the Postgres schema's constraints: one vote per (poll, user) and
// options that must belong to an existing poll.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{PollStore, StoreError, StoreResult};
use crate::models::{Comment, Poll, PollOption, Role, UserProfile, VoteRecord};

#[derive(Debug, Clone)]
struct UserRow {
    email: String,
    role: Role,
}

#[derive(Debug, Clone)]
struct CommentRow {
    id: Uuid,
    poll_id: Uuid,
    user_id: Uuid,
    content: String,
    created_at: chrono::DateTime<Utc>,
}

#[derive(Default)]
struct Tables {
    polls: Vec<Poll>,
    options: Vec<PollOption>,
    votes: Vec<VoteRecord>,
    comments: Vec<CommentRow>,
    users: HashMap<Uuid, UserRow>,
}

impl Tables {
    fn comment(&self, row: &CommentRow) -> Comment {
        Comment {
            id: row.id,
            poll_id: row.poll_id,
            user_id: row.user_id,
            content: row.content.clone(),
            created_at: row.created_at,
            user_email: self
                .users
                .get(&row.user_id)
                .map(|u| u.email.clone())
                .unwrap_or_else(|| "Anonymous".to_string()),
        }
    }
}

#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<RwLock<Tables>>,
    fail_options_insert: Arc<AtomicBool>,
    fail_vote_count: Arc<AtomicBool>,
    unavailable: Arc<AtomicBool>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn add_user(&self, user_id: Uuid, email: &str, role: Role) {
        let mut guard = self.inner.write().await;
        guard.users.insert(
            user_id,
            UserRow {
                email: email.to_string(),
                role,
            },
        );
    }

    /// Makes every subsequent `insert_options` call fail.
    pub fn fail_options_insert(&self, fail: bool) {
        self.fail_options_insert.store(fail, Ordering::SeqCst);
    }

    /// Makes the counter update inside `record_vote` fail.
    pub fn fail_vote_count(&self, fail: bool) {
        self.fail_vote_count.store(fail, Ordering::SeqCst);
    }

    /// Makes every operation fail as if the database were down.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    pub async fn poll_count(&self) -> usize {
        self.inner.read().await.polls.len()
    }

    pub async fn option_count(&self) -> usize {
        self.inner.read().await.options.len()
    }

    pub async fn vote_count(&self) -> usize {
        self.inner.read().await.votes.len()
    }

    fn check_available(&self) -> StoreResult<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::Backend("connection refused".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl PollStore for MemoryStore {
    async fn insert_poll(&self, owner: Uuid, question: &str) -> StoreResult<Poll> {
        self.check_available()?;
        let poll = Poll {
            id: Uuid::new_v4(),
            question: question.to_string(),
            user_id: owner,
            created_at: Utc::now(),
        };
        self.inner.write().await.polls.push(poll.clone());
        Ok(poll)
    }

    async fn insert_options(&self, poll_id: Uuid, texts: &[String]) -> StoreResult<Vec<PollOption>> {
        self.check_available()?;
        if self.fail_options_insert.load(Ordering::SeqCst) {
            return Err(StoreError::Backend("insert into poll_options failed".to_string()));
        }

        let mut guard = self.inner.write().await;
        if !guard.polls.iter().any(|p| p.id == poll_id) {
            return Err(StoreError::Backend(
                "poll_options_poll_id_fkey violated".to_string(),
            ));
        }

        let now = Utc::now();
        let options: Vec<PollOption> = texts
            .iter()
            .map(|text| PollOption {
                id: Uuid::new_v4(),
                poll_id,
                text: text.clone(),
                votes: 0,
                created_at: now,
            })
            .collect();
        guard.options.extend(options.iter().cloned());
        Ok(options)
    }

    async fn delete_poll_row(&self, poll_id: Uuid) -> StoreResult<()> {
        self.check_available()?;
        self.inner.write().await.polls.retain(|p| p.id != poll_id);
        Ok(())
    }

    async fn delete_poll_cascade(&self, poll_id: Uuid) -> StoreResult<()> {
        self.check_available()?;
        let mut guard = self.inner.write().await;
        guard.votes.retain(|v| v.poll_id != poll_id);
        guard.comments.retain(|c| c.poll_id != poll_id);
        guard.options.retain(|o| o.poll_id != poll_id);
        guard.polls.retain(|p| p.id != poll_id);
        Ok(())
    }

    async fn get_poll(&self, poll_id: Uuid) -> StoreResult<Option<Poll>> {
        self.check_available()?;
        let guard = self.inner.read().await;
        Ok(guard.polls.iter().find(|p| p.id == poll_id).cloned())
    }

    async fn list_options(&self, poll_id: Uuid) -> StoreResult<Vec<PollOption>> {
        self.check_available()?;
        let guard = self.inner.read().await;
        Ok(guard
            .options
            .iter()
            .filter(|o| o.poll_id == poll_id)
            .cloned()
            .collect())
    }

    async fn polls_by_owner(&self, owner: Uuid, offset: i64, limit: i64) -> StoreResult<(Vec<Poll>, i64)> {
        self.check_available()?;
        let guard = self.inner.read().await;
        let owned: Vec<&Poll> = guard.polls.iter().rev().filter(|p| p.user_id == owner).collect();
        let total = owned.len() as i64;
        let page = owned
            .into_iter()
            .skip(offset.max(0) as usize)
            .take(limit.max(0) as usize)
            .cloned()
            .collect();
        Ok((page, total))
    }

    async fn find_vote(&self, poll_id: Uuid, user_id: Uuid) -> StoreResult<Option<VoteRecord>> {
        self.check_available()?;
        let guard = self.inner.read().await;
        Ok(guard
            .votes
            .iter()
            .find(|v| v.poll_id == poll_id && v.user_id == user_id)
            .cloned())
    }

    async fn record_vote(&self, poll_id: Uuid, option_id: Uuid, user_id: Uuid) -> StoreResult<VoteRecord> {
        self.check_available()?;
        // All checks run before any mutation, under one write lock
        let mut guard = self.inner.write().await;
        if guard
            .votes
            .iter()
            .any(|v| v.poll_id == poll_id && v.user_id == user_id)
        {
            return Err(StoreError::Conflict("votes_poll_user_key".to_string()));
        }
        if self.fail_vote_count.load(Ordering::SeqCst) {
            return Err(StoreError::Backend("update poll_options failed".to_string()));
        }

        let option = guard
            .options
            .iter_mut()
            .find(|o| o.id == option_id && o.poll_id == poll_id)
            .ok_or_else(|| StoreError::Backend(format!("option {} not found", option_id)))?;
        option.votes += 1;

        let vote = VoteRecord {
            id: Uuid::new_v4(),
            poll_id,
            option_id,
            user_id,
            created_at: Utc::now(),
        };
        guard.votes.push(vote.clone());
        Ok(vote)
    }

    async fn insert_comment(&self, poll_id: Uuid, user_id: Uuid, content: &str) -> StoreResult<Comment> {
        self.check_available()?;
        let mut guard = self.inner.write().await;
        let row = CommentRow {
            id: Uuid::new_v4(),
            poll_id,
            user_id,
            content: content.to_string(),
            created_at: Utc::now(),
        };
        let comment = guard.comment(&row);
        guard.comments.push(row);
        Ok(comment)
    }

    async fn list_comments(&self, poll_id: Uuid) -> StoreResult<Vec<Comment>> {
        self.check_available()?;
        let guard = self.inner.read().await;
        Ok(guard
            .comments
            .iter()
            .filter(|c| c.poll_id == poll_id)
            .map(|c| guard.comment(c))
            .collect())
    }

    async fn get_comment(&self, comment_id: Uuid) -> StoreResult<Option<Comment>> {
        self.check_available()?;
        let guard = self.inner.read().await;
        Ok(guard
            .comments
            .iter()
            .find(|c| c.id == comment_id)
            .map(|c| guard.comment(c)))
    }

    async fn delete_comment(&self, comment_id: Uuid) -> StoreResult<()> {
        self.check_available()?;
        self.inner.write().await.comments.retain(|c| c.id != comment_id);
        Ok(())
    }

    async fn user_role(&self, user_id: Uuid) -> StoreResult<Option<Role>> {
        self.check_available()?;
        let guard = self.inner.read().await;
        Ok(guard.users.get(&user_id).map(|u| u.role))
    }

    async fn list_users(&self) -> StoreResult<Vec<UserProfile>> {
        self.check_available()?;
        let guard = self.inner.read().await;
        let mut users: Vec<UserProfile> = guard
            .users
            .iter()
            .map(|(id, row)| UserProfile {
                id: *id,
                email: Some(row.email.clone()),
                role: row.role,
            })
            .collect();
        users.sort_by(|a, b| a.email.cmp(&b.email));
        Ok(users)
    }

    async fn set_user_role(&self, user_id: Uuid, role: Role) -> StoreResult<bool> {
        self.check_available()?;
        let mut guard = self.inner.write().await;
        match guard.users.get_mut(&user_id) {
            Some(user) => {
                user.role = role;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn ping(&self) -> StoreResult<()> {
        self.check_available()
    }
}
