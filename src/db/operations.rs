use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use super::{PollStore, StoreError, StoreResult};
use crate::models::{Comment, Poll, PollOption, Role, UserProfile, VoteRecord};

const COMMENT_COLUMNS: &str = r#"
    c.id, c.poll_id, c.user_id, c.content, c.created_at,
    COALESCE(u.email, 'Anonymous') AS user_email
"#;

/// Postgres-backed store.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl PollStore for PgStore {
    async fn insert_poll(&self, owner: Uuid, question: &str) -> StoreResult<Poll> {
        let poll = sqlx::query_as::<_, Poll>(
            r#"
            INSERT INTO polls (question, user_id)
            VALUES ($1, $2)
            RETURNING id, question, user_id, created_at
            "#,
        )
        .bind(question)
        .bind(owner)
        .fetch_one(&self.pool)
        .await?;

        Ok(poll)
    }

    async fn insert_options(&self, poll_id: Uuid, texts: &[String]) -> StoreResult<Vec<PollOption>> {
        // One statement so a failure leaves no partial option set behind
        let options = sqlx::query_as::<_, PollOption>(
            r#"
            INSERT INTO poll_options (poll_id, text, position)
            SELECT $1, t.text, t.position
            FROM UNNEST($2::text[]) WITH ORDINALITY AS t(text, position)
            RETURNING id, poll_id, text, votes, created_at
            "#,
        )
        .bind(poll_id)
        .bind(texts)
        .fetch_all(&self.pool)
        .await?;

        Ok(options)
    }

    async fn delete_poll_row(&self, poll_id: Uuid) -> StoreResult<()> {
        sqlx::query("DELETE FROM polls WHERE id = $1")
            .bind(poll_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn delete_poll_cascade(&self, poll_id: Uuid) -> StoreResult<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM votes WHERE poll_id = $1")
            .bind(poll_id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM comments WHERE poll_id = $1")
            .bind(poll_id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM poll_options WHERE poll_id = $1")
            .bind(poll_id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM polls WHERE id = $1")
            .bind(poll_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn get_poll(&self, poll_id: Uuid) -> StoreResult<Option<Poll>> {
        let poll = sqlx::query_as::<_, Poll>(
            "SELECT id, question, user_id, created_at FROM polls WHERE id = $1",
        )
        .bind(poll_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(poll)
    }

    async fn list_options(&self, poll_id: Uuid) -> StoreResult<Vec<PollOption>> {
        let options = sqlx::query_as::<_, PollOption>(
            r#"
            SELECT id, poll_id, text, votes, created_at
            FROM poll_options
            WHERE poll_id = $1
            ORDER BY created_at ASC, position ASC
            "#,
        )
        .bind(poll_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(options)
    }

    async fn polls_by_owner(&self, owner: Uuid, offset: i64, limit: i64) -> StoreResult<(Vec<Poll>, i64)> {
        let polls = sqlx::query_as::<_, Poll>(
            r#"
            SELECT id, question, user_id, created_at
            FROM polls
            WHERE user_id = $1
            ORDER BY created_at DESC
            OFFSET $2 LIMIT $3
            "#,
        )
        .bind(owner)
        .bind(offset)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM polls WHERE user_id = $1")
            .bind(owner)
            .fetch_one(&self.pool)
            .await?;

        Ok((polls, total))
    }

    async fn find_vote(&self, poll_id: Uuid, user_id: Uuid) -> StoreResult<Option<VoteRecord>> {
        let vote = sqlx::query_as::<_, VoteRecord>(
            r#"
            SELECT id, poll_id, option_id, user_id, created_at
            FROM votes
            WHERE poll_id = $1 AND user_id = $2
            "#,
        )
        .bind(poll_id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(vote)
    }

    async fn record_vote(&self, poll_id: Uuid, option_id: Uuid, user_id: Uuid) -> StoreResult<VoteRecord> {
        let mut tx = self.pool.begin().await?;

        // votes_poll_user_key turns a concurrent duplicate into a unique violation
        let vote = sqlx::query_as::<_, VoteRecord>(
            r#"
            INSERT INTO votes (poll_id, option_id, user_id)
            VALUES ($1, $2, $3)
            RETURNING id, poll_id, option_id, user_id, created_at
            "#,
        )
        .bind(poll_id)
        .bind(option_id)
        .bind(user_id)
        .fetch_one(&mut *tx)
        .await?;

        let updated = sqlx::query("UPDATE poll_options SET votes = votes + 1 WHERE id = $1 AND poll_id = $2")
            .bind(option_id)
            .bind(poll_id)
            .execute(&mut *tx)
            .await?;
        if updated.rows_affected() == 0 {
            // Dropping the transaction rolls the vote back
            return Err(StoreError::Backend(format!("option {} not found", option_id)));
        }

        tx.commit().await?;
        Ok(vote)
    }

    async fn insert_comment(&self, poll_id: Uuid, user_id: Uuid, content: &str) -> StoreResult<Comment> {
        let query = format!(
            r#"
            WITH c AS (
                INSERT INTO comments (poll_id, user_id, content)
                VALUES ($1, $2, $3)
                RETURNING *
            )
            SELECT {COMMENT_COLUMNS}
            FROM c LEFT JOIN users u ON u.id = c.user_id
            "#
        );
        let comment = sqlx::query_as::<_, Comment>(&query)
            .bind(poll_id)
            .bind(user_id)
            .bind(content)
            .fetch_one(&self.pool)
            .await?;

        Ok(comment)
    }

    async fn list_comments(&self, poll_id: Uuid) -> StoreResult<Vec<Comment>> {
        let query = format!(
            r#"
            SELECT {COMMENT_COLUMNS}
            FROM comments c LEFT JOIN users u ON u.id = c.user_id
            WHERE c.poll_id = $1
            ORDER BY c.created_at ASC
            "#
        );
        let comments = sqlx::query_as::<_, Comment>(&query)
            .bind(poll_id)
            .fetch_all(&self.pool)
            .await?;

        Ok(comments)
    }

    async fn get_comment(&self, comment_id: Uuid) -> StoreResult<Option<Comment>> {
        let query = format!(
            r#"
            SELECT {COMMENT_COLUMNS}
            FROM comments c LEFT JOIN users u ON u.id = c.user_id
            WHERE c.id = $1
            "#
        );
        let comment = sqlx::query_as::<_, Comment>(&query)
            .bind(comment_id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(comment)
    }

    async fn delete_comment(&self, comment_id: Uuid) -> StoreResult<()> {
        sqlx::query("DELETE FROM comments WHERE id = $1")
            .bind(comment_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn user_role(&self, user_id: Uuid) -> StoreResult<Option<Role>> {
        let role: Option<Option<String>> = sqlx::query_scalar("SELECT role FROM users WHERE id = $1")
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(role.map(|r| r.as_deref().and_then(Role::from_id).unwrap_or(Role::Default)))
    }

    async fn list_users(&self) -> StoreResult<Vec<UserProfile>> {
        let rows: Vec<(Uuid, Option<String>, Option<String>)> =
            sqlx::query_as("SELECT id, email, role FROM users ORDER BY email ASC NULLS LAST")
                .fetch_all(&self.pool)
                .await?;

        Ok(rows
            .into_iter()
            .map(|(id, email, role)| UserProfile {
                id,
                email,
                role: role.as_deref().and_then(Role::from_id).unwrap_or(Role::Default),
            })
            .collect())
    }

    async fn set_user_role(&self, user_id: Uuid, role: Role) -> StoreResult<bool> {
        let result = sqlx::query("UPDATE users SET role = $1 WHERE id = $2")
            .bind(role.to_string())
            .bind(user_id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn ping(&self) -> StoreResult<()> {
        super::health_check(&self.pool).await
    }
}
