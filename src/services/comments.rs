use tracing::info;

use crate::cache::{comments_tag, COMMENTS_TAG};
use crate::middleware::auth::Identity;
use crate::models::{AppState, Comment};
use crate::services::{is_admin, require_caller};
use crate::types::{AppError, AppResult};
use crate::validation::{parse_id, validate_input, CommentIdInput, CommentInput, PollIdInput};

pub async fn submit_comment(
    state: &AppState,
    caller: Option<&Identity>,
    poll_id: &str,
    content: &str,
) -> AppResult<Comment> {
    validate_input(&CommentInput { poll_id, content })?;
    let caller = require_caller(caller)?;
    let poll_id = parse_id(poll_id)?;

    state
        .store
        .get_poll(poll_id)
        .await?
        .ok_or_else(|| AppError::NotFound("poll".to_string()))?;

    let comment = state
        .store
        .insert_comment(poll_id, caller.user_id, content.trim())
        .await?;
    state.cache.invalidate_tag(&comments_tag(poll_id)).await;

    info!(comment_id = %comment.id, %poll_id, "Comment added");
    Ok(comment)
}

pub async fn list_comments(state: &AppState, poll_id: &str) -> AppResult<Vec<Comment>> {
    validate_input(&PollIdInput { poll_id })?;
    let poll_id = parse_id(poll_id)?;

    let key = format!("comments:{}:list", poll_id);
    let tags = [COMMENTS_TAG.to_string(), comments_tag(poll_id)];
    state
        .cache
        .get_or_load(&key, &tags, || async {
            Ok::<_, AppError>(state.store.list_comments(poll_id).await?)
        })
        .await
}

/// Authors may delete their own comments; admins may delete any.
pub async fn delete_comment(
    state: &AppState,
    caller: Option<&Identity>,
    comment_id: &str,
) -> AppResult<()> {
    validate_input(&CommentIdInput { comment_id })?;
    let caller = require_caller(caller)?;
    let comment_id = parse_id(comment_id)?;

    let comment = state
        .store
        .get_comment(comment_id)
        .await?
        .ok_or_else(|| AppError::NotFound("comment".to_string()))?;

    if comment.user_id != caller.user_id && !is_admin(state, caller.user_id).await? {
        return Err(AppError::Forbidden(
            "You can only delete your own comments".to_string(),
        ));
    }

    state.store.delete_comment(comment_id).await?;
    state.cache.invalidate_tag(&comments_tag(comment.poll_id)).await;

    info!(%comment_id, poll_id = %comment.poll_id, "Comment deleted");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Role;
    use crate::test_support::{identity, test_state};
    use uuid::Uuid;

    #[tokio::test]
    async fn test_comments_round_trip_with_author_email() {
        let (state, store) = test_state();
        let author = identity(Uuid::new_v4());
        store.add_user(author.user_id, "author@example.com", Role::Default).await;
        let poll = state.store.insert_poll(Uuid::new_v4(), "Q?").await.unwrap();
        let poll_id = poll.id.to_string();

        assert!(list_comments(&state, &poll_id).await.unwrap().is_empty());

        submit_comment(&state, Some(&author), &poll_id, "  First!  ").await.unwrap();
        submit_comment(&state, Some(&identity(Uuid::new_v4())), &poll_id, "Second")
            .await
            .unwrap();

        let comments = list_comments(&state, &poll_id).await.unwrap();
        assert_eq!(comments.len(), 2);
        assert_eq!(comments[0].content, "First!");
        assert_eq!(comments[0].user_email, "author@example.com");
        assert_eq!(comments[1].user_email, "Anonymous");
    }

    #[tokio::test]
    async fn test_comment_on_missing_poll() {
        let (state, _store) = test_state();
        let err = submit_comment(
            &state,
            Some(&identity(Uuid::new_v4())),
            &Uuid::new_v4().to_string(),
            "hello",
        )
        .await
        .unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_delete_comment_permissions() {
        let (state, store) = test_state();
        let author = identity(Uuid::new_v4());
        let admin = identity(Uuid::new_v4());
        store.add_user(admin.user_id, "admin@example.com", Role::Admin).await;
        let poll = state.store.insert_poll(Uuid::new_v4(), "Q?").await.unwrap();
        let poll_id = poll.id.to_string();

        let first = submit_comment(&state, Some(&author), &poll_id, "mine").await.unwrap();
        let second = submit_comment(&state, Some(&author), &poll_id, "also mine")
            .await
            .unwrap();

        let err = delete_comment(&state, Some(&identity(Uuid::new_v4())), &first.id.to_string())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)));

        delete_comment(&state, Some(&author), &first.id.to_string()).await.unwrap();
        delete_comment(&state, Some(&admin), &second.id.to_string()).await.unwrap();
        assert!(list_comments(&state, &poll_id).await.unwrap().is_empty());

        let err = delete_comment(&state, Some(&author), &first.id.to_string())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }
}
