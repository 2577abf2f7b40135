// One vote per (poll, user)

use tracing::{debug, info};

use crate::cache::poll_tag;
use crate::db::StoreError;
use crate::middleware::auth::Identity;
use crate::models::{AppState, VoteRecord, VoteStatus};
use crate::services::require_caller;
use crate::types::{AppError, AppResult};
use crate::validation::{parse_id, validate_input, PollIdInput, VoteInput};

/// Records the caller's vote.
///
/// The existence check gives the common duplicate a cheap answer; the
/// `(poll_id, user_id)` unique constraint catches two requests that both
/// pass it, and that conflict is reported the same way.
pub async fn submit_vote(
    state: &AppState,
    caller: Option<&Identity>,
    identifier: &str,
    poll_id: &str,
    option_id: &str,
) -> AppResult<VoteRecord> {
    validate_input(&VoteInput { option_id, poll_id })?;
    state
        .rate_limiter
        .rate_limit(identifier, &state.config.rate_limit.vote)?;
    let caller = require_caller(caller)?;

    let poll_id = parse_id(poll_id)?;
    let option_id = parse_id(option_id)?;

    state
        .store
        .get_poll(poll_id)
        .await?
        .ok_or_else(|| AppError::NotFound("poll".to_string()))?;

    let options = state.store.list_options(poll_id).await?;
    if !options.iter().any(|o| o.id == option_id) {
        return Err(AppError::Validation(
            "Option does not belong to this poll".to_string(),
        ));
    }

    if let Some(existing) = state.store.find_vote(poll_id, caller.user_id).await? {
        debug!(vote_id = %existing.id, %poll_id, "Existing vote found");
        return Err(AppError::AlreadyVoted);
    }

    let vote = match state.store.record_vote(poll_id, option_id, caller.user_id).await {
        Ok(vote) => vote,
        Err(StoreError::Conflict(constraint)) => {
            debug!(%constraint, %poll_id, "Concurrent duplicate vote");
            return Err(AppError::AlreadyVoted);
        }
        Err(e) => return Err(e.into()),
    };

    state.cache.invalidate_tag(&poll_tag(poll_id)).await;

    info!(%poll_id, %option_id, user_id = %caller.user_id, "Vote recorded");
    Ok(vote)
}

pub async fn has_voted(state: &AppState, caller: Option<&Identity>, poll_id: &str) -> AppResult<VoteStatus> {
    validate_input(&PollIdInput { poll_id })?;
    let caller = require_caller(caller)?;
    let poll_id = parse_id(poll_id)?;

    state
        .store
        .get_poll(poll_id)
        .await?
        .ok_or_else(|| AppError::NotFound("poll".to_string()))?;

    let vote = state.store.find_vote(poll_id, caller.user_id).await?;
    Ok(VoteStatus {
        has_voted: vote.is_some(),
        option_id: vote.map(|v| v.option_id),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::models::{Poll, PollOption};
    use crate::test_support::{identity, test_state, test_state_with, TEST_SECRET};
    use uuid::Uuid;

    async fn seed_poll(state: &AppState) -> (Poll, Vec<PollOption>) {
        let poll = state
            .store
            .insert_poll(Uuid::new_v4(), "Best editor?")
            .await
            .unwrap();
        let options = state
            .store
            .insert_options(poll.id, &["vim".to_string(), "emacs".to_string()])
            .await
            .unwrap();
        (poll, options)
    }

    #[tokio::test]
    async fn test_second_vote_is_rejected() {
        let (state, store) = test_state();
        let (poll, options) = seed_poll(&state).await;
        let voter = identity(Uuid::new_v4());
        let poll_id = poll.id.to_string();
        let option_id = options[0].id.to_string();

        submit_vote(&state, Some(&voter), "voter", &poll_id, &option_id)
            .await
            .unwrap();
        let err = submit_vote(&state, Some(&voter), "voter", &poll_id, &option_id)
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::AlreadyVoted));
        assert_eq!(store.vote_count().await, 1);
        let counted = state.store.list_options(poll.id).await.unwrap();
        assert_eq!(counted[0].votes, 1);
    }

    #[tokio::test]
    async fn test_concurrent_duplicates_record_one_vote() {
        let (state, store) = test_state();
        let (poll, options) = seed_poll(&state).await;
        let voter = identity(Uuid::new_v4());
        let poll_id = poll.id.to_string();
        let option_id = options[1].id.to_string();

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let state = state.clone();
                let voter = voter.clone();
                let poll_id = poll_id.clone();
                let option_id = option_id.clone();
                tokio::spawn(async move {
                    submit_vote(&state, Some(&voter), "voter", &poll_id, &option_id).await
                })
            })
            .collect();

        let mut accepted = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(_) => accepted += 1,
                Err(AppError::AlreadyVoted) => {}
                Err(other) => panic!("unexpected error: {:?}", other),
            }
        }

        assert_eq!(accepted, 1);
        assert_eq!(store.vote_count().await, 1);
        let counted = state.store.list_options(poll.id).await.unwrap();
        assert_eq!(counted[1].votes, 1);
    }

    #[tokio::test]
    async fn test_anonymous_caller_is_rejected() {
        let (state, store) = test_state();
        let (poll, options) = seed_poll(&state).await;

        let err = submit_vote(
            &state,
            None,
            "anonymous",
            &poll.id.to_string(),
            &options[0].id.to_string(),
        )
        .await
        .unwrap_err();

        assert!(matches!(err, AppError::Unauthenticated));
        assert_eq!(store.vote_count().await, 0);
    }

    #[tokio::test]
    async fn test_validation_precedes_everything() {
        let (state, _store) = test_state();
        let err = submit_vote(&state, None, "anonymous", "", "")
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
        assert_eq!(state.rate_limiter.tracked_windows(), 0);
    }

    #[tokio::test]
    async fn test_unknown_poll_and_foreign_option() {
        let (state, _store) = test_state();
        let (poll, _options) = seed_poll(&state).await;
        let (_other, other_options) = seed_poll(&state).await;
        let voter = identity(Uuid::new_v4());

        let err = submit_vote(
            &state,
            Some(&voter),
            "voter",
            &Uuid::new_v4().to_string(),
            &other_options[0].id.to_string(),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));

        let err = submit_vote(
            &state,
            Some(&voter),
            "voter",
            &poll.id.to_string(),
            &other_options[0].id.to_string(),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[tokio::test]
    async fn test_vote_rate_limit() {
        let mut config = Config::for_local(TEST_SECRET);
        config.rate_limit.vote.max = 2;
        let (state, _store) = test_state_with(config);
        let voter = identity(Uuid::new_v4());

        for _ in 0..2 {
            let (poll, options) = seed_poll(&state).await;
            submit_vote(
                &state,
                Some(&voter),
                "voter",
                &poll.id.to_string(),
                &options[0].id.to_string(),
            )
            .await
            .unwrap();
        }

        let (poll, options) = seed_poll(&state).await;
        let err = submit_vote(
            &state,
            Some(&voter),
            "voter",
            &poll.id.to_string(),
            &options[0].id.to_string(),
        )
        .await
        .unwrap_err();
        match err {
            AppError::RateLimited(msg) => assert_eq!(msg, "Too many votes. Please try again later."),
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_store_failure_surfaces_as_database_error() {
        let (state, store) = test_state();
        let (poll, options) = seed_poll(&state).await;
        store.set_unavailable(true);

        let err = submit_vote(
            &state,
            Some(&identity(Uuid::new_v4())),
            "voter",
            &poll.id.to_string(),
            &options[0].id.to_string(),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, AppError::Database(_)));
    }

    #[tokio::test]
    async fn test_failed_count_update_rolls_back_vote() {
        let (state, store) = test_state();
        let (poll, options) = seed_poll(&state).await;
        let voter = identity(Uuid::new_v4());
        let poll_id = poll.id.to_string();
        let option_id = options[0].id.to_string();

        store.fail_vote_count(true);
        let err = submit_vote(&state, Some(&voter), "voter", &poll_id, &option_id)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Database(_)));
        assert_eq!(store.vote_count().await, 0);
        assert_eq!(state.store.list_options(poll.id).await.unwrap()[0].votes, 0);

        // Nothing was left behind, so a retry goes through
        store.fail_vote_count(false);
        submit_vote(&state, Some(&voter), "voter", &poll_id, &option_id)
            .await
            .unwrap();
        assert_eq!(store.vote_count().await, 1);
        assert_eq!(state.store.list_options(poll.id).await.unwrap()[0].votes, 1);
    }

    #[tokio::test]
    async fn test_has_voted_reports_chosen_option() {
        let (state, _store) = test_state();
        let (poll, options) = seed_poll(&state).await;
        let voter = identity(Uuid::new_v4());
        let poll_id = poll.id.to_string();

        let status = has_voted(&state, Some(&voter), &poll_id).await.unwrap();
        assert_eq!(status, VoteStatus { has_voted: false, option_id: None });

        submit_vote(&state, Some(&voter), "voter", &poll_id, &options[1].id.to_string())
            .await
            .unwrap();
        let status = has_voted(&state, Some(&voter), &poll_id).await.unwrap();
        assert_eq!(
            status,
            VoteStatus {
                has_voted: true,
                option_id: Some(options[1].id)
            }
        );

        let err = has_voted(&state, None, &poll_id).await.unwrap_err();
        assert!(matches!(err, AppError::Unauthenticated));
        let err = has_voted(&state, Some(&voter), &Uuid::new_v4().to_string())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }
}
