// Poll lifecycle: create, read, results, delete, share

use tracing::{error, info, warn};
use uuid::Uuid;

use crate::cache::{comments_tag, poll_tag, COMMENTS_TAG, POLLS_TAG};
use crate::middleware::auth::Identity;
use crate::models::{
    AppState, CreatePollResponse, OptionResult, PageQuery, PollPage, PollResults,
    PollWithOptions, ShareLinkResponse,
};
use crate::services::{is_admin, require_caller};
use crate::types::{AppError, AppResult};
use crate::validation::{parse_id, validate_input, CreatePollInput, PollIdInput};

pub const DEFAULT_PAGE_SIZE: u32 = 10;
pub const MAX_PAGE_SIZE: u32 = 50;

pub fn share_url(base_url: &str, poll_id: Uuid) -> String {
    format!("{}/poll/{}", base_url.trim_end_matches('/'), poll_id)
}

/// Creates a poll and its options.
///
/// The two inserts are separate statements. If the options insert fails
/// the poll row is deleted again so no option-less poll is left behind.
pub async fn create_poll(
    state: &AppState,
    caller: Option<&Identity>,
    identifier: &str,
    question: &str,
    options: &[String],
) -> AppResult<CreatePollResponse> {
    validate_input(&CreatePollInput { question, options })?;
    state
        .rate_limiter
        .rate_limit(identifier, &state.config.rate_limit.poll_creation)?;
    let caller = require_caller(caller)?;

    let texts: Vec<String> = options.iter().map(|o| o.trim().to_string()).collect();
    let poll = state.store.insert_poll(caller.user_id, question.trim()).await?;

    if let Err(e) = state.store.insert_options(poll.id, &texts).await {
        warn!(poll_id = %poll.id, error = %e, "Option insert failed, removing poll");
        if let Err(cleanup) = state.store.delete_poll_row(poll.id).await {
            error!(poll_id = %poll.id, error = %cleanup, "Failed to remove orphaned poll");
        }
        return Err(e.into());
    }

    state.cache.invalidate_tag(POLLS_TAG).await;
    info!(poll_id = %poll.id, options = texts.len(), "Poll created");

    Ok(CreatePollResponse {
        success: true,
        poll_id: poll.id,
        share_url: share_url(&state.config.server.public_base_url, poll.id),
    })
}

pub async fn get_poll(state: &AppState, poll_id: &str) -> AppResult<PollWithOptions> {
    validate_input(&PollIdInput { poll_id })?;
    let poll_id = parse_id(poll_id)?;

    let key = format!("poll:{}:detail", poll_id);
    let tags = [POLLS_TAG.to_string(), poll_tag(poll_id)];
    state
        .cache
        .get_or_load(&key, &tags, || async {
            let poll = state
                .store
                .get_poll(poll_id)
                .await?
                .ok_or_else(|| AppError::NotFound("poll".to_string()))?;
            let options = state.store.list_options(poll_id).await?;
            Ok::<_, AppError>(PollWithOptions { poll, options })
        })
        .await
}

pub async fn list_my_polls(
    state: &AppState,
    caller: Option<&Identity>,
    query: &PageQuery,
) -> AppResult<PollPage> {
    let caller = require_caller(caller)?;
    let page = query.page.unwrap_or(1).max(1);
    let page_size = query
        .page_size
        .unwrap_or(DEFAULT_PAGE_SIZE)
        .clamp(1, MAX_PAGE_SIZE);
    let offset = i64::from(page - 1) * i64::from(page_size);

    let key = format!("polls:owner:{}:{}:{}", caller.user_id, page, page_size);
    let tags = [POLLS_TAG.to_string()];
    state
        .cache
        .get_or_load(&key, &tags, || async {
            let (polls, total_count) = state
                .store
                .polls_by_owner(caller.user_id, offset, i64::from(page_size))
                .await?;
            Ok::<_, AppError>(PollPage {
                polls,
                total_count,
                page,
                page_size,
            })
        })
        .await
}

pub async fn poll_results(state: &AppState, poll_id: &str) -> AppResult<PollResults> {
    validate_input(&PollIdInput { poll_id })?;
    let poll_id = parse_id(poll_id)?;

    let key = format!("poll:{}:results", poll_id);
    let tags = [poll_tag(poll_id)];
    state
        .cache
        .get_or_load(&key, &tags, || async {
            let poll = state
                .store
                .get_poll(poll_id)
                .await?
                .ok_or_else(|| AppError::NotFound("poll".to_string()))?;
            let options: Vec<OptionResult> = state
                .store
                .list_options(poll_id)
                .await?
                .into_iter()
                .map(|o| OptionResult {
                    id: o.id,
                    text: o.text,
                    votes: i64::from(o.votes),
                })
                .collect();
            let total_votes = options.iter().map(|o| o.votes).sum();

            Ok::<_, AppError>(PollResults {
                poll_id,
                question: poll.question,
                options,
                total_votes,
            })
        })
        .await
}

/// Deletes a poll with everything hanging off it. Only the owner or an
/// admin may do this.
pub async fn delete_poll(
    state: &AppState,
    caller: Option<&Identity>,
    identifier: &str,
    poll_id: &str,
) -> AppResult<()> {
    validate_input(&PollIdInput { poll_id })?;
    state
        .rate_limiter
        .rate_limit(identifier, &state.config.rate_limit.poll_deletion)?;
    let caller = require_caller(caller)?;
    let poll_id = parse_id(poll_id)?;

    let poll = state
        .store
        .get_poll(poll_id)
        .await?
        .ok_or_else(|| AppError::NotFound("poll".to_string()))?;

    if poll.user_id != caller.user_id && !is_admin(state, caller.user_id).await? {
        return Err(AppError::Forbidden(
            "You can only delete your own polls".to_string(),
        ));
    }

    state.store.delete_poll_cascade(poll_id).await?;

    state.cache.invalidate_tag(POLLS_TAG).await;
    state.cache.invalidate_tag(COMMENTS_TAG).await;
    state.cache.invalidate_tag(&poll_tag(poll_id)).await;
    state.cache.invalidate_tag(&comments_tag(poll_id)).await;

    info!(%poll_id, user_id = %caller.user_id, "Poll deleted");
    Ok(())
}

pub async fn share_link(state: &AppState, poll_id: &str) -> AppResult<ShareLinkResponse> {
    validate_input(&PollIdInput { poll_id })?;
    let poll_id = parse_id(poll_id)?;

    state
        .store
        .get_poll(poll_id)
        .await?
        .ok_or_else(|| AppError::NotFound("poll".to_string()))?;

    Ok(ShareLinkResponse {
        poll_id,
        url: share_url(&state.config.server.public_base_url, poll_id),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::models::Role;
    use crate::services::votes::submit_vote;
    use crate::test_support::{identity, test_state, test_state_with, TEST_SECRET};

    fn options(texts: &[&str]) -> Vec<String> {
        texts.iter().map(|t| t.to_string()).collect()
    }

    #[test]
    fn test_share_url() {
        let id = Uuid::nil();
        assert_eq!(
            share_url("https://polls.example.com/", id),
            "https://polls.example.com/poll/00000000-0000-0000-0000-000000000000"
        );
    }

    #[tokio::test]
    async fn test_create_and_get_poll() {
        let (state, _store) = test_state();
        let owner = identity(Uuid::new_v4());

        let created = create_poll(
            &state,
            Some(&owner),
            "owner",
            "  Favourite season?  ",
            &options(&["Spring", " Summer ", "Autumn"]),
        )
        .await
        .unwrap();
        assert!(created.success);
        assert!(created.share_url.ends_with(&created.poll_id.to_string()));

        let poll = get_poll(&state, &created.poll_id.to_string()).await.unwrap();
        assert_eq!(poll.poll.question, "Favourite season?");
        assert_eq!(poll.poll.user_id, owner.user_id);
        let texts: Vec<_> = poll.options.iter().map(|o| o.text.as_str()).collect();
        assert_eq!(texts, vec!["Spring", "Summer", "Autumn"]);
    }

    #[tokio::test]
    async fn test_failed_options_insert_leaves_nothing_behind() {
        let (state, store) = test_state();
        store.fail_options_insert(true);

        let err = create_poll(
            &state,
            Some(&identity(Uuid::new_v4())),
            "owner",
            "Q?",
            &options(&["A", "B"]),
        )
        .await
        .unwrap_err();

        assert!(matches!(err, AppError::Database(_)));
        assert_eq!(store.poll_count().await, 0);
        assert_eq!(store.option_count().await, 0);
    }

    #[tokio::test]
    async fn test_create_requires_auth_and_valid_input() {
        let (state, store) = test_state();

        let err = create_poll(&state, None, "anonymous", "Q?", &options(&["A", "B"]))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Unauthenticated));

        let err = create_poll(
            &state,
            Some(&identity(Uuid::new_v4())),
            "owner",
            "Q?",
            &options(&["A"]),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, AppError::Validation(msg) if msg == "At least 2 options required"));
        assert_eq!(store.poll_count().await, 0);
    }

    #[tokio::test]
    async fn test_poll_creation_rate_limit() {
        let (state, store) = test_state();
        let owner = identity(Uuid::new_v4());

        for i in 0..3 {
            create_poll(&state, Some(&owner), "owner", &format!("Q{}", i), &options(&["A", "B"]))
                .await
                .unwrap();
        }
        let err = create_poll(&state, Some(&owner), "owner", "Q4", &options(&["A", "B"]))
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::RateLimited(_)));
        assert_eq!(store.poll_count().await, 3);
    }

    #[tokio::test]
    async fn test_results_reflect_new_votes() {
        let (state, _store) = test_state();
        let owner = identity(Uuid::new_v4());
        let created = create_poll(&state, Some(&owner), "owner", "Q?", &options(&["A", "B"]))
            .await
            .unwrap();
        let poll_id = created.poll_id.to_string();

        let before = poll_results(&state, &poll_id).await.unwrap();
        assert_eq!(before.total_votes, 0);

        let option_id = before.options[1].id.to_string();
        submit_vote(&state, Some(&owner), "owner", &poll_id, &option_id)
            .await
            .unwrap();

        let after = poll_results(&state, &poll_id).await.unwrap();
        assert_eq!(after.total_votes, 1);
        assert_eq!(after.options[1].votes, 1);
    }

    #[tokio::test]
    async fn test_list_my_polls_pages_newest_first() {
        let mut config = Config::for_local(TEST_SECRET);
        config.rate_limit.poll_creation.max = 20;
        let (state, _store) = test_state_with(config);
        let owner = identity(Uuid::new_v4());

        for i in 0..12 {
            create_poll(&state, Some(&owner), "owner", &format!("Q{}", i), &options(&["A", "B"]))
                .await
                .unwrap();
        }
        create_poll(
            &state,
            Some(&identity(Uuid::new_v4())),
            "someone-else",
            "Not mine",
            &options(&["A", "B"]),
        )
        .await
        .unwrap();

        let first = list_my_polls(&state, Some(&owner), &PageQuery::default())
            .await
            .unwrap();
        assert_eq!(first.total_count, 12);
        assert_eq!(first.page_size, DEFAULT_PAGE_SIZE);
        assert_eq!(first.polls.len(), 10);
        assert_eq!(first.polls[0].question, "Q11");

        let second = list_my_polls(
            &state,
            Some(&owner),
            &PageQuery {
                page: Some(2),
                page_size: Some(500),
            },
        )
        .await
        .unwrap();
        assert_eq!(second.page_size, MAX_PAGE_SIZE);
        assert!(second.polls.is_empty());
    }

    #[tokio::test]
    async fn test_only_owner_or_admin_may_delete() {
        let (state, store) = test_state();
        let owner = identity(Uuid::new_v4());
        let stranger = identity(Uuid::new_v4());
        let admin = identity(Uuid::new_v4());
        store.add_user(admin.user_id, "admin@example.com", Role::Admin).await;

        let created = create_poll(&state, Some(&owner), "owner", "Q?", &options(&["A", "B"]))
            .await
            .unwrap();
        let poll_id = created.poll_id.to_string();

        let err = delete_poll(&state, Some(&stranger), "stranger", &poll_id)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)));
        assert_eq!(store.poll_count().await, 1);

        delete_poll(&state, Some(&admin), "admin", &poll_id).await.unwrap();
        assert_eq!(store.poll_count().await, 0);
        assert_eq!(store.option_count().await, 0);

        let err = get_poll(&state, &poll_id).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_share_link_for_missing_poll() {
        let (state, _store) = test_state();
        let err = share_link(&state, &Uuid::new_v4().to_string()).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));

        let poll = state.store.insert_poll(Uuid::new_v4(), "Q?").await.unwrap();
        let link = share_link(&state, &poll.id.to_string()).await.unwrap();
        assert_eq!(link.url, format!("http://localhost:3000/poll/{}", poll.id));
    }
}
