use std::sync::Arc;

use tracing::{debug, info, warn};

use super::load::{InitializeAction, LoadOutcome, LoadSuccess, LoadType};
use crate::api::RemotePager;
use crate::auth::AuthToken;
use crate::cache::PageStore;
use crate::models::cursor::FIRST_PAGE;
use crate::models::Cursor;

/// Turns load requests into remote fetches and cache commits.
///
/// Holds no pagination state of its own: every decision is made from the
/// cursor stored next to the cached stories, and every successful fetch is
/// written back together with its new cursor in one commit. Callers must not
/// run two loads for the same store at once; `LoadQueue` guarantees that.
pub struct SyncMediator {
    pager: Arc<dyn RemotePager>,
    store: Arc<PageStore>,
    token: AuthToken,
}

impl SyncMediator {
    pub fn new(pager: Arc<dyn RemotePager>, store: Arc<PageStore>, token: AuthToken) -> Self {
        Self {
            pager,
            store,
            token,
        }
    }

    pub fn store(&self) -> &Arc<PageStore> {
        &self.store
    }

    /// Refresh on open unless the cache holds recent data
    pub fn initialize(&self) -> InitializeAction {
        let snapshot = self.store.snapshot();
        if snapshot.is_empty() || snapshot.is_stale() {
            InitializeAction::LaunchInitialRefresh
        } else {
            InitializeAction::SkipInitialRefresh
        }
    }

    pub async fn load(&self, load_type: LoadType, page_size: u32) -> LoadOutcome {
        let page_size = page_size.max(1);
        let cursor = self.store.read_cursor();

        // The stored page number is meaningless in another page size; start over
        let load_type = if load_type != LoadType::Refresh && !cursor.counts_pages_of(page_size) {
            info!(
                feed = %self.store.key(),
                %load_type,
                page_size,
                cached_page_size = ?cursor.page_size,
                "Page size changed, refreshing instead"
            );
            LoadType::Refresh
        } else {
            load_type
        };

        let page = match load_type {
            LoadType::Refresh => FIRST_PAGE,
            LoadType::Prepend => match cursor.prev_page {
                Some(page) => page,
                None => {
                    debug!(feed = %self.store.key(), "Prepend: no previous page");
                    return Ok(LoadSuccess::end_reached());
                }
            },
            LoadType::Append => match cursor.next_page {
                Some(page) => page,
                None => {
                    debug!(feed = %self.store.key(), "Append: no next page");
                    return Ok(LoadSuccess::end_reached());
                }
            },
        };

        debug!(feed = %self.store.key(), %load_type, page, page_size, "Fetching page");
        let stories = self
            .pager
            .fetch(page, page_size, &self.token)
            .await
            .map_err(|e| {
                warn!(feed = %self.store.key(), %load_type, page, error = %e, "Page fetch failed");
                e
            })?;

        let fetched = stories.len();
        let next = Cursor::after_page(page, fetched, page_size as usize);

        match load_type {
            LoadType::Refresh => self.store.replace_all(stories, next).await?,
            LoadType::Append => self.store.append(stories, next).await?,
            LoadType::Prepend => {
                let prev_page = if page > FIRST_PAGE {
                    Some(page - 1)
                } else {
                    None
                };
                let cursor = Cursor {
                    prev_page,
                    page_size: Some(page_size),
                    ..cursor
                };
                self.store.prepend(stories, cursor).await?
            }
        }

        let end_of_pagination_reached = match load_type {
            LoadType::Prepend => page == FIRST_PAGE,
            _ => next.is_end_of_data(),
        };
        info!(
            feed = %self.store.key(),
            %load_type,
            page,
            fetched,
            end_of_pagination_reached,
            "Page committed"
        );

        Ok(LoadSuccess {
            end_of_pagination_reached,
            fetched,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::MockPager;
    use crate::cache::FeedKey;
    use crate::error::FeedError;
    use crate::models::Story;
    use chrono::{Duration, Utc};

    fn story(id: usize) -> Story {
        Story {
            id: format!("story-{id}"),
            name: format!("name {id}"),
            description: format!("description {id}"),
            photo_url: format!("https://example.com/{id}.jpg"),
            created_at: Utc::now() - Duration::minutes(id as i64),
            latitude: None,
            longitude: None,
        }
    }

    fn remote(count: usize) -> Vec<Story> {
        (0..count).map(story).collect()
    }

    fn setup(count: usize) -> (MockPager, Arc<PageStore>, SyncMediator) {
        let pager = MockPager::new(remote(count));
        let store = Arc::new(PageStore::ephemeral(FeedKey::default()));
        let mediator = SyncMediator::new(
            Arc::new(pager.clone()),
            Arc::clone(&store),
            AuthToken::new("token"),
        );
        (pager, store, mediator)
    }

    fn ids(store: &PageStore) -> Vec<String> {
        store.materialize(0, usize::MAX).into_iter().map(|s| s.id).collect()
    }

    #[tokio::test]
    async fn test_refresh_full_page() {
        let (pager, store, mediator) = setup(12);
        let result = mediator.load(LoadType::Refresh, 5).await.unwrap();

        assert!(!result.end_of_pagination_reached);
        assert_eq!(result.fetched, 5);
        assert_eq!(ids(&store), (0..5).map(|i| format!("story-{i}")).collect::<Vec<_>>());
        assert_eq!(store.read_cursor().next_page, Some(2));
        assert_eq!(store.read_cursor().prev_page, None);
        assert_eq!(store.read_cursor().page_size, Some(5));
        assert_eq!(pager.calls(), vec![(1, 5)]);
        assert_eq!(pager.tokens(), vec!["token".to_string()]);
    }

    #[tokio::test]
    async fn test_refresh_short_page_ends_pagination() {
        let (_pager, store, mediator) = setup(3);
        let result = mediator.load(LoadType::Refresh, 5).await.unwrap();

        assert!(result.end_of_pagination_reached);
        assert_eq!(store.len(), 3);
        assert_eq!(store.read_cursor().next_page, None);
    }

    #[tokio::test]
    async fn test_refresh_ignores_stored_cursor() {
        let (pager, store, mediator) = setup(12);
        store.set_cursor(Some(7), None).await.unwrap();

        mediator.load(LoadType::Refresh, 5).await.unwrap();
        assert_eq!(pager.calls(), vec![(1, 5)]);
        assert_eq!(store.read_cursor().next_page, Some(2));
    }

    #[tokio::test]
    async fn test_append_walks_pages_until_short() {
        let (pager, store, mediator) = setup(12);
        mediator.load(LoadType::Refresh, 5).await.unwrap();

        let second = mediator.load(LoadType::Append, 5).await.unwrap();
        assert!(!second.end_of_pagination_reached);
        assert_eq!(store.read_cursor().next_page, Some(3));

        let third = mediator.load(LoadType::Append, 5).await.unwrap();
        assert!(third.end_of_pagination_reached);
        assert_eq!(third.fetched, 2);
        assert_eq!(store.len(), 12);
        assert_eq!(store.read_cursor().next_page, None);

        assert_eq!(pager.calls(), vec![(1, 5), (2, 5), (3, 5)]);
    }

    #[tokio::test]
    async fn test_append_in_other_page_size_refreshes() {
        let (pager, store, mediator) = setup(30);
        mediator.load(LoadType::Refresh, 5).await.unwrap();

        // Page 2 of size 10 would skip stories 5..9
        let result = mediator.load(LoadType::Append, 10).await.unwrap();
        assert_eq!(result.fetched, 10);
        mediator.load(LoadType::Append, 10).await.unwrap();

        assert_eq!(pager.calls(), vec![(1, 5), (1, 10), (2, 10)]);
        assert_eq!(ids(&store), (0..20).map(|i| format!("story-{i}")).collect::<Vec<_>>());
        assert_eq!(store.read_cursor().page_size, Some(10));
        assert_eq!(store.read_cursor().next_page, Some(3));
    }

    #[tokio::test]
    async fn test_append_at_end_makes_no_call() {
        let (pager, store, mediator) = setup(3);
        mediator.load(LoadType::Refresh, 5).await.unwrap();
        let generation = store.generation();

        let result = mediator.load(LoadType::Append, 5).await.unwrap();
        assert_eq!(result, LoadSuccess::end_reached());
        assert_eq!(pager.calls().len(), 1);
        assert_eq!(store.generation(), generation);
    }

    #[tokio::test]
    async fn test_append_exact_multiple_needs_one_empty_page() {
        let (pager, store, mediator) = setup(10);
        mediator.load(LoadType::Refresh, 5).await.unwrap();
        mediator.load(LoadType::Append, 5).await.unwrap();
        assert_eq!(store.read_cursor().next_page, Some(3));

        let last = mediator.load(LoadType::Append, 5).await.unwrap();
        assert!(last.end_of_pagination_reached);
        assert_eq!(last.fetched, 0);
        assert_eq!(store.len(), 10);
        assert_eq!(pager.calls_for_page(3), 1);
    }

    #[tokio::test]
    async fn test_append_does_not_duplicate_shifted_rows() {
        let (pager, store, mediator) = setup(10);
        mediator.load(LoadType::Refresh, 5).await.unwrap();

        // A new story at the head shifts story-4 onto page 2
        let mut shifted = vec![story(99)];
        shifted.extend(remote(10));
        pager.set_remote(shifted);

        mediator.load(LoadType::Append, 5).await.unwrap();
        let cached = ids(&store);
        assert_eq!(cached.len(), 9);
        assert_eq!(cached.iter().filter(|id| *id == "story-4").count(), 1);
    }

    #[tokio::test]
    async fn test_prepend_is_always_end_of_pagination() {
        let (pager, store, mediator) = setup(12);
        let before = mediator.load(LoadType::Prepend, 5).await.unwrap();
        assert!(before.end_of_pagination_reached);

        mediator.load(LoadType::Refresh, 5).await.unwrap();
        mediator.load(LoadType::Append, 5).await.unwrap();
        let after = mediator.load(LoadType::Prepend, 5).await.unwrap();

        assert_eq!(after, LoadSuccess::end_reached());
        assert_eq!(store.read_cursor().prev_page, None);
        assert_eq!(pager.calls(), vec![(1, 5), (2, 5)]);
    }

    #[tokio::test]
    async fn test_failed_fetch_leaves_cache_untouched() {
        let (pager, store, mediator) = setup(12);
        mediator.load(LoadType::Refresh, 5).await.unwrap();
        let before = store.snapshot();

        pager.fail_next(FeedError::Network("offline".to_string()));
        let err = mediator.load(LoadType::Append, 5).await.unwrap_err();
        assert_eq!(err, FeedError::Network("offline".to_string()));

        pager.fail_next(FeedError::Http {
            status: 401,
            body: "Unauthorized".to_string(),
        });
        assert!(mediator.load(LoadType::Refresh, 5).await.is_err());

        assert_eq!(*store.snapshot(), *before);
    }

    #[tokio::test]
    async fn test_refresh_is_idempotent() {
        let (_pager, store, mediator) = setup(12);
        mediator.load(LoadType::Refresh, 5).await.unwrap();
        let first = (store.materialize(0, usize::MAX), store.read_cursor());

        mediator.load(LoadType::Refresh, 5).await.unwrap();
        let second = (store.materialize(0, usize::MAX), store.read_cursor());

        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_initialize_action() {
        let (_pager, store, mediator) = setup(12);
        assert_eq!(mediator.initialize(), InitializeAction::LaunchInitialRefresh);

        mediator.load(LoadType::Refresh, 5).await.unwrap();
        assert_eq!(mediator.initialize(), InitializeAction::SkipInitialRefresh);

        store.clear().await.unwrap();
        assert_eq!(mediator.initialize(), InitializeAction::LaunchInitialRefresh);
    }
}
