//! Paginated feed synchronization.
//!
//! `StoryFeed` wires one feed's cache to the remote pager:
//! - `SyncMediator` turns REFRESH/PREPEND/APPEND requests into fetches and
//!   cache commits, deciding from the cursor stored with the cache
//! - `LoadQueue` runs those requests one at a time and merges duplicates
//! - `PagedFeed` hands the cache to a consumer as a lazy sequence and
//!   reports each change as diff ops
//!
//! Loads never run on the consumer's task; the consumer only awaits their
//! outcome or watches the load states.

pub mod load;
pub mod mediator;
pub mod queue;
pub mod source;

pub use load::{InitializeAction, LoadOutcome, LoadState, LoadStates, LoadSuccess, LoadType};
pub use mediator::SyncMediator;
pub use queue::LoadQueue;
pub use source::{LazySequence, PagedFeed};

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::watch;
use tracing::info;

use crate::api::RemotePager;
use crate::auth::AuthToken;
use crate::cache::{CacheHandle, PageStore};
use crate::error::FeedError;

/// One feed: its store, its mediator and the queue that serializes loads.
///
/// Open it once per feed and observe it from as many consumers as needed;
/// they all share the same queue, so their loads never overlap.
pub struct StoryFeed {
    store: Arc<PageStore>,
    queue: LoadQueue,
    initial_action: InitializeAction,
    initial_launched: AtomicBool,
    prefetch_distance: Option<u32>,
}

impl StoryFeed {
    /// Open the cache and start the feed's load queue.
    /// Must be called from inside a tokio runtime.
    pub async fn open(
        pager: Arc<dyn RemotePager>,
        cache: &CacheHandle,
        token: AuthToken,
    ) -> Result<Self, FeedError> {
        let store = cache.store().await?;
        let mediator = SyncMediator::new(pager, Arc::clone(&store), token);
        let initial_action = mediator.initialize();
        info!(
            feed = %store.key(),
            cached = store.len(),
            ?initial_action,
            "Feed opened"
        );

        Ok(Self {
            queue: LoadQueue::spawn(mediator),
            store,
            initial_action,
            initial_launched: AtomicBool::new(false),
            prefetch_distance: None,
        })
    }

    /// How close to the loaded tail a read must come before the next page is
    /// requested in the background. Defaults to one page; zero disables it.
    pub fn with_prefetch_distance(mut self, distance: u32) -> Self {
        self.prefetch_distance = Some(distance);
        self
    }

    pub fn store(&self) -> &Arc<PageStore> {
        &self.store
    }

    pub fn initial_action(&self) -> InitializeAction {
        self.initial_action
    }

    /// A lazy view of the feed in pages of `page_size`.
    ///
    /// The first call launches the initial refresh when the cache is empty or
    /// stale; cached stories stay readable while it runs.
    pub fn observe(&self, page_size: u32) -> PagedFeed {
        let page_size = page_size.max(1);
        if self.initial_action == InitializeAction::LaunchInitialRefresh
            && !self.initial_launched.swap(true, Ordering::SeqCst)
        {
            info!(feed = %self.store.key(), "Launching initial refresh");
            self.queue.enqueue(LoadType::Refresh, page_size);
        }

        let prefetch_distance = self.prefetch_distance.unwrap_or(page_size);
        PagedFeed::new(
            self.queue.clone(),
            Arc::clone(&self.store),
            page_size,
            prefetch_distance,
        )
    }

    pub fn load_states(&self) -> watch::Receiver<LoadStates> {
        self.queue.load_states()
    }

    pub async fn refresh(&self, page_size: u32) -> LoadOutcome {
        self.queue.load(LoadType::Refresh, page_size.max(1)).await
    }

    pub async fn retry(&self) -> Option<LoadOutcome> {
        self.queue.retry().await
    }

    /// Empty the cache and cursor, e.g. at logout.
    pub async fn clear(&self) -> Result<(), FeedError> {
        self.queue.clear().await
    }

    /// Cancel the in-flight load and stop accepting new ones.
    pub fn shutdown(&self) {
        info!(feed = %self.store.key(), "Feed shutting down");
        self.queue.shutdown();
    }
}

impl std::fmt::Debug for StoryFeed {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoryFeed")
            .field("store", &self.store)
            .field("initial_action", &self.initial_action)
            .field("prefetch_distance", &self.prefetch_distance)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::MockPager;
    use crate::cache::FeedKey;
    use crate::models::Story;
    use chrono::Utc;

    fn story(id: usize) -> Story {
        Story {
            id: format!("story-{id}"),
            name: format!("name {id}"),
            description: String::new(),
            photo_url: String::new(),
            created_at: Utc::now(),
            latitude: None,
            longitude: None,
        }
    }

    #[tokio::test]
    async fn test_observe_launches_initial_refresh_once() {
        let pager = MockPager::new((0..8).map(story).collect());
        let cache = CacheHandle::in_memory(FeedKey::default());
        let feed = StoryFeed::open(Arc::new(pager.clone()), &cache, AuthToken::new("t"))
            .await
            .unwrap();
        assert_eq!(feed.initial_action(), InitializeAction::LaunchInitialRefresh);

        let _first = feed.observe(5);
        let _second = feed.observe(5);
        feed.refresh(5).await.unwrap();

        // The explicit refresh joins the queued initial one
        assert_eq!(pager.calls(), vec![(1, 5)]);
        assert_eq!(feed.store().len(), 5);
    }

    #[tokio::test]
    async fn test_reopen_with_fresh_cache_skips_refresh() {
        let dir = tempfile::tempdir().unwrap();
        let pager = MockPager::new((0..8).map(story).collect());

        {
            let cache = CacheHandle::new(dir.path().to_path_buf(), FeedKey::default());
            let feed = StoryFeed::open(Arc::new(pager.clone()), &cache, AuthToken::new("t"))
                .await
                .unwrap();
            feed.refresh(5).await.unwrap();
            feed.shutdown();
        }

        let cache = CacheHandle::new(dir.path().to_path_buf(), FeedKey::default());
        let feed = StoryFeed::open(Arc::new(pager.clone()), &cache, AuthToken::new("t"))
            .await
            .unwrap()
            .with_prefetch_distance(0);
        assert_eq!(feed.initial_action(), InitializeAction::SkipInitialRefresh);

        let mut paged = feed.observe(5);
        assert_eq!(paged.get(4).await.unwrap().unwrap().id, "story-4");
        assert_eq!(pager.calls(), vec![(1, 5)]);
    }

    #[tokio::test]
    async fn test_clear_then_observe_refreshes_again() {
        let pager = MockPager::new((0..8).map(story).collect());
        let cache = CacheHandle::in_memory(FeedKey::default());
        let feed = StoryFeed::open(Arc::new(pager.clone()), &cache, AuthToken::new("t"))
            .await
            .unwrap()
            .with_prefetch_distance(0);

        let mut paged = feed.observe(5);
        paged.get(0).await.unwrap();
        feed.clear().await.unwrap();
        assert!(feed.store().is_empty());

        assert_eq!(paged.get(0).await.unwrap().unwrap().id, "story-0");
        assert_eq!(pager.calls(), vec![(1, 5), (1, 5)]);
    }

    #[tokio::test]
    async fn test_observe_in_other_page_size_leaves_no_gap() {
        let pager = MockPager::new((0..20).map(story).collect());
        let cache = CacheHandle::in_memory(FeedKey::default());
        let feed = StoryFeed::open(Arc::new(pager.clone()), &cache, AuthToken::new("t"))
            .await
            .unwrap()
            .with_prefetch_distance(0);

        let mut small = feed.observe(5);
        assert_eq!(small.get(0).await.unwrap().unwrap().id, "story-0");

        // Page 2 in pages of 10 would skip stories 5..9, so this reloads instead
        let mut large = feed.observe(10);
        assert_eq!(large.get(5).await.unwrap().unwrap().id, "story-5");
        assert_eq!(pager.calls(), vec![(1, 5), (1, 10)]);
        assert_eq!(feed.store().read_cursor().page_size, Some(10));
    }
}
