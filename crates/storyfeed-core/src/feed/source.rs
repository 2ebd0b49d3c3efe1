use std::sync::Arc;

use futures::stream::{self, Stream, StreamExt};
use tokio::sync::watch;
use tracing::{debug, trace};

use super::load::{LoadOutcome, LoadStates, LoadType};
use super::queue::LoadQueue;
use crate::cache::{FeedSnapshot, PageStore};
use crate::diff::{self, DiffOp};
use crate::error::FeedError;
use crate::models::Story;

/// One committed state of the cache, materialized a page at a time.
///
/// The snapshot is pinned, so positions stay valid until the owner swaps in
/// a newer sequence. Nothing is copied out of the snapshot until a position
/// inside that page is asked for.
#[derive(Debug, Clone)]
pub struct LazySequence {
    snapshot: Arc<FeedSnapshot>,
    page_size: usize,
    loaded: Vec<Story>,
}

impl LazySequence {
    pub fn new(snapshot: Arc<FeedSnapshot>, page_size: usize) -> Self {
        Self {
            snapshot,
            page_size: page_size.max(1),
            loaded: Vec::new(),
        }
    }

    pub fn generation(&self) -> u64 {
        self.snapshot.generation()
    }

    /// Items in the underlying snapshot, materialized or not
    pub fn len(&self) -> usize {
        self.snapshot.len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshot.is_empty()
    }

    pub fn loaded_len(&self) -> usize {
        self.loaded.len()
    }

    pub fn loaded(&self) -> &[Story] {
        &self.loaded
    }

    pub fn snapshot(&self) -> &FeedSnapshot {
        &self.snapshot
    }

    /// True once a fetch has reported that nothing follows the cached tail
    pub fn end_of_pagination_reached(&self) -> bool {
        self.snapshot.cached_at.is_some() && self.snapshot.cursor.is_end_of_data()
    }

    /// Materialize pages until `len` items are loaded or the snapshot runs out.
    fn load_to(&mut self, len: usize) {
        let target = len.min(self.snapshot.len());
        while self.loaded.len() < target {
            let page = self.snapshot.materialize(self.loaded.len(), self.page_size);
            if page.is_empty() {
                break;
            }
            trace!(offset = self.loaded.len(), count = page.len(), "Materialized page");
            self.loaded.extend(page);
        }
    }

    pub fn get(&mut self, position: usize) -> Option<&Story> {
        self.load_to(position + 1);
        self.loaded.get(position)
    }
}

/// Consumer view of one feed: position-addressable stories that fetch more
/// pages as the consumer reads toward the end.
///
/// Every commit to the store invalidates the current sequence. The next read
/// (or an explicit `sync`) adopts the new one and records the diff between
/// what the consumer had loaded and the same range of the new state.
pub struct PagedFeed {
    queue: LoadQueue,
    store: Arc<PageStore>,
    page_size: u32,
    prefetch_distance: u32,
    sequence: LazySequence,
    updates: Vec<DiffOp>,
}

impl PagedFeed {
    pub(crate) fn new(
        queue: LoadQueue,
        store: Arc<PageStore>,
        page_size: u32,
        prefetch_distance: u32,
    ) -> Self {
        let page_size = page_size.max(1);
        let sequence = LazySequence::new(store.snapshot(), page_size as usize);
        Self {
            queue,
            store,
            page_size,
            prefetch_distance,
            sequence,
            updates: Vec::new(),
        }
    }

    pub fn page_size(&self) -> u32 {
        self.page_size
    }

    pub fn sequence(&self) -> &LazySequence {
        &self.sequence
    }

    /// Stories the consumer has loaded so far
    pub fn items(&self) -> &[Story] {
        self.sequence.loaded()
    }

    pub fn end_of_pagination_reached(&self) -> bool {
        self.sequence.end_of_pagination_reached()
    }

    pub fn is_stale(&self) -> bool {
        self.sequence.snapshot().is_stale()
    }

    pub fn age_display(&self) -> String {
        self.sequence.snapshot().age_display()
    }

    /// Story at `position`, appending pages from the remote as needed.
    ///
    /// Returns `Ok(None)` past the end of the feed. A failed load is returned
    /// as the error and also shows in the load states; `retry` re-runs it.
    pub async fn get(&mut self, position: usize) -> Result<Option<Story>, FeedError> {
        self.sync();

        if self.sequence.is_empty() && self.sequence.snapshot().cached_at.is_none() {
            debug!(feed = %self.store.key(), "Nothing cached yet, waiting for refresh");
            self.queue.load(LoadType::Refresh, self.page_size).await?;
            self.sync();
        }

        while position >= self.sequence.len() && !self.sequence.end_of_pagination_reached() {
            let before = self.sequence.len();
            let outcome = self.queue.load(LoadType::Append, self.page_size).await?;
            self.sync();
            if outcome.end_of_pagination_reached || self.sequence.len() == before {
                break;
            }
        }

        let len = self.sequence.len();
        if position < len
            && position + self.prefetch_distance as usize >= len
            && !self.sequence.end_of_pagination_reached()
        {
            trace!(position, len, "Prefetching next page");
            self.queue.enqueue(LoadType::Append, self.page_size);
        }

        Ok(self.sequence.get(position).cloned())
    }

    /// Adopt the latest committed state if the store moved on.
    /// Returns whether anything changed.
    pub fn sync(&mut self) -> bool {
        let snapshot = self.store.snapshot();
        if snapshot.generation() == self.sequence.generation() {
            return false;
        }

        let old_len = self.sequence.len();
        let old_loaded = self.sequence.loaded_len();
        // A consumer sitting at the tail sees the next page arrive
        let target = if old_loaded >= old_len {
            old_loaded + self.page_size as usize
        } else {
            old_loaded
        };

        let mut next = LazySequence::new(snapshot, self.page_size as usize);
        next.load_to(target);

        let ops = diff::diff(self.sequence.loaded(), next.loaded());
        debug!(
            feed = %self.store.key(),
            generation = next.generation(),
            ops = ops.len(),
            "Feed sequence invalidated"
        );
        self.updates.extend(ops);
        self.sequence = next;
        true
    }

    /// Drain the diff ops recorded since the last call, in apply order.
    pub fn take_updates(&mut self) -> Vec<DiffOp> {
        std::mem::take(&mut self.updates)
    }

    /// Reload page 1, discarding everything cached for this feed.
    pub async fn refresh(&mut self) -> LoadOutcome {
        let outcome = self.queue.load(LoadType::Refresh, self.page_size).await;
        self.sync();
        outcome
    }

    /// Request the page before the cached head.
    pub async fn prepend(&mut self) -> LoadOutcome {
        let outcome = self.queue.load(LoadType::Prepend, self.page_size).await;
        self.sync();
        outcome
    }

    pub async fn retry(&mut self) -> Option<LoadOutcome> {
        let outcome = self.queue.retry().await;
        self.sync();
        outcome
    }

    pub async fn clear(&mut self) -> Result<(), FeedError> {
        self.queue.clear().await?;
        self.sync();
        Ok(())
    }

    pub fn load_states(&self) -> watch::Receiver<LoadStates> {
        self.queue.load_states()
    }

    /// Current load states, then every change until the queue stops.
    pub fn load_state_stream(&self) -> impl Stream<Item = LoadStates> + Send + 'static {
        let mut rx = self.queue.load_states();
        let current = rx.borrow_and_update().clone();
        let changes = stream::unfold(rx, |mut rx| async move {
            rx.changed().await.ok()?;
            let states = rx.borrow_and_update().clone();
            Some((states, rx))
        });
        stream::once(async move { current }).chain(changes)
    }
}

impl std::fmt::Debug for PagedFeed {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PagedFeed")
            .field("feed", self.store.key())
            .field("page_size", &self.page_size)
            .field("loaded", &self.sequence.loaded_len())
            .field("len", &self.sequence.len())
            .finish()
    }
}
