//! Durable page store for one feed.
//!
//! The whole feed (items plus cursor) lives in a single JSON document, so a
//! commit is one temp-file write followed by an atomic rename: either the new
//! items and cursor land together or neither does.

use std::fmt;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio::sync::{watch, Mutex};
use tracing::{debug, warn};

use super::FeedSnapshot;
use crate::error::FeedError;
use crate::models::{Cursor, Story};

/// Identifies one feed's cache document and cursor.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FeedKey(String);

impl FeedKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// File-name-safe form of the key. Distinct keys always get distinct
    /// stems: every byte outside `[A-Za-z0-9-]` becomes `_xx` (hex), and `_`
    /// only ever appears as that escape.
    fn file_stem(&self) -> String {
        if self.0.is_empty() {
            return "_".to_string();
        }
        let mut stem = String::with_capacity(self.0.len());
        for byte in self.0.bytes() {
            if byte.is_ascii_alphanumeric() || byte == b'-' {
                stem.push(byte as char);
            } else {
                stem.push_str(&format!("_{byte:02x}"));
            }
        }
        stem
    }
}

impl Default for FeedKey {
    fn default() -> Self {
        Self::new("stories")
    }
}

impl fmt::Display for FeedKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// On-disk layout: the item table and the single cursor row.
#[derive(Debug, Serialize, Deserialize)]
struct StoredFeed {
    feed_key: FeedKey,
    #[serde(flatten)]
    snapshot: FeedSnapshot,
}

struct Shared {
    key: FeedKey,
    path: Option<PathBuf>,
    current: RwLock<Arc<FeedSnapshot>>,
    changes: watch::Sender<u64>,
}

impl Shared {
    fn current(&self) -> Arc<FeedSnapshot> {
        // A poisoned lock still holds a fully-formed snapshot: the only write
        // under it is a single pointer swap.
        let guard = self.current.read().unwrap_or_else(|e| e.into_inner());
        Arc::clone(&guard)
    }

    fn install(&self, next: FeedSnapshot) {
        let generation = next.generation;
        {
            let mut guard = self.current.write().unwrap_or_else(|e| e.into_inner());
            *guard = Arc::new(next);
        }
        self.changes.send_replace(generation);
    }

    fn persist(&self, snapshot: &FeedSnapshot) -> Result<(), FeedError> {
        let Some(path) = self.path.as_deref() else {
            return Ok(());
        };
        let dir = path.parent().unwrap_or_else(|| Path::new("."));

        let stored = StoredFeed {
            feed_key: self.key.clone(),
            snapshot: snapshot.clone(),
        };
        let mut file = tempfile::NamedTempFile::new_in(dir).map_err(FeedError::storage)?;
        serde_json::to_writer(&mut file, &stored).map_err(FeedError::storage)?;
        file.flush().map_err(FeedError::storage)?;
        file.as_file().sync_all().map_err(FeedError::storage)?;
        file.persist(path).map_err(FeedError::storage)?;
        Ok(())
    }
}

/// The local cache for one feed: ordered stories plus a single cursor.
///
/// Reads are lock-free snapshots. Writes are serialized and transactional,
/// and each committed write bumps the store's generation, which consumers
/// watch to know their materialized view is out of date.
pub struct PageStore {
    shared: Arc<Shared>,
    writer: Arc<Mutex<()>>,
}

impl PageStore {
    /// Open (or create) the cache document for `key` inside `dir`.
    ///
    /// An unreadable document is discarded with a warning; the cache is
    /// disposable and will be rebuilt by the next refresh.
    pub fn open(dir: &Path, key: FeedKey) -> Result<Self, FeedError> {
        std::fs::create_dir_all(dir).map_err(FeedError::storage)?;
        let path = dir.join(format!("{}.json", key.file_stem()));

        let snapshot = if path.exists() {
            match Self::read_document(&path, &key) {
                Ok(snapshot) => snapshot,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Discarding unreadable feed cache");
                    FeedSnapshot::default()
                }
            }
        } else {
            FeedSnapshot::default()
        };
        debug!(feed = %key, items = snapshot.len(), cursor = ?snapshot.cursor, "Page store opened");

        Ok(Self::with_snapshot(key, Some(path), snapshot))
    }

    /// A store that never touches disk.
    pub fn ephemeral(key: FeedKey) -> Self {
        Self::with_snapshot(key, None, FeedSnapshot::default())
    }

    fn with_snapshot(key: FeedKey, path: Option<PathBuf>, snapshot: FeedSnapshot) -> Self {
        let (changes, _) = watch::channel(snapshot.generation);
        Self {
            shared: Arc::new(Shared {
                key,
                path,
                current: RwLock::new(Arc::new(snapshot)),
                changes,
            }),
            writer: Arc::new(Mutex::new(())),
        }
    }

    fn read_document(path: &Path, key: &FeedKey) -> anyhow::Result<FeedSnapshot> {
        let contents = std::fs::read_to_string(path)?;
        let stored: StoredFeed = serde_json::from_str(&contents)?;
        if &stored.feed_key != key {
            anyhow::bail!("document belongs to feed {}", stored.feed_key);
        }
        Ok(stored.snapshot)
    }

    pub fn key(&self) -> &FeedKey {
        &self.shared.key
    }

    pub fn path(&self) -> Option<&Path> {
        self.shared.path.as_deref()
    }

    /// The latest committed snapshot
    pub fn snapshot(&self) -> Arc<FeedSnapshot> {
        self.shared.current()
    }

    pub fn generation(&self) -> u64 {
        self.snapshot().generation
    }

    /// Receives the new generation after every commit
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.shared.changes.subscribe()
    }

    pub fn read_cursor(&self) -> Cursor {
        self.snapshot().cursor
    }

    pub fn len(&self) -> usize {
        self.snapshot().len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshot().is_empty()
    }

    pub fn materialize(&self, offset: usize, limit: usize) -> Vec<Story> {
        self.snapshot().materialize(offset, limit)
    }

    /// Discard all cached stories and the cursor, installing `items` and
    /// `cursor` in their place.
    pub async fn replace_all(&self, items: Vec<Story>, cursor: Cursor) -> Result<(), FeedError> {
        self.commit("replace_all", move |snapshot| {
            snapshot.items.clear();
            snapshot.append_dedup(items);
            snapshot.cursor = cursor;
            snapshot.cached_at = Some(Utc::now());
        })
        .await
    }

    /// Add `items` after the tail and install `cursor`.
    pub async fn append(&self, items: Vec<Story>, cursor: Cursor) -> Result<(), FeedError> {
        self.commit("append", move |snapshot| {
            snapshot.append_dedup(items);
            snapshot.cursor = cursor;
            snapshot.cached_at = Some(Utc::now());
        })
        .await
    }

    /// Add `items` before the head and install `cursor`.
    pub async fn prepend(&self, items: Vec<Story>, cursor: Cursor) -> Result<(), FeedError> {
        self.commit("prepend", move |snapshot| {
            snapshot.prepend_dedup(items);
            snapshot.cursor = cursor;
            snapshot.cached_at = Some(Utc::now());
        })
        .await
    }

    pub async fn set_cursor(
        &self,
        next_page: Option<u32>,
        prev_page: Option<u32>,
    ) -> Result<(), FeedError> {
        self.commit("set_cursor", move |snapshot| {
            snapshot.cursor = Cursor::new(next_page, prev_page);
        })
        .await
    }

    /// Empty the cache and cursor (logout, forced invalidation)
    pub async fn clear(&self) -> Result<(), FeedError> {
        self.commit("clear", |snapshot| {
            snapshot.items.clear();
            snapshot.cursor = Cursor::default();
            snapshot.cached_at = None;
        })
        .await
    }

    /// Apply `mutate` to a copy of the current snapshot, persist it, then
    /// publish it.
    ///
    /// The writer lock and the whole read-modify-write run on the blocking
    /// pool. Dropping the returned future therefore never abandons a commit
    /// halfway: the write either finishes and is published, or fails and
    /// leaves the previous snapshot in place.
    async fn commit<F>(&self, op: &'static str, mutate: F) -> Result<(), FeedError>
    where
        F: FnOnce(&mut FeedSnapshot) + Send + 'static,
    {
        let guard = Arc::clone(&self.writer).lock_owned().await;
        let shared = Arc::clone(&self.shared);

        let result = tokio::task::spawn_blocking(move || {
            let _guard = guard;
            let current = shared.current();
            let mut next = FeedSnapshot::clone(&current);
            mutate(&mut next);
            next.generation = current.generation + 1;

            shared.persist(&next)?;
            let summary = (next.generation, next.len(), next.cursor);
            shared.install(next);
            Ok::<_, FeedError>(summary)
        })
        .await
        .map_err(FeedError::storage)?;

        match result {
            Ok((generation, items, cursor)) => {
                debug!(feed = %self.key(), op, generation, items, ?cursor, "Feed cache committed");
                Ok(())
            }
            Err(e) => {
                warn!(feed = %self.key(), op, error = %e, "Feed cache commit failed");
                Err(e)
            }
        }
    }
}

impl fmt::Debug for PageStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PageStore")
            .field("key", &self.shared.key)
            .field("path", &self.shared.path)
            .field("generation", &self.generation())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn story(id: &str) -> Story {
        Story {
            id: id.to_string(),
            name: format!("name {id}"),
            description: format!("description {id}"),
            photo_url: format!("https://example.com/{id}.jpg"),
            created_at: Utc::now(),
            latitude: None,
            longitude: None,
        }
    }

    fn ids(store: &PageStore) -> Vec<String> {
        store.materialize(0, usize::MAX).into_iter().map(|s| s.id).collect()
    }

    #[tokio::test]
    async fn test_replace_all_then_append() {
        let store = PageStore::ephemeral(FeedKey::default());
        store
            .replace_all(vec![story("a"), story("b")], Cursor::new(Some(2), None))
            .await
            .unwrap();
        store
            .append(vec![story("c")], Cursor::new(None, None))
            .await
            .unwrap();

        assert_eq!(ids(&store), vec!["a", "b", "c"]);
        assert_eq!(store.read_cursor(), Cursor::new(None, None));
        assert_eq!(store.generation(), 2);
    }

    #[tokio::test]
    async fn test_replace_all_discards_old_contents() {
        let store = PageStore::ephemeral(FeedKey::default());
        store
            .replace_all(vec![story("a"), story("b")], Cursor::new(Some(2), None))
            .await
            .unwrap();
        store
            .replace_all(vec![story("z")], Cursor::new(None, None))
            .await
            .unwrap();

        assert_eq!(ids(&store), vec!["z"]);
    }

    #[tokio::test]
    async fn test_subscribers_see_each_commit() {
        let store = PageStore::ephemeral(FeedKey::default());
        let mut rx = store.subscribe();

        store.set_cursor(Some(3), None).await.unwrap();
        rx.changed().await.unwrap();
        assert_eq!(*rx.borrow(), 1);
        assert_eq!(store.read_cursor().next_page, Some(3));
    }

    #[tokio::test]
    async fn test_reopen_restores_items_and_cursor() {
        let dir = tempfile::tempdir().unwrap();
        {
            let store = PageStore::open(dir.path(), FeedKey::default()).unwrap();
            store
                .replace_all(vec![story("a"), story("b")], Cursor::new(Some(2), None))
                .await
                .unwrap();
        }

        let reopened = PageStore::open(dir.path(), FeedKey::default()).unwrap();
        assert_eq!(ids(&reopened), vec!["a", "b"]);
        assert_eq!(reopened.read_cursor().next_page, Some(2));
        assert!(reopened.snapshot().cached_at.is_some());
    }

    #[tokio::test]
    async fn test_feeds_keep_separate_cursors() {
        let dir = tempfile::tempdir().unwrap();
        let stories = PageStore::open(dir.path(), FeedKey::new("stories")).unwrap();
        let mine = PageStore::open(dir.path(), FeedKey::new("my/stories")).unwrap();

        stories.set_cursor(Some(4), None).await.unwrap();
        mine.set_cursor(Some(2), None).await.unwrap();

        assert_eq!(stories.read_cursor().next_page, Some(4));
        assert_eq!(mine.read_cursor().next_page, Some(2));
        assert!(dir.path().join("my_2fstories.json").exists());
    }

    #[tokio::test]
    async fn test_similar_keys_never_share_a_document() {
        let dir = tempfile::tempdir().unwrap();
        {
            let slashed = PageStore::open(dir.path(), FeedKey::new("my/stories")).unwrap();
            let underscored = PageStore::open(dir.path(), FeedKey::new("my_stories")).unwrap();
            slashed
                .replace_all(vec![story("x")], Cursor::new(Some(2), None))
                .await
                .unwrap();
            underscored
                .replace_all(vec![story("y")], Cursor::new(None, None))
                .await
                .unwrap();
        }

        let slashed = PageStore::open(dir.path(), FeedKey::new("my/stories")).unwrap();
        let underscored = PageStore::open(dir.path(), FeedKey::new("my_stories")).unwrap();
        assert_eq!(ids(&slashed), vec!["x"]);
        assert_eq!(slashed.read_cursor().next_page, Some(2));
        assert_eq!(ids(&underscored), vec!["y"]);
        assert_eq!(underscored.read_cursor().next_page, None);
    }

    #[test]
    fn test_file_stem_escapes_reserved_bytes() {
        assert_eq!(FeedKey::default().file_stem(), "stories");
        assert_eq!(FeedKey::new("my/stories").file_stem(), "my_2fstories");
        assert_eq!(FeedKey::new("my_stories").file_stem(), "my_5fstories");
        assert_eq!(FeedKey::new("").file_stem(), "_");
    }

    #[tokio::test]
    async fn test_replace_all_dedups_page() {
        let store = PageStore::ephemeral(FeedKey::default());
        let mut again = story("a");
        again.name = "A again".to_string();
        store
            .replace_all(vec![story("a"), story("b"), again], Cursor::new(Some(2), None))
            .await
            .unwrap();

        assert_eq!(ids(&store), vec!["a", "b"]);
        assert_eq!(store.materialize(0, 1)[0].name, "A again");
    }

    #[tokio::test]
    async fn test_failed_write_leaves_previous_state() {
        let dir = tempfile::tempdir().unwrap();
        let feed_dir = dir.path().join("feed");
        let store = PageStore::open(&feed_dir, FeedKey::default()).unwrap();
        store
            .replace_all(vec![story("a")], Cursor::new(Some(2), None))
            .await
            .unwrap();

        std::fs::remove_dir_all(&feed_dir).unwrap();

        let err = store
            .append(vec![story("b")], Cursor::new(Some(3), None))
            .await
            .unwrap_err();
        assert!(matches!(err, FeedError::Storage(_)));
        assert_eq!(ids(&store), vec!["a"]);
        assert_eq!(store.read_cursor().next_page, Some(2));
        assert_eq!(store.generation(), 1);
    }

    #[tokio::test]
    async fn test_corrupt_document_starts_empty() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("stories.json"), "{not json").unwrap();

        let store = PageStore::open(dir.path(), FeedKey::default()).unwrap();
        assert!(store.is_empty());
        assert_eq!(store.read_cursor(), Cursor::default());
    }

    #[tokio::test]
    async fn test_clear_resets_everything() {
        let store = PageStore::ephemeral(FeedKey::default());
        store
            .replace_all(vec![story("a")], Cursor::new(Some(2), None))
            .await
            .unwrap();
        store.clear().await.unwrap();

        assert!(store.is_empty());
        assert_eq!(store.read_cursor(), Cursor::default());
        assert!(store.snapshot().cached_at.is_none());
    }
}
