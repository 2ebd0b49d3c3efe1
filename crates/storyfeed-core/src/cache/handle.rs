use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::OnceCell;
use tracing::info;

use super::{FeedKey, PageStore};
use crate::error::FeedError;

/// Startup-constructed handle to one feed's cache.
///
/// Create it once and pass it (or an `Arc` of it) to everything that needs
/// the store. The store itself is opened lazily on first use and at most
/// once, however many tasks race to get it.
#[derive(Debug)]
pub struct CacheHandle {
    dir: Option<PathBuf>,
    key: FeedKey,
    store: OnceCell<Arc<PageStore>>,
}

impl CacheHandle {
    /// Cache backed by a document under `dir`
    pub fn new(dir: PathBuf, key: FeedKey) -> Self {
        Self {
            dir: Some(dir),
            key,
            store: OnceCell::new(),
        }
    }

    /// Cache that lives only as long as the process
    pub fn in_memory(key: FeedKey) -> Self {
        Self {
            dir: None,
            key,
            store: OnceCell::new(),
        }
    }

    pub fn key(&self) -> &FeedKey {
        &self.key
    }

    /// The store, opening it on first call
    pub async fn store(&self) -> Result<Arc<PageStore>, FeedError> {
        let store = self
            .store
            .get_or_try_init(|| async {
                let key = self.key.clone();
                let store = match self.dir.clone() {
                    Some(dir) => tokio::task::spawn_blocking(move || PageStore::open(&dir, key))
                        .await
                        .map_err(FeedError::storage)??,
                    None => PageStore::ephemeral(key),
                };
                info!(feed = %self.key, path = ?store.path(), "Feed cache ready");
                Ok::<_, FeedError>(Arc::new(store))
            })
            .await?;
        Ok(Arc::clone(store))
    }
}
