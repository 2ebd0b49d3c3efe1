//! Local caching module for offline feed access.
//!
//! This module provides the `PageStore`, the durable cache behind each feed,
//! and the `CacheHandle` that opens it exactly once per process. A feed's
//! stories and pagination cursor are stored together in one JSON document
//! and replaced atomically on every commit. Cached data is considered stale
//! after 60 minutes.

pub mod handle;
pub mod snapshot;
pub mod store;

pub use handle::CacheHandle;
pub use snapshot::FeedSnapshot;
pub use store::{FeedKey, PageStore};
