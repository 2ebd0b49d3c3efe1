//! storyfeed-core - offline-first paginated story feed.
//!
//! Stories are fetched a page at a time from the remote API, committed to a
//! local cache together with the pagination cursor, and exposed to consumers
//! as a lazy sequence that fetches more as it is read. Cached stories stay
//! readable without a network connection.

pub mod api;
pub mod auth;
pub mod cache;
pub mod config;
pub mod diff;
pub mod error;
pub mod feed;
pub mod models;

pub use api::{ApiClient, LocationFilter, RemotePager};
#[cfg(any(test, feature = "test-util"))]
pub use api::MockPager;
pub use auth::AuthToken;
pub use cache::{CacheHandle, FeedKey, FeedSnapshot, PageStore};
pub use config::Config;
pub use diff::DiffOp;
pub use error::FeedError;
pub use feed::{
    InitializeAction, LazySequence, LoadOutcome, LoadState, LoadStates, LoadSuccess, LoadType,
    PagedFeed, StoryFeed, SyncMediator,
};
pub use models::{Cursor, NewStory, StoriesResponse, Story};
