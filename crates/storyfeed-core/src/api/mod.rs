//! REST API client module for the stories service.
//!
//! This module provides the `RemotePager` seam the sync mediator fetches
//! through, the reqwest-backed `ApiClient` implementing it, and a
//! `MockPager` for tests.
//!
//! The API uses bearer token authentication; the token is supplied by the
//! caller and passed through untouched.

pub mod client;
#[cfg(any(test, feature = "test-util"))]
pub mod mock;

pub use client::{ApiClient, LocationFilter};
#[cfg(any(test, feature = "test-util"))]
pub use mock::MockPager;

use async_trait::async_trait;

use crate::auth::AuthToken;
use crate::error::FeedError;
use crate::models::Story;

/// One page of a remote paginated collection.
///
/// Implementations are stateless network calls: no caching, no retries, no
/// knowledge of which page comes next. A page shorter than `size` means the
/// remote has nothing beyond it.
#[async_trait]
pub trait RemotePager: Send + Sync {
    /// Fetch page `page` (1-based) of `size` items.
    async fn fetch(&self, page: u32, size: u32, token: &AuthToken)
        -> Result<Vec<Story>, FeedError>;
}
