//! Mock pager for testing.
//!
//! Serves pages out of an in-memory story list, records every call, and can
//! fail or stall the next fetch on demand.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use tokio::sync::watch;

use super::RemotePager;
use crate::auth::AuthToken;
use crate::error::FeedError;
use crate::models::Story;

/// Mock pager for testing.
///
/// Clones share state, so a test can keep one handle while the feed owns
/// another.
#[derive(Debug, Clone)]
pub struct MockPager {
    inner: Arc<Mutex<MockPagerInner>>,
    calls_tx: Arc<watch::Sender<usize>>,
    paused_tx: Arc<watch::Sender<bool>>,
}

#[derive(Debug, Default)]
struct MockPagerInner {
    remote: Vec<Story>,
    calls: Vec<(u32, u32)>,
    tokens: Vec<String>,
    failures: VecDeque<FeedError>,
}

impl Default for MockPager {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}

impl MockPager {
    /// Create a mock serving `remote` as the full remote collection.
    pub fn new(remote: Vec<Story>) -> Self {
        let (calls_tx, _) = watch::channel(0);
        let (paused_tx, _) = watch::channel(false);
        Self {
            inner: Arc::new(Mutex::new(MockPagerInner {
                remote,
                ..Default::default()
            })),
            calls_tx: Arc::new(calls_tx),
            paused_tx: Arc::new(paused_tx),
        }
    }

    fn lock(&self) -> MutexGuard<'_, MockPagerInner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Replace the remote collection.
    pub fn set_remote(&self, remote: Vec<Story>) {
        self.lock().remote = remote;
    }

    /// Cause the next fetch to fail with the given error.
    pub fn fail_next(&self, error: FeedError) {
        self.lock().failures.push_back(error);
    }

    /// Every `(page, size)` requested so far, in call order.
    pub fn calls(&self) -> Vec<(u32, u32)> {
        self.lock().calls.clone()
    }

    /// Number of fetches requested for `page`.
    pub fn calls_for_page(&self, page: u32) -> usize {
        self.lock()
            .calls
            .iter()
            .filter(|(p, _)| *p == page)
            .count()
    }

    /// Tokens presented with each call.
    pub fn tokens(&self) -> Vec<String> {
        self.lock().tokens.clone()
    }

    /// Hold every fetch after it is recorded until `resume()` is called.
    pub fn pause(&self) {
        self.paused_tx.send_replace(true);
    }

    pub fn resume(&self) {
        self.paused_tx.send_replace(false);
    }

    /// Wait until at least `count` fetches have been recorded.
    pub async fn wait_for_calls(&self, count: usize) {
        let mut rx = self.calls_tx.subscribe();
        let _ = rx.wait_for(|calls| *calls >= count).await;
    }
}

#[async_trait]
impl RemotePager for MockPager {
    async fn fetch(
        &self,
        page: u32,
        size: u32,
        token: &AuthToken,
    ) -> Result<Vec<Story>, FeedError> {
        let calls = {
            let mut inner = self.lock();
            inner.calls.push((page, size));
            inner.tokens.push(token.as_str().to_string());
            inner.calls.len()
        };
        self.calls_tx.send_replace(calls);

        let mut paused = self.paused_tx.subscribe();
        let _ = paused.wait_for(|p| !*p).await;

        let mut inner = self.lock();
        if let Some(error) = inner.failures.pop_front() {
            return Err(error);
        }

        let start = (page.saturating_sub(1) as usize) * size as usize;
        Ok(inner
            .remote
            .iter()
            .skip(start)
            .take(size as usize)
            .cloned()
            .collect())
    }
}
