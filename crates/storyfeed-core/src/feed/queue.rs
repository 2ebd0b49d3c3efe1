//! Serialized load queue for one feed.
//!
//! A single worker task owns the feed's `SyncMediator` and runs one job at a
//! time, so a refresh can never interleave with an append and two appends
//! can never both read the same cursor. A request whose load is already
//! queued or running joins it and receives the same outcome instead of
//! enqueueing a duplicate.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, error, info, warn};

use super::load::{LoadOutcome, LoadState, LoadStates, LoadType};
use super::mediator::SyncMediator;
use crate::error::FeedError;

/// Load type plus page size: everything that identifies a load
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct LoadKey {
    load_type: LoadType,
    page_size: u32,
}

enum Job {
    Load(LoadKey),
    Clear(oneshot::Sender<Result<(), FeedError>>),
}

/// State shared between the worker and every handle.
struct QueueState {
    pending: Mutex<HashMap<LoadKey, Vec<oneshot::Sender<LoadOutcome>>>>,
    last_failed: Mutex<Option<LoadKey>>,
    states: watch::Sender<LoadStates>,
}

impl QueueState {
    fn pending(&self) -> MutexGuard<'_, HashMap<LoadKey, Vec<oneshot::Sender<LoadOutcome>>>> {
        self.pending.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn last_failed(&self) -> MutexGuard<'_, Option<LoadKey>> {
        self.last_failed.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn set_state(&self, load_type: LoadType, state: LoadState) {
        self.states.send_modify(|states| states.set(load_type, state));
    }

    fn finish(&self, key: LoadKey, outcome: LoadOutcome) {
        {
            let mut last_failed = self.last_failed();
            match &outcome {
                Err(FeedError::Cancelled) => {}
                Err(_) => *last_failed = Some(key),
                Ok(_) if (*last_failed).map(|k| k.load_type) == Some(key.load_type) => {
                    *last_failed = None;
                }
                Ok(_) => {}
            }
        }

        let state = match &outcome {
            Err(FeedError::Cancelled) => LoadState::idle(),
            outcome => LoadState::from_outcome(outcome),
        };
        self.set_state(key.load_type, state);

        let waiters = self.pending().remove(&key).unwrap_or_default();
        for waiter in waiters {
            // Callers that stopped waiting are fine to skip
            let _ = waiter.send(outcome.clone());
        }
    }

    fn cancel_all(&self) {
        let pending: Vec<_> = self.pending().drain().collect();
        for (key, waiters) in pending {
            debug!(load_type = %key.load_type, waiters = waiters.len(), "Cancelling queued load");
            self.set_state(key.load_type, LoadState::idle());
            for waiter in waiters {
                let _ = waiter.send(Err(FeedError::Cancelled));
            }
        }
    }
}

/// Owned by the handles only; dropping the last handle stops the worker.
struct QueueHandle {
    tx: mpsc::UnboundedSender<Job>,
    shutdown: watch::Sender<bool>,
    state: Arc<QueueState>,
}

impl Drop for QueueHandle {
    fn drop(&mut self) {
        self.shutdown.send_replace(true);
    }
}

/// Handle to a feed's serialized load queue. Clones share the same worker.
#[derive(Clone)]
pub struct LoadQueue {
    handle: Arc<QueueHandle>,
}

impl LoadQueue {
    /// Spawn the worker task on the current tokio runtime.
    pub fn spawn(mediator: SyncMediator) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let (shutdown, shutdown_rx) = watch::channel(false);
        let (states, _) = watch::channel(LoadStates::default());

        let state = Arc::new(QueueState {
            pending: Mutex::new(HashMap::new()),
            last_failed: Mutex::new(None),
            states,
        });

        tokio::spawn(run_worker(mediator, rx, Arc::clone(&state), shutdown_rx));

        Self {
            handle: Arc::new(QueueHandle {
                tx,
                shutdown,
                state,
            }),
        }
    }

    /// Submit a load, joining an identical one already pending.
    fn submit(&self, load_type: LoadType, page_size: u32) -> oneshot::Receiver<LoadOutcome> {
        let key = LoadKey {
            load_type,
            page_size,
        };
        let (tx, rx) = oneshot::channel();

        let mut pending = self.handle.state.pending();
        if let Some(waiters) = pending.get_mut(&key) {
            debug!(%load_type, "Joining pending load");
            waiters.push(tx);
            return rx;
        }

        if self.handle.tx.send(Job::Load(key)).is_err() {
            let _ = tx.send(Err(FeedError::Cancelled));
            return rx;
        }
        pending.insert(key, vec![tx]);
        // Still under the lock, so the worker cannot report first
        self.handle.state.set_state(load_type, LoadState::Loading);
        rx
    }

    /// Run a load through the queue and wait for its outcome.
    pub async fn load(&self, load_type: LoadType, page_size: u32) -> LoadOutcome {
        self.submit(load_type, page_size)
            .await
            .unwrap_or(Err(FeedError::Cancelled))
    }

    /// Queue a load without waiting for it; progress shows in the load states.
    pub fn enqueue(&self, load_type: LoadType, page_size: u32) {
        drop(self.submit(load_type, page_size));
    }

    /// Re-run the most recent failed load with the same parameters.
    /// Returns `None` when nothing has failed since the last success.
    pub async fn retry(&self) -> Option<LoadOutcome> {
        let key = (*self.handle.state.last_failed())?;
        info!(load_type = %key.load_type, page_size = key.page_size, "Retrying failed load");
        Some(self.load(key.load_type, key.page_size).await)
    }

    /// Empty the feed's cache once every load queued before it has finished.
    pub async fn clear(&self) -> Result<(), FeedError> {
        let (tx, rx) = oneshot::channel();
        self.handle
            .tx
            .send(Job::Clear(tx))
            .map_err(|_| FeedError::Cancelled)?;
        rx.await.unwrap_or(Err(FeedError::Cancelled))
    }

    pub fn load_states(&self) -> watch::Receiver<LoadStates> {
        self.handle.state.states.subscribe()
    }

    /// Stop the worker, cancelling the running load and everything queued.
    pub fn shutdown(&self) {
        self.handle.shutdown.send_replace(true);
    }
}

async fn run_worker(
    mediator: SyncMediator,
    mut rx: mpsc::UnboundedReceiver<Job>,
    state: Arc<QueueState>,
    mut shutdown: watch::Receiver<bool>,
) {
    debug!(feed = %mediator.store().key(), "Load queue started");

    loop {
        let job = tokio::select! {
            biased;
            _ = shutdown.wait_for(|stop| *stop) => break,
            job = rx.recv() => match job {
                Some(job) => job,
                None => break,
            },
        };

        match job {
            Job::Load(key) => {
                let outcome = tokio::select! {
                    biased;
                    _ = shutdown.wait_for(|stop| *stop) => {
                        warn!(load_type = %key.load_type, "Load cancelled by shutdown");
                        state.finish(key, Err(FeedError::Cancelled));
                        break;
                    }
                    outcome = mediator.load(key.load_type, key.page_size) => outcome,
                };
                if let Err(e) = &outcome {
                    debug!(load_type = %key.load_type, error = %e, "Load failed");
                }
                state.finish(key, outcome);
            }
            Job::Clear(reply) => {
                let result = mediator.store().clear().await;
                match &result {
                    Ok(()) => {
                        *state.last_failed() = None;
                        state.states.send_replace(LoadStates::default());
                        info!(feed = %mediator.store().key(), "Feed cache cleared");
                    }
                    Err(e) => error!(error = %e, "Failed to clear feed cache"),
                }
                let _ = reply.send(result);
            }
        }
    }

    rx.close();
    state.cancel_all();
    debug!(feed = %mediator.store().key(), "Load queue stopped");
}
