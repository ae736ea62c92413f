//! Delayed, cancellable closing of backends removed from a group
use crate::core::{Backend, BackendHandle};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

/// Schedules retired handles for closing
///
/// Each retired handle is closed once, after its retirement delay, unless it
/// is reprieved first. Shutdown cancels the pending delays and closes those
/// handles right away.
pub struct Retirer {
    cancel_token: CancellationToken,
    tracker: TaskTracker,
    /// Reprieve tokens of pending retirements, keyed by handle address
    pending: Arc<Mutex<HashMap<usize, CancellationToken>>>,
}

/// Address of the handle allocation; unique while the handle is alive
fn slot<B: Backend>(handle: &Arc<BackendHandle<B>>) -> usize {
    Arc::as_ptr(handle) as usize
}

impl Retirer {
    pub fn new() -> Self {
        Self {
            cancel_token: CancellationToken::new(),
            tracker: TaskTracker::new(),
            pending: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Close `handle` after its retirement delay
    ///
    /// Returns `false` when the handle already has a pending retirement.
    /// Must be called within a Tokio runtime context.
    pub async fn schedule<B: Backend>(&self, handle: Arc<BackendHandle<B>>) -> bool {
        let slot = slot(&handle);
        let reprieve = CancellationToken::new();
        {
            let mut pending = self.pending.lock().await;
            if pending.contains_key(&slot) {
                return false;
            }
            pending.insert(slot, reprieve.clone());
        }

        let delay = handle.retirement_delay();
        let shutdown = self.cancel_token.clone();
        let pending = Arc::clone(&self.pending);

        tracing::info!(
            backend = handle.name(),
            delay_ms = delay.as_millis() as u64,
            "backend retired, close scheduled"
        );

        self.tracker.spawn(async move {
            tokio::select! {
                _ = reprieve.cancelled() => {
                    tracing::debug!(backend = handle.name(), "backend reinstated, close dropped");
                    return;
                }
                _ = tokio::time::sleep(delay) => {
                    tracing::debug!(backend = handle.name(), "retirement delay elapsed");
                }
                _ = shutdown.cancelled() => {
                    tracing::debug!(backend = handle.name(), "shutdown, closing retired backend early");
                }
            }

            // held through the close so a reprieve either wins or sees the handle closed
            let mut pending = pending.lock().await;
            if reprieve.is_cancelled() {
                return;
            }
            pending.remove(&slot);
            // close errors only reach the log from here
            let _ = handle.close().await;
        });

        true
    }

    /// Drop the pending retirement of `handle`, if any
    ///
    /// Returns `true` when a pending close was cancelled. A `false` return
    /// for a closed handle means its retirement already ran.
    pub async fn reprieve<B: Backend>(&self, handle: &Arc<BackendHandle<B>>) -> bool {
        let mut pending = self.pending.lock().await;
        match pending.remove(&slot(handle)) {
            Some(token) => {
                token.cancel();
                tracing::info!(backend = handle.name(), "retired backend reinstated");
                true
            }
            None => false,
        }
    }

    /// Number of retirements not yet finished
    pub fn pending(&self) -> usize {
        self.tracker.len()
    }

    /// Cancel pending delays and wait until every retired handle is closed
    pub async fn shutdown(&self) {
        self.cancel_token.cancel();
        self.tracker.close();
        self.tracker.wait().await;
    }
}

impl Default for Retirer {
    fn default() -> Self {
        Self::new()
    }
}
