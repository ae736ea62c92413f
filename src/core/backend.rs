//! Backend handle: one live backend plus identity and lifecycle metadata
use crate::config::BackendSettings;
use crate::core::{Backend, IdentityKey};
use crate::error::{SwitchyardError, SwitchyardResult};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Added to a handle's lifetime window before a retired handle is closed
pub const RETIREMENT_GRACE: Duration = Duration::from_secs(1);

/// Outcome of constructing a backend: the shared handle or the construction error
pub type Construction<B> = SwitchyardResult<Arc<BackendHandle<B>>>;

/// A constructed, probed backend
///
/// Handles are shared between the registry and any number of groups. The
/// close operation runs at most once; a closed handle is never reused.
pub struct BackendHandle<B: Backend> {
    name: String,
    key: IdentityKey,
    backend: B,
    lifetime_window: Duration,
    slow_threshold: Duration,
    closed: AtomicBool,
}

impl<B: Backend> BackendHandle<B> {
    pub fn new(settings: &BackendSettings, key: IdentityKey, backend: B) -> Self {
        Self {
            name: settings.name().to_string(),
            key,
            backend,
            lifetime_window: settings.lifetime_window(),
            slow_threshold: settings.slow_threshold(),
            closed: AtomicBool::new(false),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn key(&self) -> &IdentityKey {
        &self.key
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// The live connection of this backend
    pub fn connection(&self) -> B::Connection {
        self.backend.connection()
    }

    pub fn lifetime_window(&self) -> Duration {
        self.lifetime_window
    }

    pub fn slow_threshold(&self) -> Duration {
        self.slow_threshold
    }

    /// How long a retired handle stays open before it is closed
    ///
    /// Longer than the backend's own connection lifetime, so work already
    /// dispatched on it can finish or be recycled by the client.
    pub fn retirement_delay(&self) -> Duration {
        self.lifetime_window + RETIREMENT_GRACE
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Close the backend, once
    ///
    /// Later calls return `Ok(())` without touching the backend.
    pub async fn close(&self) -> SwitchyardResult<()> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }

        match self.backend.close().await {
            Ok(()) => {
                tracing::debug!(backend = %self.name, key = %self.key, "backend closed");
                Ok(())
            }
            Err(source) => {
                tracing::warn!(backend = %self.name, error = %source, "close backend failed");
                Err(SwitchyardError::close(self.name.clone(), source))
            }
        }
    }
}

impl<B: Backend> fmt::Debug for BackendHandle<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BackendHandle")
            .field("name", &self.name)
            .field("key", &self.key)
            .field("lifetime_window", &self.lifetime_window)
            .field("closed", &self.is_closed())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{settings, MockBackend};

    #[tokio::test]
    async fn test_close_runs_once() {
        let settings = settings("w1", "10.0.0.1:3306");
        let backend = MockBackend::new("w1");
        let closes = backend.close_counter();
        let handle = BackendHandle::new(&settings, IdentityKey::derive(&settings), backend);

        assert!(!handle.is_closed());
        handle.close().await.unwrap();
        handle.close().await.unwrap();

        assert!(handle.is_closed());
        assert_eq!(closes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_close_failure_reported_once() {
        let settings = settings("w1", "10.0.0.1:3306");
        let backend = MockBackend::new("w1").failing_close();
        let handle = BackendHandle::new(&settings, IdentityKey::derive(&settings), backend);

        let err = handle.close().await.unwrap_err();
        assert!(matches!(err, SwitchyardError::Close { ref backend, .. } if backend == "w1"));
        assert!(handle.close().await.is_ok());
    }

    #[test]
    fn test_retirement_delay() {
        let mut settings = settings("w1", "10.0.0.1:3306");
        settings.tuning.lifetime_window_sec = 30;
        let handle = BackendHandle::new(
            &settings,
            IdentityKey::derive(&settings),
            MockBackend::new("w1"),
        );
        assert_eq!(handle.retirement_delay(), Duration::from_secs(31));
    }
}
