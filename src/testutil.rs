//! In-memory backend used by unit tests.

use crate::config::{BackendSettings, EndpointConfig, TuningConfig};
use crate::core::{Backend, BackendFactory, Transactional};
use crate::error::BackendError;
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub fn settings(name: &str, address: &str) -> BackendSettings {
    BackendSettings::new(
        EndpointConfig {
            name: name.to_string(),
            address: address.to_string(),
            username: None,
            password: None,
            database: None,
        },
        TuningConfig::default(),
    )
}

/// Connection handed out by [`MockBackend`]; `tx` is set inside a transaction
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MockConn {
    pub backend: String,
    pub tx: Option<u64>,
}

pub struct MockBackend {
    name: String,
    closes: Arc<AtomicUsize>,
    probe_error: Option<String>,
    close_error: bool,
    next_tx: AtomicU64,
    commits: Arc<AtomicUsize>,
    rollbacks: Arc<AtomicUsize>,
}

impl MockBackend {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            closes: Arc::new(AtomicUsize::new(0)),
            probe_error: None,
            close_error: false,
            next_tx: AtomicU64::new(1),
            commits: Arc::new(AtomicUsize::new(0)),
            rollbacks: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn failing_probe(mut self, message: &str) -> Self {
        self.probe_error = Some(message.to_string());
        self
    }

    pub fn failing_close(mut self) -> Self {
        self.close_error = true;
        self
    }

    fn with_closes(mut self, closes: Arc<AtomicUsize>) -> Self {
        self.closes = closes;
        self
    }

    pub fn close_counter(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.closes)
    }

    pub fn commits(&self) -> usize {
        self.commits.load(Ordering::SeqCst)
    }

    pub fn rollbacks(&self) -> usize {
        self.rollbacks.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Backend for MockBackend {
    type Connection = MockConn;

    fn connection(&self) -> MockConn {
        MockConn {
            backend: self.name.clone(),
            tx: None,
        }
    }

    async fn probe(&self) -> Result<(), BackendError> {
        match &self.probe_error {
            Some(message) => Err(BackendError::probe(message.clone())),
            None => Ok(()),
        }
    }

    async fn close(&self) -> Result<(), BackendError> {
        self.closes.fetch_add(1, Ordering::SeqCst);
        if self.close_error {
            return Err(BackendError::operation("close", "socket already gone"));
        }
        Ok(())
    }
}

#[async_trait]
impl Transactional for MockBackend {
    async fn begin(&self) -> Result<MockConn, BackendError> {
        Ok(MockConn {
            backend: self.name.clone(),
            tx: Some(self.next_tx.fetch_add(1, Ordering::SeqCst)),
        })
    }

    async fn commit(&self, _tx: MockConn) -> Result<(), BackendError> {
        self.commits.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn rollback(&self, _tx: MockConn) -> Result<(), BackendError> {
        self.rollbacks.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Factory that counts opens and closes per endpoint name
#[derive(Default)]
pub struct MockFactory {
    opens: AtomicUsize,
    failing: HashSet<String>,
    open_delay: Option<Duration>,
    closes: Mutex<HashMap<String, Arc<AtomicUsize>>>,
}

impl MockFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Probes of this address fail
    pub fn failing(mut self, address: &str) -> Self {
        self.failing.insert(address.to_string());
        self
    }

    pub fn with_open_delay(mut self, delay: Duration) -> Self {
        self.open_delay = Some(delay);
        self
    }

    pub fn opens(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }

    pub fn closes(&self, name: &str) -> usize {
        self.counter(name).load(Ordering::SeqCst)
    }

    fn counter(&self, name: &str) -> Arc<AtomicUsize> {
        let mut closes = self.closes.lock().unwrap();
        Arc::clone(closes.entry(name.to_string()).or_default())
    }
}

#[async_trait]
impl BackendFactory for MockFactory {
    type Backend = MockBackend;

    async fn open(&self, settings: &BackendSettings) -> Result<MockBackend, BackendError> {
        self.opens.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.open_delay {
            tokio::time::sleep(delay).await;
        }

        let mut backend = MockBackend::new(settings.name()).with_closes(self.counter(settings.name()));
        if self.failing.contains(&settings.endpoint.address) {
            backend = backend.failing_probe("connection refused");
        }
        Ok(backend)
    }
}
