//! Selection policies choosing one member of a group
use crate::config::PoolerKind;
use crate::routing::RequestMeta;
use rand::Rng;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Selection policy trait
pub trait Pooler: Send + Sync {
    /// Pick an index in `0..candidates`, `None` when there are no candidates
    fn choose(&self, meta: &RequestMeta, candidates: usize) -> Option<usize>;
}

/// Uniform random selection
#[derive(Debug, Clone, Copy, Default)]
pub struct RandomPooler;

impl Pooler for RandomPooler {
    fn choose(&self, _meta: &RequestMeta, candidates: usize) -> Option<usize> {
        match candidates {
            0 => None,
            1 => Some(0),
            n => Some(rand::thread_rng().gen_range(0..n)),
        }
    }
}

/// Round-robin selection
pub struct RoundRobinPooler {
    counter: AtomicUsize,
}

impl RoundRobinPooler {
    pub fn new() -> Self {
        Self {
            counter: AtomicUsize::new(0),
        }
    }
}

impl Default for RoundRobinPooler {
    fn default() -> Self {
        Self::new()
    }
}

impl Pooler for RoundRobinPooler {
    fn choose(&self, _meta: &RequestMeta, candidates: usize) -> Option<usize> {
        if candidates == 0 {
            return None;
        }

        Some(self.counter.fetch_add(1, Ordering::Relaxed) % candidates)
    }
}

/// Pooler for a configured policy
pub fn pooler_for(kind: PoolerKind) -> Arc<dyn Pooler> {
    match kind {
        PoolerKind::Random => Arc::new(RandomPooler),
        PoolerKind::RoundRobin => Arc::new(RoundRobinPooler::new()),
    }
}
