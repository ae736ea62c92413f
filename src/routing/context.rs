//! Request context passed explicitly to every routing call
use std::collections::BTreeMap;

/// Request metadata consulted by classifiers and poolers
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestMeta {
    labels: BTreeMap<String, String>,
}

impl RequestMeta {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_label<K: Into<String>, V: Into<String>>(mut self, key: K, value: V) -> Self {
        self.labels.insert(key.into(), value.into());
        self
    }

    pub fn insert_label<K: Into<String>, V: Into<String>>(&mut self, key: K, value: V) {
        self.labels.insert(key.into(), value.into());
    }

    pub fn label(&self, key: &str) -> Option<&str> {
        self.labels.get(key).map(String::as_str)
    }

    pub fn has_label(&self, key: &str) -> bool {
        self.labels.contains_key(key)
    }
}

/// Per-request routing context
///
/// Carries the request metadata and, inside a transaction, the pinned
/// transaction connection. Routing returns a pinned connection for every
/// intent, so all work in one transaction lands on one backend.
#[derive(Debug, Clone)]
pub struct RequestContext<C> {
    meta: RequestMeta,
    pinned: Option<C>,
}

impl<C> Default for RequestContext<C> {
    fn default() -> Self {
        Self {
            meta: RequestMeta::default(),
            pinned: None,
        }
    }
}

impl<C: Clone> RequestContext<C> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_meta(meta: RequestMeta) -> Self {
        Self { meta, pinned: None }
    }

    pub fn with_label<K: Into<String>, V: Into<String>>(mut self, key: K, value: V) -> Self {
        self.meta.insert_label(key, value);
        self
    }

    pub fn meta(&self) -> &RequestMeta {
        &self.meta
    }

    pub fn pinned(&self) -> Option<&C> {
        self.pinned.as_ref()
    }

    pub fn is_pinned(&self) -> bool {
        self.pinned.is_some()
    }

    /// Derived context pinned to `connection`
    pub fn pinned_to(&self, connection: C) -> Self {
        Self {
            meta: self.meta.clone(),
            pinned: Some(connection),
        }
    }
}
