//! Traffic classifiers deciding shadow and gray routing
use crate::routing::RequestMeta;

/// Predicate over request metadata
pub trait Classifier: Send + Sync {
    fn judge(&self, meta: &RequestMeta) -> bool;
}

/// Never classifies a request; the default for both shadow and gray
#[derive(Debug, Clone, Copy, Default)]
pub struct NeverClassifier;

impl Classifier for NeverClassifier {
    fn judge(&self, _meta: &RequestMeta) -> bool {
        false
    }
}

/// Classifier backed by a closure
pub struct FnClassifier<F>(F);

impl<F> FnClassifier<F>
where
    F: Fn(&RequestMeta) -> bool + Send + Sync,
{
    pub fn new(judge: F) -> Self {
        Self(judge)
    }
}

impl<F> Classifier for FnClassifier<F>
where
    F: Fn(&RequestMeta) -> bool + Send + Sync,
{
    fn judge(&self, meta: &RequestMeta) -> bool {
        (self.0)(meta)
    }
}

/// Judges true when a label is present, optionally with a given value
#[derive(Debug, Clone)]
pub struct LabelClassifier {
    key: String,
    value: Option<String>,
}

impl LabelClassifier {
    /// Match on presence of `key`
    pub fn present<K: Into<String>>(key: K) -> Self {
        Self {
            key: key.into(),
            value: None,
        }
    }

    /// Match when `key` equals `value`
    pub fn equals<K: Into<String>, V: Into<String>>(key: K, value: V) -> Self {
        Self {
            key: key.into(),
            value: Some(value.into()),
        }
    }
}

impl Classifier for LabelClassifier {
    fn judge(&self, meta: &RequestMeta) -> bool {
        match (&self.value, meta.label(&self.key)) {
            (None, found) => found.is_some(),
            (Some(expected), Some(found)) => expected == found,
            (Some(_), None) => false,
        }
    }
}
