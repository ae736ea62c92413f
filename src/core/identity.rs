//! Deterministic backend identity
use crate::config::BackendSettings;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fmt;

/// Fingerprint of a backend's identity-relevant configuration
///
/// Format: `<name>:<address>:<sha256 hex of the remaining fields>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct IdentityKey(String);

impl IdentityKey {
    /// Derive the key for a set of backend settings
    ///
    /// Fields go through a sorted map before hashing so the key does not
    /// depend on declaration or assignment order.
    pub fn derive(settings: &BackendSettings) -> Self {
        let endpoint = &settings.endpoint;
        let tuning = &settings.tuning;

        let mut fields: BTreeMap<&str, serde_json::Value> = BTreeMap::new();
        fields.insert("username", json(&endpoint.username));
        fields.insert("password", json(&endpoint.password));
        fields.insert("database", json(&endpoint.database));
        fields.insert("max_open", json(&tuning.max_open));
        fields.insert("max_idle", json(&tuning.max_idle));
        fields.insert("lifetime_window_sec", json(&tuning.lifetime_window_sec));
        fields.insert("connect_timeout_ms", json(&tuning.connect_timeout_ms));

        Self::from_parts(&endpoint.name, &endpoint.address, &fields)
    }

    /// Build a key from a name, an address and any serializable option set
    pub fn from_parts<T: Serialize>(name: &str, address: &str, options: &T) -> Self {
        let encoded = serde_json::to_vec(options).unwrap_or_default();
        let digest = Sha256::digest(&encoded);
        IdentityKey(format!("{}:{}:{}", name, address, hex::encode(digest)))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

fn json<T: Serialize>(value: &T) -> serde_json::Value {
    serde_json::to_value(value).unwrap_or(serde_json::Value::Null)
}

impl fmt::Display for IdentityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
