//! Deduplicating backend registry
use crate::config::BackendSettings;
use crate::core::{Backend, BackendFactory, BackendHandle, Construction, IdentityKey};
use crate::error::SwitchyardError;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Maps identity keys to live backend handles
///
/// At most one open handle exists per identity key. Entries are never
/// removed: groups that stop referencing a handle do not shrink the registry.
/// A closed entry counts as a miss and is replaced by the next construction
/// with the same key.
pub struct InstanceRegistry<B: Backend> {
    instances: Mutex<HashMap<IdentityKey, Arc<BackendHandle<B>>>>,
}

impl<B: Backend> InstanceRegistry<B> {
    pub fn new() -> Self {
        Self {
            instances: Mutex::new(HashMap::new()),
        }
    }

    /// Construct a backend, reusing the registered handle for the same identity
    ///
    /// The lookup happens before anything is opened. The registry lock is not
    /// held while opening or probing; if another caller registered the same
    /// key meanwhile, the freshly opened backend is closed and the registered
    /// handle is returned instead.
    pub async fn construct<F>(&self, factory: &F, settings: &BackendSettings) -> Construction<B>
    where
        F: BackendFactory<Backend = B>,
    {
        let key = IdentityKey::derive(settings);

        if let Some(existing) = self.get(&key).await {
            tracing::debug!(backend = settings.name(), key = %key, "reusing registered backend");
            return Ok(existing);
        }

        let backend = factory.open(settings).await.map_err(|source| {
            tracing::error!(backend = settings.name(), error = %source, "open backend failed");
            SwitchyardError::construction(settings.name(), source)
        })?;

        if let Err(source) = backend.probe().await {
            tracing::error!(backend = settings.name(), error = %source, "new backend failed its probe");
            if let Err(e) = backend.close().await {
                tracing::warn!(backend = settings.name(), error = %e, "close unprobed backend failed");
            }
            return Err(SwitchyardError::construction(settings.name(), source));
        }

        let handle = Arc::new(BackendHandle::new(settings, key.clone(), backend));

        let winner = {
            let mut instances = self.instances.lock().await;
            match instances.get(&key) {
                Some(registered) if !registered.is_closed() => Some(Arc::clone(registered)),
                _ => {
                    instances.insert(key.clone(), Arc::clone(&handle));
                    None
                }
            }
        };

        match winner {
            Some(registered) => {
                tracing::debug!(backend = settings.name(), key = %key, "lost construction race, closing duplicate");
                // close errors are logged by the handle
                let _ = handle.close().await;
                Ok(registered)
            }
            None => {
                tracing::info!(backend = settings.name(), key = %key, "backend registered");
                Ok(handle)
            }
        }
    }

    /// The open handle registered under a key
    pub async fn get(&self, key: &IdentityKey) -> Option<Arc<BackendHandle<B>>> {
        let instances = self.instances.lock().await;
        instances
            .get(key)
            .filter(|handle| !handle.is_closed())
            .cloned()
    }

    /// Number of entries, closed ones included
    pub async fn len(&self) -> usize {
        self.instances.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.instances.lock().await.is_empty()
    }
}

impl<B: Backend> Default for InstanceRegistry<B> {
    fn default() -> Self {
        Self::new()
    }
}
