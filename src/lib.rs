//! Switchyard - multi-role backend router for data-store clients
//!
//! A router owns up to five role groups (read, write, shadow-read,
//! shadow-write, gray) for one logical data source and picks a live backend
//! per request from the request's intent and metadata. Groups can be swapped
//! at runtime without disturbing in-flight work:
//!
//! 1. Backends with identical connection parameters are built once and shared
//!    through an [`InstanceRegistry`].
//! 2. A membership update only closes backends that actually left the group,
//!    and only after their lifetime window plus a grace second.
//! 3. Construction failures are excluded and reported through the router's
//!    aggregated error instead of aborting the update.
pub mod config;
pub mod core;
pub mod error;
pub mod probe;
pub mod routing;
pub mod utils;

#[cfg(test)]
mod testutil;

pub use crate::config::{BackendSettings, Config, EndpointConfig, PoolerKind, SourceConfig, TuningConfig};
pub use crate::core::{Backend, BackendFactory, BackendHandle, InstanceRegistry, Transactional};
pub use crate::error::{BackendError, SwitchyardError, SwitchyardResult};
pub use crate::probe::{Endpoint, TcpBackend, TcpBackendFactory};
pub use crate::routing::{
    Classifier, Intent, LabelClassifier, Pooler, RequestContext, RequestMeta, Role, Router,
    RouterBuilder, StoreKind,
};
