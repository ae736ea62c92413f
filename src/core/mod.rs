//! Core abstractions shared by every store kind
//!
//! A backend is anything that can hand out a cloneable live connection, be
//! probed for liveness and be closed. The router never looks further inside.
pub mod backend;
pub mod group;
pub mod identity;
pub mod registry;
pub mod retire;

pub use backend::{BackendHandle, Construction, RETIREMENT_GRACE};
pub use group::{Group, Members, MembershipChange};
pub use identity::IdentityKey;
pub use registry::InstanceRegistry;
pub use retire::Retirer;

use crate::config::BackendSettings;
use crate::error::BackendError;
use async_trait::async_trait;

/// A single physical connection to a data store
#[async_trait]
pub trait Backend: Send + Sync + 'static {
    /// Live connection handed out by routing
    type Connection: Clone + Send + Sync + 'static;

    /// The live connection object
    fn connection(&self) -> Self::Connection;

    /// Liveness check run once at construction
    async fn probe(&self) -> Result<(), BackendError>;

    /// Release the underlying resource
    async fn close(&self) -> Result<(), BackendError>;
}

/// Backends that support native transactions
///
/// The transaction is itself a `Connection`, so it can be pinned into a
/// request context and returned by routing.
#[async_trait]
pub trait Transactional: Backend {
    async fn begin(&self) -> Result<Self::Connection, BackendError>;

    async fn commit(&self, tx: Self::Connection) -> Result<(), BackendError>;

    async fn rollback(&self, tx: Self::Connection) -> Result<(), BackendError>;
}

/// Opens backends of one kind from resolved settings
#[async_trait]
pub trait BackendFactory: Send + Sync {
    type Backend: Backend;

    async fn open(&self, settings: &BackendSettings) -> Result<Self::Backend, BackendError>;
}
