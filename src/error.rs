//! Unified error handling for switchyard
//!
//! This module provides the error types shared by the registry, the groups
//! and the router: configuration errors, backend construction and close
//! failures, and transaction errors raised by caller code.
use std::fmt;
use thiserror::Error;

/// Main error type for switchyard operations
///
/// Errors are `Clone` so a router can hand out its aggregated error state
/// without giving it up.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SwitchyardError {
    /// No primary role is populated after construction or reconfiguration
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    /// Invalid or unreadable configuration file
    #[error("Configuration file error: {0}")]
    Config(#[from] ConfigError),

    /// Backend failed to open or failed its liveness probe
    #[error("Construction of backend {backend} failed: {source}")]
    Construction {
        backend: String,
        #[source]
        source: BackendError,
    },

    /// Backend operation failed after construction
    #[error("Backend error: {0}")]
    Backend(#[from] BackendError),

    /// Closing a backend handle failed
    #[error("Close of backend {backend} failed: {source}")]
    Close {
        backend: String,
        #[source]
        source: BackendError,
    },

    /// Error returned from inside a transaction body
    #[error("Transaction error: {message}")]
    Transaction { message: String },

    /// Several independent failures collected during one apply
    #[error("{} errors, first: {}", .0.len(), .0.first().map(|e| e.to_string()).unwrap_or_default())]
    Aggregate(Vec<SwitchyardError>),
}

/// Error reported by a backend implementation
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BackendError {
    #[error("connect to {address} failed: {message}")]
    Connect { address: String, message: String },

    #[error("probe failed: {message}")]
    Probe { message: String },

    #[error("probe timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    #[error("{operation} failed: {message}")]
    Operation { operation: String, message: String },
}

/// Configuration-specific errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    IoError(String),

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Serialize error: {0}")]
    SerializeError(String),

    #[error("Validation error: {0}")]
    ValidationError(String),
}

/// Result type alias for switchyard operations
pub type SwitchyardResult<T> = Result<T, SwitchyardError>;

/// Convenience methods for creating specific error types
impl SwitchyardError {
    /// Create a configuration error
    pub fn configuration<S: Into<String>>(message: S) -> Self {
        SwitchyardError::Configuration {
            message: message.into(),
        }
    }

    /// Create a construction error for a named backend
    pub fn construction<S: Into<String>>(backend: S, source: BackendError) -> Self {
        SwitchyardError::Construction {
            backend: backend.into(),
            source,
        }
    }

    /// Create a close error for a named backend
    pub fn close<S: Into<String>>(backend: S, source: BackendError) -> Self {
        SwitchyardError::Close {
            backend: backend.into(),
            source,
        }
    }

    /// Create a transaction error
    pub fn transaction<S: Into<String>>(message: S) -> Self {
        SwitchyardError::Transaction {
            message: message.into(),
        }
    }

    /// Collapse a list of errors: none, the single error, or an aggregate
    pub fn aggregate(mut errors: Vec<SwitchyardError>) -> Option<Self> {
        match errors.len() {
            0 => None,
            1 => errors.pop(),
            _ => Some(SwitchyardError::Aggregate(errors)),
        }
    }

    /// Check if this error is recoverable (a retry or reconfiguration may fix it)
    pub fn is_recoverable(&self) -> bool {
        match self {
            SwitchyardError::Construction { source, .. } => source.is_transient(),
            SwitchyardError::Backend(source) => source.is_transient(),
            SwitchyardError::Close { .. } => true,
            SwitchyardError::Aggregate(errors) => errors.iter().all(|e| e.is_recoverable()),
            _ => false,
        }
    }

    /// Get error severity level
    pub fn severity(&self) -> ErrorSeverity {
        match self {
            SwitchyardError::Configuration { .. } => ErrorSeverity::Critical,
            SwitchyardError::Config(_) => ErrorSeverity::Critical,
            SwitchyardError::Construction { .. } => ErrorSeverity::Error,
            SwitchyardError::Backend(_) => ErrorSeverity::Warning,
            SwitchyardError::Close { .. } => ErrorSeverity::Warning,
            SwitchyardError::Transaction { .. } => ErrorSeverity::Info,
            SwitchyardError::Aggregate(errors) => errors
                .iter()
                .map(|e| e.severity())
                .min()
                .unwrap_or(ErrorSeverity::Info),
        }
    }
}

impl BackendError {
    /// Create a probe error
    pub fn probe<S: Into<String>>(message: S) -> Self {
        BackendError::Probe {
            message: message.into(),
        }
    }

    /// Create an operation error
    pub fn operation<S: Into<String>>(operation: S, message: S) -> Self {
        BackendError::Operation {
            operation: operation.into(),
            message: message.into(),
        }
    }

    /// Network-level failures that may succeed on a later attempt
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            BackendError::Connect { .. } | BackendError::Timeout { .. }
        )
    }
}

/// Error severity levels for logging and monitoring
///
/// Ordered from most to least severe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ErrorSeverity {
    /// Critical errors that require immediate attention
    Critical,
    /// Errors that affect functionality but don't crash the system
    Error,
    /// Warnings about potential issues
    Warning,
    /// Informational messages about recoverable issues
    Info,
}

impl fmt::Display for ErrorSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorSeverity::Critical => write!(f, "CRITICAL"),
            ErrorSeverity::Error => write!(f, "ERROR"),
            ErrorSeverity::Warning => write!(f, "WARNING"),
            ErrorSeverity::Info => write!(f, "INFO"),
        }
    }
}
