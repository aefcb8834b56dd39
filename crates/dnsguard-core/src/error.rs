//! Error types for the DNS guard
//!
//! This module defines all error types used throughout the crate.

use thiserror::Error;

/// Result type alias for DNS guard operations
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for the DNS guard
#[derive(Error, Debug)]
pub enum Error {
    /// The change source could not be queried during collection
    #[error("Interface enumeration failed: {0}")]
    Enumeration(String),

    /// Arming the change subscription failed
    #[error("Change subscription failed: {0}")]
    Subscription(String),

    /// A reported configuration record could not be turned into a snapshot
    #[error("Malformed configuration record: {0}")]
    SnapshotBuild(String),

    /// The live configuration handle for an interface no longer exists
    #[error("Interface not found: {0}")]
    InterfaceNotFound(String),

    /// A backend rejected or failed an operation
    #[error("Backend error ({backend}): {message}")]
    Backend {
        /// Backend name
        backend: String,
        /// Error message
        message: String,
    },

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Operation not allowed in the engine's current state
    #[error("Invalid engine state: {0}")]
    InvalidState(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Generic error with context
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Create an enumeration error
    pub fn enumeration(msg: impl Into<String>) -> Self {
        Self::Enumeration(msg.into())
    }

    /// Create a subscription error
    pub fn subscription(msg: impl Into<String>) -> Self {
        Self::Subscription(msg.into())
    }

    /// Create a snapshot build error
    pub fn snapshot_build(msg: impl Into<String>) -> Self {
        Self::SnapshotBuild(msg.into())
    }

    /// Create an "interface not found" error
    pub fn interface_not_found(msg: impl Into<String>) -> Self {
        Self::InterfaceNotFound(msg.into())
    }

    /// Create a backend-specific error
    pub fn backend(backend: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Backend {
            backend: backend.into(),
            message: message.into(),
        }
    }

    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create an invalid state error
    pub fn invalid_state(msg: impl Into<String>) -> Self {
        Self::InvalidState(msg.into())
    }

    /// Whether this error prevents the engine from reaching a consistent
    /// monitoring state
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Enumeration(_) | Self::Subscription(_))
    }
}

/// Helper for converting anyhow::Error to our Error type
impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Self::Other(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fatal_classification() {
        assert!(Error::enumeration("query failed").is_fatal());
        assert!(Error::subscription("netlink bind").is_fatal());
        assert!(!Error::interface_not_found("eth0").is_fatal());
        assert!(!Error::backend("resolved", "rejected").is_fatal());
    }

    #[test]
    fn test_backend_display() {
        let err = Error::backend("resolved", "exit status 1");
        assert_eq!(err.to_string(), "Backend error (resolved): exit status 1");
    }
}
