//! Error types for allowsync
//!
//! This module defines all error types used throughout the crate, and the
//! classification the engine uses to decide between retrying on the next
//! tick and giving up.

use thiserror::Error;

/// Result type alias for allowsync operations
pub type Result<T> = std::result::Result<T, Error>;

/// How the engine treats an error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Expected to clear up on its own; retried on the next tick
    Transient,
    /// The remote side refused the request (resource missing, access revoked).
    /// Retried like a transient error, but counted toward
    /// `max_consecutive_rejections` when that is configured.
    Rejected,
    /// No cycle can ever succeed; the process should exit
    Fatal,
}

/// Core error type for allowsync
#[derive(Error, Debug)]
pub enum Error {
    /// Public address lookup failed
    #[error("Address probe error: {0}")]
    AddressProbe(String),

    /// State store-related errors
    #[error("State store error: {0}")]
    StateStore(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Remote allow-list API failure (transport, 5xx, rate limit)
    #[error("Remote API error ({provider}): {message}")]
    RemoteApi {
        /// Provider name
        provider: String,
        /// Error message
        message: String,
    },

    /// Target resource does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// Credentials rejected or permission revoked
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    /// Remote resource is busy or was modified concurrently
    #[error("Conflict: {0}")]
    Conflict(String),

    /// A remote call did not finish in time
    #[error("Timed out: {0}")]
    Timeout(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Local I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic error with context
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Create an address probe error
    pub fn address_probe(msg: impl Into<String>) -> Self {
        Self::AddressProbe(msg.into())
    }

    /// Create a state store error
    pub fn state_store(msg: impl Into<String>) -> Self {
        Self::StateStore(msg.into())
    }

    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a remote API error
    pub fn remote_api(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::RemoteApi {
            provider: provider.into(),
            message: message.into(),
        }
    }

    /// Create a "not found" error
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    /// Create a permission error
    pub fn permission_denied(msg: impl Into<String>) -> Self {
        Self::PermissionDenied(msg.into())
    }

    /// Create a conflict error
    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    /// Create a timeout error
    pub fn timeout(msg: impl Into<String>) -> Self {
        Self::Timeout(msg.into())
    }

    /// Create an invalid input error
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    /// Classify this error for the engine's retry policy
    pub fn class(&self) -> ErrorClass {
        match self {
            Error::NotFound(_) | Error::PermissionDenied(_) => ErrorClass::Rejected,
            Error::Config(_) => ErrorClass::Fatal,
            Error::AddressProbe(_)
            | Error::StateStore(_)
            | Error::RemoteApi { .. }
            | Error::Conflict(_)
            | Error::Timeout(_)
            | Error::InvalidInput(_)
            | Error::Io(_)
            | Error::Other(_) => ErrorClass::Transient,
        }
    }
}
