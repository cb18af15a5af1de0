//! Error types for the WAN manager
//!
//! This module defines all error types used throughout the crate.

use thiserror::Error;

/// Result type alias for WAN manager operations
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for the WAN manager
#[derive(Error, Debug)]
pub enum Error {
    /// Shared store errors (lock timeout, unknown index)
    #[error("Store error: {0}")]
    Store(String),

    /// IPC bridge errors (decode failure, payload dropped, push failure)
    #[error("IPC error: {0}")]
    Ipc(String),

    /// System network configuration errors (address, route, resolver)
    #[error("System error: {0}")]
    System(String),

    /// Helper process errors (DHCP client, PPP, health check)
    #[error("Process error: {0}")]
    Process(String),

    /// Status store errors
    #[error("Status store error: {0}")]
    StatusStore(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Network-related I/O errors
    #[error("Network error: {0}")]
    Network(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Record or key not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Generic error with context
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Create a store error
    pub fn store(msg: impl Into<String>) -> Self {
        Self::Store(msg.into())
    }

    /// Create an IPC error
    pub fn ipc(msg: impl Into<String>) -> Self {
        Self::Ipc(msg.into())
    }

    /// Create a system configuration error
    pub fn system(msg: impl Into<String>) -> Self {
        Self::System(msg.into())
    }

    /// Create a helper process error
    pub fn process(msg: impl Into<String>) -> Self {
        Self::Process(msg.into())
    }

    /// Create a status store error
    pub fn status_store(msg: impl Into<String>) -> Self {
        Self::StatusStore(msg.into())
    }

    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a "not found" error
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    /// Create an invalid input error
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }
}

/// Helper for converting anyhow::Error to our Error type
impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Self::Other(err.to_string())
    }
}
