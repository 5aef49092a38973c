//! Common error types for flora

use thiserror::Error;

/// Common result type for flora operations
pub type Result<T> = std::result::Result<T, Error>;

/// Common error types across flora crates
#[derive(Error, Debug)]
pub enum Error {
    /// Database operation error (wraps sqlx::Error)
    #[cfg(feature = "sqlx")]
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// I/O operation error (wraps std::io::Error)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON encode/decode error for persisted payloads
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Configuration loading or validation error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Storage refused a write because its size limit was reached
    #[error("Storage quota exceeded: {0}")]
    QuotaExceeded(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}
