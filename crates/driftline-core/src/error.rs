//! Error types for driftline-core

use thiserror::Error;

/// Result type alias using driftline-core's Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in driftline-core operations
#[derive(Error, Debug)]
pub enum Error {
    /// Local store error
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// HTTP transport error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Remote sync API returned a non-success response
    #[error("Sync API error: {message} ({status})")]
    Api { status: u16, message: String },

    /// A component was used before `initialize()`
    #[error("{0} is not initialized")]
    NotInitialized(&'static str),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Record not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Sync state transition rejected
    #[error("Invalid sync state transition: {0}")]
    InvalidTransition(String),

    /// A retry chain was cancelled before completion
    #[error("Operation cancelled: {0}")]
    Cancelled(String),
}

impl Error {
    /// Whether this error is transient and worth retrying with backoff.
    ///
    /// Transient: network-level failures (connect, timeout), request
    /// throttling (408/429) and server errors (5xx). Everything else,
    /// notably auth failures and malformed payloads, is permanent.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Http(error) => {
                error.is_timeout() || error.is_connect() || error.is_request()
            }
            Self::Api { status, .. } => {
                matches!(status, 408 | 429) || (500..=599).contains(status)
            }
            _ => false,
        }
    }
}
