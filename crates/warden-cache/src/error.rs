//! Error types for the cache layer.

use thiserror::Error;

/// A result type using `CacheError`.
pub type Result<T> = std::result::Result<T, CacheError>;

/// Errors that can occur talking to the cache store.
#[derive(Debug, Error)]
pub enum CacheError {
    /// The backend could not be reached.
    #[error("cache connection failed: {0}")]
    Connection(String),

    /// The backend rejected a command.
    #[error("cache command failed: {0}")]
    Command(String),

    /// A projection could not be encoded or decoded.
    #[error("cache serialization error: {0}")]
    Serialization(String),

    /// The command did not complete within the configured timeout.
    #[error("cache command timed out after {0:?}")]
    Timeout(std::time::Duration),
}

impl From<serde_json::Error> for CacheError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}
