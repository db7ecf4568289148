//! Error types for the storage layer.

use thiserror::Error;

/// A result type using `StoreError`.
pub type Result<T> = std::result::Result<T, StoreError>;

/// Errors that can occur during storage operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The requested record was not found (or is soft-deleted).
    #[error("record not found")]
    NotFound,

    /// The write would violate a uniqueness constraint.
    #[error("conflict: {0}")]
    Conflict(String),

    /// A database error occurred.
    #[error("database error: {0}")]
    Database(String),

    /// Serialization or deserialization of a single record failed.
    #[error("serialization error: {0}")]
    Serialization(String),
}
