//! Error types for the synchronizer.

use std::time::Duration;

use thiserror::Error;
use warden_core::ProjectId;
use warden_store::StoreError;

/// A result type using `SyncError`.
pub type Result<T> = std::result::Result<T, SyncError>;

/// Errors that can occur while synchronizing.
#[derive(Debug, Error)]
pub enum SyncError {
    /// The role store query failed.
    #[error("role store query failed: {0}")]
    Store(#[from] StoreError),

    /// The role store query did not complete in time.
    #[error("role store query timed out after {0:?}")]
    StoreTimeout(Duration),

    /// The blocking query task panicked or was cancelled.
    #[error("role store task failed: {0}")]
    Task(String),

    /// Some project projections could not be written.
    #[error("failed to write {} project projection(s)", failed.len())]
    PartialWrite {
        /// Projects whose cache write failed.
        failed: Vec<ProjectId>,
    },

    /// An incremental poll was attempted before the initial sync succeeded.
    #[error("initial sync has not completed")]
    NotInitialized,
}
