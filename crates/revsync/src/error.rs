//! Error types for revsync.

use revsync_core::CoreError;
use revsync_store::StoreError;
use revsync_sync::SyncError;
use thiserror::Error;

/// Errors that can occur during revision control operations.
#[derive(Debug, Error)]
pub enum RevsyncError {
    /// Record decoding error.
    #[error("codec error: {0}")]
    Core(#[from] CoreError),

    /// Storage error.
    #[error("storage error: {0}")]
    Store(#[from] StoreError),

    /// Sync error.
    #[error("sync error: {0}")]
    Sync(#[from] SyncError),

    /// Invalid operation.
    #[error("invalid operation: {0}")]
    InvalidOperation(String),
}

/// Result type for revsync operations.
pub type Result<T> = std::result::Result<T, RevsyncError>;
