//! Error types for the store module.

use revsync_core::{CoreError, Digest};
use thiserror::Error;

/// Errors that can occur during repository operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Database error from SQLite.
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Record encoding/decoding error.
    #[error("codec error: {0}")]
    Codec(#[from] CoreError),

    /// Patch serialization/deserialization error.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Object not found.
    #[error("object not found: {0}")]
    NotFound(Digest),

    /// Branch reference not found.
    #[error("branch not found: {0}")]
    BranchNotFound(String),

    /// An object's content does not match its digest.
    #[error("corrupt object {digest}: {reason}")]
    Corrupt { digest: Digest, reason: String },

    /// A patch references objects that are neither in it nor local.
    #[error("incomplete patch: {0}")]
    IncompletePatch(String),

    /// Patch was produced by an incompatible format version.
    #[error("unsupported patch version: {0}")]
    UnsupportedPatchVersion(u8),

    /// Merge left conflicts the strategy would not resolve.
    #[error("merge conflict on {} entities: {}", .0.len(), .0.join(", "))]
    MergeConflict(Vec<String>),

    /// Migration error.
    #[error("migration error: {0}")]
    Migration(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;
