//! Error types for the sync module.

use revsync_core::CoreError;
use revsync_store::StoreError;
use thiserror::Error;

/// Errors that can occur during sync operations.
#[derive(Debug, Error)]
pub enum SyncError {
    /// Could not connect to or bind the server address.
    #[error("connection error: {0}")]
    Connection(String),

    /// Transport-level error on an open connection.
    #[error("transport error: {0}")]
    Transport(String),

    /// Peer sent something the protocol does not allow here.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Timeout waiting for peer.
    #[error("timeout: {0}")]
    Timeout(String),

    /// Peer closed the connection mid-exchange.
    #[error("connection closed by peer")]
    Closed,

    /// Peer reported a failure.
    #[error("remote error: {0}")]
    Remote(String),

    /// The server has no such branch.
    #[error("remote branch not found: {0}")]
    RemoteBranchNotFound(String),

    /// The workspace has no branch checked out.
    #[error("no local branch checked out")]
    NoLocalBranch,

    /// The checked out branch has no reference.
    #[error("local branch not found: {0}")]
    LocalBranchNotFound(String),

    /// Repository operation failed.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// Record decoding failed.
    #[error("codec error: {0}")]
    Core(#[from] CoreError),
}

impl From<std::io::Error> for SyncError {
    fn from(e: std::io::Error) -> Self {
        match e.kind() {
            std::io::ErrorKind::UnexpectedEof => SyncError::Closed,
            _ => SyncError::Transport(e.to_string()),
        }
    }
}

/// Result type for sync operations.
pub type Result<T> = std::result::Result<T, SyncError>;
