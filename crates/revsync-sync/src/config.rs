//! Sync configuration.

use std::time::Duration;

use crate::wire::limits;

/// Compiled-in server endpoint.
pub const DEFAULT_SERVER_ADDRESS: &str = "127.0.0.1:4040";

/// Configuration for sync behavior.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Address a TCP client connects to. See [`TcpConnector::from_config`].
    ///
    /// [`TcpConnector::from_config`]: crate::tcp::TcpConnector::from_config
    pub server_address: String,
    /// Timeout for every send and every awaited reply. `None` blocks forever.
    pub message_timeout: Option<Duration>,
    /// How long the server waits for the next command on an open connection
    /// before dropping it. `None` waits forever.
    pub idle_timeout: Option<Duration>,
    /// Big-buffer chunk size in bytes.
    pub chunk_size: usize,
    /// Largest big buffer a peer may announce.
    pub max_buffer_len: u64,
    /// Author recorded on merge commits created by pull.
    pub merge_author: String,
    /// Branch checked out after a clone when the server has it.
    pub default_branch: String,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            server_address: DEFAULT_SERVER_ADDRESS.to_string(),
            message_timeout: Some(Duration::from_secs(30)),
            idle_timeout: Some(Duration::from_secs(30)),
            chunk_size: limits::DEFAULT_CHUNK_SIZE,
            max_buffer_len: limits::DEFAULT_MAX_BUFFER_LEN,
            merge_author: "client".to_string(),
            default_branch: "master".to_string(),
        }
    }
}
