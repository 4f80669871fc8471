//! # revsync sync
//!
//! Push, pull and clone between a client workspace and a revsync server.
//!
//! ## Overview
//!
//! Commands are synchronous request/reply exchanges over one connection.
//! Each side validates the tag order it receives; anything unexpected is a
//! [`SyncError::Protocol`] and aborts the command.
//!
//! ## Key Properties
//!
//! - **Fast-forward only pushes**: the server never loses commits to a push
//! - **Minimal patches**: merge-base negotiation finds what the peer already has
//! - **Idempotent pulls**: pulling an up to date branch changes nothing
//! - **Single writer**: the server serves one request at a time
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use revsync_store::MemoryRepository;
//! use revsync_sync::{tcp::TcpConnector, SyncClient, SyncConfig, Workspace};
//!
//! async fn example() -> revsync_sync::Result<()> {
//!     let config = SyncConfig::default();
//!     let client = SyncClient::new(TcpConnector::new(config.server_address.clone()), config);
//!
//!     let mut workspace = Workspace::new(Arc::new(MemoryRepository::new()));
//!     client.pull(&mut workspace).await?; // first pull clones
//!     client.push(&workspace).await?;
//!     Ok(())
//! }
//! ```

pub mod client;
pub mod config;
pub mod connection;
pub mod error;
pub mod negotiate;
pub mod server;
pub mod transport;
pub mod wire;
pub mod workspace;

pub use client::{PullOutcome, PushOutcome, SyncClient};
pub use config::{SyncConfig, DEFAULT_SERVER_ADDRESS};
pub use connection::Connection;
pub use error::{Result, SyncError};
pub use negotiate::{answer_probes, negotiate_from_set};
pub use server::{RepositoryHandler, RequestHandler, Served, Server};
pub use transport::{memory, tcp, Connector, FramedTransport, Listener, Transport};
pub use wire::{limits, Command, Tag};
pub use workspace::Workspace;
