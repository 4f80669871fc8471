//! # revsync
//!
//! Git-like revision control for documents, synchronized with a server over
//! a request/reply protocol.
//!
//! ## Overview
//!
//! - **Commit**: record the working document on the local branch
//! - **Push**: send local commits to the server, fast-forward only
//! - **Pull**: fetch server commits, fast-forwarding or merging; the first
//!   pull clones
//! - **Stop**: shut the server down
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use revsync::{ControlConfig, RevisionControl, Verb};
//! use revsync::store::SqliteRepository;
//! use revsync::sync::tcp::TcpConnector;
//!
//! async fn example() -> revsync::Result<()> {
//!     let config = ControlConfig::default();
//!     let repo = Arc::new(SqliteRepository::open("drawing.db")?);
//!     let connector = TcpConnector::new(config.sync.server_address.clone());
//!     let mut rc = RevisionControl::new(repo, connector, config);
//!
//!     let status = rc.execute(Verb::Pull).await;
//!     println!("{}", status);
//!     Ok(())
//! }
//! ```
//!
//! ## Re-exports
//!
//! - `revsync::core` - Digests, commits and documents
//! - `revsync::store` - Repository backends, patches and merging
//! - `revsync::sync` - Transport, client and server

pub mod control;
pub mod error;

pub use revsync_core as core;
pub use revsync_store as store;
pub use revsync_sync as sync;

pub use control::{ControlConfig, RevisionControl, Status, Verb};
pub use error::{Result, RevsyncError};

pub use revsync_core::{Annotation, CommitInfo, Digest, Document, References};
pub use revsync_sync::{PullOutcome, PushOutcome};
