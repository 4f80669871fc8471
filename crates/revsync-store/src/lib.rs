//! # revsync store
//!
//! Repository abstraction for revsync. Provides a trait-based interface for
//! commit, revision and reference storage with SQLite and in-memory
//! implementations, plus the operations built on top of it: patches, commit
//! graph walks and three-way merging.
//!
//! ## Key Types
//!
//! - [`Repository`] - The async trait backends implement
//! - [`RepositoryExt`] - Validated commit/checkout/patch operations
//! - [`SqliteRepository`] - SQLite-based persistent storage
//! - [`MemoryRepository`] - In-memory storage
//! - [`MergeStrategy`] - Pluggable conflict resolution
//!
//! ## Usage
//!
//! ```rust,no_run
//! use revsync_core::{Annotation, Document};
//! use revsync_store::{Repository, RepositoryExt, SqliteRepository};
//!
//! async fn example() -> revsync_store::Result<()> {
//!     let repo = SqliteRepository::open("drawing.db")?;
//!
//!     let document = Document::new();
//!     let root = repo.commit(&document, &[], Annotation::new("alice", "init")).await?;
//!     repo.set_reference("master", &root).await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Design Notes
//!
//! - **Idempotent writes**: storing an existing commit or revision is a no-op
//! - **All or nothing patches**: a patch is fully verified before any write
//! - **References are separate**: applying a patch never moves a branch

pub mod error;
pub mod graph;
pub mod memory;
pub mod merge;
pub mod migration;
pub mod patch;
pub mod sqlite;
pub mod traits;

pub use error::{Result, StoreError};
pub use memory::MemoryRepository;
pub use merge::{Conflict, FailOnConflict, MergeStrategy, MineFull, Resolution, TheirsFull};
pub use patch::{AppliedPatch, PATCH_VERSION};
pub use sqlite::SqliteRepository;
pub use traits::{Repository, RepositoryExt};
