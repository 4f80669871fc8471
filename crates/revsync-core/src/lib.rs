//! # revsync core
//!
//! Pure primitives for revsync: digests, commit records, document snapshots,
//! and the binary codec shared by hashing and the clone side-buffer.
//!
//! This crate contains no I/O, no storage, no networking.
//!
//! ## Key Types
//!
//! - [`Digest`] - 20-byte content address of a commit or a revision
//! - [`CommitInfo`] - Immutable commit record with parent links
//! - [`Annotation`] - Author, message, date and opaque user data of a commit
//! - [`Document`] - Snapshot of the host document that gets committed
//! - [`References`] - Branch name to tip digest mapping

pub mod codec;
pub mod commit;
pub mod document;
pub mod error;
pub mod types;

pub use commit::{Annotation, CommitInfo, COMMIT_DOMAIN};
pub use document::{Document, REVISION_DOMAIN};
pub use error::{CoreError, Result};
pub use types::{Digest, References, DIGEST_LEN};
