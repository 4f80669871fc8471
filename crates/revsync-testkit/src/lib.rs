//! # revsync testkit
//!
//! Testing utilities for revsync.
//!
//! ## Overview
//!
//! This crate provides:
//!
//! - **Fixtures**: Documents, annotations with fixed dates, and linear commit
//!   chains on a branch
//! - **Generators**: Proptest strategies for documents and commit DAG shapes
//!
//! ## Property Testing
//!
//! ```rust,ignore
//! use proptest::prelude::*;
//! use revsync_testkit::generators::{build_dag, dag_shape};
//!
//! proptest! {
//!     #[test]
//!     fn walk_visits_every_commit(shape in dag_shape(20)) {
//!         // let heads = block_on(build_dag(&repo, &shape));
//!     }
//! }
//! ```
//!
//! ## Test Fixtures
//!
//! ```rust,ignore
//! use revsync_testkit::fixtures::{commit_chain, document};
//!
//! let repo = MemoryRepository::new();
//! let commits = commit_chain(&repo, "main", &["root", "c1", "c2"]).await?;
//! ```

pub mod fixtures;
pub mod generators;

pub use fixtures::{annotation, commit_chain, commit_on, document, TestFixture};
pub use generators::{build_dag, dag_shape, DagShape};
