//! Repository trait: the abstract interface to the content-addressed object
//! store behind revsync.
//!
//! Backends implement the small set of raw operations in [`Repository`].
//! Everything built on top (committing, checking out, patch exchange) lives in
//! [`RepositoryExt`] so every backend shares one implementation.

use async_trait::async_trait;
use bytes::Bytes;
use revsync_core::{Annotation, CommitInfo, Digest, Document, References};

use crate::error::{Result, StoreError};
use crate::patch::{self, AppliedPatch};

/// The Repository trait: async interface for object and reference storage.
///
/// All methods take `&self`; implementations use interior locking.
///
/// # Design Notes
///
/// - **Content addressed**: revisions are keyed by [`Document::revision_digest`],
///   commits by [`CommitInfo::hash`]. Writing an existing object is a no-op.
/// - **Unknown is not an error**: lookups of missing objects return `None`.
///   A commit seen during negotiation but not yet transferred is simply absent.
/// - **Raw writes**: `put_revision` and `put_commit` do not validate. Use
///   [`RepositoryExt`] for validated writes.
#[async_trait]
pub trait Repository: Send + Sync {
    // ─────────────────────────────────────────────────────────────────────────
    // Object Operations
    // ─────────────────────────────────────────────────────────────────────────

    /// Get a commit record by hash.
    async fn get_commit_info(&self, digest: &Digest) -> Result<Option<CommitInfo>>;

    /// Store a commit record as-is.
    async fn put_commit(&self, info: &CommitInfo) -> Result<()>;

    /// Get a document snapshot by revision digest.
    async fn get_revision(&self, digest: &Digest) -> Result<Option<Document>>;

    /// Store a document snapshot under the given revision digest.
    async fn put_revision(&self, digest: &Digest, document: &Document) -> Result<()>;

    /// Check if a revision exists.
    async fn has_revision(&self, digest: &Digest) -> Result<bool>;

    // ─────────────────────────────────────────────────────────────────────────
    // Reference Operations
    // ─────────────────────────────────────────────────────────────────────────

    /// Get the tip of a branch.
    async fn get_reference(&self, name: &str) -> Result<Option<Digest>>;

    /// Point a branch at a commit.
    async fn set_reference(&self, name: &str, digest: &Digest) -> Result<()>;

    /// Get every branch and its tip.
    async fn get_references(&self) -> Result<References>;
}

/// Extension trait with the validated, higher level repository operations.
#[async_trait]
pub trait RepositoryExt: Repository {
    /// Whether the commit is fully materialized locally.
    async fn has_commit(&self, digest: &Digest) -> Result<bool> {
        if digest.is_null() {
            return Ok(false);
        }
        Ok(self.get_commit_info(digest).await?.is_some())
    }

    /// Snapshot `document` and record a commit on top of `parents`.
    ///
    /// Every parent must already exist. Returns the new commit hash; the
    /// caller decides which reference (if any) to advance.
    async fn commit(
        &self,
        document: &Document,
        parents: &[Digest],
        annotation: Annotation,
    ) -> Result<Digest> {
        for parent in parents {
            if !self.has_commit(parent).await? {
                return Err(StoreError::NotFound(*parent));
            }
        }

        let revision = document.revision_digest();
        self.put_revision(&revision, document).await?;

        let info = CommitInfo::new(revision, parents.to_vec(), annotation);
        self.put_commit(&info).await?;

        tracing::debug!(commit = %info.hash, revision = %revision, parents = parents.len(), "committed");
        Ok(info.hash)
    }

    /// Store a commit record received from elsewhere.
    ///
    /// The hash must match the body and the revision must already be present.
    /// Parents are not checked, so records may arrive in any order.
    async fn write_commit_info(&self, info: &CommitInfo) -> Result<()> {
        if !info.verify_hash() {
            return Err(StoreError::Corrupt {
                digest: info.hash,
                reason: "commit hash does not match its body".into(),
            });
        }
        if !self.has_revision(&info.revision).await? {
            return Err(StoreError::NotFound(info.revision));
        }
        self.put_commit(info).await
    }

    /// Document snapshot recorded by a commit.
    async fn commit_document(&self, commit: &Digest) -> Result<Document> {
        let info = self
            .get_commit_info(commit)
            .await?
            .ok_or(StoreError::NotFound(*commit))?;
        self.get_revision(&info.revision)
            .await?
            .ok_or(StoreError::NotFound(info.revision))
    }

    /// Document snapshot at the tip of a branch.
    async fn checkout(&self, branch: &str) -> Result<Document> {
        let tip = self
            .get_reference(branch)
            .await?
            .ok_or_else(|| StoreError::BranchNotFound(branch.to_string()))?;
        self.commit_document(&tip).await
    }

    /// Serialize every object reachable from `to` but not from `from`.
    ///
    /// `to` may name commits (the patch then carries commits and their
    /// revisions) or revisions (the patch carries revisions only).
    async fn make_patch(&self, from: &[Digest], to: &[Digest], refs: &References) -> Result<Bytes> {
        patch::make_patch(self, from, to, refs).await
    }

    /// Verify and store the objects of a patch.
    ///
    /// Returns the patch roots and references; references are not applied.
    async fn apply_patch(&self, patch: &[u8]) -> Result<AppliedPatch> {
        patch::apply_patch(self, patch).await
    }
}

impl<R: Repository + ?Sized> RepositoryExt for R {}
