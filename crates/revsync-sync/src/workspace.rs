//! The client's working state: a repository, the document being edited, and
//! the branch it is checked out on.

use std::sync::Arc;

use revsync_core::{Annotation, Digest, Document};
use revsync_store::{Repository, RepositoryExt};

use crate::error::{Result, SyncError};

/// Local repository plus the working document.
pub struct Workspace<R> {
    repo: Arc<R>,
    document: Document,
    branch: Option<String>,
}

impl<R: Repository> Workspace<R> {
    /// A workspace with no branch checked out. The first pull clones.
    pub fn new(repo: Arc<R>) -> Self {
        Self {
            repo,
            document: Document::new(),
            branch: None,
        }
    }

    /// Open `branch` of an existing repository.
    pub async fn open(repo: Arc<R>, branch: &str) -> Result<Self> {
        let mut workspace = Self::new(repo);
        workspace.switch_branch(branch).await?;
        Ok(workspace)
    }

    pub fn repository(&self) -> &Arc<R> {
        &self.repo
    }

    pub fn document(&self) -> &Document {
        &self.document
    }

    pub fn document_mut(&mut self) -> &mut Document {
        &mut self.document
    }

    /// Name of the checked out branch.
    pub fn branch(&self) -> Option<&str> {
        self.branch.as_deref()
    }

    /// Checked out branch name, or [`SyncError::NoLocalBranch`].
    pub fn require_branch(&self) -> Result<&str> {
        self.branch().ok_or(SyncError::NoLocalBranch)
    }

    /// Tip of the checked out branch.
    pub async fn local_tip(&self) -> Result<Digest> {
        let branch = self.require_branch()?;
        self.repo
            .get_reference(branch)
            .await?
            .ok_or_else(|| SyncError::LocalBranchNotFound(branch.to_string()))
    }

    /// Commit the working document on the checked out branch.
    ///
    /// Purely local. The branch tip is the sole parent and the branch is
    /// advanced to the new commit.
    pub async fn commit(&mut self, annotation: Annotation) -> Result<Digest> {
        let parent = self.local_tip().await?;
        let branch = self.require_branch()?;

        let hash = self.repo.commit(&self.document, &[parent], annotation).await?;
        self.repo.set_reference(branch, &hash).await?;

        tracing::info!(branch, commit = %hash, "committed");
        Ok(hash)
    }

    /// Check out `branch`, replacing the working document.
    pub async fn switch_branch(&mut self, branch: &str) -> Result<()> {
        let tip = self
            .repo
            .get_reference(branch)
            .await?
            .ok_or_else(|| SyncError::LocalBranchNotFound(branch.to_string()))?;
        self.document = self.repo.commit_document(&tip).await?;
        self.branch = Some(branch.to_string());
        Ok(())
    }

    /// Create `name` at the current tip and check it out, keeping the working
    /// document.
    pub async fn create_branch(&mut self, name: &str) -> Result<()> {
        let tip = self.local_tip().await?;
        self.repo.set_reference(name, &tip).await?;
        self.branch = Some(name.to_string());
        Ok(())
    }
}
