//! Test fixtures and helpers.
//!
//! Common setup code for unit and integration tests.

use std::sync::Arc;

use bytes::Bytes;
use revsync_core::{Annotation, Digest, Document};
use revsync_store::{MemoryRepository, Repository, RepositoryExt, Result};

/// Fixed date used by fixture annotations so hashes are reproducible.
pub const FIXTURE_DATE: i64 = 1_700_000_000_000;

/// A document with a single `label` entity.
///
/// Distinct labels give distinct revisions.
pub fn document(label: &str) -> Document {
    let mut document = Document::new();
    document.insert("label", Bytes::from(label.to_string()));
    document
}

/// Annotation with a fixed date.
pub fn annotation(author: &str, message: &str) -> Annotation {
    Annotation::with_date(author, message, FIXTURE_DATE)
}

/// Commit `document(label)` on top of the branch tip (or as a root when the
/// branch does not exist yet) and advance the branch.
pub async fn commit_on<R: Repository + ?Sized>(repo: &R, branch: &str, label: &str) -> Result<Digest> {
    let parents: Vec<Digest> = repo.get_reference(branch).await?.into_iter().collect();
    let hash = repo
        .commit(&document(label), &parents, annotation("fixture", label))
        .await?;
    repo.set_reference(branch, &hash).await?;
    Ok(hash)
}

/// Commit each label in order on `branch`. Returns the commit hashes, oldest
/// first.
pub async fn commit_chain<R: Repository + ?Sized>(
    repo: &R,
    branch: &str,
    labels: &[&str],
) -> Result<Vec<Digest>> {
    let mut out = Vec::with_capacity(labels.len());
    for label in labels {
        out.push(commit_on(repo, branch, label).await?);
    }
    Ok(out)
}

/// A shared in-memory repository.
pub struct TestFixture {
    pub repo: Arc<MemoryRepository>,
}

impl TestFixture {
    pub fn new() -> Self {
        Self {
            repo: Arc::new(MemoryRepository::new()),
        }
    }

    /// A fixture whose `branch` holds a chain of commits.
    pub async fn with_chain(branch: &str, labels: &[&str]) -> Result<(Self, Vec<Digest>)> {
        let fixture = Self::new();
        let commits = commit_chain(fixture.repo.as_ref(), branch, labels).await?;
        Ok((fixture, commits))
    }
}

impl Default for TestFixture {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_commit_chain_links_parents() {
        let (fixture, commits) = TestFixture::with_chain("main", &["root", "c1", "c2"]).await.unwrap();
        let repo = fixture.repo;

        assert_eq!(repo.get_reference("main").await.unwrap(), Some(commits[2]));
        let c2 = repo.get_commit_info(&commits[2]).await.unwrap().unwrap();
        assert_eq!(c2.parents, vec![commits[1]]);
        let root = repo.get_commit_info(&commits[0]).await.unwrap().unwrap();
        assert!(root.is_root());
    }

    #[tokio::test]
    async fn test_fixture_commits_are_reproducible() {
        let a = MemoryRepository::new();
        let b = MemoryRepository::new();
        let ca = commit_chain(&a, "main", &["root", "c1"]).await.unwrap();
        let cb = commit_chain(&b, "main", &["root", "c1"]).await.unwrap();
        assert_eq!(ca, cb);
    }
}
