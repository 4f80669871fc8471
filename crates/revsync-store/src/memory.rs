//! In-memory implementation of the Repository trait.
//!
//! Used by tests and by servers started without a database path. Same
//! semantics as SQLite, nothing persisted.

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use revsync_core::{CommitInfo, Digest, Document, References};

use crate::error::Result;
use crate::traits::Repository;

/// In-memory repository.
///
/// All data is lost when the repository is dropped. Thread-safe via RwLock.
#[derive(Default)]
pub struct MemoryRepository {
    inner: RwLock<MemoryRepositoryInner>,
}

#[derive(Default)]
struct MemoryRepositoryInner {
    commits: HashMap<Digest, CommitInfo>,
    revisions: HashMap<Digest, Document>,
    refs: References,
}

impl MemoryRepository {
    /// Create a new empty in-memory repository.
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, MemoryRepositoryInner> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, MemoryRepositoryInner> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Number of stored commits.
    pub fn commit_count(&self) -> usize {
        self.read().commits.len()
    }

    /// Number of stored revisions.
    pub fn revision_count(&self) -> usize {
        self.read().revisions.len()
    }
}

#[async_trait]
impl Repository for MemoryRepository {
    async fn get_commit_info(&self, digest: &Digest) -> Result<Option<CommitInfo>> {
        Ok(self.read().commits.get(digest).cloned())
    }

    async fn put_commit(&self, info: &CommitInfo) -> Result<()> {
        self.write()
            .commits
            .entry(info.hash)
            .or_insert_with(|| info.clone());
        Ok(())
    }

    async fn get_revision(&self, digest: &Digest) -> Result<Option<Document>> {
        Ok(self.read().revisions.get(digest).cloned())
    }

    async fn put_revision(&self, digest: &Digest, document: &Document) -> Result<()> {
        self.write()
            .revisions
            .entry(*digest)
            .or_insert_with(|| document.clone());
        Ok(())
    }

    async fn has_revision(&self, digest: &Digest) -> Result<bool> {
        Ok(self.read().revisions.contains_key(digest))
    }

    async fn get_reference(&self, name: &str) -> Result<Option<Digest>> {
        Ok(self.read().refs.get(name).copied())
    }

    async fn set_reference(&self, name: &str, digest: &Digest) -> Result<()> {
        self.write().refs.insert(name.to_string(), *digest);
        Ok(())
    }

    async fn get_references(&self) -> Result<References> {
        Ok(self.read().refs.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StoreError;
    use crate::traits::RepositoryExt;
    use bytes::Bytes;
    use revsync_core::Annotation;

    fn doc(value: &'static str) -> Document {
        [("entity", Bytes::from_static(value.as_bytes()))].into_iter().collect()
    }

    #[tokio::test]
    async fn test_memory_commit_and_checkout() {
        let repo = MemoryRepository::new();
        let root = repo
            .commit(&doc("v1"), &[], Annotation::with_date("a", "init", 1))
            .await
            .unwrap();
        repo.set_reference("master", &root).await.unwrap();

        assert!(repo.has_commit(&root).await.unwrap());
        assert_eq!(repo.checkout("master").await.unwrap(), doc("v1"));
        assert_eq!(repo.get_references().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_memory_commit_requires_parents() {
        let repo = MemoryRepository::new();
        let ghost = Digest::from_bytes([1; 20]);
        let err = repo
            .commit(&doc("v1"), &[ghost], Annotation::with_date("a", "m", 1))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::NotFound(d) if d == ghost));
        assert_eq!(repo.revision_count(), 0);
    }

    #[tokio::test]
    async fn test_memory_idempotent_writes() {
        let repo = MemoryRepository::new();
        let a = repo
            .commit(&doc("v1"), &[], Annotation::with_date("a", "m", 1))
            .await
            .unwrap();
        let b = repo
            .commit(&doc("v1"), &[], Annotation::with_date("a", "m", 1))
            .await
            .unwrap();
        assert_eq!(a, b);
        assert_eq!(repo.commit_count(), 1);
        assert_eq!(repo.revision_count(), 1);
    }

    #[tokio::test]
    async fn test_checkout_unknown_branch() {
        let repo = MemoryRepository::new();
        let err = repo.checkout("nope").await.unwrap_err();
        assert!(matches!(err, StoreError::BranchNotFound(name) if name == "nope"));
    }

    #[tokio::test]
    async fn test_write_commit_info_rejects_tampering() {
        let repo = MemoryRepository::new();
        let revision = doc("v1").revision_digest();
        repo.put_revision(&revision, &doc("v1")).await.unwrap();

        let mut info = CommitInfo::new(revision, vec![], Annotation::with_date("a", "m", 1));
        repo.write_commit_info(&info).await.unwrap();

        info.annotation.author = "mallory".into();
        let err = repo.write_commit_info(&info).await.unwrap_err();
        assert!(matches!(err, StoreError::Corrupt { .. }));
    }
}
