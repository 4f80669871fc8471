//! Commit records.

use bytes::{Bytes, BytesMut};
use serde::{Deserialize, Serialize};

use crate::codec;
use crate::types::Digest;

/// Domain separator for commit digests.
pub const COMMIT_DOMAIN: &[u8] = b"revsync-commit-v0:";

/// Who made a commit, when, and why.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Annotation {
    pub author: String,
    pub message: String,
    /// Unix milliseconds.
    pub date: i64,
    /// Opaque host data carried along with the commit.
    pub user_data: Bytes,
}

impl Annotation {
    /// Create an annotation stamped with the current time.
    pub fn new(author: impl Into<String>, message: impl Into<String>) -> Self {
        Self::with_date(author, message, now_millis())
    }

    /// Create an annotation with an explicit date.
    pub fn with_date(author: impl Into<String>, message: impl Into<String>, date: i64) -> Self {
        Self {
            author: author.into(),
            message: message.into(),
            date,
            user_data: Bytes::new(),
        }
    }

    /// Attach opaque user data.
    pub fn user_data(mut self, data: impl Into<Bytes>) -> Self {
        self.user_data = data.into();
        self
    }
}

/// An immutable commit record.
///
/// `hash` is derived from the other fields; see [`CommitInfo::compute_hash`].
/// A commit with no parents is a root.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitInfo {
    pub hash: Digest,
    /// Digest of the document snapshot this commit records.
    pub revision: Digest,
    pub parents: Vec<Digest>,
    pub annotation: Annotation,
}

impl CommitInfo {
    /// Build a commit record and compute its hash.
    pub fn new(revision: Digest, parents: Vec<Digest>, annotation: Annotation) -> Self {
        let mut info = Self {
            hash: Digest::NULL,
            revision,
            parents,
            annotation,
        };
        info.hash = info.compute_hash();
        info
    }

    /// Hash of the commit body (revision, parents, annotation).
    pub fn compute_hash(&self) -> Digest {
        let mut buf = BytesMut::new();
        codec::encode_commit_body(&mut buf, &self.revision, &self.parents, &self.annotation);
        Digest::hash(COMMIT_DOMAIN, &buf)
    }

    /// Whether the stored hash matches the body.
    pub fn verify_hash(&self) -> bool {
        self.hash == self.compute_hash()
    }

    pub fn is_root(&self) -> bool {
        self.parents.is_empty()
    }
}

/// Get current time in milliseconds.
fn now_millis() -> i64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::DIGEST_LEN;

    #[test]
    fn test_commit_hash_covers_annotation() {
        let revision = Digest::from_bytes([7; DIGEST_LEN]);
        let a = CommitInfo::new(revision, vec![], Annotation::with_date("a", "m", 1));
        let b = CommitInfo::new(revision, vec![], Annotation::with_date("a", "m", 2));
        assert_ne!(a.hash, b.hash);
        assert!(a.verify_hash());
    }

    #[test]
    fn test_commit_hash_covers_parent_order() {
        let revision = Digest::from_bytes([7; DIGEST_LEN]);
        let p1 = Digest::from_bytes([1; DIGEST_LEN]);
        let p2 = Digest::from_bytes([2; DIGEST_LEN]);
        let annotation = Annotation::with_date("a", "merge", 1);
        let a = CommitInfo::new(revision, vec![p1, p2], annotation.clone());
        let b = CommitInfo::new(revision, vec![p2, p1], annotation);
        assert_ne!(a.hash, b.hash);
    }

    #[test]
    fn test_tampered_commit_fails_verification() {
        let mut info = CommitInfo::new(
            Digest::from_bytes([7; DIGEST_LEN]),
            vec![],
            Annotation::with_date("a", "m", 1),
        );
        info.annotation.message = "edited".into();
        assert!(!info.verify_hash());
        assert!(info.is_root());
    }
}
