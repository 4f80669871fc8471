//! Commit graph walks.
//!
//! All walks use an explicit worklist and a visited set, so shared ancestry
//! (merge commits) is visited once and deep histories do not recurse.

use std::collections::{BTreeSet, HashSet, VecDeque};

use revsync_core::{CommitInfo, Digest};

use crate::error::{Result, StoreError};
use crate::traits::Repository;

async fn require_commit<R: Repository + ?Sized>(repo: &R, digest: &Digest) -> Result<CommitInfo> {
    repo.get_commit_info(digest)
        .await?
        .ok_or(StoreError::NotFound(*digest))
}

/// Every commit reachable from `frontier`, stopping at commits in `base`.
///
/// Commits in `base` are neither included nor expanded. Null digests are
/// skipped. A commit missing from the repository is an error.
pub async fn collect_commits<R: Repository + ?Sized>(
    repo: &R,
    base: &BTreeSet<Digest>,
    frontier: &[Digest],
) -> Result<BTreeSet<Digest>> {
    let mut found = BTreeSet::new();
    let mut stack: Vec<Digest> = frontier.to_vec();

    while let Some(digest) = stack.pop() {
        if digest.is_null() || base.contains(&digest) || found.contains(&digest) {
            continue;
        }
        let info = require_commit(repo, &digest).await?;
        found.insert(digest);
        stack.extend(info.parents.iter().copied());
    }

    Ok(found)
}

/// Revisions recorded by every commit reachable from `frontier`, stopping at
/// commits in `base`.
pub async fn collect_revisions<R: Repository + ?Sized>(
    repo: &R,
    base: &BTreeSet<Digest>,
    frontier: &[Digest],
) -> Result<BTreeSet<Digest>> {
    let mut revisions = BTreeSet::new();
    let mut visited = HashSet::new();
    let mut stack: Vec<Digest> = frontier.to_vec();

    while let Some(digest) = stack.pop() {
        if digest.is_null() || base.contains(&digest) || !visited.insert(digest) {
            continue;
        }
        let info = require_commit(repo, &digest).await?;
        revisions.insert(info.revision);
        stack.extend(info.parents.iter().copied());
    }

    Ok(revisions)
}

/// Whether `ancestor` is reachable from `descendant` (a commit is its own
/// ancestor). Null is an ancestor of nothing.
///
/// Returns false rather than failing when `descendant`'s history is not
/// fully materialized.
pub async fn is_ancestor<R: Repository + ?Sized>(
    repo: &R,
    ancestor: &Digest,
    descendant: &Digest,
) -> Result<bool> {
    if ancestor.is_null() || descendant.is_null() {
        return Ok(false);
    }

    let mut visited = HashSet::new();
    let mut stack = vec![*descendant];

    while let Some(digest) = stack.pop() {
        if digest == *ancestor {
            return Ok(true);
        }
        if !visited.insert(digest) {
            continue;
        }
        if let Some(info) = repo.get_commit_info(&digest).await? {
            stack.extend(info.parents.iter().copied());
        }
    }

    Ok(false)
}

/// Nearest common ancestor of two commits, if they share history.
///
/// Ancestors of `a` are marked first; the breadth-first walk from `b` then
/// stops at the first marked commit.
pub async fn merge_base<R: Repository + ?Sized>(
    repo: &R,
    a: &Digest,
    b: &Digest,
) -> Result<Option<Digest>> {
    if a.is_null() || b.is_null() {
        return Ok(None);
    }

    let mut ancestors_of_a = HashSet::new();
    let mut queue = VecDeque::from([*a]);
    while let Some(digest) = queue.pop_front() {
        if !ancestors_of_a.insert(digest) {
            continue;
        }
        let info = require_commit(repo, &digest).await?;
        queue.extend(info.parents.iter().copied());
    }

    let mut visited = HashSet::new();
    let mut queue = VecDeque::from([*b]);
    while let Some(digest) = queue.pop_front() {
        if ancestors_of_a.contains(&digest) {
            return Ok(Some(digest));
        }
        if !visited.insert(digest) {
            continue;
        }
        let info = require_commit(repo, &digest).await?;
        queue.extend(info.parents.iter().copied());
    }

    Ok(None)
}

/// History from `head`, newest first, following every parent.
pub async fn history<R: Repository + ?Sized>(repo: &R, head: &Digest) -> Result<Vec<CommitInfo>> {
    let mut out = Vec::new();
    let mut visited = HashSet::new();
    let mut queue = VecDeque::new();
    if !head.is_null() {
        queue.push_back(*head);
    }

    while let Some(digest) = queue.pop_front() {
        if !visited.insert(digest) {
            continue;
        }
        let info = require_commit(repo, &digest).await?;
        queue.extend(info.parents.iter().copied());
        out.push(info);
    }

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryRepository;
    use crate::traits::RepositoryExt;
    use bytes::Bytes;
    use revsync_core::{Annotation, Document};

    async fn commit(repo: &MemoryRepository, value: &str, parents: &[Digest]) -> Digest {
        let document: Document = [("e", Bytes::from(value.to_string()))].into_iter().collect();
        repo.commit(&document, parents, Annotation::with_date("t", value, 0))
            .await
            .unwrap()
    }

    /// root - a - b (mine)
    ///          \
    ///           c (theirs)
    async fn fork(repo: &MemoryRepository) -> (Digest, Digest, Digest, Digest) {
        let root = commit(repo, "root", &[]).await;
        let a = commit(repo, "a", &[root]).await;
        let b = commit(repo, "b", &[a]).await;
        let c = commit(repo, "c", &[a]).await;
        (root, a, b, c)
    }

    #[tokio::test]
    async fn test_collect_commits_stops_at_base() {
        let repo = MemoryRepository::new();
        let (root, a, b, c) = fork(&repo).await;

        let all = collect_commits(&repo, &BTreeSet::new(), &[b, c]).await.unwrap();
        assert_eq!(all, BTreeSet::from([root, a, b, c]));

        let only_new = collect_commits(&repo, &BTreeSet::from([a]), &[b]).await.unwrap();
        assert_eq!(only_new, BTreeSet::from([b]));
    }

    #[tokio::test]
    async fn test_collect_revisions_visits_shared_history_once() {
        let repo = MemoryRepository::new();
        let (_, _, b, c) = fork(&repo).await;
        let merge = commit(&repo, "m", &[b, c]).await;

        let revisions = collect_revisions(&repo, &BTreeSet::new(), &[merge]).await.unwrap();
        assert_eq!(revisions.len(), 5);
    }

    #[tokio::test]
    async fn test_collect_missing_commit_is_error() {
        let repo = MemoryRepository::new();
        let ghost = Digest::from_bytes([9; 20]);
        let err = collect_commits(&repo, &BTreeSet::new(), &[ghost]).await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound(d) if d == ghost));
    }

    #[tokio::test]
    async fn test_is_ancestor() {
        let repo = MemoryRepository::new();
        let (root, a, b, c) = fork(&repo).await;

        assert!(is_ancestor(&repo, &root, &b).await.unwrap());
        assert!(is_ancestor(&repo, &b, &b).await.unwrap());
        assert!(!is_ancestor(&repo, &b, &c).await.unwrap());
        assert!(!is_ancestor(&repo, &b, &a).await.unwrap());
        assert!(!is_ancestor(&repo, &Digest::NULL, &b).await.unwrap());
    }

    #[tokio::test]
    async fn test_merge_base_of_fork() {
        let repo = MemoryRepository::new();
        let (_, a, b, c) = fork(&repo).await;
        assert_eq!(merge_base(&repo, &b, &c).await.unwrap(), Some(a));
        assert_eq!(merge_base(&repo, &b, &a).await.unwrap(), Some(a));
    }

    #[tokio::test]
    async fn test_merge_base_of_unrelated_roots() {
        let repo = MemoryRepository::new();
        let x = commit(&repo, "x", &[]).await;
        let y = commit(&repo, "y", &[]).await;
        assert_eq!(merge_base(&repo, &x, &y).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_history_newest_first() {
        let repo = MemoryRepository::new();
        let (root, a, b, _) = fork(&repo).await;
        let log: Vec<Digest> = history(&repo, &b).await.unwrap().iter().map(|c| c.hash).collect();
        assert_eq!(log, vec![b, a, root]);
        assert!(history(&repo, &Digest::NULL).await.unwrap().is_empty());
    }
}
