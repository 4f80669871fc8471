//! Three-way document merging.
//!
//! Entities are merged key by key against the common ancestor. A key changed
//! on one side only takes that side's value. A key changed differently on
//! both sides is a conflict, handed to a [`MergeStrategy`].

use std::collections::BTreeSet;

use bytes::Bytes;
use revsync_core::{Digest, Document};

use crate::error::{Result, StoreError};
use crate::graph;
use crate::traits::{Repository, RepositoryExt};

/// One entity that both sides changed differently.
///
/// `None` means the entity is absent on that side.
#[derive(Debug, Clone, Copy)]
pub struct Conflict<'a> {
    pub key: &'a str,
    pub base: Option<&'a Bytes>,
    pub mine: Option<&'a Bytes>,
    pub theirs: Option<&'a Bytes>,
}

/// How a strategy settles a conflict.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    Mine,
    Theirs,
    Unresolved,
}

/// Pluggable conflict resolution.
pub trait MergeStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    fn resolve(&self, conflict: &Conflict<'_>) -> Resolution;
}

/// Local side wins every conflict.
#[derive(Debug, Clone, Copy, Default)]
pub struct MineFull;

impl MergeStrategy for MineFull {
    fn name(&self) -> &'static str {
        "mine-full"
    }

    fn resolve(&self, _conflict: &Conflict<'_>) -> Resolution {
        Resolution::Mine
    }
}

/// Remote side wins every conflict.
#[derive(Debug, Clone, Copy, Default)]
pub struct TheirsFull;

impl MergeStrategy for TheirsFull {
    fn name(&self) -> &'static str {
        "theirs-full"
    }

    fn resolve(&self, _conflict: &Conflict<'_>) -> Resolution {
        Resolution::Theirs
    }
}

/// Refuses to merge when any entity conflicts.
#[derive(Debug, Clone, Copy, Default)]
pub struct FailOnConflict;

impl MergeStrategy for FailOnConflict {
    fn name(&self) -> &'static str {
        "fail-on-conflict"
    }

    fn resolve(&self, _conflict: &Conflict<'_>) -> Resolution {
        Resolution::Unresolved
    }
}

/// Merge two documents against their common ancestor.
pub fn three_way_merge(
    base: &Document,
    mine: &Document,
    theirs: &Document,
    strategy: &dyn MergeStrategy,
) -> Result<Document> {
    let keys: BTreeSet<&String> = base.keys().chain(mine.keys()).chain(theirs.keys()).collect();

    let mut merged = Document::new();
    let mut unresolved = Vec::new();

    for key in keys {
        let b = base.get(key);
        let m = mine.get(key);
        let t = theirs.get(key);

        let value = if m == t || t == b {
            m
        } else if m == b {
            t
        } else {
            let conflict = Conflict {
                key,
                base: b,
                mine: m,
                theirs: t,
            };
            match strategy.resolve(&conflict) {
                Resolution::Mine => m,
                Resolution::Theirs => t,
                Resolution::Unresolved => {
                    unresolved.push(key.clone());
                    continue;
                }
            }
        };

        if let Some(value) = value {
            merged.insert(key.clone(), value.clone());
        }
    }

    if !unresolved.is_empty() {
        return Err(StoreError::MergeConflict(unresolved));
    }
    Ok(merged)
}

/// Merge the working document (based on `mine_tip`) with the snapshot at
/// `theirs_tip`.
///
/// The base is the merge base of the two tips; unrelated histories merge
/// against an empty document.
pub async fn merge<R: Repository + ?Sized>(
    repo: &R,
    mine: &Document,
    mine_tip: &Digest,
    theirs_tip: &Digest,
    strategy: &dyn MergeStrategy,
) -> Result<Document> {
    let theirs = repo.commit_document(theirs_tip).await?;
    let base = match graph::merge_base(repo, mine_tip, theirs_tip).await? {
        Some(base) => repo.commit_document(&base).await?,
        None => Document::new(),
    };

    tracing::debug!(
        mine = %mine_tip,
        theirs = %theirs_tip,
        strategy = strategy.name(),
        "merging documents"
    );

    three_way_merge(&base, mine, &theirs, strategy)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryRepository;
    use revsync_core::Annotation;

    fn doc(pairs: &[(&str, &'static str)]) -> Document {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), Bytes::from_static(v.as_bytes())))
            .collect()
    }

    #[test]
    fn test_one_sided_changes_combine() {
        let base = doc(&[("a", "1"), ("b", "1"), ("c", "1")]);
        let mine = doc(&[("a", "2"), ("b", "1"), ("c", "1")]);
        let theirs = doc(&[("a", "1"), ("b", "1"), ("d", "1")]);

        let merged = three_way_merge(&base, &mine, &theirs, &FailOnConflict).unwrap();
        assert_eq!(merged, doc(&[("a", "2"), ("b", "1"), ("d", "1")]));
    }

    #[test]
    fn test_conflict_strategies() {
        let base = doc(&[("a", "1")]);
        let mine = doc(&[("a", "mine")]);
        let theirs = doc(&[("a", "theirs")]);

        let merged = three_way_merge(&base, &mine, &theirs, &MineFull).unwrap();
        assert_eq!(merged, mine);

        let merged = three_way_merge(&base, &mine, &theirs, &TheirsFull).unwrap();
        assert_eq!(merged, theirs);

        let err = three_way_merge(&base, &mine, &theirs, &FailOnConflict).unwrap_err();
        assert!(matches!(err, StoreError::MergeConflict(keys) if keys == vec!["a".to_string()]));
    }

    #[test]
    fn test_delete_against_edit_is_conflict() {
        let base = doc(&[("a", "1")]);
        let mine = doc(&[]);
        let theirs = doc(&[("a", "2")]);

        assert_eq!(three_way_merge(&base, &mine, &theirs, &MineFull).unwrap(), mine);
        assert_eq!(three_way_merge(&base, &mine, &theirs, &TheirsFull).unwrap(), theirs);
    }

    #[tokio::test]
    async fn test_merge_uses_common_ancestor() {
        let repo = MemoryRepository::new();
        let base = doc(&[("a", "1"), ("b", "1")]);
        let root = repo
            .commit(&base, &[], Annotation::with_date("t", "root", 0))
            .await
            .unwrap();

        let theirs = doc(&[("a", "1"), ("b", "2")]);
        let theirs_tip = repo
            .commit(&theirs, &[root], Annotation::with_date("t", "theirs", 1))
            .await
            .unwrap();

        let mine = doc(&[("a", "2"), ("b", "1")]);
        let mine_tip = repo
            .commit(&mine, &[root], Annotation::with_date("t", "mine", 2))
            .await
            .unwrap();

        let merged = merge(&repo, &mine, &mine_tip, &theirs_tip, &FailOnConflict)
            .await
            .unwrap();
        assert_eq!(merged, doc(&[("a", "2"), ("b", "2")]));
    }
}
