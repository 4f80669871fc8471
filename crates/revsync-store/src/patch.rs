//! Patch format: the graph difference between two sets of objects.
//!
//! A patch is a CBOR document carrying document snapshots, commit records and
//! a reference list. The receiver verifies every object against its digest
//! and checks that the commit graph it describes is complete before writing
//! anything, so a rejected patch leaves the repository untouched.

use std::collections::{BTreeMap, BTreeSet, HashSet};

use bytes::Bytes;
use revsync_core::{CommitInfo, Digest, Document, References};
use serde::{Deserialize, Serialize};

use crate::error::{Result, StoreError};
use crate::traits::Repository;

/// Current patch format version.
pub const PATCH_VERSION: u8 = 0;

#[derive(Debug, Serialize, Deserialize)]
struct PatchBody {
    version: u8,
    roots: Vec<Digest>,
    revisions: Vec<RevisionEntry>,
    commits: Vec<CommitInfo>,
    refs: References,
}

#[derive(Debug, Serialize, Deserialize)]
struct RevisionEntry {
    digest: Digest,
    document: Document,
}

/// What applying a patch produced.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AppliedPatch {
    /// The `to` set the patch was made for.
    pub roots: Vec<Digest>,
    /// References carried by the patch. Not applied to the repository.
    pub refs: References,
    /// Number of commit records written.
    pub commits: usize,
    /// Number of document snapshots written.
    pub revisions: usize,
}

/// Every object reachable from `from`: commits, their revisions, and bare
/// revisions. Digests unknown locally are skipped.
async fn known_closure<R: Repository + ?Sized>(repo: &R, from: &[Digest]) -> Result<HashSet<Digest>> {
    let mut known = HashSet::new();
    let mut stack: Vec<Digest> = from.iter().copied().filter(|d| !d.is_null()).collect();

    while let Some(digest) = stack.pop() {
        if !known.insert(digest) {
            continue;
        }
        if let Some(info) = repo.get_commit_info(&digest).await? {
            known.insert(info.revision);
            stack.extend(info.parents.iter().copied());
        } else if !repo.has_revision(&digest).await? {
            tracing::debug!(digest = %digest, "patch base object unknown locally, ignored");
        }
    }

    Ok(known)
}

/// Build a patch with every object reachable from `to` that is not reachable
/// from `from`.
pub async fn make_patch<R: Repository + ?Sized>(
    repo: &R,
    from: &[Digest],
    to: &[Digest],
    refs: &References,
) -> Result<Bytes> {
    let known = known_closure(repo, from).await?;

    let mut visited = HashSet::new();
    let mut revisions = BTreeMap::new();
    let mut commits = Vec::new();
    let mut stack: Vec<Digest> = to.iter().rev().copied().collect();

    while let Some(digest) = stack.pop() {
        if digest.is_null() || known.contains(&digest) || !visited.insert(digest) {
            continue;
        }

        if let Some(info) = repo.get_commit_info(&digest).await? {
            stack.push(info.revision);
            stack.extend(info.parents.iter().rev().copied());
            commits.push(info);
        } else if let Some(document) = repo.get_revision(&digest).await? {
            revisions.insert(digest, document);
        } else {
            return Err(StoreError::NotFound(digest));
        }
    }

    let body = PatchBody {
        version: PATCH_VERSION,
        roots: to.to_vec(),
        revisions: revisions
            .into_iter()
            .map(|(digest, document)| RevisionEntry { digest, document })
            .collect(),
        commits,
        refs: refs.clone(),
    };

    tracing::debug!(
        commits = body.commits.len(),
        revisions = body.revisions.len(),
        from = from.len(),
        "patch built"
    );

    let mut buf = Vec::new();
    ciborium::into_writer(&body, &mut buf)
        .map_err(|e| StoreError::Serialization(e.to_string()))?;
    Ok(Bytes::from(buf))
}

/// Verify a patch against the repository and store its objects.
pub async fn apply_patch<R: Repository + ?Sized>(repo: &R, patch: &[u8]) -> Result<AppliedPatch> {
    let body: PatchBody =
        ciborium::from_reader(patch).map_err(|e| StoreError::Serialization(e.to_string()))?;

    if body.version != PATCH_VERSION {
        return Err(StoreError::UnsupportedPatchVersion(body.version));
    }

    // Verify everything before the first write.
    let mut incoming_revisions = BTreeSet::new();
    for entry in &body.revisions {
        if entry.document.revision_digest() != entry.digest {
            return Err(StoreError::Corrupt {
                digest: entry.digest,
                reason: "document does not match revision digest".into(),
            });
        }
        incoming_revisions.insert(entry.digest);
    }

    let incoming_commits: BTreeSet<Digest> = body.commits.iter().map(|c| c.hash).collect();
    for info in &body.commits {
        if !info.verify_hash() {
            return Err(StoreError::Corrupt {
                digest: info.hash,
                reason: "commit hash does not match its body".into(),
            });
        }
        if !incoming_revisions.contains(&info.revision) && !repo.has_revision(&info.revision).await? {
            return Err(StoreError::IncompletePatch(format!(
                "commit {} needs revision {}",
                info.hash, info.revision
            )));
        }
        for parent in &info.parents {
            if !incoming_commits.contains(parent) && repo.get_commit_info(parent).await?.is_none() {
                return Err(StoreError::IncompletePatch(format!(
                    "commit {} needs parent {}",
                    info.hash, parent
                )));
            }
        }
    }

    for entry in &body.revisions {
        repo.put_revision(&entry.digest, &entry.document).await?;
    }
    for info in &body.commits {
        repo.put_commit(info).await?;
    }

    tracing::debug!(
        commits = body.commits.len(),
        revisions = body.revisions.len(),
        refs = body.refs.len(),
        "patch applied"
    );

    Ok(AppliedPatch {
        roots: body.roots,
        refs: body.refs,
        commits: body.commits.len(),
        revisions: body.revisions.len(),
    })
}
