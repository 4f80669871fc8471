//! Merge-base negotiation.
//!
//! The probing side walks its history from a head, asking the peer about one
//! commit at a time. A commit the peer has bounds the walk on that path and
//! joins the "from" set of the patch that will be built. The answering side
//! replies from its own repository until the prober ends the probe loop with
//! any tag other than [`Tag::Sha`].
//!
//! Each probe costs one round trip. The walk never asks about a commit twice,
//! so it needs at most as many round trips as the head has ancestors.

use std::collections::HashSet;

use revsync_core::Digest;
use revsync_store::{Repository, RepositoryExt, StoreError};

use crate::connection::Connection;
use crate::error::Result;
use crate::transport::Transport;
use crate::wire::Tag;

/// Probe the peer from `head` and return the commits it already has that
/// bound the history it is missing.
///
/// An empty result means the peer shares nothing with `head`, so the patch
/// must carry the full history.
pub async fn negotiate_from_set<T, R>(
    conn: &mut Connection<T>,
    repo: &R,
    head: &Digest,
) -> Result<Vec<Digest>>
where
    T: Transport,
    R: Repository + ?Sized,
{
    let mut from = Vec::new();
    let mut visited = HashSet::new();
    let mut stack = Vec::new();
    if !head.is_null() {
        stack.push(*head);
    }

    let mut probes = 0usize;
    while let Some(digest) = stack.pop() {
        if !visited.insert(digest) {
            continue;
        }

        conn.send_tag(Tag::Sha).await?;
        conn.send_digest(&digest).await?;
        probes += 1;

        if conn.recv_status().await? {
            from.push(digest);
            continue;
        }

        let info = repo
            .get_commit_info(&digest)
            .await?
            .ok_or(StoreError::NotFound(digest))?;
        stack.extend(info.parents.iter().rev().copied());
    }

    tracing::debug!(head = %head, probes, from = from.len(), "negotiated patch base");
    Ok(from)
}

/// Answer probes until the peer sends a non-probe tag, which is returned.
pub async fn answer_probes<T, R>(conn: &mut Connection<T>, repo: &R) -> Result<Tag>
where
    T: Transport,
    R: Repository + ?Sized,
{
    let mut answered = 0usize;
    loop {
        let tag = conn.recv_tag().await?;
        if tag != Tag::Sha {
            tracing::debug!(answered, end = %tag, "probe loop finished");
            return Ok(tag);
        }

        let digest = conn.recv_digest().await?;
        let known = repo.has_commit(&digest).await?;
        conn.send_tag(if known { Tag::Ok } else { Tag::NotOk }).await?;
        answered += 1;
    }
}
