//! Sync protocol client.
//!
//! Every command opens its own connection, runs to completion or error, and
//! drops the connection. Nothing is retried.
//!
//! ```text
//! Push                                 Pull
//! Client              Server           Client              Server
//!   |--- PUSH ----------->|              |--- PULL ----------->|
//!   |--- SHA d ---------->|              |--- branch --------->|
//!   |<-- OK/NOT_OK -------|              |<-- OK + tip --------|
//!   |   ...               |              |--- OK + local tip ->|
//!   |--- OK + branch ---->|              |<-- OK/NOT_OK -------|  (fast-forward?)
//!   |<-- remote tip ------|              |<-- SHA d -----------|
//!   |--- OK + patch ----->|              |--- OK/NOT_OK ------>|
//!   |<-- OK/NOT_OK -------|              |<-- OK + OK + patch -|
//! ```

use revsync_core::{codec, Annotation, Digest, References};
use revsync_store::{graph, merge, MergeStrategy, MineFull, Repository, RepositoryExt};

use crate::config::SyncConfig;
use crate::connection::{unexpected, Connection};
use crate::error::{Result, SyncError};
use crate::negotiate::{answer_probes, negotiate_from_set};
use crate::transport::Connector;
use crate::wire::Tag;
use crate::workspace::Workspace;

/// Result of a push.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PushOutcome {
    /// The server accepted the patch.
    Pushed { branch: String, tip: Digest },
    /// The server has commits the client lacks. Pull first.
    NeedPull { remote_tip: Digest },
}

/// Result of a pull or clone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PullOutcome {
    /// The client already has the remote tip.
    UpToDate { tip: Digest },
    /// The local branch moved forward to the remote tip.
    FastForward { tip: Digest },
    /// Histories diverged; a merge commit was created.
    Merged { tip: Digest, remote_tip: Digest },
    /// First pull into an empty workspace.
    Cloned { branch: String, refs: References },
}

/// Client for one remote server.
pub struct SyncClient<C> {
    connector: C,
    config: SyncConfig,
    strategy: Box<dyn MergeStrategy>,
}

impl<C: Connector> SyncClient<C> {
    pub fn new(connector: C, config: SyncConfig) -> Self {
        Self {
            connector,
            config,
            strategy: Box::new(MineFull),
        }
    }

    /// Replace the conflict policy used by pull merges.
    pub fn with_strategy(mut self, strategy: impl MergeStrategy + 'static) -> Self {
        self.strategy = Box::new(strategy);
        self
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    async fn open(&self) -> Result<Connection<C::Transport>> {
        let transport = self.connector.connect().await?;
        Ok(Connection::new(transport, &self.config))
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Push
    // ─────────────────────────────────────────────────────────────────────────

    /// Send the checked out branch to the server.
    ///
    /// Fast-forward only: if the server's tip is not in the local history the
    /// push is declined with [`PushOutcome::NeedPull`]. Local state is never
    /// changed.
    pub async fn push<R: Repository>(&self, workspace: &Workspace<R>) -> Result<PushOutcome> {
        let branch = workspace.require_branch()?.to_string();
        let tip = workspace.local_tip().await?;
        let repo = workspace.repository().as_ref();

        tracing::info!(branch = %branch, tip = %tip, "push started");
        let mut conn = self.open().await?;
        conn.send_tag(Tag::Push).await?;

        let from = negotiate_from_set(&mut conn, repo, &tip).await?;
        conn.send_tag(Tag::Ok).await?;
        conn.send_string(&branch).await?;

        let remote_tip = conn.recv_digest().await?;
        if !remote_tip.is_null() && !graph::is_ancestor(repo, &remote_tip, &tip).await? {
            conn.send_tag(Tag::NeedPull).await?;
            conn.expect_tag(Tag::DoNothing).await?;
            tracing::info!(branch = %branch, remote_tip = %remote_tip, "push declined, server ahead");
            return Ok(PushOutcome::NeedPull { remote_tip });
        }

        let refs = References::from([(branch.clone(), tip)]);
        let patch = repo.make_patch(&from, &[tip], &refs).await?;
        conn.send_tag(Tag::Ok).await?;
        conn.send_buffer(&patch).await?;

        if !conn.recv_status().await? {
            return Err(SyncError::Remote("server rejected the patch".into()));
        }

        tracing::info!(branch = %branch, tip = %tip, patch_len = patch.len(), "push finished");
        Ok(PushOutcome::Pushed { branch, tip })
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Pull
    // ─────────────────────────────────────────────────────────────────────────

    /// Bring the checked out branch up to date with the server, cloning when
    /// the workspace has no branch yet.
    pub async fn pull<R: Repository>(&self, workspace: &mut Workspace<R>) -> Result<PullOutcome> {
        let Some(branch) = workspace.branch().map(str::to_string) else {
            return self.clone_into(workspace).await;
        };
        let local_tip = workspace.local_tip().await?;
        let repo = std::sync::Arc::clone(workspace.repository());

        tracing::info!(branch = %branch, local_tip = %local_tip, "pull started");
        let mut conn = self.open().await?;
        conn.send_tag(Tag::Pull).await?;
        conn.send_string(&branch).await?;

        if !conn.recv_status().await? {
            return Err(SyncError::RemoteBranchNotFound(branch));
        }
        let remote_tip = conn.recv_digest().await?;

        if repo.has_commit(&remote_tip).await? {
            conn.send_tag(Tag::NotOk).await?;
            tracing::info!(branch = %branch, "no need to pull");
            return Ok(PullOutcome::UpToDate { tip: local_tip });
        }

        conn.send_tag(Tag::Ok).await?;
        conn.send_digest(&local_tip).await?;
        let fast_forward = conn.recv_status().await?;

        match answer_probes(&mut conn, repo.as_ref()).await? {
            Tag::Ok => {}
            other => return Err(unexpected(other, &[Tag::Ok])),
        }
        if !conn.recv_status().await? {
            return Err(SyncError::Remote("server can't create a patch on pull".into()));
        }
        let patch = conn.recv_buffer().await?;
        drop(conn);

        let applied = repo.apply_patch(&patch).await?;
        tracing::debug!(commits = applied.commits, revisions = applied.revisions, "pull patch applied");

        let outcome = if fast_forward {
            repo.set_reference(&branch, &remote_tip).await?;
            workspace.switch_branch(&branch).await?;
            PullOutcome::FastForward { tip: remote_tip }
        } else {
            let merged = merge::merge(
                repo.as_ref(),
                workspace.document(),
                &local_tip,
                &remote_tip,
                self.strategy.as_ref(),
            )
            .await?;
            let tip = repo
                .commit(
                    &merged,
                    &[remote_tip, local_tip],
                    Annotation::new(self.config.merge_author.clone(), "mergeCommit"),
                )
                .await?;
            repo.set_reference(&branch, &tip).await?;
            workspace.switch_branch(&branch).await?;
            PullOutcome::Merged { tip, remote_tip }
        };

        tracing::info!(branch = %branch, outcome = ?outcome, "pull finished");
        Ok(outcome)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Clone
    // ─────────────────────────────────────────────────────────────────────────

    /// Copy every branch of the server into the workspace's repository and
    /// check out the default branch (or the first one).
    ///
    /// References and the checked out branch are only set once every commit
    /// record is written. A failure earlier leaves unreferenced objects behind
    /// and the workspace still without a branch.
    pub async fn clone_into<R: Repository>(&self, workspace: &mut Workspace<R>) -> Result<PullOutcome> {
        let repo = std::sync::Arc::clone(workspace.repository());

        tracing::info!("clone started");
        let mut conn = self.open().await?;
        conn.send_tag(Tag::Clone).await?;

        if !conn.recv_status().await? {
            return Err(SyncError::Remote("server can't create a patch on clone".into()));
        }
        let patch = conn.recv_buffer().await?;
        let applied = match repo.apply_patch(&patch).await {
            Ok(applied) => applied,
            Err(e) => {
                tracing::warn!(error = %e, "clone patch rejected");
                conn.send_tag(Tag::NotOk).await?;
                return Err(e.into());
            }
        };
        conn.send_tag(Tag::Ok).await?;

        let stream = conn.recv_buffer().await?;
        drop(conn);

        let commits = codec::decode_commit_stream(&stream)?;
        for info in &commits {
            repo.write_commit_info(info).await?;
        }
        for (name, digest) in &applied.refs {
            repo.set_reference(name, digest).await?;
        }

        let branch = if applied.refs.contains_key(&self.config.default_branch) {
            Some(self.config.default_branch.clone())
        } else {
            applied.refs.keys().next().cloned()
        };
        let branch = branch.ok_or_else(|| SyncError::Remote("server has no branches".into()))?;
        workspace.switch_branch(&branch).await?;

        tracing::info!(
            branch = %branch,
            commits = commits.len(),
            revisions = applied.revisions,
            refs = applied.refs.len(),
            "clone finished"
        );
        Ok(PullOutcome::Cloned {
            branch,
            refs: applied.refs,
        })
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Stop
    // ─────────────────────────────────────────────────────────────────────────

    /// Ask the server process to shut down.
    pub async fn stop(&self) -> Result<()> {
        let mut conn = self.open().await?;
        conn.send_tag(Tag::Stop).await?;
        conn.expect_tag(Tag::Ok).await?;
        tracing::info!("server stop acknowledged");
        Ok(())
    }
}
