//! Sync protocol server.
//!
//! One connection is served at a time and every request runs to completion
//! before the next tag is read, so the repository sees a single writer.
//! Requests are dispatched through [`RequestHandler`]; [`RepositoryHandler`]
//! is the implementation backed by a [`Repository`].

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use revsync_core::{codec, Annotation, Digest, Document, References};
use revsync_store::{graph, Repository, RepositoryExt};

use crate::config::SyncConfig;
use crate::connection::{unexpected, Connection};
use crate::error::{Result, SyncError};
use crate::negotiate::{answer_probes, negotiate_from_set};
use crate::transport::{Listener, Transport};
use crate::wire::{Command, Tag};

/// Pause after a failed accept before trying again.
const ACCEPT_BACKOFF: Duration = Duration::from_millis(50);

/// Handlers for the commands a server answers. `Stop` is handled by the
/// server loop itself.
#[async_trait]
pub trait RequestHandler: Send + Sync {
    async fn handle_push<T: Transport>(&self, conn: &mut Connection<T>) -> Result<()>;

    async fn handle_pull<T: Transport>(&self, conn: &mut Connection<T>) -> Result<()>;

    async fn handle_clone<T: Transport>(&self, conn: &mut Connection<T>) -> Result<()>;
}

/// How a connection ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Served {
    /// The peer closed the connection.
    Closed,
    /// The peer asked the server to stop.
    Stop,
}

/// Accept loop dispatching commands to a handler.
pub struct Server<H> {
    handler: H,
    config: SyncConfig,
}

impl<H: RequestHandler> Server<H> {
    pub fn new(handler: H, config: SyncConfig) -> Self {
        Self { handler, config }
    }

    pub fn handler(&self) -> &H {
        &self.handler
    }

    /// Serve connections until a client sends `Stop` or the listener is
    /// closed.
    ///
    /// A failed accept or request is logged and the loop goes on with the
    /// next connection.
    pub async fn run<L: Listener>(&self, listener: &mut L) -> Result<()> {
        tracing::info!("server waiting for connections");
        loop {
            let transport = match listener.accept().await {
                Ok(transport) => transport,
                Err(SyncError::Closed) => {
                    tracing::info!("listener closed, server shutting down");
                    return Ok(());
                }
                Err(e) => {
                    tracing::warn!(error = %e, "accept failed");
                    tokio::time::sleep(ACCEPT_BACKOFF).await;
                    continue;
                }
            };
            let mut conn = Connection::new(transport, &self.config);
            match self.serve_connection(&mut conn).await {
                Ok(Served::Stop) => {
                    tracing::info!("stop requested, server shutting down");
                    return Ok(());
                }
                Ok(Served::Closed) => tracing::debug!("connection closed"),
                Err(e) => tracing::warn!(error = %e, "request failed, connection dropped"),
            }
        }
    }

    /// Serve commands on one connection until the peer closes it, stays idle
    /// past the idle timeout, or sends `Stop`.
    pub async fn serve_connection<T: Transport>(&self, conn: &mut Connection<T>) -> Result<Served> {
        loop {
            let tag = match conn.try_recv_tag().await {
                Ok(Some(tag)) => tag,
                Ok(None) => return Ok(Served::Closed),
                Err(SyncError::Timeout(reason)) => {
                    tracing::info!(reason = %reason, "idle connection dropped");
                    return Ok(Served::Closed);
                }
                Err(e) => return Err(e),
            };
            let command = Command::try_from(tag)?;
            tracing::info!(command = ?command, "request received");
            match command {
                Command::Push => self.handler.handle_push(conn).await?,
                Command::Pull => self.handler.handle_pull(conn).await?,
                Command::Clone => self.handler.handle_clone(conn).await?,
                Command::Stop => {
                    conn.send_tag(Tag::Ok).await?;
                    return Ok(Served::Stop);
                }
            }
        }
    }
}

/// Request handler over a repository.
pub struct RepositoryHandler<R> {
    repo: Arc<R>,
}

impl<R: Repository> RepositoryHandler<R> {
    pub fn new(repo: Arc<R>) -> Self {
        Self { repo }
    }

    pub fn repository(&self) -> &Arc<R> {
        &self.repo
    }

    /// Give an empty repository its first commit on `branch`.
    ///
    /// Returns the root commit, or `None` if the repository already has
    /// references.
    pub async fn initialize(&self, branch: &str, document: &Document) -> Result<Option<Digest>> {
        if !self.repo.get_references().await?.is_empty() {
            return Ok(None);
        }
        let root = self
            .repo
            .commit(document, &[], Annotation::new("server", "initial commit"))
            .await?;
        self.repo.set_reference(branch, &root).await?;
        tracing::info!(branch, commit = %root, "repository initialized");
        Ok(Some(root))
    }

    async fn log_history(&self) -> Result<()> {
        for (branch, tip) in self.repo.get_references().await? {
            for info in graph::history(self.repo.as_ref(), &tip).await? {
                tracing::debug!(
                    branch = %branch,
                    commit = %info.hash,
                    parents = ?info.parents,
                    author = %info.annotation.author,
                    message = %info.annotation.message,
                    "log"
                );
            }
        }
        Ok(())
    }

    /// Advance each reference from a pushed patch if its commit is present
    /// and the move is a fast-forward.
    async fn advance_refs(&self, refs: &References) -> Result<()> {
        for (branch, digest) in refs {
            if !self.repo.has_commit(digest).await? {
                tracing::warn!(branch = %branch, commit = %digest, "pushed reference to missing commit ignored");
                continue;
            }
            if let Some(current) = self.repo.get_reference(branch).await? {
                if !graph::is_ancestor(self.repo.as_ref(), &current, digest).await? {
                    tracing::warn!(branch = %branch, commit = %digest, "non fast-forward reference ignored");
                    continue;
                }
            }
            self.repo.set_reference(branch, digest).await?;
            tracing::info!(branch = %branch, tip = %digest, "branch advanced");
        }
        Ok(())
    }
}

#[async_trait]
impl<R: Repository> RequestHandler for RepositoryHandler<R> {
    async fn handle_push<T: Transport>(&self, conn: &mut Connection<T>) -> Result<()> {
        match answer_probes(conn, self.repo.as_ref()).await? {
            Tag::Ok => {}
            other => return Err(unexpected(other, &[Tag::Ok])),
        }

        let branch = conn.recv_string().await?;
        let tip = self.repo.get_reference(&branch).await?.unwrap_or(Digest::NULL);
        conn.send_digest(&tip).await?;

        match conn.recv_tag().await? {
            Tag::NeedPull => {
                conn.send_tag(Tag::DoNothing).await?;
                tracing::info!(branch = %branch, "push declined by client, pull needed");
                return Ok(());
            }
            Tag::Ok => {}
            other => return Err(unexpected(other, &[Tag::Ok, Tag::NeedPull])),
        }

        let patch = conn.recv_buffer().await?;
        let applied = match self.repo.apply_patch(&patch).await {
            Ok(applied) => applied,
            Err(e) => {
                tracing::warn!(branch = %branch, error = %e, "push patch rejected");
                conn.send_tag(Tag::NotOk).await?;
                return Ok(());
            }
        };
        if let Err(e) = self.advance_refs(&applied.refs).await {
            tracing::warn!(branch = %branch, error = %e, "updating references failed");
            conn.send_tag(Tag::NotOk).await?;
            return Ok(());
        }
        conn.send_tag(Tag::Ok).await?;

        if let Err(e) = self.log_history().await {
            tracing::warn!(error = %e, "could not walk history");
        }
        Ok(())
    }

    async fn handle_pull<T: Transport>(&self, conn: &mut Connection<T>) -> Result<()> {
        let branch = conn.recv_string().await?;
        let Some(tip) = self.repo.get_reference(&branch).await? else {
            tracing::info!(branch = %branch, "pull of unknown branch");
            conn.send_tag(Tag::NotOk).await?;
            return Ok(());
        };
        conn.send_tag(Tag::Ok).await?;
        conn.send_digest(&tip).await?;

        if !conn.recv_status().await? {
            tracing::info!(branch = %branch, "client already up to date");
            return Ok(());
        }
        let client_tip = conn.recv_digest().await?;

        let fast_forward =
            client_tip.is_null() || graph::is_ancestor(self.repo.as_ref(), &client_tip, &tip).await?;
        conn.send_tag(if fast_forward { Tag::Ok } else { Tag::NotOk }).await?;

        let from = negotiate_from_set(conn, self.repo.as_ref(), &tip).await?;
        conn.send_tag(Tag::Ok).await?;

        let refs = References::from([(branch.clone(), tip)]);
        match self.repo.make_patch(&from, &[tip], &refs).await {
            Ok(patch) => {
                conn.send_tag(Tag::Ok).await?;
                conn.send_buffer(&patch).await?;
                tracing::info!(branch = %branch, fast_forward, patch_len = patch.len(), "pull served");
            }
            Err(e) => {
                tracing::warn!(branch = %branch, error = %e, "could not create pull patch");
                conn.send_tag(Tag::NotOk).await?;
            }
        }
        Ok(())
    }

    async fn handle_clone<T: Transport>(&self, conn: &mut Connection<T>) -> Result<()> {
        let prepared = async {
            let refs = self.repo.get_references().await?;
            let heads: Vec<Digest> = refs.values().copied().collect();
            let base = BTreeSet::new();

            let commits = graph::collect_commits(self.repo.as_ref(), &base, &heads).await?;
            let revisions = graph::collect_revisions(self.repo.as_ref(), &base, &heads).await?;

            let mut infos = Vec::with_capacity(commits.len());
            for digest in &commits {
                if let Some(info) = self.repo.get_commit_info(digest).await? {
                    infos.push(info);
                }
            }

            let revisions: Vec<Digest> = revisions.into_iter().collect();
            let patch = self.repo.make_patch(&[], &revisions, &refs).await?;
            Ok::<_, revsync_store::StoreError>((patch, codec::encode_commit_stream(&infos)))
        };

        let (patch, commit_stream) = match prepared.await {
            Ok(prepared) => prepared,
            Err(e) => {
                tracing::warn!(error = %e, "could not create clone patch");
                conn.send_tag(Tag::NotOk).await?;
                return Ok(());
            }
        };

        conn.send_tag(Tag::Ok).await?;
        conn.send_buffer(&patch).await?;

        if !conn.recv_status().await? {
            tracing::warn!("client could not apply clone patch");
            return Ok(());
        }
        conn.send_buffer(&commit_stream).await?;
        tracing::info!(patch_len = patch.len(), commits_len = commit_stream.len(), "clone served");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::memory::{memory_network, pair, MemoryListener};
    use crate::transport::Connector;
    use bytes::Bytes;
    use revsync_store::MemoryRepository;
    use revsync_testkit::{commit_chain, document};

    fn setup(repo: Arc<MemoryRepository>) -> (Server<RepositoryHandler<MemoryRepository>>, SyncConfig) {
        let config = SyncConfig::default();
        (Server::new(RepositoryHandler::new(repo), config.clone()), config)
    }

    #[tokio::test]
    async fn test_initialize_only_once() {
        let repo = Arc::new(MemoryRepository::new());
        let handler = RepositoryHandler::new(Arc::clone(&repo));

        let root = handler.initialize("master", &document("empty")).await.unwrap();
        assert!(root.is_some());
        assert_eq!(repo.get_reference("master").await.unwrap(), root);
        assert_eq!(handler.initialize("master", &document("again")).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_stop_is_acknowledged() {
        let (server, config) = setup(Arc::new(MemoryRepository::new()));
        let (a, b) = pair();
        let mut client = Connection::new(a, &config);
        let mut conn = Connection::new(b, &config);

        let serving = server.serve_connection(&mut conn);
        let asking = async {
            client.send_tag(Tag::Stop).await.unwrap();
            client.expect_tag(Tag::Ok).await.unwrap();
        };
        let (served, ()) = tokio::join!(serving, asking);
        assert_eq!(served.unwrap(), Served::Stop);
    }

    #[tokio::test]
    async fn test_non_command_tag_is_protocol_error() {
        let (server, config) = setup(Arc::new(MemoryRepository::new()));
        let (a, b) = pair();
        let mut client = Connection::new(a, &config);
        let mut conn = Connection::new(b, &config);

        client.send_tag(Tag::Sha).await.unwrap();
        let err = server.serve_connection(&mut conn).await.unwrap_err();
        assert!(matches!(err, crate::error::SyncError::Protocol(_)));
    }

    #[tokio::test]
    async fn test_pull_of_unknown_branch_answers_not_ok() {
        let repo = Arc::new(MemoryRepository::new());
        commit_chain(repo.as_ref(), "master", &["root"]).await.unwrap();
        let (server, config) = setup(repo);
        let (a, b) = pair();
        let mut client = Connection::new(a, &config);
        let mut conn = Connection::new(b, &config);

        let serving = server.serve_connection(&mut conn);
        let asking = async {
            client.send_tag(Tag::Pull).await.unwrap();
            client.send_string("feature").await.unwrap();
            let found = client.recv_status().await.unwrap();
            drop(client);
            found
        };
        let (served, found) = tokio::join!(serving, asking);
        assert!(!found);
        assert_eq!(served.unwrap(), Served::Closed);
    }

    #[tokio::test]
    async fn test_push_with_need_pull_leaves_server_untouched() {
        let repo = Arc::new(MemoryRepository::new());
        let commits = commit_chain(repo.as_ref(), "master", &["root", "c1"]).await.unwrap();
        let (server, config) = setup(Arc::clone(&repo));
        let (a, b) = pair();
        let mut client = Connection::new(a, &config);
        let mut conn = Connection::new(b, &config);

        let serving = server.serve_connection(&mut conn);
        let asking = async {
            client.send_tag(Tag::Push).await.unwrap();
            client.send_tag(Tag::Ok).await.unwrap();
            client.send_string("master").await.unwrap();
            let remote_tip = client.recv_digest().await.unwrap();
            client.send_tag(Tag::NeedPull).await.unwrap();
            client.expect_tag(Tag::DoNothing).await.unwrap();
            drop(client);
            remote_tip
        };
        let (served, remote_tip) = tokio::join!(serving, asking);
        assert_eq!(served.unwrap(), Served::Closed);
        assert_eq!(remote_tip, commits[1]);
        assert_eq!(repo.get_reference("master").await.unwrap(), Some(commits[1]));
    }

    #[tokio::test]
    async fn test_push_of_garbage_patch_answers_not_ok() {
        let repo = Arc::new(MemoryRepository::new());
        commit_chain(repo.as_ref(), "master", &["root"]).await.unwrap();
        let (server, config) = setup(Arc::clone(&repo));
        let (a, b) = pair();
        let mut client = Connection::new(a, &config);
        let mut conn = Connection::new(b, &config);

        let serving = server.serve_connection(&mut conn);
        let asking = async {
            client.send_tag(Tag::Push).await.unwrap();
            client.send_tag(Tag::Ok).await.unwrap();
            client.send_string("feature").await.unwrap();
            assert!(client.recv_digest().await.unwrap().is_null());
            client.send_tag(Tag::Ok).await.unwrap();
            client.send_buffer(b"not a patch").await.unwrap();
            let status = client.recv_status().await.unwrap();
            drop(client);
            status
        };
        let (served, status) = tokio::join!(serving, asking);
        assert!(!status);
        assert_eq!(served.unwrap(), Served::Closed);
        assert!(repo.get_reference("feature").await.unwrap().is_none());
    }

    /// Push `patch` on `branch` over a raw connection and return the server's
    /// final status.
    async fn push_patch(
        server: &Server<RepositoryHandler<MemoryRepository>>,
        config: &SyncConfig,
        branch: &str,
        patch: Bytes,
    ) -> bool {
        let (a, b) = pair();
        let mut client = Connection::new(a, config);
        let mut conn = Connection::new(b, config);

        let serving = server.serve_connection(&mut conn);
        let asking = async {
            client.send_tag(Tag::Push).await.unwrap();
            client.send_tag(Tag::Ok).await.unwrap();
            client.send_string(branch).await.unwrap();
            client.recv_digest().await.unwrap();
            client.send_tag(Tag::Ok).await.unwrap();
            client.send_buffer(&patch).await.unwrap();
            let status = client.recv_status().await.unwrap();
            drop(client);
            status
        };
        let (served, status) = tokio::join!(serving, asking);
        assert_eq!(served.unwrap(), Served::Closed);
        status
    }

    #[tokio::test]
    async fn test_pushed_ref_to_missing_commit_is_ignored() {
        let repo = Arc::new(MemoryRepository::new());
        let commits = commit_chain(repo.as_ref(), "master", &["root"]).await.unwrap();
        let (server, config) = setup(Arc::clone(&repo));

        let ghost = Digest::from_bytes([0x42; 20]);
        let refs = References::from([("master".to_string(), ghost), ("feature".to_string(), ghost)]);
        let patch = repo.make_patch(&[], &[], &refs).await.unwrap();

        assert!(push_patch(&server, &config, "master", patch).await);
        assert_eq!(repo.get_reference("master").await.unwrap(), Some(commits[0]));
        assert!(repo.get_reference("feature").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_pushed_ref_to_unrelated_root_is_ignored() {
        let repo = Arc::new(MemoryRepository::new());
        let commits = commit_chain(repo.as_ref(), "master", &["root", "c1"]).await.unwrap();
        let (server, config) = setup(Arc::clone(&repo));

        let other = MemoryRepository::new();
        let unrelated = commit_chain(&other, "master", &["elsewhere"]).await.unwrap();
        let refs = References::from([("master".to_string(), unrelated[0])]);
        let patch = other.make_patch(&[], &[unrelated[0]], &refs).await.unwrap();

        assert!(push_patch(&server, &config, "master", patch).await);
        assert_eq!(repo.get_reference("master").await.unwrap(), Some(commits[1]));
        // objects are stored, only the reference stays put
        assert!(repo.has_commit(&unrelated[0]).await.unwrap());
    }

    #[tokio::test]
    async fn test_idle_connection_is_closed() {
        let config = SyncConfig {
            idle_timeout: Some(Duration::from_millis(50)),
            ..SyncConfig::default()
        };
        let server = Server::new(RepositoryHandler::new(Arc::new(MemoryRepository::new())), config.clone());
        let (_client, b) = pair();
        let mut conn = Connection::new(b, &config);

        assert_eq!(server.serve_connection(&mut conn).await.unwrap(), Served::Closed);
    }

    /// Fails the first `failures` accepts.
    struct FlakyListener {
        failures: usize,
        inner: MemoryListener,
    }

    #[async_trait]
    impl Listener for FlakyListener {
        type Transport = <MemoryListener as Listener>::Transport;

        async fn accept(&mut self) -> Result<Self::Transport> {
            if self.failures > 0 {
                self.failures -= 1;
                return Err(SyncError::Transport("connection aborted".into()));
            }
            self.inner.accept().await
        }
    }

    #[tokio::test]
    async fn test_accept_errors_do_not_stop_server() {
        let (connector, listener) = memory_network();
        let (server, config) = setup(Arc::new(MemoryRepository::new()));
        let mut listener = FlakyListener { failures: 2, inner: listener };

        let running = server.run(&mut listener);
        let stopping = async {
            let mut conn = Connection::new(connector.connect().await.unwrap(), &config);
            conn.send_tag(Tag::Stop).await.unwrap();
            conn.expect_tag(Tag::Ok).await.unwrap();
        };
        let (ran, ()) = tokio::join!(running, stopping);
        ran.unwrap();
    }

    #[tokio::test]
    async fn test_closed_listener_ends_run() {
        let (connector, mut listener) = memory_network();
        drop(connector);
        let (server, _) = setup(Arc::new(MemoryRepository::new()));
        server.run(&mut listener).await.unwrap();
    }
}
