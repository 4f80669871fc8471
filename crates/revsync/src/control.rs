//! Revision control: the four user verbs over a workspace and a server.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use revsync_core::{Annotation, Digest, Document};
use revsync_store::{MergeStrategy, Repository};
use revsync_sync::{Connector, PullOutcome, PushOutcome, SyncClient, SyncConfig, Workspace};

use crate::error::{Result, RevsyncError};

/// Configuration for revision control.
#[derive(Debug, Clone)]
pub struct ControlConfig {
    /// Author recorded on local commits.
    pub author: String,
    /// Sync configuration.
    pub sync: SyncConfig,
}

impl Default for ControlConfig {
    fn default() -> Self {
        Self {
            author: "user".to_string(),
            sync: SyncConfig::default(),
        }
    }
}

/// A user command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verb {
    Commit { message: String },
    Push,
    Pull,
    Stop,
}

impl FromStr for Verb {
    type Err = RevsyncError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "commit" => Ok(Verb::Commit {
                message: "commit".to_string(),
            }),
            "push" => Ok(Verb::Push),
            "pull" => Ok(Verb::Pull),
            "stop" => Ok(Verb::Stop),
            other => Err(RevsyncError::InvalidOperation(format!("unknown command: {}", other))),
        }
    }
}

/// Final status line of a command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Status {
    pub success: bool,
    pub message: String,
}

impl Status {
    fn ok(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
        }
    }

    fn failed(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

/// A workspace wired to one server.
pub struct RevisionControl<R, C> {
    workspace: Workspace<R>,
    client: SyncClient<C>,
    author: String,
}

impl<R: Repository, C: Connector> RevisionControl<R, C> {
    /// Start without a checked out branch. The first pull clones.
    pub fn new(repo: Arc<R>, connector: C, config: ControlConfig) -> Self {
        Self {
            workspace: Workspace::new(repo),
            client: SyncClient::new(connector, config.sync),
            author: config.author,
        }
    }

    /// Resume work on `branch` of an existing local repository.
    pub async fn open(repo: Arc<R>, branch: &str, connector: C, config: ControlConfig) -> Result<Self> {
        Ok(Self {
            workspace: Workspace::open(repo, branch).await?,
            client: SyncClient::new(connector, config.sync),
            author: config.author,
        })
    }

    /// Replace the conflict policy used by pull merges.
    pub fn with_strategy(mut self, strategy: impl MergeStrategy + 'static) -> Self {
        self.client = self.client.with_strategy(strategy);
        self
    }

    pub fn workspace(&self) -> &Workspace<R> {
        &self.workspace
    }

    pub fn workspace_mut(&mut self) -> &mut Workspace<R> {
        &mut self.workspace
    }

    pub fn document(&self) -> &Document {
        self.workspace.document()
    }

    pub fn document_mut(&mut self) -> &mut Document {
        self.workspace.document_mut()
    }

    pub fn branch(&self) -> Option<&str> {
        self.workspace.branch()
    }

    /// Commit the working document on the local branch.
    pub async fn commit(&mut self, message: &str) -> Result<Digest> {
        let annotation = Annotation::new(self.author.clone(), message);
        Ok(self.workspace.commit(annotation).await?)
    }

    pub async fn push(&self) -> Result<PushOutcome> {
        Ok(self.client.push(&self.workspace).await?)
    }

    /// Pull the local branch, or clone when there is none yet.
    pub async fn pull(&mut self) -> Result<PullOutcome> {
        Ok(self.client.pull(&mut self.workspace).await?)
    }

    pub async fn stop(&self) -> Result<()> {
        Ok(self.client.stop().await?)
    }

    /// Run a verb and describe the result in one line. Failures are logged
    /// and reported, never propagated.
    pub async fn execute(&mut self, verb: Verb) -> Status {
        let result = match &verb {
            Verb::Commit { message } => self
                .commit(message)
                .await
                .map(|hash| Status::ok(format!("committed {}", hash))),
            Verb::Push => self.push().await.map(|outcome| match outcome {
                PushOutcome::Pushed { branch, tip } => Status::ok(format!("pushed {} to {}", tip, branch)),
                PushOutcome::NeedPull { remote_tip } => Status::failed(format!(
                    "server is ahead at {}, pull first",
                    remote_tip
                )),
            }),
            Verb::Pull => self.pull().await.map(|outcome| match outcome {
                PullOutcome::UpToDate { .. } => Status::ok("no need to pull"),
                PullOutcome::FastForward { tip } => Status::ok(format!("fast-forwarded to {}", tip)),
                PullOutcome::Merged { tip, remote_tip } => {
                    Status::ok(format!("merged {} into {}", remote_tip, tip))
                }
                PullOutcome::Cloned { branch, refs } => {
                    Status::ok(format!("cloned {} branches, on {}", refs.len(), branch))
                }
            }),
            Verb::Stop => self.stop().await.map(|()| Status::ok("server stopped")),
        };

        match result {
            Ok(status) => {
                tracing::info!(verb = ?verb, status = %status, "command finished");
                status
            }
            Err(e) => {
                tracing::warn!(verb = ?verb, error = %e, "command failed");
                Status::failed(format!("{:?} failed: {}", verb, e))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verb_parsing() {
        assert_eq!("push".parse::<Verb>().unwrap(), Verb::Push);
        assert_eq!("stop".parse::<Verb>().unwrap(), Verb::Stop);
        assert!(matches!("commit".parse::<Verb>().unwrap(), Verb::Commit { .. }));
        assert!(matches!(
            "rebase".parse::<Verb>(),
            Err(RevsyncError::InvalidOperation(_))
        ));
    }

    #[test]
    fn test_status_displays_message() {
        let status = Status::ok("no need to pull");
        assert!(status.success);
        assert_eq!(status.to_string(), "no need to pull");
    }
}
