//! revsync client: commit, push, pull and stop against a revsync server.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use bytes::Bytes;
use clap::{Parser, Subcommand};
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

use revsync::store::{Repository, SqliteRepository};
use revsync::sync::tcp::TcpConnector;
use revsync::sync::{SyncConfig, DEFAULT_SERVER_ADDRESS};
use revsync::{ControlConfig, RevisionControl, Verb};

/// Revision control client for revsync repositories.
#[derive(Parser, Debug)]
#[command(name = "revsync")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Local SQLite repository file
    #[arg(long, global = true, default_value = "revsync.db")]
    repository: PathBuf,

    /// Server address
    #[arg(long, global = true, default_value = DEFAULT_SERVER_ADDRESS)]
    server: String,

    /// Local branch; defaults to master, or the first branch found
    #[arg(long, global = true)]
    branch: Option<String>,

    /// Author recorded on commits
    #[arg(long, global = true, default_value = "user")]
    author: String,

    /// Seconds to wait for a server message; 0 waits forever
    #[arg(long, global = true, default_value_t = 30)]
    timeout: u64,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, global = true, default_value = "warn")]
    log_level: Level,

    #[command(subcommand)]
    command: Command,
}

/// Available commands.
#[derive(Subcommand, Debug)]
enum Command {
    /// Commit the working document on the local branch
    Commit {
        /// Commit message
        #[arg(short, long, default_value = "commit")]
        message: String,

        /// Set an entity before committing (key=value)
        #[arg(long = "set", value_name = "KEY=VALUE")]
        set: Vec<String>,

        /// Remove an entity before committing
        #[arg(long = "remove", value_name = "KEY")]
        remove: Vec<String>,
    },
    /// Send local commits to the server
    Push,
    /// Fetch server commits; clones into an empty repository
    Pull,
    /// Shut the server down
    Stop,
}

async fn local_branch(repo: &SqliteRepository, requested: Option<&str>, default: &str) -> Result<Option<String>> {
    if let Some(branch) = requested {
        return Ok(Some(branch.to_string()));
    }
    let refs = repo.get_references().await?;
    if refs.contains_key(default) {
        return Ok(Some(default.to_string()));
    }
    Ok(refs.keys().next().cloned())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing::subscriber::set_global_default(
        FmtSubscriber::builder().with_max_level(cli.log_level).finish(),
    )?;

    let config = ControlConfig {
        author: cli.author.clone(),
        sync: SyncConfig {
            server_address: cli.server.clone(),
            message_timeout: (cli.timeout > 0).then(|| Duration::from_secs(cli.timeout)),
            ..SyncConfig::default()
        },
    };

    let repo = Arc::new(
        SqliteRepository::open(&cli.repository)
            .with_context(|| format!("opening repository {}", cli.repository.display()))?,
    );
    let connector = TcpConnector::from_config(&config.sync);

    let branch = local_branch(&repo, cli.branch.as_deref(), &config.sync.default_branch).await?;
    let mut rc = match branch {
        Some(branch) => RevisionControl::open(repo, &branch, connector, config).await?,
        None => RevisionControl::new(repo, connector, config),
    };

    let verb = match cli.command {
        Command::Commit {
            message,
            set,
            remove,
        } => {
            for pair in set {
                let Some((key, value)) = pair.split_once('=') else {
                    bail!("--set expects KEY=VALUE, got {:?}", pair);
                };
                rc.document_mut().insert(key, Bytes::from(value.to_string()));
            }
            for key in remove {
                rc.document_mut().remove(&key);
            }
            Verb::Commit { message }
        }
        Command::Push => Verb::Push,
        Command::Pull => Verb::Pull,
        Command::Stop => Verb::Stop,
    };

    let status = rc.execute(verb).await;
    println!("{}", status);
    if !status.success {
        std::process::exit(1);
    }
    Ok(())
}
