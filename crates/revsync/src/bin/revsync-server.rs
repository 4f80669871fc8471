//! revsync server: answers push, pull and clone requests for one repository
//! until a client sends stop.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use revsync::core::Document;
use revsync::store::{MemoryRepository, Repository, SqliteRepository};
use revsync::sync::tcp::TcpAcceptor;
use revsync::sync::{RepositoryHandler, Server, SyncConfig, DEFAULT_SERVER_ADDRESS};

/// Serve a revsync repository over TCP.
#[derive(Parser, Debug)]
#[command(name = "revsync-server")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Address to listen on
    #[arg(long, default_value = DEFAULT_SERVER_ADDRESS)]
    listen: String,

    /// SQLite repository file; an in-memory repository when omitted
    #[arg(long)]
    repository: Option<PathBuf>,

    /// Branch that receives the initial commit of an empty repository
    #[arg(long, default_value = "master")]
    branch: String,

    /// Seconds to wait for a peer message or an idle peer's next command; 0 waits forever
    #[arg(long, default_value_t = 30)]
    timeout: u64,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, default_value = "info")]
    log_level: Level,
}

async fn serve<R: Repository + 'static>(repo: Arc<R>, args: &Args) -> Result<()> {
    let timeout = (args.timeout > 0).then(|| Duration::from_secs(args.timeout));
    let config = SyncConfig {
        message_timeout: timeout,
        idle_timeout: timeout,
        ..SyncConfig::default()
    };

    let handler = RepositoryHandler::new(repo);
    handler
        .initialize(&args.branch, &Document::new())
        .await
        .context("initializing repository")?;

    let mut acceptor = TcpAcceptor::bind(&args.listen).await?;
    info!(address = %acceptor.local_addr()?, "listening");

    Server::new(handler, config).run(&mut acceptor).await?;
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    tracing::subscriber::set_global_default(
        FmtSubscriber::builder().with_max_level(args.log_level).finish(),
    )?;

    match &args.repository {
        Some(path) => {
            let repo = SqliteRepository::open(path)
                .with_context(|| format!("opening repository {}", path.display()))?;
            serve(Arc::new(repo), &args).await
        }
        None => serve(Arc::new(MemoryRepository::new()), &args).await,
    }
}
