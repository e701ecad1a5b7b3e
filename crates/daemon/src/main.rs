//! remotefs-daemon: long-lived process exposing the remote view over
//! `/stat`, `/ls`, and `/cat` on a Unix socket or TCP loopback address.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::EnvFilter;

use remotefs_daemon::cli::StoreArgs;
use remotefs_daemon::{process, serve, IpcServer, Transport};

#[derive(Parser, Debug)]
#[command(name = "remotefs-daemon", version, about)]
struct Args {
    #[command(flatten)]
    store: StoreArgs,

    /// Unix domain socket path for IPC (takes precedence over --listen)
    #[arg(long)]
    socket: Option<PathBuf>,

    /// TCP listen address when --socket is empty
    #[arg(long, default_value = "127.0.0.1:8484")]
    listen: SocketAddr,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();
    let fs = args.store.open().context("initialize remotefs")?;

    // Serving before the snapshot exists would make every stat a network
    // round-trip; a warm failure is a startup failure.
    tokio::time::timeout(
        args.store.timeout(),
        fs.warm_metadata_cache(&CancellationToken::new()),
    )
    .await
    .context("metadata warm timed out")?
    .context("prime metadata cache")?;

    let server = Arc::new(IpcServer::new(fs));
    let transport = match args.socket {
        Some(path) => Transport::Unix(path),
        None => Transport::Tcp(args.listen),
    };
    let shutdown = process::shutdown_token();
    serve(server, transport, shutdown).await.context("serve")?;
    info!("daemon stopped");
    Ok(())
}
