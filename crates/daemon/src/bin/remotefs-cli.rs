//! remotefs-cli: quick inspections of the remote view without a daemon,
//! plus a `serve` subcommand that runs the IPC server in the foreground.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use remotefs_daemon::cli::op::{Op, OpContext};
use remotefs_daemon::cli::ops;
use remotefs_daemon::cli::StoreArgs;
use remotefs_daemon::{process, serve, IpcServer, Transport};

#[derive(Parser, Debug)]
#[command(name = "remotefs-cli", version, about)]
struct Args {
    #[command(flatten)]
    store: StoreArgs,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print metadata for a local path
    Stat(ops::stat::Stat),
    /// List a local directory
    Ls(ops::ls::Ls),
    /// Print the content of a local file path
    Cat(ops::cat::Cat),
    /// Run the IPC server in the foreground
    Serve {
        /// Unix domain socket path (takes precedence over --listen)
        #[arg(long)]
        socket: Option<PathBuf>,
        /// TCP listen address when --socket is empty
        #[arg(long, default_value = "127.0.0.1:8484")]
        listen: SocketAddr,
    },
}

async fn run_op<O: Op>(op: &O, ctx: &OpContext) -> ExitCode {
    match op.execute(ctx).await {
        Ok(output) => {
            let rendered = output.to_string();
            println!("{}", rendered.trim_end_matches('\n'));
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("{e}");
            ExitCode::FAILURE
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .init();

    let args = Args::parse();
    let fs = match args.store.open() {
        Ok(fs) => fs,
        Err(e) => {
            eprintln!("{e}");
            return ExitCode::FAILURE;
        }
    };
    let ctx = OpContext {
        fs: fs.clone(),
        timeout: args.store.timeout(),
    };

    match &args.command {
        Command::Stat(op) => run_op(op, &ctx).await,
        Command::Ls(op) => run_op(op, &ctx).await,
        Command::Cat(op) => run_op(op, &ctx).await,
        Command::Serve { socket, listen } => {
            let server = Arc::new(IpcServer::new(fs));
            let transport = match socket {
                Some(path) => Transport::Unix(path.clone()),
                None => Transport::Tcp(*listen),
            };
            let shutdown = process::shutdown_token();
            match serve(server, transport, shutdown).await {
                Ok(()) => ExitCode::SUCCESS,
                Err(e) => {
                    eprintln!("serve: {e}");
                    ExitCode::FAILURE
                }
            }
        }
    }
}
