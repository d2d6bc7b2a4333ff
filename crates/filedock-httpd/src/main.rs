#![deny(unsafe_code)]

use std::io;
use std::net::IpAddr;
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use filedock_httpd::{FiledockServer, ServerConfig};

/// HTTP backend for single-root file management
#[derive(Parser)]
#[command(name = "filedockd")]
#[command(author, version)]
#[command(after_help = "EXAMPLES:
    # Serve the current directory on an auto-assigned port
    filedockd --root .

    # Serve /srv/files on port 8080 with request signing
    FILEDOCK_SECRET=s3cret filedockd --root /srv/files --port 8080
")]
struct Cli {
    /// Base directory all client paths resolve under
    #[arg(long, env = "FILEDOCK_ROOT", default_value = ".")]
    root: PathBuf,

    /// Bind address
    #[arg(long, default_value = "127.0.0.1")]
    bind: IpAddr,

    /// Port to bind to (0 = auto-assign)
    #[arg(short, long, default_value_t = 0)]
    port: u16,

    /// Shared signing secret (empty disables verification)
    #[arg(long, env = "FILEDOCK_SECRET", hide_env_values = true)]
    secret: Option<String>,

    /// Do not emit CORS headers
    #[arg(long)]
    no_cors: bool,

    /// Disable GET ?file= content serving
    #[arg(long)]
    no_file_serving: bool,

    /// Chunk size in bytes for copy and range streaming
    #[arg(long, default_value_t = filedock_core::ops::DEFAULT_CHUNK_SIZE)]
    chunk_size: usize,

    /// Verbosity level (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    setup_tracing(cli.verbose);

    let root = cli
        .root
        .canonicalize()
        .with_context(|| format!("cannot resolve root '{}'", cli.root.display()))?;
    if !root.is_dir() {
        bail!("root '{}' is not a directory", root.display());
    }

    let config = ServerConfig {
        bind_address: cli.bind,
        port: cli.port,
        root,
        secret: cli.secret,
        cors_enabled: !cli.no_cors,
        file_serving: !cli.no_file_serving,
        chunk_size: cli.chunk_size,
    };

    let server = FiledockServer::start(config)
        .await
        .context("failed to start server")?;
    info!(url = %server.url(), "Serving");

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for shutdown signal")?;
    server.stop().await;
    Ok(())
}

fn setup_tracing(verbose: u8) {
    let filter = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into()))
        .with_writer(io::stderr)
        .init();
}
