//! wirenet demo chat server entry point.
//!
//! Loads `ServerConfig` from a TOML file (if present), applies command-line
//! overrides, starts the server with the chat handler, and runs until Ctrl-C.
//!
//! ```text
//! wirenet-server --port 5050 --threads 4
//! RUST_LOG=debug wirenet-server --config server.toml
//! ```

use std::net::IpAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use wirenet_core::protocol::ChatKind;
use wirenet_server::application::chat::ChatServer;
use wirenet_server::{Server, ServerConfig};

#[derive(Debug, Parser)]
#[command(name = "wirenet-server", version, about = "wirenet demo chat server")]
struct Args {
    /// Path to a TOML config file. Missing files fall back to defaults.
    #[arg(short, long, env = "WIRENET_SERVER_CONFIG", default_value = "wirenet-server.toml")]
    config: PathBuf,

    /// Address to bind, overriding the config file.
    #[arg(long, env = "WIRENET_BIND")]
    bind: Option<IpAddr>,

    /// Port to listen on, overriding the config file.
    #[arg(short, long, env = "WIRENET_PORT")]
    port: Option<u16>,

    /// Number of I/O reactor threads, overriding the config file.
    #[arg(short, long, env = "WIRENET_THREADS")]
    threads: Option<usize>,

    /// Write the effective configuration back to `--config` and continue.
    #[arg(long)]
    save_config: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialise structured logging.  Level is overridden by `RUST_LOG`.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    let mut config = ServerConfig::load_from(&args.config)
        .with_context(|| format!("loading {}", args.config.display()))?;
    if let Some(bind) = args.bind {
        config.bind_address = bind;
    }
    if let Some(port) = args.port {
        config.port = port;
    }
    if args.threads.is_some() {
        config.reactor_threads = args.threads;
    }
    if args.save_config {
        config
            .save_to(&args.config)
            .with_context(|| format!("saving {}", args.config.display()))?;
        info!("configuration written to {}", args.config.display());
    }

    info!("wirenet server starting on {}", config.socket_addr());

    let chat = Arc::new(ChatServer::new());
    let server = match Server::<ChatKind>::new(config, chat.clone()).start() {
        Ok(server) => server,
        Err(e) => {
            error!("failed to start server: {e}");
            return Err(e).context("starting server");
        }
    };
    info!("listening on {}", server.local_addr());

    server.wait_for_signal().await.context("server stopped")?;

    info!(
        pings = chat.pings(),
        relayed = chat.relayed(),
        "wirenet server stopped"
    );
    Ok(())
}
