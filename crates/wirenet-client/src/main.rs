//! wirenet demo chat client entry point.
//!
//! ```text
//! wirenet-client ping --count 3
//! wirenet-client message-all --name ada --age 36
//! wirenet-client --host 10.0.0.7 --max-retries 5 --retry-wait-ms 1000 listen
//! ```
//!
//! Incoming messages are handled on a dispatch thread and forwarded to the
//! async main task over a channel.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use tokio::sync::mpsc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use wirenet_client::application::chat::{self, ChatEvent, Greeting};
use wirenet_client::{ClientConfig, ClientInterface};
use wirenet_core::protocol::ChatKind;
use wirenet_core::{ErrorKind, OwnedMessage};

#[derive(Debug, Parser)]
#[command(name = "wirenet-client", version, about = "wirenet demo chat client")]
struct Args {
    /// Path to a TOML config file. Missing files fall back to defaults.
    #[arg(short, long, env = "WIRENET_CLIENT_CONFIG", default_value = "wirenet-client.toml")]
    config: PathBuf,

    /// Server host, overriding the config file.
    #[arg(long, env = "WIRENET_HOST")]
    host: Option<String>,

    /// Server port, overriding the config file.
    #[arg(short, long, env = "WIRENET_PORT")]
    port: Option<u16>,

    /// Extra connect attempts, overriding the config file.
    #[arg(long)]
    max_retries: Option<u32>,

    /// Milliseconds between connect attempts, overriding the config file.
    #[arg(long)]
    retry_wait_ms: Option<u64>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Measure round-trip time to the server.
    Ping {
        #[arg(short = 'n', long, default_value_t = 1)]
        count: u32,
        #[arg(long, default_value_t = 1000)]
        interval_ms: u64,
    },
    /// Send a greeting to every other connected client.
    MessageAll {
        #[arg(long)]
        name: String,
        #[arg(long)]
        age: u32,
        /// How long to keep printing incoming messages afterwards.
        #[arg(long, default_value_t = 500)]
        linger_ms: u64,
    },
    /// Print messages from other clients until Ctrl-C.
    Listen,
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

    let mut config = ClientConfig::load_from(&args.config)
        .with_context(|| format!("loading {}", args.config.display()))?;
    if let Some(host) = args.host {
        config.host = host;
    }
    if let Some(port) = args.port {
        config.port = port;
    }
    if let Some(max_retries) = args.max_retries {
        config.max_retries = max_retries;
    }
    if let Some(retry_wait_ms) = args.retry_wait_ms {
        config.retry_wait_ms = retry_wait_ms;
    }

    let client = ClientInterface::<ChatKind>::with_hook(config.retry_policy(), |kind: ErrorKind| {
        warn!("server connection lost: {kind}");
    })
    .context("starting client")?;
    client
        .connect(&config.host, config.port)
        .await
        .with_context(|| format!("connecting to {}:{}", config.host, config.port))?;

    let (events_tx, mut events) = mpsc::unbounded_channel();
    let dispatcher = client
        .start_dispatch(move |owned: OwnedMessage<ChatKind>| {
            match chat::interpret(owned.message, chat::now_micros()) {
                Ok(event) => {
                    let _ = events_tx.send(event);
                }
                Err(e) => warn!("unreadable message from server: {e}"),
            }
        })
        .context("starting dispatch thread")?;

    match args.command {
        Command::Ping { count, interval_ms } => {
            for seq in 1..=count {
                client.send(chat::ping_message(chat::now_micros()))?;
                match tokio::time::timeout(Duration::from_secs(5), next_pong(&mut events)).await {
                    Ok(Some(round_trip)) => info!(seq, "ping: {round_trip:?}"),
                    Ok(None) => bail!("server connection closed"),
                    Err(_) => warn!(seq, "ping timed out"),
                }
                if seq < count {
                    tokio::time::sleep(Duration::from_millis(interval_ms)).await;
                }
            }
        }
        Command::MessageAll { name, age, linger_ms } => {
            client.send(chat::message_all(&Greeting { name, age })?)?;
            info!("message sent to all clients");
            let linger = tokio::time::sleep(Duration::from_millis(linger_ms));
            tokio::pin!(linger);
            loop {
                tokio::select! {
                    _ = &mut linger => break,
                    event = events.recv() => match event {
                        Some(event) => report(event),
                        None => break,
                    },
                }
            }
        }
        Command::Listen => loop {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => break,
                event = events.recv() => match event {
                    Some(event) => report(event),
                    None => break,
                },
            }
        },
    }

    client.disconnect();
    // Dispatch drains whatever is still queued before it stops.
    tokio::task::spawn_blocking(move || dispatcher.shutdown())
        .await
        .context("joining dispatch thread")??;
    Ok(())
}

async fn next_pong(events: &mut mpsc::UnboundedReceiver<ChatEvent>) -> Option<Duration> {
    while let Some(event) = events.recv().await {
        match event {
            ChatEvent::Pong { round_trip } => return Some(round_trip),
            other => report(other),
        }
    }
    None
}

fn report(event: ChatEvent) {
    match event {
        ChatEvent::Pong { round_trip } => info!("pong: {round_trip:?}"),
        ChatEvent::Relayed { sender, body } => info!("hello from [{sender}]: {body}"),
        ChatEvent::Unexpected(kind) => warn!("unexpected {kind:?} from server"),
    }
}
