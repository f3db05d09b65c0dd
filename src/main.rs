use anyhow::{Context, Result};
use clap::Parser;
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod chat_log;
mod config;
mod delivery;
mod error;
mod notifier;
mod relay;

use crate::chat_log::{watcher, AiTool};
use crate::config::{Destination, DestinationConfig};
use crate::delivery::DedupGuard;
use crate::relay::Relay;

#[derive(Parser, Debug)]
#[command(name = "transcript-relay")]
#[command(about = "Forward AI coding assistant conversations to team chat in real time", long_about = None)]
struct Args {
    /// Assistant whose transcripts are watched
    #[arg(long, value_enum, env = "RELAY_SOURCE", default_value_t = AiTool::Claude)]
    source: AiTool,

    /// Chat system that receives the messages
    #[arg(long, value_enum, env = "RELAY_DESTINATION", default_value_t = Destination::Zulip)]
    destination: Destination,

    /// Transcript directory (defaults to the assistant's storage location)
    #[arg(long, env = "RELAY_WATCH_ROOT")]
    watch_root: Option<String>,

    /// Forget the oldest sent-message fingerprints beyond this many
    #[arg(long, env = "RELAY_DEDUP_CAPACITY")]
    dedup_capacity: Option<usize>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "transcript_relay=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let destination = match DestinationConfig::from_env(args.destination, args.source) {
        Ok(destination) => destination,
        Err(e) => {
            error!("Missing {:?} configuration: {e}", args.destination);
            error!("Set these environment variables:");
            for var in config::expected_vars(args.destination, args.source) {
                error!("  {var}");
            }
            return Ok(());
        }
    };

    let root = match config::watch_root(args.source, args.watch_root.as_deref()) {
        Ok(root) => root,
        Err(e) => {
            error!("Cannot resolve watch directory: {e}; pass --watch-root");
            return Ok(());
        }
    };

    if !root.exists() {
        std::fs::create_dir_all(&root)
            .with_context(|| format!("failed to create {}", root.display()))?;
        warn!("Watch directory did not exist, created: {}", root.display());
    }
    let root = root.canonicalize().unwrap_or(root);

    info!("Watching {} for {:?} conversations...", root.display(), args.source);
    info!("Sending to: {}", destination.describe());

    let notifier = notifier::from_config(&destination, args.source);
    let mut relay = Relay::new(
        root.clone(),
        args.source,
        notifier,
        DedupGuard::new(args.dedup_capacity),
    );

    let (watcher, mut events) =
        watcher::watch_root(&root).context("failed to start file watcher")?;

    relay.run(&mut events, shutdown_signal()).await;

    drop(watcher);
    info!("File watch released, exiting");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                error!("Failed to install signal handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down gracefully...");
        },
        _ = terminate => {
            info!("Received terminate signal, shutting down gracefully...");
        },
    }
}
