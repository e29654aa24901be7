//! event-relay
//!
//! Control plane of a UDP-to-TCP event relay: loads and hot-reloads the
//! configuration, keeps the forward destination pool in shape and reports
//! relay statistics to a telemetry sink.
//!
//! # Architecture Overview
//!
//! ```text
//!   SIGHUP / config watcher           SIGTERM / SIGINT
//!            │                               │
//!            ▼                               ▼
//!   ┌──────────────────────── main loop (lifecycle) ───────────────────────┐
//!   │  ReloadController ──▶ SharedConfig (ArcSwap) ──▶ WorkerPool::reconcile │
//!   │        │                     │                                       │
//!   │        ▼                     ▼                                       │
//!   │   backup file         StatsReporter (periodic worker)                │
//!   │                              │                                       │
//!   └──────────────────────────────┼───────────────────────────────────────┘
//!                                  ▼
//!                           telemetry sink
//! ```

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use tokio::sync::mpsc;

use event_relay::config::{shared, ConfigWatcher, RuntimeConfig};
use event_relay::lifecycle::{forward_signals, ControlEvent, Relay, RunOutcome, StartupError};
use event_relay::observability::{init_logging, LogRouter};

#[derive(Parser)]
#[command(name = "event-relay")]
#[command(about = "Relay events from a UDP listener to TCP destinations", version)]
struct Cli {
    /// Config file; enables reload on SIGHUP
    #[arg(short, long, conflicts_with = "addresses")]
    config: Option<PathBuf>,

    /// Also reload when the config file changes
    #[arg(short, long, requires = "config")]
    watch: bool,

    /// Listener address followed by one or more forward addresses
    #[arg(required_unless_present = "config")]
    addresses: Vec<String>,
}

#[tokio::main]
async fn main() -> Result<ExitCode, Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let router = LogRouter::new(true);
    init_logging(&router);
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "event-relay starting");

    match run(cli, router).await {
        Ok(RunOutcome::Clean) => Ok(ExitCode::SUCCESS),
        Ok(RunOutcome::WorkerDied) => Ok(ExitCode::FAILURE),
        Err(e) => {
            tracing::error!(error = %e, "Startup failed");
            Err(e.into())
        }
    }
}

async fn run(cli: Cli, router: LogRouter) -> Result<RunOutcome, StartupError> {
    let runtime = match &cli.config {
        Some(path) => RuntimeConfig::from_file(path),
        None => RuntimeConfig::from_addresses(cli.addresses),
    };
    let relay = Relay::start(shared(runtime), Arc::new(router))?;

    let (events_tx, events_rx) = mpsc::unbounded_channel();
    forward_signals(events_tx.clone()).map_err(StartupError::Signals)?;

    // Kept alive for the lifetime of the main loop.
    let _watcher = match (&cli.config, cli.watch) {
        (Some(path), true) => {
            let (watcher, mut requests) = ConfigWatcher::new(path);
            let watcher = watcher.run().map_err(StartupError::Watcher)?;
            let tx = events_tx.clone();
            tokio::spawn(async move {
                while requests.recv().await.is_some() {
                    if tx.send(ControlEvent::Reload).is_err() {
                        break;
                    }
                }
            });
            Some(watcher)
        }
        _ => None,
    };
    drop(events_tx);

    let outcome = relay.run(events_rx).await;
    tracing::info!(?outcome, "Shutdown complete");
    Ok(outcome)
}
