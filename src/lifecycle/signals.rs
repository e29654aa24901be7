//! OS signal handling.
//!
//! # Responsibilities
//! - Register handlers for SIGHUP, SIGTERM and SIGINT
//! - Translate signals into `ControlEvent`s for the main loop
//!
//! # Design Decisions
//! - Uses Tokio's signal handling (async-safe)
//! - Only the main loop consumes events; workers observe control bits
//! - SIGHUP triggers config reload, not shutdown

use std::io;
use tokio::signal::unix::{signal, Signal, SignalKind};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// What the main loop is asked to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlEvent {
    Reload,
    Shutdown,
}

/// Installed signal streams.
pub struct SignalListener {
    hangup: Signal,
    terminate: Signal,
    interrupt: Signal,
}

impl SignalListener {
    pub fn install() -> io::Result<Self> {
        Ok(Self {
            hangup: signal(SignalKind::hangup())?,
            terminate: signal(SignalKind::terminate())?,
            interrupt: signal(SignalKind::interrupt())?,
        })
    }

    /// Wait for the next signal we care about.
    pub async fn recv(&mut self) -> ControlEvent {
        tokio::select! {
            _ = self.hangup.recv() => {
                tracing::info!(signal = "SIGHUP", "Reload requested");
                ControlEvent::Reload
            }
            _ = self.terminate.recv() => {
                tracing::info!(signal = "SIGTERM", "Shutdown requested");
                ControlEvent::Shutdown
            }
            _ = self.interrupt.recv() => {
                tracing::info!(signal = "SIGINT", "Shutdown requested");
                ControlEvent::Shutdown
            }
        }
    }
}

/// Install handlers and forward every signal to `events` until the
/// receiver goes away.
pub fn forward_signals(events: mpsc::UnboundedSender<ControlEvent>) -> io::Result<JoinHandle<()>> {
    let mut listener = SignalListener::install()?;
    Ok(tokio::spawn(async move {
        loop {
            let event = listener.recv().await;
            if events.send(event).is_err() {
                break;
            }
        }
    }))
}
