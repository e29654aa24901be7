//! Structured logging with a switchable destination.
//!
//! # Responsibilities
//! - Initialize the tracing subscriber
//! - Route log lines to stderr or stdout according to `log_to_stderr`
//! - Re-route at runtime when a reload flips the flag
//!
//! # Design Decisions
//! - Uses tracing crate for structured logging
//! - Level comes from `RUST_LOG`, default `event_relay=info`
//! - Routing is one atomic flag read per line; no subscriber rebuild

use std::io::{self, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Something that can re-open the log destination.
pub trait LogRouting: Send + Sync {
    /// Send subsequent log lines to stderr (`true`) or stdout (`false`).
    fn reopen(&self, to_stderr: bool);
}

/// `MakeWriter` that picks stderr or stdout per line.
#[derive(Debug, Clone)]
pub struct LogRouter {
    to_stderr: Arc<AtomicBool>,
}

impl LogRouter {
    pub fn new(to_stderr: bool) -> Self {
        Self {
            to_stderr: Arc::new(AtomicBool::new(to_stderr)),
        }
    }

    pub fn to_stderr(&self) -> bool {
        self.to_stderr.load(Ordering::Acquire)
    }
}

impl LogRouting for LogRouter {
    fn reopen(&self, to_stderr: bool) {
        self.to_stderr.store(to_stderr, Ordering::Release);
    }
}

/// Writer handed out by `LogRouter`.
pub enum RoutedWriter {
    Stdout(io::Stdout),
    Stderr(io::Stderr),
}

impl Write for RoutedWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            RoutedWriter::Stdout(w) => w.write(buf),
            RoutedWriter::Stderr(w) => w.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            RoutedWriter::Stdout(w) => w.flush(),
            RoutedWriter::Stderr(w) => w.flush(),
        }
    }
}

impl<'a> MakeWriter<'a> for LogRouter {
    type Writer = RoutedWriter;

    fn make_writer(&'a self) -> Self::Writer {
        if self.to_stderr() {
            RoutedWriter::Stderr(io::stderr())
        } else {
            RoutedWriter::Stdout(io::stdout())
        }
    }
}

/// Install the global subscriber writing through `router`.
///
/// Returns `false` if a subscriber was already installed.
pub fn init_logging(router: &LogRouter) -> bool {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "event_relay=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(router.clone()))
        .try_init()
        .is_ok()
}
