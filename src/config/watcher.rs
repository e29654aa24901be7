//! Config file watcher.
//!
//! Turns modifications of the config file into reload requests for the
//! main loop, the same way SIGHUP does. The watcher never loads anything
//! itself; loading, validation and merging stay in `ReloadController`.

use std::path::{Path, PathBuf};
use std::time::Duration;
use notify::{Config, Event, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;

/// A reload request raised by a file change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReloadRequest;

/// Watches one config file.
pub struct ConfigWatcher {
    path: PathBuf,
    request_tx: mpsc::UnboundedSender<ReloadRequest>,
}

impl ConfigWatcher {
    /// Returns the watcher and the receiving end of its reload requests.
    pub fn new(path: &Path) -> (Self, mpsc::UnboundedReceiver<ReloadRequest>) {
        let (request_tx, request_rx) = mpsc::unbounded_channel();
        (
            Self {
                path: path.to_path_buf(),
                request_tx,
            },
            request_rx,
        )
    }

    /// Start watching. Dropping the returned watcher stops it.
    pub fn run(self) -> Result<RecommendedWatcher, notify::Error> {
        let tx = self.request_tx;
        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| match res {
                Ok(event) if event.kind.is_modify() || event.kind.is_create() => {
                    tracing::info!(paths = ?event.paths, "Config file change detected");
                    // The main loop is gone when the receiver is closed.
                    let _ = tx.send(ReloadRequest);
                }
                Ok(_) => {}
                Err(e) => tracing::error!(error = %e, "Config watch error"),
            },
            Config::default().with_poll_interval(Duration::from_secs(2)),
        )?;

        watcher.watch(&self.path, RecursiveMode::NonRecursive)?;
        tracing::info!(path = %self.path.display(), "Config watcher started");
        Ok(watcher)
    }
}
