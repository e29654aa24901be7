//! Startup orchestration and the main control loop.
//!
//! # Responsibilities
//! - Perform the initial config load (fatal on failure)
//! - Build the worker pool and start the stats reporter
//! - Apply reloads: re-shape the pool and restart the reporter
//! - Shut down in order when asked, or when a worker dies
//!
//! # Design Decisions
//! - Fail fast: a rejected initial config aborts startup
//! - The reporter is restarted on every effective reload so it picks up a
//!   new sink address; the RELOADING bit marks that exit as intentional
//! - A reporter exit nobody asked for stops the whole process with failure

use std::io;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc;

use crate::config::reload::{ReloadController, ReloadError};
use crate::config::schema::SharedConfig;
use crate::config::validation::{validate_config, ValidationError};
use crate::lifecycle::control::ControlBits;
use crate::lifecycle::signals::ControlEvent;
use crate::observability::LogRouting;
use crate::pool::{BlobStats, WorkerPool};
use crate::telemetry::{ReporterExit, StatsReporter};
use crate::worker::WorkerHandle;

#[derive(Debug, Error)]
pub enum StartupError {
    #[error(transparent)]
    Reload(#[from] ReloadError),

    #[error("invalid configuration: {} problem(s)", .0.len())]
    Invalid(Vec<ValidationError>),

    #[error("failed to install signal handlers: {0}")]
    Signals(#[source] io::Error),

    #[error("failed to watch config file: {0}")]
    Watcher(#[source] notify::Error),
}

/// How the main loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// Shutdown was requested.
    Clean,
    /// A worker died and the process stopped because of it.
    WorkerDied,
}

/// The running relay control plane.
pub struct Relay {
    config: SharedConfig,
    control: Arc<ControlBits>,
    pool: Arc<WorkerPool>,
    blobs: Arc<BlobStats>,
    reloader: Option<Arc<ReloadController>>,
    hostname: Option<String>,
}

impl Relay {
    /// Load and check the initial configuration and build the pool.
    ///
    /// A config bound to a file goes through a full reload; one given
    /// directly is only validated.
    pub fn start(config: SharedConfig, router: Arc<dyn LogRouting>) -> Result<Self, StartupError> {
        let reloader = if config.load().file.is_some() {
            let reloader = Arc::new(ReloadController::new(config.clone(), router));
            reloader.reload()?;
            Some(reloader)
        } else {
            validate_config(&config.load().snapshot).map_err(StartupError::Invalid)?;
            None
        };

        let live = config.load_full();
        live.snapshot.dump();
        let pool = Arc::new(WorkerPool::from_forwards(live.snapshot.forwards()));
        tracing::info!(
            generation = live.generation,
            forwards = pool.len(),
            "Relay started"
        );

        Ok(Self {
            config,
            control: Arc::new(ControlBits::new()),
            pool,
            blobs: Arc::new(BlobStats::new()),
            reloader,
            hostname: None,
        })
    }

    /// Report under `hostname` instead of the real host name.
    pub fn with_hostname(mut self, hostname: impl Into<String>) -> Self {
        self.hostname = Some(hostname.into());
        self
    }

    pub fn config(&self) -> &SharedConfig {
        &self.config
    }

    pub fn control(&self) -> &Arc<ControlBits> {
        &self.control
    }

    pub fn pool(&self) -> &Arc<WorkerPool> {
        &self.pool
    }

    pub fn blobs(&self) -> &Arc<BlobStats> {
        &self.blobs
    }

    fn spawn_reporter(&self) -> WorkerHandle<ReporterExit> {
        let mut reporter = StatsReporter::new(
            self.config.clone(),
            self.pool.clone(),
            self.blobs.clone(),
            self.control.clone(),
        );
        if let Some(hostname) = &self.hostname {
            reporter = reporter.with_hostname(hostname.clone());
        }
        Arc::new(reporter).spawn()
    }

    /// Run until a shutdown event arrives, the event source closes, or the
    /// reporter dies.
    pub async fn run(self, mut events: mpsc::UnboundedReceiver<ControlEvent>) -> RunOutcome {
        let mut reporter = self.spawn_reporter();

        let outcome = loop {
            tokio::select! {
                event = events.recv() => match event {
                    Some(ControlEvent::Reload) => self.reload(&mut reporter).await,
                    Some(ControlEvent::Shutdown) | None => break RunOutcome::Clean,
                },
                _ = reporter.exited() => {
                    tracing::error!(
                        worker = reporter.name(),
                        "Worker exited unexpectedly, stopping"
                    );
                    break RunOutcome::WorkerDied;
                }
            }
        };

        self.shutdown(&reporter).await;
        outcome
    }

    async fn reload(&self, reporter: &mut WorkerHandle<ReporterExit>) {
        let Some(reloader) = self.reloader.clone() else {
            tracing::warn!("Reload requested, but the config did not come from a file");
            return;
        };

        let changed = match tokio::task::spawn_blocking(move || reloader.reload()).await {
            Ok(Ok(changed)) => changed,
            Ok(Err(e)) => {
                tracing::error!(error = %e, "Reload failed");
                return;
            }
            Err(e) => {
                tracing::error!(error = %e, "Reload task failed");
                return;
            }
        };
        if !changed {
            return;
        }

        self.control.set(ControlBits::RELOADING);

        let live = self.config.load_full();
        let reconciled = self.pool.reconcile(live.snapshot.forwards());
        tracing::info!(
            generation = live.generation,
            added = reconciled.added.len(),
            removed = reconciled.removed.len(),
            "Applied reloaded config"
        );

        reporter.destroy().await;
        *reporter = self.spawn_reporter();

        self.control.unset(ControlBits::RELOADING);
    }

    async fn shutdown(&self, reporter: &WorkerHandle<ReporterExit>) {
        self.control.set(ControlBits::STOPPING);
        tracing::info!("Stopping relay");

        match reporter.destroy().await {
            Some(ReporterExit::Died) => tracing::warn!(worker = reporter.name(), "Worker had died"),
            Some(ReporterExit::Stopped) | None => {}
        }

        self.control.set_stopped();
        tracing::info!("Relay stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::{shared, RuntimeConfig};
    use crate::observability::LogRouter;

    fn router() -> Arc<dyn LogRouting> {
        Arc::new(LogRouter::new(true))
    }

    #[test]
    fn test_invalid_direct_config_fails_startup() {
        let config = shared(RuntimeConfig::from_addresses(vec!["udp@0.0.0.0:1".into()]));
        let err = Relay::start(config, router()).err().unwrap();
        assert!(matches!(
            err,
            StartupError::Invalid(ref errors) if errors.contains(&ValidationError::MissingForwards)
        ));
    }

    #[test]
    fn test_missing_file_fails_startup() {
        let config = shared(RuntimeConfig::from_file("/definitely/not/here/relay.conf"));
        let err = Relay::start(config, router()).err().unwrap();
        assert!(matches!(err, StartupError::Reload(ReloadError::Fatal(_))));
    }

    #[tokio::test]
    async fn test_shutdown_event_stops_cleanly() {
        let mut runtime = RuntimeConfig::from_addresses(vec![
            "udp@0.0.0.0:10000".into(),
            "127.0.0.1:2000".into(),
        ]);
        runtime.snapshot.spillway_root = std::env::temp_dir().to_string_lossy().into_owned();
        // Nothing listens on port 1; the reporter keeps retrying.
        runtime.snapshot.telemetry.addr = "127.0.0.1:1".into();

        let relay = Relay::start(shared(runtime), router()).unwrap();
        let control = relay.control().clone();
        assert_eq!(relay.pool().len(), 1);

        let (tx, rx) = mpsc::unbounded_channel();
        let run = tokio::spawn(relay.run(rx));
        tx.send(ControlEvent::Reload).unwrap();
        tx.send(ControlEvent::Shutdown).unwrap();

        assert_eq!(run.await.unwrap(), RunOutcome::Clean);
        assert!(control.is_stopped());
    }
}
