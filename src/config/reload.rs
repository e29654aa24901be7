//! Reload engine.
//!
//! # Responsibilities
//! - Re-read and validate the config file on request
//! - Merge accepted settings into a copy of the live config and publish it
//! - Track generation and attempt/change/success times
//! - Back up the effective config after every change
//!
//! # Design Decisions
//! - One reload at a time; a concurrent caller blocks on the mutex
//! - Readers never see a half-merged config: the merge happens on a private
//!   copy that is published with a single `ArcSwap::store`
//! - A rejected first load is fatal; later rejections keep the live config

use std::sync::{Arc, Mutex, PoisonError};
use std::time::{SystemTime, UNIX_EPOCH};
use thiserror::Error;

use crate::config::loader::{load_config, ConfigError};
use crate::config::merge::merge_config;
use crate::config::persist::persist_config;
use crate::config::schema::{RuntimeConfig, SharedConfig};
use crate::observability::metrics::{record_persist_failure, record_reload};
use crate::observability::LogRouting;

#[derive(Debug, Error)]
pub enum ReloadError {
    #[error("initial configuration rejected: {0}")]
    Fatal(#[source] ConfigError),

    #[error("configuration did not come from a file; nothing to reload")]
    NoSource,
}

/// Current unix time in seconds.
pub fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// Applies config file changes to the shared live config.
pub struct ReloadController {
    config: SharedConfig,
    router: Arc<dyn LogRouting>,
    lock: Mutex<()>,
}

impl ReloadController {
    pub fn new(config: SharedConfig, router: Arc<dyn LogRouting>) -> Self {
        Self {
            config,
            router,
            lock: Mutex::new(()),
        }
    }

    pub fn config(&self) -> &SharedConfig {
        &self.config
    }

    /// Reload now. Returns whether any setting changed.
    pub fn reload(&self) -> Result<bool, ReloadError> {
        self.reload_at(unix_now())
    }

    /// Reload with `now` as the current unix time.
    pub fn reload_at(&self, now: u64) -> Result<bool, ReloadError> {
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);

        let current = self.config.load_full();
        let Some(path) = current.file.clone() else {
            return Err(ReloadError::NoSource);
        };
        let first_load = current.generation == 0;

        let mut next: RuntimeConfig = (*current).clone();
        next.epoch_attempt = now;

        let loaded = match load_config(&path) {
            Ok(loaded) => loaded,
            Err(err) if first_load => {
                tracing::error!(
                    file = %path.display(),
                    error = %err,
                    "Initial configuration rejected"
                );
                self.config.store(Arc::new(next));
                record_reload("fatal", 0);
                return Err(ReloadError::Fatal(err));
            }
            Err(err) => {
                tracing::warn!(
                    file = %path.display(),
                    error = %err,
                    generation = current.generation,
                    "Configuration rejected, keeping current settings"
                );
                let generation = next.generation;
                self.config.store(Arc::new(next));
                record_reload("rejected", generation);
                return Ok(false);
            }
        };

        let outcome = merge_config(&mut next.snapshot, loaded, first_load, self.router.as_ref());
        let changed = first_load || outcome.changed();
        if changed {
            next.generation += 1;
            next.epoch_changed = now;
        }
        next.epoch_success = now;

        let next = Arc::new(next);
        self.config.store(Arc::clone(&next));

        if changed {
            tracing::info!(
                generation = next.generation,
                fields = outcome.fields.len(),
                addresses = outcome.addresses.len(),
                "Configuration changed"
            );
            if persist_config(&next, now).is_err() {
                record_persist_failure();
            }
            record_reload("changed", next.generation);
        } else {
            tracing::info!(generation = next.generation, "Configuration unchanged");
            record_reload("unchanged", next.generation);
        }

        Ok(changed)
    }
}
