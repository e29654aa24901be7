//! Periodic worker lifecycle.
//!
//! # States
//! ```text
//! Created → Running → Stopping → Stopped
//! ```
//! `Stopped` is terminal. A worker body observes `Stopping` at the head of
//! its loop and inside every `WorkerContext::wait`.
//!
//! `WorkerHandle::destroy` may be called from several places at once (e.g.
//! a reload restarting the worker while shutdown tears everything down).
//! Exactly one caller wins the `→ Stopping` transition and joins the task;
//! everyone else returns immediately.

use std::future::Future;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Lifecycle state of a worker.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum WorkerState {
    Created = 0,
    Running = 1,
    Stopping = 2,
    Stopped = 3,
}

impl From<u8> for WorkerState {
    fn from(val: u8) -> Self {
        match val {
            0 => WorkerState::Created,
            1 => WorkerState::Running,
            2 => WorkerState::Stopping,
            _ => WorkerState::Stopped,
        }
    }
}

/// Atomic stop indicator shared between a handle and its task.
#[derive(Debug)]
pub struct StopState(AtomicU8);

impl StopState {
    pub fn new() -> Self {
        Self(AtomicU8::new(WorkerState::Created as u8))
    }

    pub fn get(&self) -> WorkerState {
        WorkerState::from(self.0.load(Ordering::Acquire))
    }

    pub fn is_stopping(&self) -> bool {
        self.get() >= WorkerState::Stopping
    }

    fn start(&self) -> bool {
        self.0
            .compare_exchange(
                WorkerState::Created as u8,
                WorkerState::Running as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok()
    }

    /// Move to `Stopping` unless already there or beyond.
    ///
    /// Returns `true` only for the caller that made the transition.
    pub fn claim_stop(&self) -> bool {
        self.0
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
                (current < WorkerState::Stopping as u8).then_some(WorkerState::Stopping as u8)
            })
            .is_ok()
    }

    fn mark_stopped(&self) {
        self.0.store(WorkerState::Stopped as u8, Ordering::Release);
    }
}

impl Default for StopState {
    fn default() -> Self {
        Self::new()
    }
}

/// The worker-side view of its own lifecycle.
#[derive(Debug, Clone)]
pub struct WorkerContext {
    state: Arc<StopState>,
}

impl WorkerContext {
    /// A context that is not owned by any handle and never stops on its own.
    ///
    /// Useful for running a worker body inline.
    pub fn detached() -> Self {
        let state = StopState::new();
        state.start();
        Self { state: Arc::new(state) }
    }

    pub fn is_stopping(&self) -> bool {
        self.state.is_stopping()
    }

    /// Sleep for `total`, in chunks of at most `granularity`, returning early
    /// once a stop is requested.
    ///
    /// Returns `true` when the full duration elapsed without a stop request.
    pub async fn wait(&self, total: Duration, granularity: Duration) -> bool {
        let chunk = granularity.max(Duration::from_millis(1));
        let mut remaining = total;

        while !remaining.is_zero() {
            if self.is_stopping() {
                return false;
            }
            let step = remaining.min(chunk);
            tokio::time::sleep(step).await;
            remaining -= step;
        }

        !self.is_stopping()
    }
}

/// Owner of a running periodic worker.
pub struct WorkerHandle<T> {
    name: &'static str,
    state: Arc<StopState>,
    task: Mutex<Option<JoinHandle<T>>>,
    exited: watch::Receiver<bool>,
}

impl<T: Send + 'static> WorkerHandle<T> {
    /// Spawn `body` on the tokio runtime and move the worker to `Running`.
    pub fn spawn<F, Fut>(name: &'static str, body: F) -> Self
    where
        F: FnOnce(WorkerContext) -> Fut,
        Fut: Future<Output = T> + Send + 'static,
    {
        let state = Arc::new(StopState::new());
        state.start();

        let ctx = WorkerContext { state: state.clone() };
        let (exited_tx, exited) = watch::channel(false);
        let fut = body(ctx);

        let task = tokio::spawn(async move {
            let output = fut.await;
            let _ = exited_tx.send(true);
            output
        });

        tracing::debug!(worker = name, "Worker started");

        Self {
            name,
            state,
            task: Mutex::new(Some(task)),
            exited,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn state(&self) -> WorkerState {
        self.state.get()
    }

    /// Wait until the worker body has returned, for whatever reason.
    pub async fn exited(&self) {
        let mut rx = self.exited.clone();
        // An error means the sender is gone, which only happens after exit.
        let _ = rx.wait_for(|done| *done).await;
    }

    /// Stop the worker and wait for its task to finish.
    ///
    /// Returns the task output to the one caller that performed the stop.
    /// Concurrent or repeated callers get `None` without waiting.
    pub async fn destroy(&self) -> Option<T> {
        if !self.state.claim_stop() {
            tracing::debug!(worker = self.name, "Worker already stopping");
            return None;
        }

        let task = self
            .task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();

        let output = match task {
            Some(task) => match task.await {
                Ok(output) => Some(output),
                Err(e) => {
                    tracing::error!(worker = self.name, error = %e, "Worker task failed");
                    None
                }
            },
            None => None,
        };

        self.state.mark_stopped();
        tracing::debug!(worker = self.name, "Worker stopped");
        output
    }
}

impl<T> Drop for WorkerHandle<T> {
    fn drop(&mut self) {
        // The detached task notices this at its next check and exits.
        self.state.claim_stop();
    }
}
