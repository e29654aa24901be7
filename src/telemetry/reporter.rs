//! Periodic stats reporter.
//!
//! # Responsibilities
//! - Drain forward counters from the pool once per interval
//! - Render them, buffer pool counters and process memory as telemetry lines
//! - Ship each report to the telemetry sink in a single write
//!
//! # Design Decisions
//! - The pool lock covers only the drain; formatting and I/O happen on the
//!   value snapshot
//! - A report that overflows its buffer is dropped whole
//! - Send failures reset the connection; the report is lost and the next
//!   cycle reconnects
//! - Settings are re-read from the live config every cycle, except the sink
//!   address, which is fixed for the lifetime of one reporter task

use std::sync::Arc;
use std::time::Duration;

use crate::config::reload::unix_now;
use crate::config::schema::{RuntimeConfig, SharedConfig};
use crate::lifecycle::control::ControlBits;
use crate::net::output::{OutputChannel, OutputError};
use crate::observability::metrics::record_report;
use crate::pool::{
    BlobStats, Counter, CounterSet, RateWindows, StatsSnapshot, WorkerPool, RATE_WINDOWS,
};
use crate::telemetry::format::{destination_namespace, namespace_root, ReportBuffer, ReportError};
use crate::telemetry::memory::{host_name, MemoryProbe, MemorySample};
use crate::worker::{WorkerContext, WorkerHandle};

/// How a reporter task ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReporterExit {
    /// Stopped on request during shutdown or reload.
    Stopped,
    /// Ended while nobody asked it to.
    Died,
}

/// Builds and ships telemetry reports.
pub struct StatsReporter {
    config: SharedConfig,
    pool: Arc<WorkerPool>,
    blobs: Arc<BlobStats>,
    control: Arc<ControlBits>,
    hostname: String,
}

impl StatsReporter {
    pub fn new(
        config: SharedConfig,
        pool: Arc<WorkerPool>,
        blobs: Arc<BlobStats>,
        control: Arc<ControlBits>,
    ) -> Self {
        Self {
            config,
            pool,
            blobs,
            control,
            hostname: host_name(),
        }
    }

    /// Use `hostname` instead of the real one in namespaces.
    pub fn with_hostname(mut self, hostname: impl Into<String>) -> Self {
        self.hostname = hostname.into();
        self
    }

    /// Drain the pool and render one report stamped `epoch`.
    pub fn build_report(
        &self,
        memory: Option<MemorySample>,
        epoch: u64,
    ) -> Result<ReportBuffer, ReportError> {
        let config = self.config.load();
        let stats = self.pool.snapshot();
        render_report(&config, &self.hostname, &stats, &self.blobs, memory, epoch)
    }

    /// Start the reporter as a periodic worker.
    pub fn spawn(self: Arc<Self>) -> WorkerHandle<ReporterExit> {
        WorkerHandle::spawn("stats_reporter", move |ctx| async move { self.run(ctx).await })
    }

    async fn run(&self, ctx: WorkerContext) -> ReporterExit {
        let sink = self.config.load().snapshot.telemetry.addr.clone();
        let mut channel = OutputChannel::new(sink, "telemetry sink");
        let mut probe = MemoryProbe::new();

        tracing::info!(sink = %channel.addr(), "Stats reporter started");

        loop {
            let (interval, granularity) = self.timing();
            match self.cycle(&ctx, &mut channel, &mut probe).await {
                Ok(()) => {}
                Err(OutputError::Stopped(_)) => break,
                Err(OutputError::Address(e)) => {
                    tracing::error!(error = %e, "Telemetry sink address unusable");
                    break;
                }
                Err(e) => tracing::warn!(error = %e, "Telemetry report not sent"),
            }
            if !ctx.wait(interval, granularity).await {
                break;
            }
        }

        let leaving = self.control.is_one_of(ControlBits::STOPPING | ControlBits::RELOADING);
        if leaving && channel.is_open() {
            // Flush what accumulated since the last cycle before the
            // destination goes away.
            if let Err(e) = self.flush(&mut channel, &mut probe).await {
                tracing::warn!(error = %e, "Final telemetry flush failed");
            }
        }
        channel.reset();

        if self.control.exit_expected() {
            tracing::info!("Stats reporter stopped");
            ReporterExit::Stopped
        } else {
            tracing::error!("Stats reporter died unexpectedly");
            ReporterExit::Died
        }
    }

    fn timing(&self) -> (Duration, Duration) {
        let config = self.config.load();
        let telemetry = &config.snapshot.telemetry;
        (
            Duration::from_millis(telemetry.send_interval_ms.into()),
            Duration::from_millis(telemetry.sleep_poll_interval_ms.into()),
        )
    }

    fn send_timeout(&self) -> Duration {
        Duration::from_secs(self.config.load().snapshot.tcp_send_timeout_sec.into())
    }

    async fn cycle(
        &self,
        ctx: &WorkerContext,
        channel: &mut OutputChannel,
        probe: &mut MemoryProbe,
    ) -> Result<(), OutputError> {
        let Some(report) = self.report(probe) else {
            return Ok(());
        };
        if !channel.is_open() {
            channel.open_eventually(ctx).await?;
        }
        self.send(channel, &report).await
    }

    async fn flush(
        &self,
        channel: &mut OutputChannel,
        probe: &mut MemoryProbe,
    ) -> Result<(), OutputError> {
        match self.report(probe) {
            Some(report) => self.send(channel, &report).await,
            None => Ok(()),
        }
    }

    fn report(&self, probe: &mut MemoryProbe) -> Option<ReportBuffer> {
        match self.build_report(probe.sample(), unix_now()) {
            Ok(report) => Some(report),
            Err(e) => {
                tracing::warn!(error = %e, "Telemetry report dropped");
                record_report("overflow", 0);
                None
            }
        }
    }

    async fn send(
        &self,
        channel: &mut OutputChannel,
        report: &ReportBuffer,
    ) -> Result<(), OutputError> {
        match channel.send(report.as_bytes(), self.send_timeout()).await {
            Ok(bytes) => {
                tracing::debug!(bytes, "Telemetry report sent");
                record_report("sent", bytes);
                Ok(())
            }
            Err(e) => {
                record_report("send_failed", 0);
                Err(e)
            }
        }
    }
}

fn push_counters(
    report: &mut ReportBuffer,
    prefix: &str,
    counters: &CounterSet,
    rates: &RateWindows,
) -> Result<(), ReportError> {
    for counter in Counter::ALL {
        let name = counter.name();
        report.push(prefix, &format!("{name}.count"), counters.get(counter))?;
        if Counter::RATED.contains(&counter) {
            for (w, (_, label)) in RATE_WINDOWS.iter().enumerate() {
                let rate = rates.rate(counter, w).round() as u64;
                report.push(prefix, &format!("{name}.loadavg_{label}"), rate)?;
            }
        }
    }
    Ok(())
}

/// Render a full report from already drained stats.
pub fn render_report(
    config: &RuntimeConfig,
    hostname: &str,
    stats: &StatsSnapshot,
    blobs: &BlobStats,
    memory: Option<MemorySample>,
    epoch: u64,
) -> Result<ReportBuffer, ReportError> {
    let snapshot = &config.snapshot;
    let root = namespace_root(&snapshot.telemetry.target, hostname);
    let mut report = ReportBuffer::new(epoch);

    if snapshot.telemetry.add_ports {
        let listener = snapshot.listener().unwrap_or("none");
        for destination in &stats.destinations {
            let prefix = destination_namespace(&root, listener, &destination.address);
            push_counters(&mut report, &prefix, &destination.counters, &destination.rates)?;
        }
    } else {
        let mut counters = CounterSet::default();
        let mut rates = RateWindows::default();
        for destination in &stats.destinations {
            counters.merge(&destination.counters);
            rates.merge(&destination.rates);
        }
        push_counters(&mut report, &root, &counters, &rates)?;
    }

    let blobs = blobs.read();
    let prefix = format!("{root}.blobs");
    report.push(&prefix, "active_count", blobs.active_count)?;
    report.push(&prefix, "active.bytes", blobs.active_bytes)?;
    report.push(&prefix, "active_refcnt.bytes", blobs.active_refcnt_bytes)?;
    report.push(&prefix, "total.count", blobs.total_count)?;
    report.push(&prefix, "total.bytes", blobs.total_bytes)?;
    report.push(&prefix, "total_refcnt.bytes", blobs.total_refcnt_bytes)?;
    for (bucket, count) in &blobs.buckets {
        report.push(&prefix, &format!("buckets.log2_{bucket}"), count)?;
    }

    if let Some(memory) = memory {
        report.push(&root, "memory.rss", memory.resident)?;
        report.push(&root, "memory.virtual", memory.virtual_bytes)?;
    }

    Ok(report)
}
