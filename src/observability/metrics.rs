//! Internal metrics.
//!
//! # Responsibilities
//! - Count reload outcomes and track the config generation
//! - Count telemetry report sends, failures and dropped cycles
//!
//! # Metrics
//! - `relay_config_reloads_total` (counter): by outcome
//!   (`changed`, `unchanged`, `rejected`, `fatal`)
//! - `relay_config_generation` (gauge): current generation
//! - `relay_config_persist_failures_total` (counter)
//! - `relay_telemetry_reports_total` (counter): by result
//!   (`sent`, `send_failed`, `overflow`)
//! - `relay_telemetry_report_bytes` (histogram)
//!
//! # Design Decisions
//! - Goes through the `metrics` facade; a process that installs no
//!   recorder pays almost nothing
//! - These describe the relay itself, separate from the telemetry lines the
//!   stats reporter ships

use metrics::{counter, gauge, histogram};

/// Record the outcome of one reload attempt.
pub fn record_reload(outcome: &'static str, generation: u64) {
    counter!("relay_config_reloads_total", "outcome" => outcome).increment(1);
    gauge!("relay_config_generation").set(generation as f64);
}

/// Record a failed config backup.
pub fn record_persist_failure() {
    counter!("relay_config_persist_failures_total").increment(1);
}

/// Record one telemetry report cycle.
pub fn record_report(result: &'static str, bytes: usize) {
    counter!("relay_telemetry_reports_total", "result" => result).increment(1);
    if result == "sent" {
        histogram!("relay_telemetry_report_bytes").record(bytes as f64);
    }
}
