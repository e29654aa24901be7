//! Telemetry shipped to an external sink.
//!
//! # Data Flow
//! ```text
//! StatsReporter (periodic worker)
//!     → WorkerPool::snapshot (drain counters under the pool lock)
//!     → format.rs (bounded ReportBuffer of plaintext lines)
//!     → net::output::OutputChannel (one write per report)
//! ```

pub mod format;
pub mod memory;
pub mod reporter;

pub use format::{ReportBuffer, ReportError, REPORT_CAPACITY};
pub use memory::{MemoryProbe, MemorySample};
pub use reporter::{render_report, ReporterExit, StatsReporter};
