//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! All subsystems produce:
//!     → logging.rs (structured log events, routed to stderr/stdout)
//!     → metrics.rs (reload and report counters via the metrics facade)
//!
//! Reload flips log_to_stderr:
//!     → merge calls LogRouting::reopen before logging other changes
//! ```
//!
//! # Design Decisions
//! - Structured fields on every event (addresses, generations, errors)
//! - Telemetry shipped to the sink lives in `telemetry`, not here

pub mod logging;
pub mod metrics;

pub use logging::{init_logging, LogRouter, LogRouting};
