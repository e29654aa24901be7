//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (startup.rs):
//!     Initial load (fatal on failure) → Build pool → Start stats reporter
//!
//! Signals (signals.rs), config watcher:
//!     SIGHUP / file change → ControlEvent::Reload
//!     SIGTERM / SIGINT     → ControlEvent::Shutdown
//!
//! Main loop (startup.rs):
//!     Reload   → RELOADING bit → reconcile pool → restart reporter
//!     Shutdown → STOPPING bit → destroy reporter → STOP bit
//!     Reporter death → shutdown with failure
//! ```
//!
//! # Design Decisions
//! - Lifecycle state is one atomic bitmask (control.rs) readable anywhere
//! - Only the main loop reacts to events; workers poll their own stop state

pub mod control;
pub mod signals;
pub mod startup;

pub use control::ControlBits;
pub use signals::{forward_signals, ControlEvent, SignalListener};
pub use startup::{Relay, RunOutcome, StartupError};
