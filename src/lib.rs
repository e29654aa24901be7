//! Event relay control plane.
//!
//! Configuration loading and hot reload, periodic workers, forward
//! statistics and telemetry reporting for a UDP-to-TCP event relay.

pub mod config;
pub mod lifecycle;
pub mod net;
pub mod observability;
pub mod pool;
pub mod resilience;
pub mod telemetry;
pub mod worker;

pub use config::{ReloadController, RuntimeConfig, SharedConfig};
pub use lifecycle::{ControlBits, ControlEvent, Relay, RunOutcome};
