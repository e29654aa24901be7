//! Resilience helpers.
//!
//! # Responsibilities
//! - Pace reconnect attempts to outbound sinks so a dead telemetry
//!   destination is not hammered

pub mod backoff;

pub use backoff::Backoff;
