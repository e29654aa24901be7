//! Configuration validation.
//!
//! # Responsibilities
//! - Range checks on every numeric setting
//! - Spill directory existence
//! - Telemetry namespace syntax
//! - Address syntax and role, and listener/forward cardinality
//!
//! # Design Decisions
//! - Returns all validation errors, not just first; each is logged
//! - Validation is pure function: ConfigSnapshot → Result<(), Vec<ValidationError>>
//! - Addresses are parsed and the result thrown away. They are parsed again
//!   when a connection opens, so reload logic never holds live socket state.

use std::path::Path;
use thiserror::Error;

use crate::config::schema::ConfigSnapshot;
use crate::net::address::{AddressError, Direction, Protocol, SocketSpec};

/// Upper bound of seconds settings.
pub const MAX_SECONDS: u32 = 60;
/// Upper bound of millisecond and microsecond settings (one second of
/// microseconds, the largest sleep the data path performs in one call).
pub const MAX_SUBSECOND: u32 = 1_000_000;
/// Socket buffers are sized in pages.
pub const BUFFER_ALIGN: u32 = 4096;
/// Smallest accepted socket buffer.
pub const MIN_BUFFER: u32 = 1 << 20;

/// A single rejected setting.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("{field} value {value} out of range (1..={max})")]
    OutOfRange {
        field: &'static str,
        value: u32,
        max: u32,
    },

    #[error("{field} value {value} must be a multiple of 4096 and at least 1048576")]
    BufferSize { field: &'static str, value: u32 },

    #[error("{field} value '{value}' is not an existing directory")]
    NotADirectory { field: &'static str, value: String },

    #[error("{field} value '{value}' is not a dotted identifier")]
    InvalidNamespace { field: &'static str, value: String },

    #[error("{field} value '{value}' invalid: {reason}")]
    InvalidAddress {
        field: String,
        value: String,
        reason: AddressError,
    },

    #[error("missing listener address")]
    MissingListener,

    #[error("missing forward addresses")]
    MissingForwards,
}

pub fn is_valid_sec(sec: u32) -> bool {
    sec > 0 && sec <= MAX_SECONDS
}

pub fn is_valid_millisec(ms: u32) -> bool {
    ms > 0 && ms <= MAX_SUBSECOND
}

pub fn is_valid_microsec(us: u32) -> bool {
    us > 0 && us <= MAX_SUBSECOND
}

pub fn is_valid_buffer_size(size: u32) -> bool {
    size % BUFFER_ALIGN == 0 && size >= MIN_BUFFER
}

/// The directory may vanish right after this check; that is accepted.
pub fn is_valid_directory(path: &str) -> bool {
    !path.is_empty() && Path::new(path).is_dir()
}

/// One or more words of `[A-Za-z0-9_]`, separated by single dots.
pub fn is_valid_namespace(target: &str) -> bool {
    !target.is_empty()
        && target.split('.').all(|word| {
            !word.is_empty() && word.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
        })
}

fn check_range(
    errors: &mut Vec<ValidationError>,
    field: &'static str,
    value: u32,
    valid: fn(u32) -> bool,
    max: u32,
) {
    if !valid(value) {
        errors.push(ValidationError::OutOfRange { field, value, max });
    }
}

fn check_address(
    errors: &mut Vec<ValidationError>,
    field: String,
    value: &str,
    protocol: Protocol,
    direction: Direction,
    role: &'static str,
) {
    if let Err(reason) = SocketSpec::parse(value, protocol, direction, role) {
        errors.push(ValidationError::InvalidAddress {
            field,
            value: value.to_string(),
            reason,
        });
    }
}

/// Check every setting of `config` independently.
pub fn validate_config(config: &ConfigSnapshot) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    check_range(
        &mut errors,
        "tcp_send_timeout_sec",
        config.tcp_send_timeout_sec,
        is_valid_sec,
        MAX_SECONDS,
    );
    check_range(
        &mut errors,
        "polling_interval_ms",
        config.polling_interval_ms,
        is_valid_millisec,
        MAX_SUBSECOND,
    );
    check_range(
        &mut errors,
        "sleep_after_disaster_ms",
        config.sleep_after_disaster_ms,
        is_valid_millisec,
        MAX_SUBSECOND,
    );
    if !is_valid_buffer_size(config.server_socket_rcvbuf_bytes) {
        errors.push(ValidationError::BufferSize {
            field: "server_socket_rcvbuf_bytes",
            value: config.server_socket_rcvbuf_bytes,
        });
    }

    if !is_valid_directory(&config.spillway_root) {
        errors.push(ValidationError::NotADirectory {
            field: "spillway_root",
            value: config.spillway_root.clone(),
        });
    }
    check_range(&mut errors, "spill_usec", config.spill_usec, is_valid_microsec, MAX_SUBSECOND);

    let telemetry = &config.telemetry;
    check_address(
        &mut errors,
        "telemetry.addr".to_string(),
        &telemetry.addr,
        Protocol::Tcp,
        Direction::Outbound,
        "telemetry sink",
    );
    if !is_valid_namespace(&telemetry.target) {
        errors.push(ValidationError::InvalidNamespace {
            field: "telemetry.target",
            value: telemetry.target.clone(),
        });
    }
    check_range(
        &mut errors,
        "telemetry.send_interval_ms",
        telemetry.send_interval_ms,
        is_valid_millisec,
        MAX_SUBSECOND,
    );
    check_range(
        &mut errors,
        "telemetry.sleep_poll_interval_ms",
        telemetry.sleep_poll_interval_ms,
        is_valid_millisec,
        MAX_SUBSECOND,
    );

    match config.listener() {
        None => errors.push(ValidationError::MissingListener),
        Some(listener) => check_address(
            &mut errors,
            "listener".to_string(),
            listener,
            Protocol::Udp,
            Direction::Inbound,
            "listener",
        ),
    }
    if config.forwards().is_empty() {
        errors.push(ValidationError::MissingForwards);
    }
    for (i, forward) in config.forwards().iter().enumerate() {
        check_address(
            &mut errors,
            format!("forward[{}]", i + 1),
            forward,
            Protocol::Tcp,
            Direction::Outbound,
            "forward",
        );
    }

    for error in &errors {
        tracing::warn!(%error, "Invalid setting");
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

/// Number of rules `config` violates.
pub fn violation_count(config: &ConfigSnapshot) -> usize {
    validate_config(config).err().map_or(0, |errors| errors.len())
}
