//! Configuration schema definitions.
//!
//! `ConfigSnapshot` is the plain value parsed from a config file.
//! `RuntimeConfig` is the live configuration: a snapshot plus the
//! provenance the reload engine maintains.

use std::path::PathBuf;
use std::sync::Arc;
use arc_swap::ArcSwap;

/// The live configuration, shared by every subsystem.
///
/// Readers call `load()`; only the reload controller stores new versions.
pub type SharedConfig = Arc<ArcSwap<RuntimeConfig>>;

/// Create a shared handle around a runtime config.
pub fn shared(config: RuntimeConfig) -> SharedConfig {
    Arc::new(ArcSwap::from_pointee(config))
}

/// One complete set of relay settings, as read from a config source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigSnapshot {
    /// Route log output to stderr (`true`) or stdout (`false`).
    pub log_to_stderr: bool,

    /// Send timeout for forward connections, in seconds.
    pub tcp_send_timeout_sec: u32,

    /// Polling interval of the forwarding workers, in milliseconds.
    pub polling_interval_ms: u32,

    /// Back-off after a failed send before retrying, in milliseconds.
    pub sleep_after_disaster_ms: u32,

    /// Receive buffer size of the listener socket, in bytes.
    pub server_socket_rcvbuf_bytes: u32,

    /// Directory for disk spill files.
    pub spillway_root: String,

    /// Queue age after which events spill to disk, in microseconds.
    pub spill_usec: u32,

    /// Telemetry sink settings.
    pub telemetry: TelemetryConfig,

    /// Index 0 is the listener; the rest are forward destinations.
    pub addresses: Vec<String>,
}

/// Telemetry sink settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TelemetryConfig {
    /// Destination address of the telemetry sink.
    pub addr: String,

    /// Namespace root template, e.g. `relay.prod`.
    pub target: String,

    /// Interval between reports, in milliseconds.
    pub send_interval_ms: u32,

    /// Granularity of the interruptible wait between reports, in milliseconds.
    pub sleep_poll_interval_ms: u32,

    /// Suffix the namespace with listener and destination identifiers.
    pub add_ports: bool,
}

impl Default for ConfigSnapshot {
    fn default() -> Self {
        Self {
            log_to_stderr: true,
            tcp_send_timeout_sec: 2,
            polling_interval_ms: 1,
            sleep_after_disaster_ms: 1000,
            server_socket_rcvbuf_bytes: 32 * 1024 * 1024,
            spillway_root: "/tmp".to_string(),
            spill_usec: 1_000_000,
            telemetry: TelemetryConfig::default(),
            addresses: Vec::new(),
        }
    }
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            addr: "127.0.0.1:2003".to_string(),
            target: "event_relay".to_string(),
            send_interval_ms: 60_000,
            sleep_poll_interval_ms: 500,
            add_ports: false,
        }
    }
}

impl ConfigSnapshot {
    /// The listener address, if one is configured.
    pub fn listener(&self) -> Option<&str> {
        self.addresses.first().map(String::as_str)
    }

    /// The forward destinations, in configured order.
    pub fn forwards(&self) -> &[String] {
        self.addresses.get(1..).unwrap_or(&[])
    }

    /// Log every setting at info level.
    pub fn dump(&self) {
        tracing::info!(
            log_to_stderr = self.log_to_stderr,
            tcp_send_timeout_sec = self.tcp_send_timeout_sec,
            polling_interval_ms = self.polling_interval_ms,
            sleep_after_disaster_ms = self.sleep_after_disaster_ms,
            server_socket_rcvbuf_bytes = self.server_socket_rcvbuf_bytes,
            spillway_root = %self.spillway_root,
            spill_usec = self.spill_usec,
            "Relay settings"
        );
        tracing::info!(
            addr = %self.telemetry.addr,
            target = %self.telemetry.target,
            send_interval_ms = self.telemetry.send_interval_ms,
            sleep_poll_interval_ms = self.telemetry.sleep_poll_interval_ms,
            add_ports = self.telemetry.add_ports,
            "Telemetry settings"
        );
        if let Some(listener) = self.listener() {
            tracing::info!(address = %listener, "Listener address");
        }
        for forward in self.forwards() {
            tracing::info!(address = %forward, "Forward address");
        }
    }
}

/// The live configuration with reload provenance.
#[derive(Debug, Clone, Default)]
pub struct RuntimeConfig {
    /// Current settings.
    pub snapshot: ConfigSnapshot,

    /// Number of reloads that changed at least one field. Zero until the
    /// first successful load.
    pub generation: u64,

    /// Unix time of the last reload attempt.
    pub epoch_attempt: u64,

    /// Unix time of the last reload that changed something.
    pub epoch_changed: u64,

    /// Unix time of the last reload that completed without a fatal error.
    pub epoch_success: u64,

    /// Path of the config file, if the config came from one.
    pub file: Option<PathBuf>,
}

impl RuntimeConfig {
    /// Defaults bound to a config file that has not been loaded yet.
    pub fn from_file(path: impl Into<PathBuf>) -> Self {
        Self {
            file: Some(path.into()),
            ..Self::default()
        }
    }

    /// Defaults with addresses given directly (no config file, no reload).
    pub fn from_addresses(addresses: Vec<String>) -> Self {
        Self {
            snapshot: ConfigSnapshot {
                addresses,
                ..ConfigSnapshot::default()
            },
            ..Self::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_listener_and_forwards() {
        let mut snapshot = ConfigSnapshot::default();
        assert!(snapshot.listener().is_none());
        assert!(snapshot.forwards().is_empty());

        snapshot.addresses = vec![
            "127.0.0.1:10000".into(),
            "tcp@10.0.0.1:2000".into(),
            "tcp@10.0.0.2:2000".into(),
        ];
        assert_eq!(snapshot.listener(), Some("127.0.0.1:10000"));
        assert_eq!(snapshot.forwards().len(), 2);
        assert_eq!(snapshot.forwards()[1], "tcp@10.0.0.2:2000");
    }

    #[test]
    fn test_shared_config_swap() {
        let config = shared(RuntimeConfig::from_file("/etc/event-relay.conf"));
        assert_eq!(config.load().generation, 0);

        let mut next = (**config.load()).clone();
        next.generation = 1;
        config.store(Arc::new(next));
        assert_eq!(config.load().generation, 1);
    }
}
