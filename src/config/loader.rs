//! Configuration loading from disk.
//!
//! The format is line oriented:
//! ```text
//! # comment
//! tcp_send_timeout_sec = 2      # trailing comment
//! telemetry.addr = tcp@graphite.local:2003
//! udp@0.0.0.0:10000             # first bare line: listener
//! tcp@10.0.0.1:2000             # further bare lines: forwards
//! ```

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::config::schema::ConfigSnapshot;
use crate::config::validation::{validate_config, ValidationError};

/// Error type for configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {}: {source}", path.display())]
    Io { path: PathBuf, source: io::Error },

    #[error("{}:{line}: assignment without a value: '{text}'", path.display())]
    Malformed {
        path: PathBuf,
        line: usize,
        text: String,
    },

    #[error("{}:{line}: unknown config option '{key}'", path.display())]
    UnknownKey {
        path: PathBuf,
        line: usize,
        key: String,
    },

    #[error("{}:{line}: value {value} of '{key}' is out of range", path.display())]
    OutOfRange {
        path: PathBuf,
        line: usize,
        key: String,
        value: String,
    },

    #[error("validation failed: {}", join_errors(.0))]
    Validation(Vec<ValidationError>),
}

fn join_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Read and parse a config file without validating it.
pub fn read_config(path: &Path) -> Result<ConfigSnapshot, ConfigError> {
    tracing::info!(file = %path.display(), "Loading config file");
    let content = fs::read_to_string(path).map_err(|source| {
        let err = ConfigError::Io {
            path: path.to_path_buf(),
            source,
        };
        tracing::warn!(error = %err, "Failed to open config file");
        err
    })?;

    let config = parse_config(&content, path)?;
    tracing::info!(file = %path.display(), "Loaded config file");
    Ok(config)
}

/// Load and validate configuration from a file.
pub fn load_config(path: &Path) -> Result<ConfigSnapshot, ConfigError> {
    let config = read_config(path)?;
    validate_config(&config).map_err(ConfigError::Validation)?;
    Ok(config)
}

/// Parse config text. `origin` is only used in error messages.
pub fn parse_config(content: &str, origin: &Path) -> Result<ConfigSnapshot, ConfigError> {
    let mut config = ConfigSnapshot::default();

    for (index, raw) in content.lines().enumerate() {
        let line_num = index + 1;
        let line = match raw.find('#') {
            Some(pos) => &raw[..pos],
            None => raw,
        }
        .trim();

        if line.is_empty() {
            continue;
        }

        let Some((key, value)) = line.split_once('=') else {
            config.addresses.push(line.to_string());
            continue;
        };

        let key = key.trim();
        let value = value.trim();
        if value.is_empty() {
            let err = ConfigError::Malformed {
                path: origin.to_path_buf(),
                line: line_num,
                text: line.to_string(),
            };
            tracing::warn!(error = %err, "Error in config file");
            return Err(err);
        }

        if let Err(rejected) = apply_option(&mut config, key, value) {
            let path = origin.to_path_buf();
            let key = key.to_string();
            let err = match rejected {
                Rejected::UnknownKey => ConfigError::UnknownKey {
                    path,
                    line: line_num,
                    key,
                },
                Rejected::OutOfRange => ConfigError::OutOfRange {
                    path,
                    line: line_num,
                    key,
                    value: value.to_string(),
                },
            };
            tracing::warn!(error = %err, "Error in config file");
            return Err(err);
        }
    }

    Ok(config)
}

/// Why a `key = value` line rejects the whole file.
enum Rejected {
    UnknownKey,
    OutOfRange,
}

/// Set the field named `key`.
fn apply_option(config: &mut ConfigSnapshot, key: &str, value: &str) -> Result<(), Rejected> {
    let telemetry = &mut config.telemetry;
    match key {
        "log_to_stderr" => set_bool(&mut config.log_to_stderr, key, value),
        "tcp_send_timeout_sec" => set_num(&mut config.tcp_send_timeout_sec, key, value)?,
        "polling_interval_ms" => set_num(&mut config.polling_interval_ms, key, value)?,
        "sleep_after_disaster_ms" => set_num(&mut config.sleep_after_disaster_ms, key, value)?,
        "server_socket_rcvbuf_bytes" => {
            set_num(&mut config.server_socket_rcvbuf_bytes, key, value)?
        }
        "spillway_root" => config.spillway_root = value.to_string(),
        "spill_usec" => set_num(&mut config.spill_usec, key, value)?,
        "telemetry.addr" => telemetry.addr = value.to_string(),
        "telemetry.target" => telemetry.target = value.to_string(),
        "telemetry.send_interval_ms" => set_num(&mut telemetry.send_interval_ms, key, value)?,
        "telemetry.sleep_poll_interval_ms" => {
            set_num(&mut telemetry.sleep_poll_interval_ms, key, value)?
        }
        "telemetry.add_ports" => set_bool(&mut telemetry.add_ports, key, value),
        _ => return Err(Rejected::UnknownKey),
    }
    Ok(())
}

// Text that is not a number leaves the default in place; validation still
// judges the result. A number the field cannot hold rejects the file.
fn set_num(slot: &mut u32, key: &str, value: &str) -> Result<(), Rejected> {
    if !is_integer(value) {
        tracing::warn!(key, value, "Ignoring strange config value");
        return Ok(());
    }
    let number: i64 = value.parse().map_err(|_| Rejected::OutOfRange)?;
    *slot = u32::try_from(number).map_err(|_| Rejected::OutOfRange)?;
    Ok(())
}

fn is_integer(value: &str) -> bool {
    let digits = value.strip_prefix(['+', '-']).unwrap_or(value);
    !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit())
}

fn set_bool(slot: &mut bool, key: &str, value: &str) {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" => *slot = true,
        "0" | "false" | "no" => *slot = false,
        _ => tracing::warn!(key, value, "Ignoring strange config value"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn parse(text: &str) -> Result<ConfigSnapshot, ConfigError> {
        parse_config(text, Path::new("test.conf"))
    }

    #[test]
    fn test_parse_fields_and_addresses() {
        let config = parse(
            "# relay config\n\
             \n\
             tcp_send_timeout_sec = 5   # seconds\n\
             spillway_root=/var/spool/relay\n\
             telemetry.target = relay.prod\n\
             telemetry.add_ports = 1\n\
             log_to_stderr = false\n\
             udp@0.0.0.0:10000\n\
             \ttcp@10.0.0.1:2000  \n\
             tcp@10.0.0.2:2000 # backup\n",
        )
        .unwrap();

        assert_eq!(config.tcp_send_timeout_sec, 5);
        assert_eq!(config.spillway_root, "/var/spool/relay");
        assert_eq!(config.telemetry.target, "relay.prod");
        assert!(config.telemetry.add_ports);
        assert!(!config.log_to_stderr);
        assert_eq!(config.listener(), Some("udp@0.0.0.0:10000"));
        assert_eq!(config.forwards(), ["tcp@10.0.0.1:2000", "tcp@10.0.0.2:2000"]);
        assert_eq!(config.polling_interval_ms, ConfigSnapshot::default().polling_interval_ms);
    }

    #[test]
    fn test_unknown_key_rejects_load() {
        let err = parse("udp@0.0.0.0:1\nbogus_option = 3\n").unwrap_err();
        match err {
            ConfigError::UnknownKey { line, key, .. } => {
                assert_eq!(line, 2);
                assert_eq!(key, "bogus_option");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_empty_value_rejects_load() {
        let err = parse("spill_usec =   # nothing\n").unwrap_err();
        assert!(matches!(err, ConfigError::Malformed { line: 1, .. }));
    }

    #[test]
    fn test_strange_number_keeps_default() {
        let config = parse("spill_usec = lots\n").unwrap();
        assert_eq!(config.spill_usec, ConfigSnapshot::default().spill_usec);
    }

    #[test]
    fn test_number_outside_field_rejects_load() {
        let err = parse("tcp_send_timeout_sec = -1\n").unwrap_err();
        match err {
            ConfigError::OutOfRange { line, key, value, .. } => {
                assert_eq!(line, 1);
                assert_eq!(key, "tcp_send_timeout_sec");
                assert_eq!(value, "-1");
            }
            other => panic!("unexpected error: {other}"),
        }

        let err = parse("udp@0.0.0.0:1\nserver_socket_rcvbuf_bytes = 99999999999\n").unwrap_err();
        assert!(matches!(err, ConfigError::OutOfRange { line: 2, .. }));

        let err = parse("spill_usec = 123456789012345678901234567890\n").unwrap_err();
        assert!(matches!(err, ConfigError::OutOfRange { .. }));

        assert_eq!(parse("spill_usec = +250\n").unwrap().spill_usec, 250);
    }

    #[test]
    fn test_missing_file() {
        let err = read_config(Path::new("/nonexistent/event-relay.conf")).unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }

    #[test]
    fn test_load_config_validates() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "tcp_send_timeout_sec = 0").unwrap();
        writeln!(file, "127.0.0.1:10000").unwrap();
        writeln!(file, "127.0.0.1:2000").unwrap();

        let err = load_config(file.path()).unwrap_err();
        match err {
            ConfigError::Validation(errors) => assert_eq!(errors.len(), 1),
            other => panic!("unexpected error: {other}"),
        }
    }
}
