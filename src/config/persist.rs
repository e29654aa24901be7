//! Backups of the effective configuration.
//!
//! After a reload that changed something, the live settings are written
//! next to the config file as `<config-path>.save.<unix-time>`. The file is
//! written under a temporary name in the same directory and renamed into
//! place, so a backup either exists complete or not at all. Existing
//! backups are never replaced: a second backup in the same second gets a
//! `.1`, `.2`, ... suffix.

use std::fmt::Write as _;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tempfile::{NamedTempFile, TempPath};
use thiserror::Error;

use crate::config::schema::{ConfigSnapshot, RuntimeConfig};

#[derive(Debug, Error)]
pub enum PersistError {
    #[error("config has no source file to back up next to")]
    NoSourcePath,

    #[error("failed to create temporary file in {}: {source}", dir.display())]
    Create { dir: PathBuf, source: io::Error },

    #[error("failed to write backup: {0}")]
    Write(#[source] io::Error),

    #[error("failed to rename backup to {}: {source}", path.display())]
    Persist { path: PathBuf, source: io::Error },
}

/// Render `snapshot` in the config file format. Keys come in a fixed order,
/// followed by the listener and the forwards.
pub fn render_config(snapshot: &ConfigSnapshot) -> String {
    let telemetry = &snapshot.telemetry;
    let mut out = String::new();
    // Writing into a String cannot fail.
    let _ = writeln!(out, "log_to_stderr = {}", u8::from(snapshot.log_to_stderr));
    let _ = writeln!(out, "tcp_send_timeout_sec = {}", snapshot.tcp_send_timeout_sec);
    let _ = writeln!(out, "polling_interval_ms = {}", snapshot.polling_interval_ms);
    let _ = writeln!(out, "sleep_after_disaster_ms = {}", snapshot.sleep_after_disaster_ms);
    let _ = writeln!(
        out,
        "server_socket_rcvbuf_bytes = {}",
        snapshot.server_socket_rcvbuf_bytes
    );
    let _ = writeln!(out, "spillway_root = {}", snapshot.spillway_root);
    let _ = writeln!(out, "spill_usec = {}", snapshot.spill_usec);
    let _ = writeln!(out, "telemetry.addr = {}", telemetry.addr);
    let _ = writeln!(out, "telemetry.target = {}", telemetry.target);
    let _ = writeln!(out, "telemetry.send_interval_ms = {}", telemetry.send_interval_ms);
    let _ = writeln!(
        out,
        "telemetry.sleep_poll_interval_ms = {}",
        telemetry.sleep_poll_interval_ms
    );
    let _ = writeln!(out, "telemetry.add_ports = {}", u8::from(telemetry.add_ports));
    for address in &snapshot.addresses {
        let _ = writeln!(out, "{address}");
    }
    out
}

/// Backups taken within one second before giving up.
const MAX_SAME_SECOND: u32 = 1000;

/// Path of the backup taken at `now` for the config file at `source`.
pub fn backup_path(source: &Path, now: u64) -> PathBuf {
    let mut name = source.as_os_str().to_os_string();
    name.push(format!(".save.{now}"));
    PathBuf::from(name)
}

/// Write a backup of `config` taken at unix time `now`.
pub fn persist_config(config: &RuntimeConfig, now: u64) -> Result<PathBuf, PersistError> {
    let result = write_backup(config, now);
    match &result {
        Ok(path) => tracing::info!(path = %path.display(), "Saved config backup"),
        Err(error) => tracing::warn!(%error, "Failed to save config backup"),
    }
    result
}

fn write_backup(config: &RuntimeConfig, now: u64) -> Result<PathBuf, PersistError> {
    let source = config.file.as_deref().ok_or(PersistError::NoSourcePath)?;
    let dir = match source.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    };

    let mut file = tempfile::Builder::new()
        .prefix("event-relay.conf.")
        .tempfile_in(dir)
        .map_err(|source| PersistError::Create {
            dir: dir.to_path_buf(),
            source,
        })?;

    write_all(&mut file, render_config(&config.snapshot).as_bytes())?;
    persist_unique(file.into_temp_path(), backup_path(source, now))
}

/// Rename `temp` to `target`, or to the first free `target.N`.
fn persist_unique(mut temp: TempPath, target: PathBuf) -> Result<PathBuf, PersistError> {
    let mut candidate = target.clone();
    let mut suffix = 0;
    loop {
        match temp.persist_noclobber(&candidate) {
            Ok(()) => return Ok(candidate),
            Err(err)
                if err.error.kind() == io::ErrorKind::AlreadyExists
                    && suffix < MAX_SAME_SECOND =>
            {
                temp = err.path;
                suffix += 1;
                let mut name = target.as_os_str().to_os_string();
                name.push(format!(".{suffix}"));
                candidate = PathBuf::from(name);
            }
            Err(err) => {
                return Err(PersistError::Persist {
                    path: candidate,
                    source: err.error,
                })
            }
        }
    }
}

fn write_all(file: &mut NamedTempFile, bytes: &[u8]) -> Result<(), PersistError> {
    file.write_all(bytes)
        .and_then(|()| file.flush())
        .map_err(PersistError::Write)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::loader::read_config;
    use crate::config::validation::validate_config;

    fn runtime_in(dir: &Path) -> RuntimeConfig {
        let mut config = RuntimeConfig::from_file(dir.join("relay.conf"));
        config.snapshot.spillway_root = dir.to_string_lossy().into_owned();
        config.snapshot.tcp_send_timeout_sec = 7;
        config.snapshot.log_to_stderr = false;
        config.snapshot.telemetry.target = "relay.test".into();
        config.snapshot.addresses = vec![
            "udp@0.0.0.0:10000".into(),
            "tcp@10.0.0.1:2000".into(),
            "/run/relay.sock".into(),
        ];
        config
    }

    #[test]
    fn test_backup_path() {
        assert_eq!(
            backup_path(Path::new("/etc/relay.conf"), 1700000000),
            PathBuf::from("/etc/relay.conf.save.1700000000")
        );
    }

    #[test]
    fn test_render_order() {
        let dir = tempfile::tempdir().unwrap();
        let text = render_config(&runtime_in(dir.path()).snapshot);
        let lines: Vec<_> = text.lines().collect();
        assert_eq!(lines[0], "log_to_stderr = 0");
        assert_eq!(lines[11], "telemetry.add_ports = 0");
        assert_eq!(&lines[12..], ["udp@0.0.0.0:10000", "tcp@10.0.0.1:2000", "/run/relay.sock"]);
    }

    #[test]
    fn test_persisted_backup_reloads_equal() {
        let dir = tempfile::tempdir().unwrap();
        let config = runtime_in(dir.path());

        let path = persist_config(&config, 42).unwrap();
        assert_eq!(path, dir.path().join("relay.conf.save.42"));

        let reread = read_config(&path).unwrap();
        assert_eq!(reread, config.snapshot);
        assert_eq!(validate_config(&reread), Ok(()));

        // Only the backup remains; the temporary file was renamed.
        let entries = std::fs::read_dir(dir.path()).unwrap().count();
        assert_eq!(entries, 1);
    }

    #[test]
    fn test_same_second_backups_are_all_kept() {
        let dir = tempfile::tempdir().unwrap();
        let mut first = runtime_in(dir.path());
        first.snapshot.addresses.truncate(2);
        let second = runtime_in(dir.path());

        let p1 = persist_config(&first, 500).unwrap();
        let p2 = persist_config(&second, 500).unwrap();

        assert_eq!(p1, dir.path().join("relay.conf.save.500"));
        assert_eq!(p2, dir.path().join("relay.conf.save.500.1"));
        assert_eq!(read_config(&p1).unwrap(), first.snapshot);
        assert_eq!(read_config(&p2).unwrap(), second.snapshot);
    }

    #[test]
    fn test_existing_entry_is_not_replaced() {
        let dir = tempfile::tempdir().unwrap();
        let config = runtime_in(dir.path());
        let occupied = dir.path().join("relay.conf.save.7");
        std::fs::create_dir(&occupied).unwrap();
        std::fs::write(occupied.join("keep"), "x").unwrap();

        let path = persist_config(&config, 7).unwrap();
        assert_eq!(path, dir.path().join("relay.conf.save.7.1"));
        assert!(occupied.join("keep").exists());
    }

    #[test]
    fn test_no_source_path() {
        let config = RuntimeConfig::from_addresses(vec!["a:1".into(), "b:1".into()]);
        assert!(matches!(persist_config(&config, 1), Err(PersistError::NoSourcePath)));
    }

    #[test]
    fn test_missing_directory() {
        let config = RuntimeConfig::from_file("/definitely/not/here/relay.conf");
        assert!(matches!(persist_config(&config, 1), Err(PersistError::Create { .. })));
    }
}
