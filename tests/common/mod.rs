//! Shared utilities for integration tests.

#![allow(dead_code)]

use std::fs;
use std::future::Future;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
use tokio::net::TcpListener;

/// Write `body` as the relay config in `dir`, with a spill directory that
/// exists. Returns the config path.
pub fn write_config(dir: &Path, body: &str) -> PathBuf {
    let path = dir.join("relay.conf");
    fs::write(&path, format!("spillway_root = {}\n{body}", dir.display())).unwrap();
    path
}

/// Number of backup files next to the config in `dir`.
pub fn backup_count(dir: &Path) -> usize {
    fs::read_dir(dir)
        .unwrap()
        .filter_map(Result::ok)
        .filter(|e| e.file_name().to_string_lossy().contains(".save."))
        .count()
}

/// A telemetry sink that records every received line.
#[derive(Clone)]
pub struct TelemetrySink {
    pub addr: SocketAddr,
    lines: Arc<Mutex<Vec<String>>>,
}

impl TelemetrySink {
    pub async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let lines = Arc::new(Mutex::new(Vec::new()));

        let sink_lines = lines.clone();
        tokio::spawn(async move {
            while let Ok((socket, _)) = listener.accept().await {
                let lines = sink_lines.clone();
                tokio::spawn(async move {
                    let mut reader = BufReader::new(socket).lines();
                    while let Ok(Some(line)) = reader.next_line().await {
                        lines.lock().unwrap().push(line);
                    }
                });
            }
        });

        Self { addr, lines }
    }

    pub fn lines(&self) -> Vec<String> {
        self.lines.lock().unwrap().clone()
    }

    /// Values of every line whose path is `path`, in arrival order.
    pub fn values(&self, path: &str) -> Vec<u64> {
        self.lines()
            .iter()
            .filter_map(|line| {
                let mut parts = line.split(' ');
                if parts.next()? != path {
                    return None;
                }
                parts.next()?.parse().ok()
            })
            .collect()
    }
}

/// A telemetry sink that hangs up after the first read of every
/// connection.
#[derive(Clone)]
pub struct HangupSink {
    pub addr: SocketAddr,
    accepted: Arc<AtomicUsize>,
}

impl HangupSink {
    pub async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let accepted = Arc::new(AtomicUsize::new(0));

        let counter = accepted.clone();
        tokio::spawn(async move {
            while let Ok((mut socket, _)) = listener.accept().await {
                counter.fetch_add(1, Ordering::SeqCst);
                tokio::spawn(async move {
                    let mut buf = vec![0u8; 64 * 1024];
                    let _ = socket.read(&mut buf).await;
                });
            }
        });

        Self { addr, accepted }
    }

    /// Connections accepted so far.
    pub fn accepted(&self) -> usize {
        self.accepted.load(Ordering::SeqCst)
    }
}

/// Poll `check` until it returns true or `timeout` passes.
pub async fn eventually<F, Fut>(timeout: Duration, mut check: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if check().await {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    false
}
