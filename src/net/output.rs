//! Lazily connected output channel for worker side channels.
//!
//! The channel connects on first need and is dropped on any write failure,
//! so the next cycle reconnects. Payloads that fail are not retried.

use std::io;
use std::time::Duration;
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio::net::{TcpStream, UnixStream};

use crate::net::address::{AddressError, Direction, Endpoint, Protocol, SocketSpec};
use crate::resilience::Backoff;
use crate::worker::WorkerContext;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
const RECONNECT_BASE: Duration = Duration::from_millis(100);
const RECONNECT_MAX: Duration = Duration::from_secs(10);

/// Errors raised while connecting or writing.
#[derive(Debug, Error)]
pub enum OutputError {
    #[error("invalid address: {0}")]
    Address(#[from] AddressError),

    #[error("connect to {addr} failed: {source}")]
    Connect { addr: String, source: io::Error },

    #[error("connect to {addr} timed out")]
    ConnectTimeout { addr: String },

    #[error("write to {addr} failed: {source}")]
    Write { addr: String, source: io::Error },

    #[error("write to {addr} timed out after {timeout:?}")]
    WriteTimeout { addr: String, timeout: Duration },

    #[error("output channel to {0} is not connected")]
    NotConnected(String),

    #[error("worker stopping before {0} connected")]
    Stopped(String),
}

enum OutputStream {
    Tcp(TcpStream),
    Unix(UnixStream),
}

impl OutputStream {
    async fn write_all(&mut self, payload: &[u8]) -> io::Result<()> {
        match self {
            OutputStream::Tcp(s) => s.write_all(payload).await,
            OutputStream::Unix(s) => s.write_all(payload).await,
        }
    }
}

/// A stream connection to an outbound sink, reconnected on demand.
pub struct OutputChannel {
    addr: String,
    role: &'static str,
    stream: Option<OutputStream>,
    backoff: Backoff,
}

impl OutputChannel {
    /// Create an unconnected channel. Nothing is parsed or opened yet.
    pub fn new(addr: impl Into<String>, role: &'static str) -> Self {
        Self {
            addr: addr.into(),
            role,
            stream: None,
            backoff: Backoff::new(RECONNECT_BASE, RECONNECT_MAX),
        }
    }

    pub fn addr(&self) -> &str {
        &self.addr
    }

    pub fn is_open(&self) -> bool {
        self.stream.is_some()
    }

    /// Make one connect attempt.
    ///
    /// The address is parsed again here rather than reusing the result of
    /// config validation.
    pub async fn connect(&mut self) -> Result<(), OutputError> {
        let spec = SocketSpec::parse(&self.addr, Protocol::Tcp, Direction::Outbound, self.role)?;

        let stream = match &spec.endpoint {
            Endpoint::Inet { host, port } => {
                let attempt = TcpStream::connect((host.as_str(), *port));
                let stream = tokio::time::timeout(CONNECT_TIMEOUT, attempt)
                    .await
                    .map_err(|_| OutputError::ConnectTimeout { addr: self.addr.clone() })?
                    .map_err(|source| OutputError::Connect { addr: self.addr.clone(), source })?;
                if let Err(e) = stream.set_nodelay(true) {
                    tracing::debug!(addr = %self.addr, error = %e, "Failed to set TCP_NODELAY");
                }
                OutputStream::Tcp(stream)
            }
            Endpoint::Local(path) => {
                let stream = UnixStream::connect(path)
                    .await
                    .map_err(|source| OutputError::Connect { addr: self.addr.clone(), source })?;
                OutputStream::Unix(stream)
            }
        };

        tracing::info!(role = self.role, addr = %spec, "Output channel connected");
        self.stream = Some(stream);
        self.backoff.reset();
        Ok(())
    }

    /// Keep trying to connect until it works or the worker is asked to stop.
    ///
    /// An address that does not parse fails immediately.
    pub async fn open_eventually(&mut self, ctx: &WorkerContext) -> Result<(), OutputError> {
        while !ctx.is_stopping() {
            match self.connect().await {
                Ok(()) => return Ok(()),
                Err(OutputError::Address(e)) => return Err(OutputError::Address(e)),
                Err(e) => {
                    let delay = self.backoff.next_delay();
                    tracing::warn!(
                        role = self.role,
                        error = %e,
                        attempt = self.backoff.attempts(),
                        delay = ?delay,
                        "Connect failed, will retry"
                    );
                    ctx.wait(delay, delay.min(Duration::from_secs(1))).await;
                }
            }
        }
        Err(OutputError::Stopped(self.addr.clone()))
    }

    /// Write the whole payload in one go, bounded by `timeout`.
    ///
    /// Any failure closes the connection.
    pub async fn send(&mut self, payload: &[u8], timeout: Duration) -> Result<usize, OutputError> {
        let stream = self
            .stream
            .as_mut()
            .ok_or_else(|| OutputError::NotConnected(self.addr.clone()))?;

        let result = match tokio::time::timeout(timeout, stream.write_all(payload)).await {
            Ok(Ok(())) => Ok(payload.len()),
            Ok(Err(source)) => Err(OutputError::Write { addr: self.addr.clone(), source }),
            Err(_) => Err(OutputError::WriteTimeout { addr: self.addr.clone(), timeout }),
        };

        if result.is_err() {
            self.reset();
        }
        result
    }

    /// Close the connection, if any.
    pub fn reset(&mut self) {
        if self.stream.take().is_some() {
            tracing::debug!(role = self.role, addr = %self.addr, "Output channel closed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncReadExt;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn test_send_requires_connection() {
        let mut channel = OutputChannel::new("127.0.0.1:9", "test");
        assert!(!channel.is_open());
        let err = channel.send(b"x", Duration::from_secs(1)).await.unwrap_err();
        assert!(matches!(err, OutputError::NotConnected(_)));
    }

    #[tokio::test]
    async fn test_connect_and_send() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let reader = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = Vec::new();
            socket.read_to_end(&mut buf).await.unwrap();
            buf
        });

        let mut channel = OutputChannel::new(format!("tcp@{}", addr), "test");
        channel.connect().await.unwrap();
        assert!(channel.is_open());
        let wrote = channel.send(b"a.b 1 2\n", Duration::from_secs(1)).await.unwrap();
        assert_eq!(wrote, 8);
        channel.reset();

        assert_eq!(reader.await.unwrap(), b"a.b 1 2\n");
    }

    #[tokio::test]
    async fn test_invalid_address_is_not_retried() {
        let ctx = WorkerContext::detached();
        let mut channel = OutputChannel::new("udp@127.0.0.1:2003", "test");
        let err = channel.open_eventually(&ctx).await.unwrap_err();
        assert!(matches!(err, OutputError::Address(AddressError::ProtocolMismatch { .. })));
    }
}
