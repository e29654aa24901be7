//! Plaintext telemetry lines.
//!
//! Every line reads `<dotted.path> <integer> <unix-seconds>\n`. A report is
//! assembled in a bounded buffer and written to the sink in one piece.

use std::fmt::{Display, Write as _};
use thiserror::Error;

use crate::net::address::clean_name;

/// Upper bound of one report.
pub const REPORT_CAPACITY: usize = 64 * 1024;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReportError {
    #[error("report exceeds {capacity} bytes")]
    Overflow { capacity: usize },
}

/// A report being assembled.
#[derive(Debug, Clone)]
pub struct ReportBuffer {
    buf: String,
    line: String,
    capacity: usize,
    timestamp: u64,
}

impl ReportBuffer {
    /// An empty report stamped with `timestamp`.
    pub fn new(timestamp: u64) -> Self {
        Self::with_capacity(REPORT_CAPACITY, timestamp)
    }

    pub fn with_capacity(capacity: usize, timestamp: u64) -> Self {
        Self {
            buf: String::with_capacity(capacity.min(REPORT_CAPACITY)),
            line: String::new(),
            capacity,
            timestamp,
        }
    }

    /// Append `<prefix>.<metric> <value> <timestamp>`.
    ///
    /// Fails without modifying the report when the line does not fit.
    pub fn push(
        &mut self,
        prefix: &str,
        metric: &str,
        value: impl Display,
    ) -> Result<(), ReportError> {
        self.line.clear();
        // Writing into a String cannot fail.
        let _ = writeln!(self.line, "{prefix}.{metric} {value} {}", self.timestamp);
        if self.buf.len() + self.line.len() > self.capacity {
            return Err(ReportError::Overflow {
                capacity: self.capacity,
            });
        }
        self.buf.push_str(&self.line);
        Ok(())
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.buf.as_bytes()
    }

    pub fn as_str(&self) -> &str {
        &self.buf
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn timestamp(&self) -> u64 {
        self.timestamp
    }
}

/// `a.b.example.com` becomes `com.example.b.a`.
pub fn reverse_dotwise(name: &str) -> String {
    name.split('.')
        .filter(|label| !label.is_empty())
        .rev()
        .map(clean_name)
        .collect::<Vec<_>>()
        .join(".")
}

/// `<target>.<reversed hostname>`.
pub fn namespace_root(target: &str, hostname: &str) -> String {
    let host = reverse_dotwise(hostname);
    if host.is_empty() {
        target.to_string()
    } else {
        format!("{target}.{host}")
    }
}

/// `<root>.<listener>.<destination>`, both cleaned for use as path words.
pub fn destination_namespace(root: &str, listener: &str, destination: &str) -> String {
    format!("{root}.{}.{}", clean_name(listener), clean_name(destination))
}
