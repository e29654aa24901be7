//! Socket address grammar.
//!
//! Accepted forms:
//! - `host:port` (protocol taken from the caller's default)
//! - `tcp@host:port`, `udp@host:port`
//! - `/path/to/socket`, `unix@/path/to/socket`
//!
//! Parsing only checks syntax and role; host names are resolved when a
//! connection is opened.

use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Transport protocol of an address.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Protocol {
    Tcp,
    Udp,
    Unix,
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Protocol::Tcp => write!(f, "tcp"),
            Protocol::Udp => write!(f, "udp"),
            Protocol::Unix => write!(f, "unix"),
        }
    }
}

/// Whether the address is listened on or connected to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Inbound,
    Outbound,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Inbound => write!(f, "inbound"),
            Direction::Outbound => write!(f, "outbound"),
        }
    }
}

/// Where an address points.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Endpoint {
    Inet { host: String, port: u16 },
    Local(PathBuf),
}

/// Errors produced by the address grammar.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AddressError {
    #[error("empty address")]
    Empty,

    #[error("unknown protocol '{0}'")]
    UnknownProtocol(String),

    #[error("missing port in '{0}'")]
    MissingPort(String),

    #[error("invalid port '{0}'")]
    InvalidPort(String),

    #[error("invalid host '{0}'")]
    InvalidHost(String),

    #[error("{protocol} cannot be used for {direction} {role}")]
    ProtocolMismatch {
        protocol: Protocol,
        direction: Direction,
        role: &'static str,
    },
}

/// A parsed socket address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SocketSpec {
    pub protocol: Protocol,
    pub endpoint: Endpoint,
    /// The address as written in the config.
    pub arg: String,
}

impl SocketSpec {
    /// Parse `arg`, applying `default_protocol` when none is given and
    /// checking that the protocol suits `direction`.
    ///
    /// `role` only decorates error messages ("listener", "forward", ...).
    pub fn parse(
        arg: &str,
        default_protocol: Protocol,
        direction: Direction,
        role: &'static str,
    ) -> Result<Self, AddressError> {
        let arg = arg.trim();
        if arg.is_empty() {
            return Err(AddressError::Empty);
        }

        let (protocol, rest) = match arg.split_once('@') {
            Some((proto, rest)) => (parse_protocol(proto)?, rest),
            None if arg.starts_with('/') => (Protocol::Unix, arg),
            None => (default_protocol, arg),
        };

        let endpoint = if protocol == Protocol::Unix {
            if rest.is_empty() {
                return Err(AddressError::Empty);
            }
            Endpoint::Local(PathBuf::from(rest))
        } else {
            parse_inet(rest)?
        };

        let allowed = match direction {
            Direction::Inbound => matches!(protocol, Protocol::Udp | Protocol::Unix),
            Direction::Outbound => matches!(protocol, Protocol::Tcp | Protocol::Unix),
        };
        if !allowed {
            return Err(AddressError::ProtocolMismatch { protocol, direction, role });
        }

        Ok(Self {
            protocol,
            endpoint,
            arg: arg.to_string(),
        })
    }

    /// The address with every non-alphanumeric character replaced by `_`,
    /// suitable as a metric path component.
    pub fn clean_name(&self) -> String {
        clean_name(&self.arg)
    }
}

impl fmt::Display for SocketSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.endpoint {
            Endpoint::Inet { host, port } => write!(f, "{}@{}:{}", self.protocol, host, port),
            Endpoint::Local(path) => write!(f, "unix@{}", path.display()),
        }
    }
}

/// Replace every non-alphanumeric character of `arg` with `_`.
pub fn clean_name(arg: &str) -> String {
    arg.chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect()
}

fn parse_protocol(proto: &str) -> Result<Protocol, AddressError> {
    match proto.to_ascii_lowercase().as_str() {
        "tcp" => Ok(Protocol::Tcp),
        "udp" => Ok(Protocol::Udp),
        "unix" => Ok(Protocol::Unix),
        _ => Err(AddressError::UnknownProtocol(proto.to_string())),
    }
}

fn parse_inet(rest: &str) -> Result<Endpoint, AddressError> {
    let (host, port) = rest
        .rsplit_once(':')
        .ok_or_else(|| AddressError::MissingPort(rest.to_string()))?;

    let host = host
        .strip_prefix('[')
        .and_then(|h| h.strip_suffix(']'))
        .unwrap_or(host);
    let host_ok = !host.is_empty()
        && host
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_' | ':'));
    if !host_ok {
        return Err(AddressError::InvalidHost(host.to_string()));
    }

    let port: u16 = port
        .parse()
        .map_err(|_| AddressError::InvalidPort(port.to_string()))?;
    if port == 0 {
        return Err(AddressError::InvalidPort(port.to_string()));
    }

    Ok(Endpoint::Inet {
        host: host.to_string(),
        port,
    })
}
