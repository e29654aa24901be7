//! Network addressing and outbound connections.
//!
//! # Data Flow
//! ```text
//! Address string from config ("tcp@host:port", "/path", ...)
//!     → address.rs (SocketSpec::parse, role and protocol checks)
//!     → output.rs (OutputChannel: lazy connect, bounded writes, reset)
//! ```
//!
//! # Design Decisions
//! - Addresses are validated at load time and parsed again at connect time
//! - TCP and Unix stream sockets share one channel type

pub mod address;
pub mod output;

pub use address::{AddressError, Direction, Endpoint, Protocol, SocketSpec};
pub use output::{OutputChannel, OutputError};
