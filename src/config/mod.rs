//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (line format)
//!     → loader.rs (parse into ConfigSnapshot)
//!     → validation.rs (every rule checked, every violation logged)
//!     → merge.rs (field table applied to a copy of the live config)
//!     → ArcSwap store of the new RuntimeConfig
//!     → persist.rs (backup next to the config file)
//!
//! Reload triggers:
//!     SIGHUP, or watcher.rs on file modification
//!     → reload.rs (ReloadController, one reload at a time)
//! ```
//!
//! # Design Decisions
//! - Unknown keys and value-less assignments reject the whole file
//! - The first load must succeed; later rejections keep the live config
//! - Generation only moves when a setting actually changed

pub mod loader;
pub mod merge;
pub mod persist;
pub mod reload;
pub mod schema;
pub mod validation;
pub mod watcher;

pub use loader::{load_config, read_config, ConfigError};
pub use merge::{merge_config, AddressChange, FieldChange, MergeOutcome};
pub use persist::{persist_config, PersistError};
pub use reload::{unix_now, ReloadController, ReloadError};
pub use schema::{shared, ConfigSnapshot, RuntimeConfig, SharedConfig, TelemetryConfig};
pub use validation::{validate_config, ValidationError};
pub use watcher::{ConfigWatcher, ReloadRequest};
