//! Background worker subsystem.
//!
//! # Data Flow
//! ```text
//! WorkerHandle::spawn(body)
//!     → tokio task runs body(WorkerContext)
//!     → body loops: work, then ctx.wait(interval, granularity)
//!
//! WorkerHandle::destroy()
//!     → atomic claim Running → Stopping
//!     → body notices at its next check
//!     → winner joins the task → Stopped
//! ```
//!
//! # Design Decisions
//! - Cancellation is cooperative; a body blocked in a write is not aborted
//! - Waits are chunked so shutdown latency is bounded by the granularity
//! - Workers never look at OS signals; the main loop translates those

pub mod periodic;

pub use periodic::{StopState, WorkerContext, WorkerHandle, WorkerState};
