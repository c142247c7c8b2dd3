//! Cooperative cancellation.
//!
//! A single [`CancellationToken`] type threads interruption from the caller through the
//! orchestrator, the stage monitor, worker pools, and child processes.

mod token;

pub use token::{CancelCallback, CancellationToken};
