//! Run-level cancellation.
//!
//! A single [`CancellationToken`] is shared by the run context, the
//! orchestrator and every per-record task of the executing step.

mod token;

pub use token::CancellationToken;
