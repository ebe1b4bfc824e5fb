//! Run-scoped state shared by every step.
//!
//! This module provides:
//! - Run identity: [`RunId`], [`SearchTarget`] and [`RunScope`]
//! - The [`RunContext`] created at run start and read by all steps
//! - The [`Clients`] bundle of long-lived external adapters
//! - The per-step [`StepContext`] view

mod clients;
mod identity;
mod run;
mod step;

pub use clients::Clients;
pub use identity::{RunId, RunScope, SearchTarget};
pub use run::{RunContext, RunEntry, RunOptions};
pub use step::StepContext;
