//! Per-step view of the run context.

use std::ops::Deref;

use super::RunContext;
use crate::core::StepStamp;

/// What a step sees while it runs: the run context plus its own position.
#[derive(Debug, Clone, Copy)]
pub struct StepContext<'a> {
    run: &'a RunContext,
    step_id: &'a str,
    ordinal: usize,
}

impl<'a> StepContext<'a> {
    /// Creates a step context.
    #[must_use]
    pub const fn new(run: &'a RunContext, step_id: &'a str, ordinal: usize) -> Self {
        Self {
            run,
            step_id,
            ordinal,
        }
    }

    /// The run context.
    #[must_use]
    pub const fn run(&self) -> &'a RunContext {
        self.run
    }

    /// Identifier of the running step.
    #[must_use]
    pub const fn step_id(&self) -> &'a str {
        self.step_id
    }

    /// Ordinal of the running step.
    #[must_use]
    pub const fn ordinal(&self) -> usize {
        self.ordinal
    }

    /// Stamp for derived fields and status changes written by this step.
    #[must_use]
    pub fn stamp(&self) -> StepStamp {
        StepStamp::new(self.step_id, self.ordinal)
    }
}

impl Deref for StepContext<'_> {
    type Target = RunContext;

    fn deref(&self) -> &Self::Target {
        self.run
    }
}
