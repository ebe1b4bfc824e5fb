//! Pipeline definition, planning and execution.
//!
//! This module provides:
//! - The ordered, configurable step list ([`PipelineDefinition`])
//! - Plan resolution by mode, scope and restart point ([`ExecutionPlan`])
//! - The run manifest persisted next to the artifacts ([`RunManifest`])
//! - The sequential run state machine ([`Orchestrator`])

mod definition;
mod manifest;
mod orchestrator;
mod plan;

#[cfg(test)]
mod integration_tests;

pub use definition::{PipelineDefinition, StepEntry};
pub use manifest::{FailureRecord, RestartPoint, RunManifest, RunMode};
pub use orchestrator::{Orchestrator, RunOutcome, RunRequest};
pub use plan::{ExecutionPlan, InputSource, PlannedStep};
