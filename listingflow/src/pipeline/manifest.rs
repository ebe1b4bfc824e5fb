//! Run-level state persisted next to the artifacts.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::context::{RunContext, RunEntry, SearchTarget};
use crate::core::RunState;
use crate::errors::ListingflowError;
use crate::utils::format_iso;

/// Which part of the pipeline a run executes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum RunMode {
    /// One step.
    SingleStep {
        /// The step to run.
        step_id: String,
    },
    /// The leading extractor and enricher steps.
    Extraction,
    /// Every step.
    Full,
}

impl RunMode {
    /// Single-step mode for `step_id`.
    #[must_use]
    pub fn single(step_id: impl Into<String>) -> Self {
        Self::SingleStep {
            step_id: step_id.into(),
        }
    }
}

impl fmt::Display for RunMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SingleStep { step_id } => write!(f, "step:{step_id}"),
            Self::Extraction => write!(f, "extraction"),
            Self::Full => write!(f, "full"),
        }
    }
}

/// An earlier artifact used as the input of the first planned step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RestartPoint {
    /// Run holding the artifact.
    pub run_id: String,
    /// Step that produced it.
    pub step_id: String,
}

impl RestartPoint {
    /// Creates a restart point.
    #[must_use]
    pub fn new(run_id: impl Into<String>, step_id: impl Into<String>) -> Self {
        Self {
            run_id: run_id.into(),
            step_id: step_id.into(),
        }
    }
}

impl fmt::Display for RestartPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.run_id, self.step_id)
    }
}

/// Why a run aborted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureRecord {
    /// Failing step, when the failure is attributable to one.
    pub step_id: Option<String>,
    /// Stable error code.
    pub code: String,
    /// Human-readable message.
    pub message: String,
}

impl FailureRecord {
    /// Captures `error`, attributing it to `step_id` when the error names none.
    #[must_use]
    pub fn from_error(error: &ListingflowError, step_id: Option<&str>) -> Self {
        Self {
            step_id: error.step_id().or(step_id).map(str::to_string),
            code: error.code().to_string(),
            message: error.to_string(),
        }
    }

    /// Blames the failure on `step_id`, whatever the error named.
    #[must_use]
    pub fn attributed_to(mut self, step_id: &str) -> Self {
        self.step_id = Some(step_id.to_string());
        self
    }
}

/// The persisted state of a run (`run.json`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunManifest {
    /// Run id.
    pub run_id: String,
    /// Correlation id derived from the run id.
    pub uuid: String,
    /// What was searched.
    pub search: SearchTarget,
    /// Acting user.
    pub user: String,
    /// Country scope.
    pub country: Option<String>,
    /// Organization scope.
    pub organization: Option<String>,
    /// Requested step range.
    pub mode: RunMode,
    /// Lifecycle state.
    pub state: RunState,
    /// Run start (ISO 8601).
    pub started_at: String,
    /// Set once the run is terminal.
    #[serde(default)]
    pub finished_at: Option<String>,
    /// Artifact the run resumed from.
    #[serde(default)]
    pub restart_from: Option<RestartPoint>,
    /// One entry per persisted step.
    #[serde(default)]
    pub entries: Vec<RunEntry>,
    /// Set when the run aborted.
    #[serde(default)]
    pub failure: Option<FailureRecord>,
}

impl RunManifest {
    /// A pending manifest for `ctx`.
    #[must_use]
    pub fn for_run(ctx: &RunContext, mode: RunMode, restart_from: Option<RestartPoint>) -> Self {
        Self {
            run_id: ctx.run_id().to_string(),
            uuid: ctx.run_id().uuid().to_string(),
            search: ctx.target().clone(),
            user: ctx.user().to_string(),
            country: ctx.country().map(str::to_string),
            organization: ctx.organization().map(str::to_string),
            mode,
            state: RunState::Pending,
            started_at: format_iso(ctx.started_at()),
            finished_at: None,
            restart_from,
            entries: Vec::new(),
            failure: None,
        }
    }

    /// Entry for `step_id`.
    #[must_use]
    pub fn entry(&self, step_id: &str) -> Option<&RunEntry> {
        self.entries.iter().find(|e| e.step_id == step_id)
    }
}
