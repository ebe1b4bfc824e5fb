//! The persisted output of one step.

use serde::{Deserialize, Serialize};

use super::{Record, Shape, StepKind, StepSummary};

/// Records produced by one step of one run, plus the header needed to
/// validate them as a restart point.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Artifact {
    /// Run that produced the artifact.
    pub run_id: String,
    /// Producing step.
    pub step_id: String,
    /// Ordinal of the producing step.
    pub ordinal: usize,
    /// Kind of the producing step.
    pub kind: StepKind,
    /// Derived fields guaranteed on every active record.
    pub shape: Shape,
    /// False when the step was cut short by cancellation or failure.
    pub complete: bool,
    /// When the artifact was written (ISO 8601).
    pub created_at: String,
    /// Counts over `records`.
    pub summary: StepSummary,
    /// The records, in deterministic order.
    pub records: Vec<Record>,
}

impl Artifact {
    /// Creates a complete artifact, computing its summary from `records`.
    #[must_use]
    pub fn new(
        run_id: impl Into<String>,
        step_id: impl Into<String>,
        ordinal: usize,
        kind: StepKind,
        shape: Shape,
        records: Vec<Record>,
    ) -> Self {
        Self {
            run_id: run_id.into(),
            step_id: step_id.into(),
            ordinal,
            kind,
            shape,
            complete: true,
            created_at: crate::utils::iso_timestamp(),
            summary: StepSummary::from_records(&records),
            records,
        }
    }

    /// Replaces the summary.
    #[must_use]
    pub fn with_summary(mut self, summary: StepSummary) -> Self {
        self.summary = summary;
        self
    }

    /// Marks the artifact as partial.
    #[must_use]
    pub fn partial(mut self) -> Self {
        self.complete = false;
        self
    }

    /// File name inside the run directory: `{ordinal:02}_{step_id}.json`.
    #[must_use]
    pub fn file_name(&self) -> String {
        artifact_file_name(self.ordinal, &self.step_id)
    }

    /// Active records only.
    pub fn active_records(&self) -> impl Iterator<Item = &Record> {
        self.records.iter().filter(|r| r.is_active())
    }
}

/// Deterministic file name for an artifact.
#[must_use]
pub fn artifact_file_name(ordinal: usize, step_id: &str) -> String {
    format!("{ordinal:02}_{step_id}.json")
}
