//! Step kind, scope, failure policy and run state enums.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The kind of work a step performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepKind {
    /// Discovers listings or fetches their structured attributes.
    Extractor,
    /// Expands the query with related terms, purely additively.
    Enricher,
    /// Excludes records by deterministic rules.
    Filter,
    /// Attaches a model label and score to each record.
    Classifier,
    /// Orders and truncates the final records.
    Ranker,
}

impl StepKind {
    /// Returns true for kinds that belong to the extraction phase.
    #[must_use]
    pub const fn is_extraction(&self) -> bool {
        matches!(self, Self::Extractor | Self::Enricher)
    }
}

impl fmt::Display for StepKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Extractor => write!(f, "extractor"),
            Self::Enricher => write!(f, "enricher"),
            Self::Filter => write!(f, "filter"),
            Self::Classifier => write!(f, "classifier"),
            Self::Ranker => write!(f, "ranker"),
        }
    }
}

/// Whether a step needs a country in the run scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepScope {
    /// Runs for every run.
    #[default]
    Global,
    /// Only meaningful when the run names a country.
    Country,
}

/// What the orchestrator does when a step fails fatally.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Abort the run.
    #[default]
    FailFast,
    /// Persist an empty artifact and continue with the next step.
    SkipAndContinue,
}

impl fmt::Display for FailurePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::FailFast => write!(f, "fail_fast"),
            Self::SkipAndContinue => write!(f, "skip_and_continue"),
        }
    }
}

/// Lifecycle state of a run.
///
/// Step indices refer to positions in the resolved plan, not ordinals.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum RunState {
    /// Created, no step started.
    #[default]
    Pending,
    /// Executing the step at `index`.
    RunningStep {
        /// Plan position.
        index: usize,
    },
    /// The step at `index` failed fatally.
    StepFailed {
        /// Plan position.
        index: usize,
    },
    /// Every requested step completed.
    Completed,
    /// A fatal failure ended the run.
    Aborted,
}

impl RunState {
    /// Returns true once the run can no longer change.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Aborted)
    }
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::RunningStep { index } => write!(f, "running_step({index})"),
            Self::StepFailed { index } => write!(f, "step_failed({index})"),
            Self::Completed => write!(f, "completed"),
            Self::Aborted => write!(f, "aborted"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_step_kind_display() {
        assert_eq!(StepKind::Extractor.to_string(), "extractor");
        assert_eq!(StepKind::Classifier.to_string(), "classifier");
        assert_eq!(StepKind::Ranker.to_string(), "ranker");
    }

    #[test]
    fn test_extraction_kinds() {
        assert!(StepKind::Extractor.is_extraction());
        assert!(StepKind::Enricher.is_extraction());
        assert!(!StepKind::Filter.is_extraction());
    }

    #[test]
    fn test_run_state_terminal() {
        assert!(RunState::Completed.is_terminal());
        assert!(RunState::Aborted.is_terminal());
        assert!(!RunState::RunningStep { index: 2 }.is_terminal());
        assert!(!RunState::StepFailed { index: 2 }.is_terminal());
    }

    #[test]
    fn test_run_state_serialization() {
        let json = serde_json::to_value(RunState::RunningStep { index: 3 }).unwrap();
        assert_eq!(json, serde_json::json!({"state": "running_step", "index": 3}));
        let back: RunState = serde_json::from_value(json).unwrap();
        assert_eq!(back, RunState::RunningStep { index: 3 });
    }

    #[test]
    fn test_defaults() {
        assert_eq!(FailurePolicy::default(), FailurePolicy::FailFast);
        assert_eq!(StepScope::default(), StepScope::Global);
        assert_eq!(RunState::default(), RunState::Pending);
    }
}
