//! The ordered list of steps a pipeline runs.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::core::FailurePolicy;
use crate::errors::{ConfigurationError, Result};

const DEFAULT_STEPS: [&str; 12] = [
    "discovery",
    "keyword_enrichment",
    "structured_extraction",
    "country_filter",
    "page_type",
    "page_type_filter",
    "blocked_content",
    "blocked_content_filter",
    "relevance",
    "relevance_filter",
    "suspicion",
    "ranker",
];

/// One step of a pipeline definition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepEntry {
    /// Registry identifier.
    pub id: String,
    /// Consume this earlier step's artifact instead of the preceding one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input_from: Option<String>,
    /// Overrides the step's default failure policy.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_policy: Option<FailurePolicy>,
}

impl StepEntry {
    /// An entry with no overrides.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            input_from: None,
            failure_policy: None,
        }
    }

    /// Routes the entry to consume `step_id`'s artifact.
    #[must_use]
    pub fn with_input_from(mut self, step_id: impl Into<String>) -> Self {
        self.input_from = Some(step_id.into());
        self
    }

    /// Overrides the failure policy.
    #[must_use]
    pub const fn with_policy(mut self, policy: FailurePolicy) -> Self {
        self.failure_policy = Some(policy);
        self
    }
}

/// Ordered step entries. Ordinals are 1-based positions in this list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineDefinition {
    /// The entries, in execution order.
    pub steps: Vec<StepEntry>,
}

impl Default for PipelineDefinition {
    fn default() -> Self {
        Self::new(DEFAULT_STEPS.iter().map(|id| {
            let entry = StepEntry::new(*id);
            if *id == "keyword_enrichment" {
                entry.with_policy(FailurePolicy::SkipAndContinue)
            } else {
                entry
            }
        }))
    }
}

impl PipelineDefinition {
    /// Creates a definition from entries.
    pub fn new(steps: impl IntoIterator<Item = StepEntry>) -> Self {
        Self {
            steps: steps.into_iter().collect(),
        }
    }

    /// A definition of plain entries.
    #[must_use]
    pub fn of(ids: &[&str]) -> Self {
        Self::new(ids.iter().map(|id| StepEntry::new(*id)))
    }

    /// Number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    /// Returns true if there are no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Ordinal of `step_id`.
    #[must_use]
    pub fn ordinal_of(&self, step_id: &str) -> Option<usize> {
        self.steps.iter().position(|s| s.id == step_id).map(|i| i + 1)
    }

    /// Entries with their ordinals.
    pub fn entries(&self) -> impl Iterator<Item = (usize, &StepEntry)> {
        self.steps.iter().enumerate().map(|(i, entry)| (i + 1, entry))
    }

    /// Checks that ids are unique and every `input_from` names an earlier entry.
    pub fn validate(&self) -> Result<()> {
        if self.steps.is_empty() {
            return Err(ConfigurationError::new("pipeline definition has no steps").into());
        }
        let mut seen = HashSet::new();
        for entry in &self.steps {
            if let Some(source) = &entry.input_from {
                if !seen.contains(source.as_str()) {
                    return Err(ConfigurationError::new(format!(
                        "step '{}' reads from '{source}', which is not an earlier step",
                        entry.id
                    ))
                    .for_step(&entry.id)
                    .with_parameter("input_from")
                    .into());
                }
            }
            if !seen.insert(entry.id.as_str()) {
                return Err(ConfigurationError::new(format!(
                    "step '{}' appears more than once",
                    entry.id
                ))
                .for_step(&entry.id)
                .into());
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_default_definition() {
        let definition = PipelineDefinition::default();
        assert_eq!(definition.len(), 12);
        assert_eq!(definition.ordinal_of("discovery"), Some(1));
        assert_eq!(definition.ordinal_of("country_filter"), Some(4));
        assert_eq!(definition.ordinal_of("ranker"), Some(12));
        assert_eq!(
            definition.steps[1].failure_policy,
            Some(FailurePolicy::SkipAndContinue)
        );
        definition.validate().unwrap();
    }

    #[test]
    fn test_duplicate_ids_rejected() {
        let err = PipelineDefinition::of(&["discovery", "ranker", "ranker"])
            .validate()
            .unwrap_err();
        assert_eq!(err.code(), "CONFIGURATION");
        assert_eq!(err.step_id(), Some("ranker"));
    }

    #[test]
    fn test_input_from_must_be_earlier() {
        let definition = PipelineDefinition::new([
            StepEntry::new("discovery"),
            StepEntry::new("ranker").with_input_from("relevance"),
            StepEntry::new("relevance"),
        ]);
        assert!(definition.validate().is_err());

        let definition = PipelineDefinition::new([
            StepEntry::new("discovery"),
            StepEntry::new("structured_extraction"),
            StepEntry::new("ranker").with_input_from("discovery"),
        ]);
        definition.validate().unwrap();
    }

    #[test]
    fn test_toml_form() {
        let definition: PipelineDefinition = toml::from_str(
            r#"
            steps = [
                { id = "discovery" },
                { id = "keyword_enrichment", failure_policy = "skip_and_continue" },
                { id = "ranker", input_from = "discovery" },
            ]
            "#,
        )
        .unwrap();
        assert_eq!(definition.steps[2], StepEntry::new("ranker").with_input_from("discovery"));
        assert_eq!(
            definition.steps[1].failure_policy,
            Some(FailurePolicy::SkipAndContinue)
        );
    }
}
