//! Generic filter over a classifier's label and score.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::{Step, StepDescriptor, StepOutput};
use crate::context::StepContext;
use crate::core::{fields, Record, Shape, StepKind, StepStamp};
use crate::errors::Result;

/// Layered rule of a [`LabelFilterStep`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LabelFilterConfig {
    /// When non-empty, only these labels are kept.
    pub keep_labels: Vec<String>,
    /// Labels always excluded.
    pub exclude_labels: Vec<String>,
    /// Records scoring below are excluded.
    pub min_score: Option<f64>,
    /// Records scoring above are excluded.
    pub max_score: Option<f64>,
}

impl LabelFilterConfig {
    /// Why a record with `label` and `score` is excluded, if it is.
    #[must_use]
    pub fn rejection(&self, label: Option<&str>, score: Option<f64>) -> Option<String> {
        let Some(label) = label else {
            return Some("missing label".to_string());
        };
        if !self.keep_labels.is_empty() && !self.keep_labels.iter().any(|l| l == label) {
            return Some(format!("label '{label}' not in keep list"));
        }
        if self.exclude_labels.iter().any(|l| l == label) {
            return Some(format!("label '{label}' excluded"));
        }
        match (score, self.min_score, self.max_score) {
            (None, Some(_), _) | (None, _, Some(_)) => Some("missing score".to_string()),
            (Some(s), Some(min), _) if s < min => Some(format!("score {s} below {min}")),
            (Some(s), _, Some(max)) if s > max => Some(format!("score {s} above {max}")),
            _ => None,
        }
    }
}

/// Excludes active records whose label violates the configured rule.
#[derive(Debug, Clone)]
pub struct LabelFilterStep {
    descriptor: StepDescriptor,
    field: String,
    config: LabelFilterConfig,
}

impl LabelFilterStep {
    /// Creates a filter over the label stored in `field`.
    #[must_use]
    pub fn new(id: impl Into<String>, field: impl Into<String>, config: LabelFilterConfig) -> Self {
        let field = field.into();
        Self {
            descriptor: StepDescriptor::new(id, StepKind::Filter)
                .requiring(Shape::of(&[field.as_str()])),
            field,
            config,
        }
    }

    /// Applies the rule.
    #[must_use]
    pub fn apply(&self, input: &[Record], stamp: &StepStamp) -> Vec<Record> {
        let score_key = fields::score_of(&self.field);
        let mut output = input.to_vec();
        for record in output.iter_mut().filter(|r| r.is_active()) {
            let label = record.derived(&self.field).and_then(|v| v.as_str());
            let score = record.derived(&score_key).and_then(serde_json::Value::as_f64);
            if let Some(reason) = self.config.rejection(label, score) {
                record.exclude(stamp, reason);
            }
        }
        output
    }
}

#[async_trait]
impl Step for LabelFilterStep {
    fn descriptor(&self) -> &StepDescriptor {
        &self.descriptor
    }

    async fn execute(&self, input: &[Record], ctx: &StepContext<'_>) -> Result<StepOutput> {
        Ok(StepOutput::new(self.apply(input, &ctx.stamp())))
    }
}
