//! Model-backed classification steps.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::BTreeMap;
use std::sync::Arc;

use super::fanout::fan_out;
use super::{Step, StepDescriptor, StepOutput};
use crate::adapters::ClassificationModel;
use crate::context::StepContext;
use crate::core::{fields, Record, Shape, StepKind, StepStamp, StepSummary};
use crate::errors::{ConfigurationError, Result};

/// Layered configuration of a [`ClassifierStep`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassifierConfig {
    /// Name of the model in the run's client set. Defaults to the step id.
    #[serde(default)]
    pub model: Option<String>,
}

/// Attaches a label, a score and the model version to every active record.
///
/// Never removes records; a separate filter step acts on the label.
#[derive(Debug, Clone)]
pub struct ClassifierStep {
    descriptor: StepDescriptor,
    field: String,
    model: String,
}

impl ClassifierStep {
    /// Creates a classifier writing `field` and `{field}_score`.
    #[must_use]
    pub fn new(id: impl Into<String>, field: impl Into<String>, config: ClassifierConfig) -> Self {
        let id = id.into();
        let field = field.into();
        let score = fields::score_of(&field);
        Self {
            descriptor: StepDescriptor::new(id.clone(), StepKind::Classifier)
                .providing(Shape::of(&[field.as_str(), score.as_str()])),
            model: config.model.unwrap_or(id),
            field,
        }
    }

    /// Name of the model this step calls.
    #[must_use]
    pub fn model_name(&self) -> &str {
        &self.model
    }

    fn resolve_model<'a>(&self, ctx: &StepContext<'a>) -> Result<&'a Arc<dyn ClassificationModel>> {
        ctx.run().clients().model(&self.model).ok_or_else(|| {
            ConfigurationError::new(format!("model '{}' is not configured", self.model))
                .for_step(self.id())
                .with_parameter("model")
                .into()
        })
    }

    async fn classify(
        &self,
        model: &Arc<dyn ClassificationModel>,
        mut record: Record,
        stamp: &StepStamp,
    ) -> Result<Record> {
        let prediction = model.predict(&record).await?;
        record.derive_with_model(&self.field, json!(prediction.label), stamp, &prediction.model_version)?;
        record.derive_with_model(
            &fields::score_of(&self.field),
            json!(prediction.score),
            stamp,
            prediction.model_version,
        )?;
        Ok(record)
    }
}

#[async_trait]
impl Step for ClassifierStep {
    fn descriptor(&self) -> &StepDescriptor {
        &self.descriptor
    }

    fn validate(&self, _input: &[Record], ctx: &StepContext<'_>) -> Result<()> {
        self.resolve_model(ctx).map(|_| ())
    }

    async fn execute(&self, input: &[Record], ctx: &StepContext<'_>) -> Result<StepOutput> {
        let model = self.resolve_model(ctx)?;
        let stamp = ctx.stamp();
        fan_out(input, ctx, |record| self.classify(model, record, &stamp)).await
    }

    fn summarize(&self, output: &[Record]) -> StepSummary {
        let mut labels: BTreeMap<String, usize> = BTreeMap::new();
        for record in output.iter().filter(|r| r.is_active()) {
            if let Some(label) = record.derived(&self.field).and_then(|v| v.as_str()) {
                *labels.entry(label.to_string()).or_default() += 1;
            }
        }
        labels
            .into_iter()
            .fold(StepSummary::from_records(output), |s, (label, n)| s.with_detail(label, n))
    }
}
