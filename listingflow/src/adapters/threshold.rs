//! A model that thresholds a probability the provider already computed.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::{ClassificationModel, Prediction};
use crate::core::Record;
use crate::errors::SourceError;

fn default_positive() -> String {
    "positive".to_string()
}

fn default_negative() -> String {
    "negative".to_string()
}

fn default_unknown() -> String {
    "unknown".to_string()
}

/// Labels a record by comparing a numeric raw field against a threshold.
///
/// Structured-extraction providers often return a page-type probability;
/// this turns it into a label without calling another model. Records whose
/// page carried no such probability get `unknown_label` and a zero score, so
/// filters can tell "no evidence" apart from a low score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProbabilityThresholdModel {
    /// Raw field holding the probability.
    pub field: String,
    /// Scores strictly above this get `positive_label`.
    pub threshold: f64,
    /// Label for scores above the threshold.
    #[serde(default = "default_positive")]
    pub positive_label: String,
    /// Label for everything else.
    #[serde(default = "default_negative")]
    pub negative_label: String,
    /// Label when the field is absent or not a number.
    #[serde(default = "default_unknown")]
    pub unknown_label: String,
}

impl ProbabilityThresholdModel {
    /// Creates a model reading `field` with the given threshold.
    #[must_use]
    pub fn new(field: impl Into<String>, threshold: f64) -> Self {
        Self {
            field: field.into(),
            threshold,
            positive_label: default_positive(),
            negative_label: default_negative(),
            unknown_label: default_unknown(),
        }
    }

    /// Sets both labels.
    #[must_use]
    pub fn with_labels(mut self, positive: impl Into<String>, negative: impl Into<String>) -> Self {
        self.positive_label = positive.into();
        self.negative_label = negative.into();
        self
    }

    fn version(&self) -> String {
        format!("threshold:{}>{}", self.field, self.threshold)
    }
}

#[async_trait]
impl ClassificationModel for ProbabilityThresholdModel {
    async fn predict(&self, record: &Record) -> Result<Prediction, SourceError> {
        let Some(score) = record.raw().get(&self.field).and_then(serde_json::Value::as_f64) else {
            return Ok(Prediction::new(self.unknown_label.clone(), 0.0, self.version()));
        };
        let label = if score > self.threshold {
            &self.positive_label
        } else {
            &self.negative_label
        };
        Ok(Prediction::new(label.clone(), score, self.version()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record_with(probability: Option<f64>) -> Record {
        let record = Record::discovered("q", "s", "https://a.ch", 0);
        match probability {
            Some(p) => record.with_raw("product_probability", json!(p)),
            None => record,
        }
    }

    #[tokio::test]
    async fn test_threshold_labels() {
        let model = ProbabilityThresholdModel::new("product_probability", 0.4)
            .with_labels("ecommerce_product", "other");

        let high = model.predict(&record_with(Some(0.93))).await.unwrap();
        assert_eq!(high.label, "ecommerce_product");
        assert!((high.score - 0.93).abs() < f64::EPSILON);

        let low = model.predict(&record_with(Some(0.4))).await.unwrap();
        assert_eq!(low.label, "other");
    }

    #[tokio::test]
    async fn test_missing_field_is_unknown() {
        let model = ProbabilityThresholdModel::new("product_probability", 0.4);
        let prediction = model.predict(&record_with(None)).await.unwrap();
        assert_eq!(prediction.label, "unknown");
        assert!(prediction.score.abs() < f64::EPSILON);
        assert_eq!(prediction.model_version, "threshold:product_probability>0.4");

        let text = Record::discovered("q", "s", "https://a.ch", 0).with_raw("product_probability", json!("high"));
        assert_eq!(model.predict(&text).await.unwrap().label, "unknown");
    }
}
