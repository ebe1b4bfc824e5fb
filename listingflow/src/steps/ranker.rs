//! Final ordering and truncation.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::BTreeMap;

use super::{Step, StepDescriptor, StepOutput};
use crate::context::StepContext;
use crate::core::{fields, Record, Shape, StepKind, StepStamp};
use crate::errors::Result;

fn default_top_n() -> usize {
    100
}

/// Layered configuration of [`RankerStep`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankerConfig {
    /// Weight per derived field.
    #[serde(default)]
    pub weights: BTreeMap<String, f64>,
    /// Records kept.
    #[serde(default = "default_top_n")]
    pub top_n: usize,
}

impl Default for RankerConfig {
    fn default() -> Self {
        Self {
            weights: BTreeMap::new(),
            top_n: default_top_n(),
        }
    }
}

fn numeric(value: Option<&Value>) -> f64 {
    match value {
        Some(Value::Number(n)) => n.as_f64().unwrap_or(0.0),
        Some(Value::Bool(true)) => 1.0,
        _ => 0.0,
    }
}

impl RankerConfig {
    /// Weighted sum over the record's derived fields.
    #[must_use]
    pub fn composite_score(&self, record: &Record) -> f64 {
        self.weights
            .iter()
            .map(|(key, weight)| weight * numeric(record.derived(key)))
            .sum()
    }
}

/// Orders active records by composite score and keeps the top N.
///
/// The sort is stable: equal scores keep discovery order. Only active
/// records are emitted, each carrying its score and 1-based rank.
#[derive(Debug, Clone)]
pub struct RankerStep {
    descriptor: StepDescriptor,
    config: RankerConfig,
}

impl RankerStep {
    /// Registry identifier.
    pub const ID: &'static str = "ranker";

    /// Creates the step.
    #[must_use]
    pub fn new(config: RankerConfig) -> Self {
        Self {
            descriptor: StepDescriptor::new(Self::ID, StepKind::Ranker)
                .providing(Shape::of(&[fields::COMPOSITE_SCORE, fields::RANK])),
            config,
        }
    }

    /// Ranks `input`.
    pub fn rank(&self, input: &[Record], stamp: &StepStamp) -> Result<Vec<Record>> {
        let mut scored: Vec<(f64, Record)> = input
            .iter()
            .filter(|r| r.is_active())
            .map(|r| (self.config.composite_score(r), r.clone()))
            .collect();
        scored.sort_by(|(a, ra), (b, rb)| {
            b.total_cmp(a)
                .then_with(|| ra.discovery_index().cmp(&rb.discovery_index()))
        });
        scored.truncate(self.config.top_n);

        scored
            .into_iter()
            .enumerate()
            .map(|(i, (score, mut record))| -> Result<Record> {
                record.derive(fields::COMPOSITE_SCORE, json!(score), stamp)?;
                record.derive(fields::RANK, json!(i + 1), stamp)?;
                Ok(record)
            })
            .collect()
    }
}

#[async_trait]
impl Step for RankerStep {
    fn descriptor(&self) -> &StepDescriptor {
        &self.descriptor
    }

    async fn execute(&self, input: &[Record], ctx: &StepContext<'_>) -> Result<StepOutput> {
        Ok(StepOutput::new(self.rank(input, &ctx.stamp())?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn scored(index: usize, suspicion: f64) -> Record {
        let stamp = StepStamp::new("suspicion", 11);
        let mut record = Record::discovered("aspirin", "serp", &format!("https://s{index}.ch/p"), index);
        record.derive("suspicion_score", json!(suspicion), &stamp).unwrap();
        record
    }

    fn ranker(top_n: usize) -> RankerStep {
        RankerStep::new(RankerConfig {
            weights: BTreeMap::from([("suspicion_score".to_string(), 1.0)]),
            top_n,
        })
    }

    #[test]
    fn test_ties_keep_discovery_order() {
        let input = vec![scored(0, 0.5), scored(1, 0.9), scored(2, 0.5), scored(3, 0.5)];
        let out = ranker(3).rank(&input, &StepStamp::new("ranker", 12)).unwrap();

        let order: Vec<usize> = out.iter().map(Record::discovery_index).collect();
        assert_eq!(order, vec![1, 0, 2]);
        let ranks: Vec<&Value> = out.iter().filter_map(|r| r.derived(fields::RANK)).collect();
        assert_eq!(ranks, vec![&json!(1), &json!(2), &json!(3)]);
    }

    #[test]
    fn test_inactive_records_are_dropped() {
        let mut input = vec![scored(0, 0.9), scored(1, 0.1)];
        input[0].exclude(&StepStamp::new("country_filter", 4), "blacklist");
        let out = ranker(10).rank(&input, &StepStamp::new("ranker", 12)).unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].discovery_index(), 1);
    }

    #[test]
    fn test_numeric_conversion() {
        let stamp = StepStamp::new("blocked_content", 7);
        let mut record = Record::discovered("aspirin", "serp", "https://a.ch/p", 0);
        record.derive("flag", json!(true), &stamp).unwrap();
        record.derive("label", json!("x"), &stamp).unwrap();
        let config = RankerConfig {
            weights: BTreeMap::from([
                ("flag".to_string(), 2.0),
                ("label".to_string(), 5.0),
                ("missing".to_string(), 3.0),
            ]),
            top_n: 1,
        };
        assert!((config.composite_score(&record) - 2.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_ranking_is_reproducible() {
        let input: Vec<Record> = (0..20).map(|i| scored(i, f64::from(u32::try_from(i % 4).unwrap()))).collect();
        let stamp = StepStamp::new("ranker", 12);
        let a = serde_json::to_vec(&ranker(5).rank(&input, &stamp).unwrap()).unwrap();
        let b = serde_json::to_vec(&ranker(5).rank(&input, &stamp).unwrap()).unwrap();
        assert_eq!(a, b);
    }
}
