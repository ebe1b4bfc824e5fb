//! The step contract and the built-in steps.
//!
//! Every step, whatever its kind, offers the same three capabilities:
//! `validate` before any work, `execute` over an ordered record sequence, and
//! `summarize` over its output. Steps never mutate their input; they return
//! new records so earlier artifacts stay valid restart points.

mod classifier;
mod country_filter;
mod delivery_policy;
mod discovery;
mod enrichment;
mod extraction;
pub mod fanout;
mod known_domains;
mod label_filter;
mod ranker;

pub use classifier::{ClassifierConfig, ClassifierStep};
pub use country_filter::{CountryFilterConfig, CountryFilterStep, CountryVerdict};
pub use delivery_policy::{DeliveryPolicyConfig, DeliveryPolicyStep};
pub use discovery::DiscoveryStep;
pub use enrichment::{EnrichmentConfig, KeywordEnrichmentStep};
pub use extraction::{parse_price, StructuredExtractionStep};
pub use known_domains::KnownDomains;
pub use label_filter::{LabelFilterConfig, LabelFilterStep};
pub use ranker::{RankerConfig, RankerStep};

use async_trait::async_trait;
use std::fmt::Debug;

use crate::context::StepContext;
use crate::core::{FailurePolicy, Record, Shape, StepKind, StepScope, StepSummary};
use crate::errors::Result;

/// Static metadata of a step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepDescriptor {
    /// Registry identifier.
    pub id: String,
    /// Step kind.
    pub kind: StepKind,
    /// Derived fields the input must carry on every active record.
    pub requires: Shape,
    /// Derived fields the step adds to every active record.
    pub provides: Shape,
    /// Default failure policy; a pipeline entry may override it.
    pub failure_policy: FailurePolicy,
    /// Whether the step needs a country.
    pub scope: StepScope,
}

impl StepDescriptor {
    /// Creates a global, fail-fast descriptor with empty shapes.
    #[must_use]
    pub fn new(id: impl Into<String>, kind: StepKind) -> Self {
        Self {
            id: id.into(),
            kind,
            requires: Shape::empty(),
            provides: Shape::empty(),
            failure_policy: FailurePolicy::default(),
            scope: StepScope::default(),
        }
    }

    /// Sets the required input fields.
    #[must_use]
    pub fn requiring(mut self, shape: Shape) -> Self {
        self.requires = shape;
        self
    }

    /// Sets the provided output fields.
    #[must_use]
    pub fn providing(mut self, shape: Shape) -> Self {
        self.provides = shape;
        self
    }

    /// Sets the failure policy.
    #[must_use]
    pub const fn with_policy(mut self, policy: FailurePolicy) -> Self {
        self.failure_policy = policy;
        self
    }

    /// Marks the step as country-scoped.
    #[must_use]
    pub const fn country_scoped(mut self) -> Self {
        self.scope = StepScope::Country;
        self
    }

    /// Shape of the output given the shape of the input.
    #[must_use]
    pub fn output_shape(&self, input: &Shape) -> Shape {
        input.union(&self.provides)
    }
}

/// Units of external work a step attempted and how many failed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FailureCount {
    /// Calls (or records) attempted.
    pub attempted: usize,
    /// Calls (or records) that failed.
    pub failed: usize,
}

impl FailureCount {
    /// Failed fraction; zero when nothing was attempted.
    #[must_use]
    pub fn ratio(&self) -> f64 {
        if self.attempted == 0 {
            0.0
        } else {
            #[allow(clippy::cast_precision_loss)]
            let ratio = self.failed as f64 / self.attempted as f64;
            ratio
        }
    }
}

/// What `execute` hands back to the orchestrator.
#[derive(Debug, Clone)]
pub struct StepOutput {
    /// Output records in deterministic order.
    pub records: Vec<Record>,
    /// Failure accounting. When absent the orchestrator counts records the
    /// step marked failed against its active input.
    pub failures: Option<FailureCount>,
    /// False when cancellation cut the step short.
    pub complete: bool,
}

impl StepOutput {
    /// A complete output.
    #[must_use]
    pub const fn new(records: Vec<Record>) -> Self {
        Self {
            records,
            failures: None,
            complete: true,
        }
    }

    /// Attaches failure accounting.
    #[must_use]
    pub const fn with_failures(mut self, attempted: usize, failed: usize) -> Self {
        self.failures = Some(FailureCount { attempted, failed });
        self
    }

    /// Marks the output as cut short.
    #[must_use]
    pub const fn interrupted(mut self) -> Self {
        self.complete = false;
        self
    }
}

/// A unit of extraction, enrichment, filtering, classification or ranking.
#[async_trait]
pub trait Step: Send + Sync + Debug {
    /// Static metadata.
    fn descriptor(&self) -> &StepDescriptor;

    /// Identifier, shorthand for `descriptor().id`.
    fn id(&self) -> &str {
        &self.descriptor().id
    }

    /// Checks run-scope parameters and collaborators before any work.
    fn validate(&self, _input: &[Record], _ctx: &StepContext<'_>) -> Result<()> {
        Ok(())
    }

    /// Produces the output records.
    async fn execute(&self, input: &[Record], ctx: &StepContext<'_>) -> Result<StepOutput>;

    /// Counts over the output.
    fn summarize(&self, output: &[Record]) -> StepSummary {
        StepSummary::from_records(output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_descriptor_output_shape() {
        let descriptor = StepDescriptor::new("page_type", StepKind::Classifier)
            .providing(Shape::of(&["page_type", "page_type_score"]));
        let out = descriptor.output_shape(&Shape::of(&["price"]));
        assert!(out.satisfies(&Shape::of(&["price", "page_type"])));
        assert_eq!(descriptor.scope, StepScope::Global);
        assert_eq!(descriptor.failure_policy, FailurePolicy::FailFast);
    }

    #[test]
    fn test_failure_ratio() {
        assert!((FailureCount::default().ratio()).abs() < f64::EPSILON);
        let count = FailureCount {
            attempted: 10,
            failed: 1,
        };
        assert!((count.ratio() - 0.1).abs() < f64::EPSILON);
    }

    #[test]
    fn test_output_builders() {
        let output = StepOutput::new(vec![]).with_failures(3, 1).interrupted();
        assert!(!output.complete);
        assert_eq!(output.failures.map(|f| f.failed), Some(1));
    }
}
