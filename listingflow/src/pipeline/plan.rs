//! Resolving a pipeline definition into the steps a run executes.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::info;

use super::{PipelineDefinition, RestartPoint, RunMode, StepEntry};
use crate::context::RunScope;
use crate::core::{FailurePolicy, Shape, StepScope};
use crate::errors::{ConfigurationError, Result, ShapeMismatchError, UnknownStepError};
use crate::registry::StepRegistry;
use crate::steps::Step;

/// Where a planned step reads its input from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputSource {
    /// No input: the step starts from the query.
    Initial,
    /// The artifact of an earlier step of this run.
    Step(String),
    /// An artifact of the restarted run: the restart point itself, or a step
    /// that ran before it.
    Restart(RestartPoint),
}

impl fmt::Display for InputSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Initial => write!(f, "the initial query"),
            Self::Step(id) => write!(f, "the output of '{id}'"),
            Self::Restart(point) => write!(f, "artifact {point}"),
        }
    }
}

/// A resolved step with its position and input.
#[derive(Debug, Clone)]
pub struct PlannedStep {
    /// The step instance.
    pub step: Arc<dyn Step>,
    /// Ordinal in the pipeline definition.
    pub ordinal: usize,
    /// Effective failure policy.
    pub policy: FailurePolicy,
    /// Where the input comes from.
    pub source: InputSource,
    /// Shape of that input.
    pub input_shape: Shape,
}

impl PlannedStep {
    /// The step id.
    #[must_use]
    pub fn id(&self) -> &str {
        self.step.id()
    }

    /// Shape of the step's output.
    #[must_use]
    pub fn output_shape(&self) -> Shape {
        self.step.descriptor().output_shape(&self.input_shape)
    }
}

/// The ordered, validated steps of one run.
#[derive(Debug, Clone)]
pub struct ExecutionPlan {
    steps: Vec<PlannedStep>,
    skipped: Vec<String>,
}

struct Resolved<'a> {
    ordinal: usize,
    entry: &'a StepEntry,
    step: Arc<dyn Step>,
}

impl ExecutionPlan {
    /// Builds the plan for `mode`.
    ///
    /// Country-scoped steps are dropped from unscoped runs, except that asking
    /// for one in single-step mode is an error. With a restart point, the
    /// first planned step reads that artifact (passed along with its shape);
    /// full and extraction runs then start right after the restart step.
    pub fn build(
        definition: &PipelineDefinition,
        registry: &StepRegistry,
        mode: &RunMode,
        scope: &RunScope,
        restart: Option<(&RestartPoint, &Shape)>,
    ) -> Result<Self> {
        definition.validate()?;
        let country = scope.country.as_deref();
        let organization = scope.organization.as_deref();

        if let RunMode::SingleStep { step_id } = mode {
            if definition.ordinal_of(step_id).is_none() {
                return Err(if registry.contains(step_id) {
                    ConfigurationError::new(format!(
                        "step '{step_id}' is not part of the pipeline definition"
                    ))
                    .for_step(step_id)
                    .into()
                } else {
                    UnknownStepError {
                        step_id: step_id.clone(),
                        registered: registry.step_ids(),
                    }
                    .into()
                });
            }
        }

        let mut resolved = Vec::with_capacity(definition.len());
        let mut skipped = Vec::new();
        for (ordinal, entry) in definition.entries() {
            let requested = matches!(mode, RunMode::SingleStep { step_id } if *step_id == entry.id);
            if country.is_none()
                && !requested
                && registry.scope_of(&entry.id) == Some(StepScope::Country)
            {
                info!(step = %entry.id, ordinal, "Skipping country-scoped step in unscoped run");
                skipped.push(entry.id.clone());
                continue;
            }
            resolved.push(Resolved {
                ordinal,
                entry,
                step: registry.resolve(&entry.id, country, organization)?,
            });
        }

        let selected = select(&resolved, mode, restart.map(|(point, _)| point), definition)?;

        // Output shapes of every resolved step, as if the whole pipeline ran.
        let mut shapes: HashMap<&str, Shape> = HashMap::new();
        let mut previous: Option<&str> = None;
        for item in &resolved {
            let input = match item.entry.input_from.as_deref().or(previous) {
                Some(source) => shapes
                    .get(source)
                    .cloned()
                    .ok_or_else(|| skipped_source(&item.entry.id, source))?,
                None => Shape::empty(),
            };
            shapes.insert(item.entry.id.as_str(), item.step.descriptor().output_shape(&input));
            previous = Some(item.entry.id.as_str());
        }

        let mut steps: Vec<PlannedStep> = Vec::with_capacity(selected.len());
        for (position, &index) in selected.iter().enumerate() {
            let item = &resolved[index];
            let requires = &item.step.descriptor().requires;

            let (source, input_shape) = match (position, restart) {
                (0, Some((point, shape))) => (InputSource::Restart(point.clone()), shape.clone()),
                (0, None) if requires.is_empty() => (InputSource::Initial, Shape::empty()),
                _ => {
                    let predecessor = item
                        .entry
                        .input_from
                        .as_deref()
                        .or_else(|| index.checked_sub(1).map(|i| resolved[i].entry.id.as_str()));
                    match predecessor {
                        None => (InputSource::Initial, Shape::empty()),
                        Some(source) => match steps.iter().find(|s| s.id() == source) {
                            Some(planned) => (InputSource::Step(source.to_string()), planned.output_shape()),
                            None => {
                                let shape = shapes
                                    .get(source)
                                    .cloned()
                                    .ok_or_else(|| skipped_source(&item.entry.id, source))?;
                                // Sources that ran before the restart point live in the restarted run.
                                match restart {
                                    Some((point, _)) => (
                                        InputSource::Restart(RestartPoint::new(point.run_id.clone(), source)),
                                        shape,
                                    ),
                                    None => (InputSource::Step(source.to_string()), shape),
                                }
                            }
                        },
                    }
                }
            };

            if !input_shape.satisfies(requires) {
                return Err(ShapeMismatchError::new(
                    item.step.id(),
                    source.to_string(),
                    input_shape.missing(requires),
                )
                .into());
            }

            steps.push(PlannedStep {
                step: Arc::clone(&item.step),
                ordinal: item.ordinal,
                policy: item
                    .entry
                    .failure_policy
                    .unwrap_or(item.step.descriptor().failure_policy),
                source,
                input_shape,
            });
        }

        Ok(Self { steps, skipped })
    }

    /// The planned steps in execution order.
    #[must_use]
    pub fn steps(&self) -> &[PlannedStep] {
        &self.steps
    }

    /// Country-scoped steps dropped because the run has no country.
    #[must_use]
    pub fn skipped(&self) -> &[String] {
        &self.skipped
    }

    /// Number of planned steps.
    #[must_use]
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    /// Returns true if nothing is planned.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Planned step ids in order.
    #[must_use]
    pub fn step_ids(&self) -> Vec<&str> {
        self.steps.iter().map(PlannedStep::id).collect()
    }
}

fn skipped_source(step_id: &str, source: &str) -> crate::errors::ListingflowError {
    ConfigurationError::new(format!(
        "step '{step_id}' reads from '{source}', which does not run in this scope"
    ))
    .for_step(step_id)
    .with_parameter("input_from")
    .into()
}

/// Indices into `resolved` of the steps `mode` runs.
fn select(
    resolved: &[Resolved<'_>],
    mode: &RunMode,
    restart: Option<&RestartPoint>,
    definition: &PipelineDefinition,
) -> Result<Vec<usize>> {
    let mut selected: Vec<usize> = match mode {
        RunMode::SingleStep { step_id } => resolved
            .iter()
            .position(|r| r.entry.id == *step_id)
            .into_iter()
            .collect(),
        RunMode::Extraction => (0..resolved.len())
            .take_while(|&i| resolved[i].step.descriptor().kind.is_extraction())
            .collect(),
        RunMode::Full => (0..resolved.len()).collect(),
    };

    if let (Some(point), false) = (restart, matches!(mode, RunMode::SingleStep { .. })) {
        let after = definition.ordinal_of(&point.step_id).ok_or_else(|| {
            ConfigurationError::new(format!(
                "restart step '{}' is not part of the pipeline definition",
                point.step_id
            ))
            .with_parameter("from_step")
        })?;
        selected.retain(|&i| resolved[i].ordinal > after);
    }

    if selected.is_empty() {
        return Err(ConfigurationError::new(format!("no step left to run in {mode} mode")).into());
    }
    Ok(selected)
}
