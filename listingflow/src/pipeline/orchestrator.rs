//! The run state machine.
//!
//! Steps run strictly in sequence. Each one reads a persisted (or just
//! produced) artifact, executes, and has its output persisted before the next
//! step starts. A fatal error persists whatever partial output exists, marks
//! the manifest aborted and ends the run.

use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info, info_span, warn, Instrument};

use super::{ExecutionPlan, FailureRecord, InputSource, PlannedStep, RestartPoint, RunManifest, RunMode};
use crate::context::{RunContext, RunEntry, StepContext};
use crate::core::{Artifact, FailurePolicy, Record, RunState};
use crate::errors::{ExcessiveFailureError, ListingflowError, Result, ShapeMismatchError};
use crate::registry::StepRegistry;
use crate::steps::{FailureCount, StepOutput};
use crate::store::ArtifactStore;
use crate::utils::iso_timestamp;

use super::PipelineDefinition;

/// What to run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunRequest {
    /// Step range.
    pub mode: RunMode,
    /// Earlier artifact the first planned step reads. When it belongs to the
    /// run being executed, that run is continued in place.
    pub restart: Option<RestartPoint>,
}

impl RunRequest {
    /// Every step.
    #[must_use]
    pub const fn full() -> Self {
        Self {
            mode: RunMode::Full,
            restart: None,
        }
    }

    /// The leading extraction steps.
    #[must_use]
    pub const fn extraction() -> Self {
        Self {
            mode: RunMode::Extraction,
            restart: None,
        }
    }

    /// One step.
    #[must_use]
    pub fn single(step_id: impl Into<String>) -> Self {
        Self {
            mode: RunMode::single(step_id),
            restart: None,
        }
    }

    /// Resumes from an earlier artifact.
    #[must_use]
    pub fn with_restart(mut self, restart: RestartPoint) -> Self {
        self.restart = Some(restart);
        self
    }
}

/// How a run ended.
#[derive(Debug, Clone)]
pub struct RunOutcome {
    /// Run id.
    pub run_id: String,
    /// Terminal state.
    pub state: RunState,
    /// Persisted steps.
    pub entries: Vec<RunEntry>,
    /// Why the run aborted.
    pub failure: Option<FailureRecord>,
    /// Records of the last executed step.
    pub records: Vec<Record>,
}

impl RunOutcome {
    /// Returns true if every requested step completed.
    #[must_use]
    pub fn is_completed(&self) -> bool {
        self.state == RunState::Completed
    }

    /// Process exit code: 0 when completed, 1 otherwise.
    #[must_use]
    pub fn exit_code(&self) -> i32 {
        i32::from(!self.is_completed())
    }

    /// Active records of the last executed step.
    pub fn active_records(&self) -> impl Iterator<Item = &Record> {
        self.records.iter().filter(|r| r.is_active())
    }
}

/// A step error plus the output produced before it.
struct StepFailure {
    error: ListingflowError,
    partial: Option<Vec<Record>>,
}

impl From<ListingflowError> for StepFailure {
    fn from(error: ListingflowError) -> Self {
        Self {
            error,
            partial: None,
        }
    }
}

/// Sequences steps, persists their artifacts and tracks run state.
pub struct Orchestrator {
    registry: Arc<StepRegistry>,
    store: Arc<dyn ArtifactStore>,
    definition: PipelineDefinition,
}

impl Orchestrator {
    /// Creates an orchestrator over the default pipeline definition.
    #[must_use]
    pub fn new(registry: Arc<StepRegistry>, store: Arc<dyn ArtifactStore>) -> Self {
        Self {
            registry,
            store,
            definition: PipelineDefinition::default(),
        }
    }

    /// Replaces the pipeline definition.
    #[must_use]
    pub fn with_definition(mut self, definition: PipelineDefinition) -> Self {
        self.definition = definition;
        self
    }

    /// The pipeline definition.
    #[must_use]
    pub const fn definition(&self) -> &PipelineDefinition {
        &self.definition
    }

    /// The artifact store.
    #[must_use]
    pub fn store(&self) -> &Arc<dyn ArtifactStore> {
        &self.store
    }

    /// Executes `request` within `ctx`.
    ///
    /// Step, configuration and shape errors end the run as aborted and are
    /// reported in the outcome. Only failing to create the run or to write
    /// its final manifest is returned as an error.
    pub async fn run(&self, ctx: &RunContext, request: &RunRequest) -> Result<RunOutcome> {
        let mut manifest = self.open_run(ctx, request).await?;
        info!(
            run_id = %ctx.run_id(),
            mode = %request.mode,
            search = %ctx.target(),
            country = ?ctx.country(),
            organization = ?ctx.organization(),
            "Starting run"
        );
        ctx.emit(
            "run.started",
            json!({
                "mode": request.mode.to_string(),
                "search": ctx.target().to_string(),
                "country": ctx.country(),
                "organization": ctx.organization(),
                "restart_from": request.restart.as_ref().map(ToString::to_string),
            }),
        );

        ctx.emit_on_cancel();
        let timer = ctx
            .options()
            .timeout()
            .map(|timeout| ctx.token().cancel_after(timeout));
        let result = self.execute(ctx, request, &mut manifest).await;
        if let Some(timer) = timer {
            timer.abort();
        }

        manifest.entries = ctx.entries();
        manifest.finished_at = Some(iso_timestamp());
        let (records, failure) = match result {
            Ok(records) => {
                manifest.state = RunState::Completed;
                info!(run_id = %ctx.run_id(), steps = manifest.entries.len(), "Run completed");
                ctx.emit("run.completed", json!({"steps": manifest.entries.len()}));
                (records, None)
            }
            Err(failure) => {
                manifest.state = RunState::Aborted;
                error!(
                    run_id = %ctx.run_id(),
                    step = ?failure.step_id,
                    code = %failure.code,
                    error = %failure.message,
                    "Run aborted"
                );
                ctx.emit("run.aborted", json!(failure));
                (Vec::new(), Some(failure))
            }
        };
        manifest.failure.clone_from(&failure);
        self.store.persist_manifest(&manifest).await?;

        Ok(RunOutcome {
            run_id: manifest.run_id,
            state: manifest.state,
            entries: manifest.entries,
            failure,
            records,
        })
    }

    async fn open_run(&self, ctx: &RunContext, request: &RunRequest) -> Result<RunManifest> {
        let run_id = ctx.run_id().as_str();
        let continuing = request
            .restart
            .as_ref()
            .is_some_and(|point| point.run_id == run_id);
        if !continuing {
            self.store.create_run(run_id).await?;
            return Ok(RunManifest::for_run(ctx, request.mode.clone(), request.restart.clone()));
        }

        let mut manifest = self.store.load_manifest(run_id).await?;
        info!(run_id, entries = manifest.entries.len(), "Continuing run in place");
        for entry in &manifest.entries {
            ctx.record_entry(entry.clone());
        }
        manifest.mode = request.mode.clone();
        manifest.state = RunState::Pending;
        manifest.restart_from.clone_from(&request.restart);
        manifest.finished_at = None;
        manifest.failure = None;
        Ok(manifest)
    }

    async fn execute(
        &self,
        ctx: &RunContext,
        request: &RunRequest,
        manifest: &mut RunManifest,
    ) -> std::result::Result<Vec<Record>, FailureRecord> {
        let restart = match &request.restart {
            Some(point) => Some(
                self.store
                    .load(&point.run_id, &point.step_id)
                    .await
                    .map_err(|e| FailureRecord::from_error(&e, Some(&point.step_id)))?,
            ),
            None => None,
        };
        let restart_input = request.restart.as_ref().zip(restart.as_ref());

        let plan = ExecutionPlan::build(
            &self.definition,
            &self.registry,
            &request.mode,
            ctx.scope(),
            restart_input.map(|(point, artifact)| (point, &artifact.shape)),
        )
        .map_err(|e| FailureRecord::from_error(&e, None))?;

        for step_id in plan.skipped() {
            let ordinal = self.definition.ordinal_of(step_id).unwrap_or_default();
            ctx.emit_for_step("step.skipped", step_id, ordinal, json!({"reason": "run has no country"}));
        }

        let mut outputs: HashMap<String, Vec<Record>> = HashMap::new();
        let mut last = Vec::new();
        for (index, planned) in plan.steps().iter().enumerate() {
            let step_id = planned.id();
            let fail = |e: &ListingflowError| FailureRecord::from_error(e, Some(step_id));

            if let Some(reason) = ctx.token().reason() {
                return Err(fail(&ListingflowError::Cancelled(reason)));
            }

            manifest.state = RunState::RunningStep { index };
            manifest.entries = ctx.entries();
            self.store
                .persist_manifest(manifest)
                .await
                .map_err(|e| fail(&e))?;

            let input = match &planned.source {
                InputSource::Initial => Vec::new(),
                InputSource::Restart(point) if request.restart.as_ref() == Some(point) => restart
                    .as_ref()
                    .map(|artifact| artifact.records.clone())
                    .unwrap_or_default(),
                InputSource::Restart(point) => self
                    .load_input(planned, &point.run_id, &point.step_id)
                    .await
                    .map_err(|e| fail(&e).attributed_to(step_id))?,
                InputSource::Step(source) => match outputs.get(source) {
                    Some(records) => records.clone(),
                    None => self
                        .load_input(planned, ctx.run_id().as_str(), source)
                        .await
                        .map_err(|e| fail(&e).attributed_to(step_id))?,
                },
            };

            let span = info_span!("pipeline_step", step = %step_id, ordinal = planned.ordinal);
            let records = match self.run_step(ctx, planned, &input).instrument(span).await {
                Ok(records) => records,
                Err(e) => {
                    manifest.state = RunState::StepFailed { index };
                    return Err(fail(&e));
                }
            };
            outputs.insert(step_id.to_string(), records.clone());
            last = records;
        }
        Ok(last)
    }

    /// Loads a persisted input artifact and checks it still carries what the
    /// step requires.
    async fn load_input(&self, planned: &PlannedStep, run_id: &str, source: &str) -> Result<Vec<Record>> {
        let artifact = self.store.load(run_id, source).await?;
        let requires = &planned.step.descriptor().requires;
        if !artifact.shape.satisfies(requires) {
            return Err(ShapeMismatchError::new(
                planned.id(),
                format!("artifact {run_id}/{source}"),
                artifact.shape.missing(requires),
            )
            .into());
        }
        Ok(artifact.records)
    }

    async fn run_step(&self, ctx: &RunContext, planned: &PlannedStep, input: &[Record]) -> Result<Vec<Record>> {
        let step_id = planned.id();
        let step_ctx = StepContext::new(ctx, step_id, planned.ordinal);
        let started = Instant::now();

        info!(input = input.len(), source = %planned.source, "Step started");
        ctx.emit_for_step(
            "step.started",
            step_id,
            planned.ordinal,
            json!({"input": input.len(), "source": planned.source.to_string()}),
        );

        match self.attempt(&step_ctx, planned, input).await {
            Ok(output) => {
                let entry = self.persist(ctx, planned, output.records.clone(), true).await?;
                let duration_ms = started.elapsed().as_secs_f64() * 1000.0;
                info!(summary = %entry.summary, duration_ms, "Step completed");
                ctx.emit_for_step(
                    "step.completed",
                    step_id,
                    planned.ordinal,
                    json!({
                        "summary": entry.summary,
                        "location": entry.location,
                        "duration_ms": duration_ms,
                    }),
                );
                Ok(output.records)
            }
            Err(failure)
                if planned.policy == FailurePolicy::SkipAndContinue
                    && !failure.error.is_cancelled() =>
            {
                warn!(error = %failure.error, "Step failed, continuing with empty output");
                self.persist(ctx, planned, Vec::new(), true).await?;
                ctx.emit_for_step(
                    "step.skipped",
                    step_id,
                    planned.ordinal,
                    json!({"code": failure.error.code(), "error": failure.error.to_string()}),
                );
                Ok(Vec::new())
            }
            Err(failure) => {
                if let Some(partial) = failure.partial {
                    let entry = self.persist(ctx, planned, partial, false).await?;
                    warn!(summary = %entry.summary, "Persisted partial output");
                }
                error!(code = failure.error.code(), error = %failure.error, "Step failed");
                ctx.emit_for_step(
                    "step.failed",
                    step_id,
                    planned.ordinal,
                    json!({"code": failure.error.code(), "error": failure.error.to_string()}),
                );
                Err(failure.error)
            }
        }
    }

    async fn attempt(
        &self,
        ctx: &StepContext<'_>,
        planned: &PlannedStep,
        input: &[Record],
    ) -> std::result::Result<StepOutput, StepFailure> {
        let step = &planned.step;
        step.validate(input, ctx)?;

        let output = match step.execute(input, ctx).await {
            Ok(output) => output,
            Err(e) => {
                return Err(match ctx.token().reason() {
                    Some(reason) if !e.is_cancelled() => ListingflowError::Cancelled(reason),
                    _ => e,
                }
                .into())
            }
        };

        if !output.complete {
            let reason = ctx
                .token()
                .reason()
                .unwrap_or_else(|| "step interrupted".to_string());
            return Err(StepFailure {
                error: ListingflowError::Cancelled(reason),
                partial: Some(output.records),
            });
        }

        let failures = output
            .failures
            .unwrap_or_else(|| count_failures(step.id(), input, &output.records));
        let threshold = ctx.options().failure_threshold;
        if failures.failed > 0 {
            warn!(
                failed = failures.failed,
                attempted = failures.attempted,
                "Step recorded failures"
            );
        }
        if failures.ratio() > threshold {
            return Err(StepFailure {
                error: ExcessiveFailureError {
                    step_id: step.id().to_string(),
                    failed: failures.failed,
                    attempted: failures.attempted,
                    threshold,
                }
                .into(),
                partial: Some(output.records),
            });
        }
        Ok(output)
    }

    async fn persist(
        &self,
        ctx: &RunContext,
        planned: &PlannedStep,
        records: Vec<Record>,
        complete: bool,
    ) -> Result<RunEntry> {
        let step = &planned.step;
        let summary = step.summarize(&records);
        let mut artifact = Artifact::new(
            ctx.run_id().as_str(),
            step.id(),
            planned.ordinal,
            step.descriptor().kind,
            planned.output_shape(),
            records,
        )
        .with_summary(summary);
        if !complete {
            artifact = artifact.partial();
        }

        let location = self.store.persist(&artifact).await?;
        let entry = RunEntry {
            step_id: artifact.step_id,
            ordinal: artifact.ordinal,
            location,
            summary: artifact.summary,
            complete,
        };
        ctx.record_entry(entry.clone());
        Ok(entry)
    }
}

/// Records the step failed, relative to its active input.
fn count_failures(step_id: &str, input: &[Record], output: &[Record]) -> FailureCount {
    let already = input.iter().filter(|r| r.failed_by(step_id)).count();
    FailureCount {
        attempted: input.iter().filter(|r| r.is_active()).count(),
        failed: output
            .iter()
            .filter(|r| r.failed_by(step_id))
            .count()
            .saturating_sub(already),
    }
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("registry", &self.registry)
            .field("definition", &self.definition)
            .finish_non_exhaustive()
    }
}
