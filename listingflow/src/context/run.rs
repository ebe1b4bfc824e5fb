//! The run context: everything steps may read about the current run.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use super::{Clients, RunId, RunScope, SearchTarget};
use crate::adapters::SearchQuery;
use crate::cancellation::CancellationToken;
use crate::core::StepSummary;
use crate::events::{EventSink, LoggingEventSink, RunEvent};
use crate::utils::Timestamp;

fn default_max_results() -> usize {
    50
}

fn default_max_concurrency() -> usize {
    8
}

fn default_failure_threshold() -> f64 {
    0.5
}

/// Tunables of a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunOptions {
    /// Result cap per discovery source.
    #[serde(default = "default_max_results")]
    pub max_results: usize,
    /// Whether keyword enrichment queries related terms.
    #[serde(default)]
    pub enrich_keywords: bool,
    /// Bound on concurrent external calls within one step.
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,
    /// Fraction of failed records above which a step fails.
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: f64,
    /// Cancels the run after this many seconds.
    #[serde(default)]
    pub timeout_seconds: Option<u64>,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            max_results: default_max_results(),
            enrich_keywords: false,
            max_concurrency: default_max_concurrency(),
            failure_threshold: default_failure_threshold(),
            timeout_seconds: None,
        }
    }
}

impl RunOptions {
    /// Sets the per-source result cap.
    #[must_use]
    pub const fn with_max_results(mut self, max_results: usize) -> Self {
        self.max_results = max_results;
        self
    }

    /// Enables or disables keyword enrichment.
    #[must_use]
    pub const fn with_enrichment(mut self, enabled: bool) -> Self {
        self.enrich_keywords = enabled;
        self
    }

    /// Sets the concurrency bound. Zero is treated as one.
    #[must_use]
    pub fn with_max_concurrency(mut self, max_concurrency: usize) -> Self {
        self.max_concurrency = max_concurrency.max(1);
        self
    }

    /// Sets the failure threshold.
    #[must_use]
    pub const fn with_failure_threshold(mut self, threshold: f64) -> Self {
        self.failure_threshold = threshold;
        self
    }

    /// Sets the run timeout.
    #[must_use]
    pub const fn with_timeout(mut self, seconds: Option<u64>) -> Self {
        self.timeout_seconds = seconds;
        self
    }

    /// The run timeout as a duration.
    #[must_use]
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_seconds.map(Duration::from_secs)
    }
}

/// One completed (or cut short) step of a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunEntry {
    /// Step identifier.
    pub step_id: String,
    /// Ordinal of the step in the pipeline definition.
    pub ordinal: usize,
    /// Where the artifact was written.
    pub location: String,
    /// Record counts of the artifact.
    pub summary: StepSummary,
    /// False when the artifact holds partial output.
    pub complete: bool,
}

/// Process-wide state of one run.
///
/// Created before the first step and passed by reference to every step.
/// After the run starts only the completion ledger changes, and only the
/// orchestrator appends to it.
pub struct RunContext {
    run_id: RunId,
    started_at: Timestamp,
    user: String,
    target: SearchTarget,
    scope: RunScope,
    options: RunOptions,
    clients: Clients,
    token: Arc<CancellationToken>,
    event_sink: Arc<dyn EventSink>,
    entries: Mutex<Vec<RunEntry>>,
}

impl RunContext {
    /// Creates a context for a new run started now.
    #[must_use]
    pub fn new(target: SearchTarget, user: impl Into<String>) -> Self {
        let started_at = chrono::Utc::now();
        let user = user.into();
        Self {
            run_id: RunId::generate(target.value(), &user, &started_at),
            started_at,
            user,
            target,
            scope: RunScope::unscoped(),
            options: RunOptions::default(),
            clients: Clients::new(),
            token: Arc::new(CancellationToken::new()),
            event_sink: Arc::new(LoggingEventSink::default()),
            entries: Mutex::new(Vec::new()),
        }
    }

    /// Overrides the generated run id.
    #[must_use]
    pub fn with_run_id(mut self, run_id: RunId) -> Self {
        self.run_id = run_id;
        self
    }

    /// Sets the scope.
    #[must_use]
    pub fn with_scope(mut self, scope: RunScope) -> Self {
        self.scope = scope;
        self
    }

    /// Sets the options.
    #[must_use]
    pub fn with_options(mut self, options: RunOptions) -> Self {
        self.options = options;
        self
    }

    /// Sets the external clients.
    #[must_use]
    pub fn with_clients(mut self, clients: Clients) -> Self {
        self.clients = clients;
        self
    }

    /// Shares an existing cancellation token, e.g. one wired to Ctrl-C.
    #[must_use]
    pub fn with_token(mut self, token: Arc<CancellationToken>) -> Self {
        self.token = token;
        self
    }

    /// Sets the event sink.
    #[must_use]
    pub fn with_event_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.event_sink = sink;
        self
    }

    /// The run id.
    #[must_use]
    pub const fn run_id(&self) -> &RunId {
        &self.run_id
    }

    /// When the run started.
    #[must_use]
    pub const fn started_at(&self) -> &Timestamp {
        &self.started_at
    }

    /// Acting user.
    #[must_use]
    pub fn user(&self) -> &str {
        &self.user
    }

    /// Search target.
    #[must_use]
    pub const fn target(&self) -> &SearchTarget {
        &self.target
    }

    /// Country and organization scope.
    #[must_use]
    pub const fn scope(&self) -> &RunScope {
        &self.scope
    }

    /// Country code, if scoped.
    #[must_use]
    pub fn country(&self) -> Option<&str> {
        self.scope.country.as_deref()
    }

    /// Organization, if scoped.
    #[must_use]
    pub fn organization(&self) -> Option<&str> {
        self.scope.organization.as_deref()
    }

    /// Run options.
    #[must_use]
    pub const fn options(&self) -> &RunOptions {
        &self.options
    }

    /// External clients.
    #[must_use]
    pub const fn clients(&self) -> &Clients {
        &self.clients
    }

    /// The run's cancellation token.
    #[must_use]
    pub const fn token(&self) -> &Arc<CancellationToken> {
        &self.token
    }

    /// Whether the run was cancelled.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// The query discovery sources receive.
    #[must_use]
    pub fn search_query(&self) -> SearchQuery {
        SearchQuery::new(self.target.clone()).with_country(self.scope.country.clone())
    }

    /// Emits a run-level event.
    pub fn emit(&self, event_type: &str, data: serde_json::Value) {
        self.event_sink
            .emit(&RunEvent::new(event_type, self.run_id.as_str()).with_data(data));
    }

    /// Emits `run.cancelling` with the reason once the token fires, even
    /// while a step is still draining its in-flight records.
    pub fn emit_on_cancel(&self) {
        let sink = Arc::clone(&self.event_sink);
        let run_id = self.run_id.as_str().to_string();
        self.token.on_cancel(move |reason| {
            sink.emit(&RunEvent::new("run.cancelling", run_id).with_data(serde_json::json!({ "reason": reason })));
        });
    }

    /// Emits a step-level event.
    pub fn emit_for_step(&self, event_type: &str, step_id: &str, ordinal: usize, data: serde_json::Value) {
        self.event_sink.emit(
            &RunEvent::new(event_type, self.run_id.as_str())
                .for_step(step_id, ordinal)
                .with_data(data),
        );
    }

    /// Appends a completion entry, replacing an earlier entry for the same step.
    pub fn record_entry(&self, entry: RunEntry) {
        let mut entries = self.entries.lock();
        debug!(step = %entry.step_id, location = %entry.location, "Recording run entry");
        entries.retain(|e| e.step_id != entry.step_id);
        entries.push(entry);
    }

    /// Snapshot of the completion ledger.
    #[must_use]
    pub fn entries(&self) -> Vec<RunEntry> {
        self.entries.lock().clone()
    }

    /// Entry for `step_id`, if that step completed in this run.
    #[must_use]
    pub fn entry(&self, step_id: &str) -> Option<RunEntry> {
        self.entries.lock().iter().find(|e| e.step_id == step_id).cloned()
    }
}

impl std::fmt::Debug for RunContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunContext")
            .field("run_id", &self.run_id)
            .field("user", &self.user)
            .field("target", &self.target)
            .field("scope", &self.scope)
            .field("options", &self.options)
            .field("clients", &self.clients)
            .finish_non_exhaustive()
    }
}
