//! Ready-made records, contexts and registries for tests.

use serde_json::json;
use std::sync::Arc;

use crate::adapters::StructuredFields;
use crate::context::{Clients, RunContext, RunOptions, RunScope, SearchTarget};
use crate::core::Record;
use crate::errors::Result;
use crate::events::CollectingEventSink;
use crate::registry::StepRegistry;
use crate::settings::Settings;

/// Records discovered by `source` for "aspirin", in order.
#[must_use]
pub fn discovered(source: &str, urls: &[&str]) -> Vec<Record> {
    urls.iter()
        .enumerate()
        .map(|(i, url)| Record::discovered("aspirin", source, url, i))
        .collect()
}

/// A product page as a structured-extraction provider reports it.
#[must_use]
pub fn product_page(title: &str, price: &str, probability: f64) -> StructuredFields {
    StructuredFields::from([
        ("title".to_string(), json!(title)),
        ("price".to_string(), json!(price)),
        ("probability".to_string(), json!(probability)),
    ])
}

/// A run context for a keyword search with collected events.
#[must_use]
pub fn keyword_run(term: &str, clients: Clients) -> (RunContext, Arc<CollectingEventSink>) {
    let sink = Arc::new(CollectingEventSink::new());
    let ctx = RunContext::new(SearchTarget::infer(term), "tester")
        .with_options(RunOptions::default())
        .with_clients(clients)
        .with_event_sink(sink.clone());
    (ctx, sink)
}

/// The same context scoped to `country`.
#[must_use]
pub fn scoped(ctx: RunContext, country: &str) -> RunContext {
    ctx.with_scope(RunScope::unscoped().with_country(country))
}

/// The built-in registry over the default settings merged with `overrides`.
pub fn registry_with(overrides: &str) -> Result<StepRegistry> {
    let settings = Settings::merged(overrides)?;
    Ok(StepRegistry::with_builtin_steps(&settings))
}
