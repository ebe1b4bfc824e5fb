//! The first extractor: turns search results into records.

use async_trait::async_trait;
use futures::future::join_all;
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use tracing::{info, warn};

use super::{Step, StepDescriptor, StepOutput};
use crate::adapters::{DiscoverySource, RawListing, SearchQuery};
use crate::context::StepContext;
use crate::core::{Record, RecordId, StepKind, StepSummary};
use crate::errors::{ConfigurationError, ListingflowError, Result, SourceError};

/// Queries every discovery source that supports the run's search target.
///
/// Results are deduplicated by normalized URL in source order and capped at
/// the run's `max_results` per source. A source failing transiently is logged
/// and skipped; failure accounting counts sources rather than records.
#[derive(Debug, Clone)]
pub struct DiscoveryStep {
    descriptor: StepDescriptor,
}

impl DiscoveryStep {
    /// Registry identifier.
    pub const ID: &'static str = "discovery";

    /// Creates the step.
    #[must_use]
    pub fn new() -> Self {
        Self {
            descriptor: StepDescriptor::new(Self::ID, StepKind::Extractor),
        }
    }

    async fn query_source(
        source: &Arc<dyn DiscoverySource>,
        query: &SearchQuery,
        max_results: usize,
        ctx: &StepContext<'_>,
    ) -> Option<std::result::Result<Vec<RawListing>, SourceError>> {
        if ctx.is_cancelled() {
            return None;
        }
        tokio::select! {
            result = source.search(query, max_results) => Some(result),
            () = ctx.token().cancelled() => None,
        }
    }
}

impl Default for DiscoveryStep {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Step for DiscoveryStep {
    fn descriptor(&self) -> &StepDescriptor {
        &self.descriptor
    }

    fn validate(&self, _input: &[Record], ctx: &StepContext<'_>) -> Result<()> {
        if ctx.clients().sources_for(ctx.target()).next().is_none() {
            return Err(ConfigurationError::new(format!(
                "no discovery source supports {} search",
                ctx.target().kind()
            ))
            .for_step(Self::ID)
            .with_parameter("sources")
            .into());
        }
        Ok(())
    }

    async fn execute(&self, _input: &[Record], ctx: &StepContext<'_>) -> Result<StepOutput> {
        let query = ctx.search_query();
        let max_results = ctx.options().max_results;
        let sources: Vec<&Arc<dyn DiscoverySource>> = ctx.clients().sources_for(ctx.target()).collect();

        let results = join_all(
            sources
                .iter()
                .map(|source| Self::query_source(source, &query, max_results, ctx)),
        )
        .await;

        let mut seen = HashSet::new();
        let mut records = Vec::new();
        let mut failed = 0;
        let mut interrupted = false;
        for (source, result) in sources.iter().zip(results) {
            let listings = match result {
                None => {
                    interrupted = true;
                    continue;
                }
                Some(Ok(listings)) => listings,
                Some(Err(err)) if err.is_transient() => {
                    warn!(source = source.name(), error = %err, "Discovery source failed, skipping");
                    failed += 1;
                    continue;
                }
                Some(Err(err)) => return Err(ListingflowError::Source(err)),
            };

            let mut kept = 0;
            for listing in listings.into_iter().take(max_results) {
                let record = Record::discovered(ctx.target().value(), source.name(), &listing.url, records.len());
                if !seen.insert(record.id().clone()) {
                    continue;
                }
                let mut record = record;
                record.raw_mut().extend(listing.fields);
                records.push(record);
                kept += 1;
            }
            info!(source = source.name(), kept, "Discovered listings");
        }

        let output = StepOutput::new(records).with_failures(sources.len(), failed);
        Ok(if interrupted { output.interrupted() } else { output })
    }

    fn summarize(&self, output: &[Record]) -> StepSummary {
        let mut per_source: BTreeMap<&str, usize> = BTreeMap::new();
        for record in output {
            *per_source.entry(record.source()).or_default() += 1;
        }
        per_source
            .into_iter()
            .fold(StepSummary::from_records(output), |summary, (source, count)| {
                summary.with_detail(source, count)
            })
    }
}

/// Identifiers of `records`, for deduplicating later additions.
pub(crate) fn known_ids(records: &[Record]) -> HashSet<RecordId> {
    records.iter().map(|r| r.id().clone()).collect()
}
