//! Related-term query expansion.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::{BTreeSet, HashMap};
use tracing::{info, warn};

use super::discovery::known_ids;
use super::{Step, StepDescriptor, StepOutput};
use crate::adapters::{ExpandedTerm, SearchQuery};
use crate::context::{SearchTarget, StepContext};
use crate::core::{fields, Record, RecordId, StepKind};
use crate::errors::{ListingflowError, Result};

fn default_max_terms() -> usize {
    5
}

fn default_candidate_terms() -> usize {
    50
}

/// Layered configuration of [`KeywordEnrichmentStep`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnrichmentConfig {
    /// Related terms kept, by descending volume.
    #[serde(default = "default_max_terms")]
    pub max_terms: usize,
    /// Suggestions requested from the expander before selection. Never
    /// fewer than `max_terms + 1`, since the original keyword may come back.
    #[serde(default = "default_candidate_terms")]
    pub candidate_terms: usize,
    /// Result cap per term and source. Defaults to the run's cap.
    #[serde(default)]
    pub results_per_term: Option<usize>,
}

impl Default for EnrichmentConfig {
    fn default() -> Self {
        Self {
            max_terms: default_max_terms(),
            candidate_terms: default_candidate_terms(),
            results_per_term: None,
        }
    }
}

/// Searches related keywords and adds what they find.
///
/// New URLs become new records continuing the discovery index; records found
/// again are annotated with the terms that found them. Nothing is removed.
/// When enrichment is off for the run, the input passes through unchanged so
/// later ordinals stay stable.
#[derive(Debug, Clone)]
pub struct KeywordEnrichmentStep {
    descriptor: StepDescriptor,
    config: EnrichmentConfig,
}

impl KeywordEnrichmentStep {
    /// Registry identifier.
    pub const ID: &'static str = "keyword_enrichment";

    /// Creates the step.
    #[must_use]
    pub fn new(config: EnrichmentConfig) -> Self {
        Self {
            descriptor: StepDescriptor::new(Self::ID, StepKind::Enricher),
            config,
        }
    }

    fn requested_terms(&self) -> usize {
        self.config.candidate_terms.max(self.config.max_terms + 1)
    }

    /// Drops the original keyword, merges case variants by summing their
    /// volume, and keeps the `max_terms` highest volumes.
    fn top_terms(&self, terms: Vec<ExpandedTerm>, original: &str) -> Vec<ExpandedTerm> {
        let original = original.trim().to_lowercase();
        let mut merged: Vec<ExpandedTerm> = Vec::with_capacity(terms.len());
        let mut positions: HashMap<String, usize> = HashMap::new();
        for term in terms {
            let key = term.term.trim().to_lowercase();
            if key.is_empty() || key == original {
                continue;
            }
            match positions.get(&key) {
                Some(&i) => merged[i].volume += term.volume,
                None => {
                    positions.insert(key, merged.len());
                    merged.push(ExpandedTerm {
                        term: term.term.trim().to_string(),
                        volume: term.volume,
                    });
                }
            }
        }
        // Stable sort keeps the expander's order among equal volumes.
        merged.sort_by(|a, b| b.volume.cmp(&a.volume));
        merged.truncate(self.config.max_terms);
        merged
    }
}

#[async_trait]
impl Step for KeywordEnrichmentStep {
    fn descriptor(&self) -> &StepDescriptor {
        &self.descriptor
    }

    async fn execute(&self, input: &[Record], ctx: &StepContext<'_>) -> Result<StepOutput> {
        let records = input.to_vec();
        let SearchTarget::Keyword(keyword) = ctx.target() else {
            return Ok(StepOutput::new(records));
        };
        let expander = match ctx.clients().expander() {
            Some(expander) if ctx.options().enrich_keywords => expander,
            _ => {
                info!("Keyword enrichment disabled, passing records through");
                return Ok(StepOutput::new(records));
            }
        };

        let terms = match expander.expand(keyword, self.requested_terms()).await {
            Ok(terms) => self.top_terms(terms, keyword),
            Err(err) if err.is_transient() => {
                warn!(error = %err, "Keyword expansion failed, passing records through");
                return Ok(StepOutput::new(records));
            }
            Err(err) => return Err(ListingflowError::Source(err)),
        };

        let stamp = ctx.stamp();
        let per_term = self.config.results_per_term.unwrap_or(ctx.options().max_results);
        let mut records = records;
        let mut ids = known_ids(&records);
        let mut found_again: HashMap<RecordId, BTreeSet<String>> = HashMap::new();
        let mut next_index = records.iter().map(|r| r.discovery_index() + 1).max().unwrap_or(0);
        let (mut attempted, mut failed) = (0, 0);

        for term in &terms {
            let query = SearchQuery::new(SearchTarget::Keyword(term.term.clone()))
                .with_country(ctx.country().map(str::to_string));
            for source in ctx.clients().sources_for(&query.target) {
                if ctx.is_cancelled() {
                    return Ok(StepOutput::new(records)
                        .with_failures(attempted, failed)
                        .interrupted());
                }
                attempted += 1;
                let listings = match source.search(&query, per_term).await {
                    Ok(listings) => listings,
                    Err(err) if err.is_transient() => {
                        warn!(term = %term.term, source = source.name(), error = %err, "Related-term search failed");
                        failed += 1;
                        continue;
                    }
                    Err(err) => return Err(ListingflowError::Source(err)),
                };
                for listing in listings.into_iter().take(per_term) {
                    let mut record = Record::discovered(&term.term, source.name(), &listing.url, next_index);
                    if ids.insert(record.id().clone()) {
                        record.raw_mut().extend(listing.fields);
                        record.derive(fields::KEYWORD_VOLUME, json!(term.volume), &stamp)?;
                        record.derive(fields::RELATED_TERMS, json!([term.term]), &stamp)?;
                        records.push(record);
                        next_index += 1;
                    } else {
                        found_again
                            .entry(record.id().clone())
                            .or_default()
                            .insert(term.term.clone());
                    }
                }
            }
        }

        for record in records.iter_mut().filter(|r| r.is_active()) {
            if let Some(terms) = found_again.remove(record.id()) {
                let mut all: BTreeSet<String> = record
                    .derived(fields::RELATED_TERMS)
                    .and_then(Value::as_array)
                    .map(|a| a.iter().filter_map(|v| v.as_str().map(str::to_string)).collect())
                    .unwrap_or_default();
                all.extend(terms);
                record.derive(fields::RELATED_TERMS, json!(all), &stamp)?;
            }
        }

        info!(terms = terms.len(), records = records.len(), "Keyword enrichment done");
        Ok(StepOutput::new(records).with_failures(attempted, failed))
    }
}
