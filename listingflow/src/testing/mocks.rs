//! Scripted collaborators for tests and dry runs.

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use crate::adapters::{
    ClassificationModel, DiscoverySource, ExpandedTerm, KeywordExpander, PageFetcher, Prediction,
    RawListing, SearchQuery, StructuredFields,
};
use crate::cancellation::CancellationToken;
use crate::context::SearchTarget;
use crate::core::Record;
use crate::errors::SourceError;

/// A discovery source returning fixed listings for keyword and image searches.
#[derive(Debug, Clone)]
pub struct StaticSource {
    name: String,
    listings: Vec<RawListing>,
    calls: Arc<Mutex<Vec<String>>>,
}

impl StaticSource {
    /// Creates a source over `listings`.
    #[must_use]
    pub fn new(name: impl Into<String>, listings: Vec<RawListing>) -> Self {
        Self {
            name: name.into(),
            listings,
            calls: Arc::default(),
        }
    }

    /// Creates a source over bare URLs.
    #[must_use]
    pub fn with_urls(name: impl Into<String>, urls: &[&str]) -> Self {
        Self::new(name, urls.iter().map(|u| RawListing::new(*u)).collect())
    }

    /// Search terms received so far.
    #[must_use]
    pub fn queries(&self) -> Vec<String> {
        self.calls.lock().clone()
    }
}

#[async_trait]
impl DiscoverySource for StaticSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn supports(&self, target: &SearchTarget) -> bool {
        !matches!(target, SearchTarget::Url(_))
    }

    async fn search(
        &self,
        query: &SearchQuery,
        max_results: usize,
    ) -> Result<Vec<RawListing>, SourceError> {
        self.calls.lock().push(query.target.value().to_string());
        Ok(self.listings.iter().take(max_results).cloned().collect())
    }
}

/// A discovery source that always fails.
#[derive(Debug, Clone)]
pub struct FailingSource {
    name: String,
    transient: bool,
}

impl FailingSource {
    /// Fails with a transient error.
    #[must_use]
    pub fn transient(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            transient: true,
        }
    }

    /// Fails with a fatal error.
    #[must_use]
    pub fn fatal(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            transient: false,
        }
    }
}

#[async_trait]
impl DiscoverySource for FailingSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn supports(&self, _target: &SearchTarget) -> bool {
        true
    }

    async fn search(
        &self,
        _query: &SearchQuery,
        _max_results: usize,
    ) -> Result<Vec<RawListing>, SourceError> {
        Err(if self.transient {
            SourceError::transient(&self.name, "503 Service Unavailable")
        } else {
            SourceError::fatal(&self.name, "401 Unauthorized")
        })
    }
}

/// A keyword expander with fixed related terms.
#[derive(Debug, Clone)]
pub struct StaticExpander {
    terms: Vec<ExpandedTerm>,
}

impl StaticExpander {
    /// Creates an expander returning `(term, volume)` pairs.
    #[must_use]
    pub fn new(terms: Vec<(&str, u64)>) -> Self {
        Self {
            terms: terms
                .into_iter()
                .map(|(term, volume)| ExpandedTerm {
                    term: term.to_string(),
                    volume,
                })
                .collect(),
        }
    }
}

#[async_trait]
impl KeywordExpander for StaticExpander {
    async fn expand(&self, _term: &str, limit: usize) -> Result<Vec<ExpandedTerm>, SourceError> {
        Ok(self.terms.iter().take(limit).cloned().collect())
    }
}

/// A page fetcher serving fixed pages; unknown URLs get an empty page.
#[derive(Debug, Clone, Default)]
pub struct StaticFetcher {
    pages: HashMap<String, StructuredFields>,
    transient: HashSet<String>,
    missing: HashSet<String>,
}

impl StaticFetcher {
    /// Creates a fetcher with no pages.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Serves `fields` for `url`.
    #[must_use]
    pub fn with_page(mut self, url: impl Into<String>, fields: StructuredFields) -> Self {
        self.pages.insert(url.into(), fields);
        self
    }

    /// Fails transiently for `url`.
    #[must_use]
    pub fn transient_for(mut self, url: impl Into<String>) -> Self {
        self.transient.insert(url.into());
        self
    }

    /// Answers `url` with a fatal 404.
    #[must_use]
    pub fn missing(mut self, url: impl Into<String>) -> Self {
        self.missing.insert(url.into());
        self
    }
}

#[async_trait]
impl PageFetcher for StaticFetcher {
    async fn fetch(&self, url: &str) -> Result<StructuredFields, SourceError> {
        if self.transient.contains(url) {
            return Err(SourceError::transient("static_fetcher", "connection reset"));
        }
        if self.missing.contains(url) {
            return Err(SourceError::fatal("static_fetcher", "HTTP 404"));
        }
        Ok(self.pages.get(url).cloned().unwrap_or_default())
    }
}

/// A classification model with scripted answers.
///
/// Every record gets the default label unless a per-URL answer, a transient
/// failure or a cancellation is scripted for its URL.
#[derive(Debug, Clone)]
pub struct ScriptedModel {
    name: String,
    version: String,
    default: (String, f64),
    labels: BTreeMap<String, (String, f64)>,
    transient: HashSet<String>,
    cancel_on: Option<(String, Arc<CancellationToken>)>,
    calls: Arc<Mutex<usize>>,
}

impl ScriptedModel {
    /// Creates a model answering `"positive"` with score 1.0.
    #[must_use]
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            default: ("positive".to_string(), 1.0),
            labels: BTreeMap::new(),
            transient: HashSet::new(),
            cancel_on: None,
            calls: Arc::default(),
        }
    }

    /// Sets the default answer.
    #[must_use]
    pub fn label_all(mut self, label: impl Into<String>, score: f64) -> Self {
        self.default = (label.into(), score);
        self
    }

    /// Answers `label` and `score` for `url`.
    #[must_use]
    pub fn label_for(mut self, url: impl Into<String>, label: impl Into<String>, score: f64) -> Self {
        self.labels.insert(url.into(), (label.into(), score));
        self
    }

    /// Fails transiently for `url`.
    #[must_use]
    pub fn transient_for(mut self, url: impl Into<String>) -> Self {
        self.transient.insert(url.into());
        self
    }

    /// Cancels `token` when asked about `url`, then never answers.
    #[must_use]
    pub fn cancels_on(mut self, url: impl Into<String>, token: Arc<CancellationToken>) -> Self {
        self.cancel_on = Some((url.into(), token));
        self
    }

    /// Number of predictions requested.
    #[must_use]
    pub fn calls(&self) -> usize {
        *self.calls.lock()
    }
}

#[async_trait]
impl ClassificationModel for ScriptedModel {
    async fn predict(&self, record: &Record) -> Result<Prediction, SourceError> {
        *self.calls.lock() += 1;
        let url = record.url();
        if let Some((target, token)) = &self.cancel_on {
            if target == url {
                token.cancel("operator abort");
                std::future::pending::<()>().await;
            }
        }
        if self.transient.contains(url) {
            return Err(SourceError::transient(&self.name, "model endpoint timed out"));
        }
        let (label, score) = self.labels.get(url).unwrap_or(&self.default);
        Ok(Prediction::new(label.clone(), *score, self.version.clone()))
    }
}

/// Raw listing carrying the given fields.
#[must_use]
pub fn listing(url: &str, fields: &[(&str, Value)]) -> RawListing {
    fields
        .iter()
        .fold(RawListing::new(url), |listing, (key, value)| {
            listing.with_field(*key, value.clone())
        })
}
