//! Interfaces to external collaborators.
//!
//! The core never talks to a provider directly. Discovery sources, page
//! fetchers, keyword expanders and classification models are consumed through
//! the traits below and shared read-only through the run context.
//!
//! Provider-neutral implementations live alongside:
//! - [`ManualUrlSource`] and [`UrlListSource`] for offline discovery
//! - [`ProbabilityThresholdModel`] for thresholding a provider probability
//! - `HttpPageFetcher` and `HttpModelEndpoint` behind the `http` feature

#[cfg(feature = "http")]
mod http;
mod manual;
pub mod retry;
mod threshold;

#[cfg(feature = "http")]
pub use http::{HttpConfig, HttpModelEndpoint, HttpPageFetcher};
pub use manual::{ManualUrlSource, UrlListSource};
pub use threshold::ProbabilityThresholdModel;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

use crate::context::SearchTarget;
use crate::core::Record;
use crate::errors::SourceError;

/// Structured fields returned by an extraction adapter.
pub type StructuredFields = BTreeMap<String, Value>;

/// A query handed to discovery sources.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchQuery {
    /// What to search for.
    pub target: SearchTarget,
    /// Country scope of the run, lowercase ISO code.
    pub country: Option<String>,
}

impl SearchQuery {
    /// Creates a query for `target`.
    #[must_use]
    pub const fn new(target: SearchTarget) -> Self {
        Self {
            target,
            country: None,
        }
    }

    /// Sets the country scope.
    #[must_use]
    pub fn with_country(mut self, country: Option<String>) -> Self {
        self.country = country;
        self
    }
}

/// A listing as reported by a discovery source, before it becomes a record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawListing {
    /// URL of the listing.
    pub url: String,
    /// Provider-specific fields, kept verbatim.
    #[serde(default)]
    pub fields: StructuredFields,
}

impl RawListing {
    /// Creates a listing with no extra fields.
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            fields: BTreeMap::new(),
        }
    }

    /// Adds a provider field.
    #[must_use]
    pub fn with_field(mut self, key: impl Into<String>, value: Value) -> Self {
        self.fields.insert(key.into(), value);
        self
    }
}

/// A model answer for one record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    /// Predicted label.
    pub label: String,
    /// Confidence or probability for the label.
    pub score: f64,
    /// Version of the model that answered.
    pub model_version: String,
}

impl Prediction {
    /// Creates a prediction.
    #[must_use]
    pub fn new(label: impl Into<String>, score: f64, model_version: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            score,
            model_version: model_version.into(),
        }
    }
}

/// A related search term and its volume.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExpandedTerm {
    /// The term.
    pub term: String,
    /// Estimated monthly search volume.
    pub volume: u64,
}

/// Finds listings for a search target.
#[async_trait]
pub trait DiscoverySource: Send + Sync {
    /// Name recorded as each record's source.
    fn name(&self) -> &str;

    /// Whether this source can handle `target` at all.
    fn supports(&self, target: &SearchTarget) -> bool;

    /// Returns at most `max_results` listings.
    async fn search(
        &self,
        query: &SearchQuery,
        max_results: usize,
    ) -> Result<Vec<RawListing>, SourceError>;
}

/// Fetches structured fields for a listing URL.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PageFetcher: Send + Sync {
    /// Returns the structured fields of the page at `url`.
    async fn fetch(&self, url: &str) -> Result<StructuredFields, SourceError>;
}

/// A black-box classifier: record in, label and score out.
#[async_trait]
pub trait ClassificationModel: Send + Sync {
    /// Predicts a label for `record`.
    async fn predict(&self, record: &Record) -> Result<Prediction, SourceError>;
}

/// Suggests related search terms for query expansion.
#[async_trait]
pub trait KeywordExpander: Send + Sync {
    /// Returns up to `limit` related terms for `term`.
    async fn expand(&self, term: &str, limit: usize) -> Result<Vec<ExpandedTerm>, SourceError>;
}
