//! The record type flowing between steps.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

use crate::errors::FieldOwnershipError;
use crate::utils::{normalize_url, short_digest};

/// Well-known derived field keys.
pub mod fields {
    /// Parsed listing price.
    pub const PRICE: &str = "price";
    /// ISO currency of [`PRICE`].
    pub const CURRENCY: &str = "currency";
    /// Host of the listing URL.
    pub const DOMAIN: &str = "domain";
    /// Detected page language.
    pub const LANGUAGE: &str = "language";
    /// Search volume of the term that found the record.
    pub const KEYWORD_VOLUME: &str = "keyword_volume";
    /// Related terms that found the record again.
    pub const RELATED_TERMS: &str = "related_terms";
    /// Result of the country filter.
    pub const COUNTRY_FILTER: &str = "country_filter";
    /// Result of the delivery-policy filter.
    pub const DELIVERY_POLICY: &str = "delivery_policy";
    /// Page-type label.
    pub const PAGE_TYPE: &str = "page_type";
    /// Blocked-content label.
    pub const BLOCKED_CONTENT: &str = "blocked_content";
    /// Relevance label.
    pub const RELEVANCE: &str = "relevance";
    /// Suspicion label.
    pub const SUSPICION: &str = "suspicion";
    /// Ranker composite score.
    pub const COMPOSITE_SCORE: &str = "composite_score";
    /// 1-based rank.
    pub const RANK: &str = "rank";

    /// Key under which a classifier stores the score for `label_field`.
    #[must_use]
    pub fn score_of(label_field: &str) -> String {
        format!("{label_field}_score")
    }
}

/// Stable identifier of a record, derived from its normalized URL.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordId(String);

impl RecordId {
    /// Derives the identifier for a normalized URL or image reference.
    #[must_use]
    pub fn derive(reference: &str) -> Self {
        Self(short_digest(reference))
    }

    /// Returns the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identifies the step (and its ordinal) writing to a record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepStamp {
    /// Step identifier.
    pub step: String,
    /// Ordinal within the pipeline definition.
    pub ordinal: usize,
}

impl StepStamp {
    /// Creates a new stamp.
    #[must_use]
    pub fn new(step: impl Into<String>, ordinal: usize) -> Self {
        Self {
            step: step.into(),
            ordinal,
        }
    }
}

/// A derived value and the step that wrote it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DerivedValue {
    /// The value.
    pub value: Value,
    /// Step that owns the field.
    pub step: String,
    /// Ordinal of that step.
    pub ordinal: usize,
    /// Model version, for classifier output.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_version: Option<String>,
}

/// Whether a record still takes part in the pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum RecordStatus {
    /// Processed by every following step.
    #[default]
    Active,
    /// Removed by a filter. Kept for audit.
    Excluded {
        /// Filter step id.
        step: String,
        /// Filter ordinal.
        ordinal: usize,
        /// Why it was excluded.
        reason: String,
    },
    /// An external call for this record failed.
    Failed {
        /// Step id.
        step: String,
        /// Step ordinal.
        ordinal: usize,
        /// Error detail.
        error: String,
    },
}

/// One candidate listing plus everything later steps learned about it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    id: RecordId,
    discovery_index: usize,
    query: String,
    source: String,
    url: String,
    original_url: String,
    #[serde(default)]
    raw: BTreeMap<String, Value>,
    #[serde(default)]
    derived: BTreeMap<String, DerivedValue>,
    #[serde(default)]
    status: RecordStatus,
}

impl Record {
    /// Mints a record for a discovered listing.
    ///
    /// The identifier is derived from the normalized URL. References that
    /// are not absolute URLs (image handles, for instance) are used verbatim.
    #[must_use]
    pub fn discovered(
        query: impl Into<String>,
        source: impl Into<String>,
        url: &str,
        discovery_index: usize,
    ) -> Self {
        let normalized = normalize_url(url).unwrap_or_else(|| url.trim().to_string());
        Self {
            id: RecordId::derive(&normalized),
            discovery_index,
            query: query.into(),
            source: source.into(),
            url: normalized,
            original_url: url.to_string(),
            raw: BTreeMap::new(),
            derived: BTreeMap::new(),
            status: RecordStatus::Active,
        }
    }

    /// Adds a raw provider field.
    #[must_use]
    pub fn with_raw(mut self, key: impl Into<String>, value: Value) -> Self {
        self.raw.insert(key.into(), value);
        self
    }

    /// The immutable identifier.
    #[must_use]
    pub const fn id(&self) -> &RecordId {
        &self.id
    }

    /// Position in first-discovery order.
    #[must_use]
    pub const fn discovery_index(&self) -> usize {
        self.discovery_index
    }

    /// The query or keyword that found this record.
    #[must_use]
    pub fn query(&self) -> &str {
        &self.query
    }

    /// Name of the discovery source.
    #[must_use]
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Normalized URL.
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    /// URL as the source reported it.
    #[must_use]
    pub fn original_url(&self) -> &str {
        &self.original_url
    }

    /// Provider-specific raw fields.
    #[must_use]
    pub const fn raw(&self) -> &BTreeMap<String, Value> {
        &self.raw
    }

    /// Mutable access to the raw fields.
    pub fn raw_mut(&mut self) -> &mut BTreeMap<String, Value> {
        &mut self.raw
    }

    /// Raw field as a string, if present and textual.
    #[must_use]
    pub fn raw_str(&self, key: &str) -> Option<&str> {
        self.raw.get(key).and_then(Value::as_str)
    }

    /// Value of a derived field.
    #[must_use]
    pub fn derived(&self, key: &str) -> Option<&Value> {
        self.derived.get(key).map(|d| &d.value)
    }

    /// Derived field with provenance.
    #[must_use]
    pub fn provenance(&self, key: &str) -> Option<&DerivedValue> {
        self.derived.get(key)
    }

    /// All derived fields, sorted by key.
    #[must_use]
    pub const fn derived_fields(&self) -> &BTreeMap<String, DerivedValue> {
        &self.derived
    }

    /// Writes a derived field on behalf of `stamp`.
    pub fn derive(
        &mut self,
        key: &str,
        value: Value,
        stamp: &StepStamp,
    ) -> Result<(), FieldOwnershipError> {
        self.write_derived(key, value, stamp, None)
    }

    /// Writes a derived field produced by a versioned model.
    pub fn derive_with_model(
        &mut self,
        key: &str,
        value: Value,
        stamp: &StepStamp,
        model_version: impl Into<String>,
    ) -> Result<(), FieldOwnershipError> {
        self.write_derived(key, value, stamp, Some(model_version.into()))
    }

    fn write_derived(
        &mut self,
        key: &str,
        value: Value,
        stamp: &StepStamp,
        model_version: Option<String>,
    ) -> Result<(), FieldOwnershipError> {
        if let Some(existing) = self.derived.get(key) {
            if existing.step != stamp.step {
                return Err(FieldOwnershipError {
                    field: key.to_string(),
                    owner: existing.step.clone(),
                    writer: stamp.step.clone(),
                });
            }
        }
        self.derived.insert(
            key.to_string(),
            DerivedValue {
                value,
                step: stamp.step.clone(),
                ordinal: stamp.ordinal,
                model_version,
            },
        );
        Ok(())
    }

    /// Current status.
    #[must_use]
    pub const fn status(&self) -> &RecordStatus {
        &self.status
    }

    /// Returns true if later steps should process this record.
    #[must_use]
    pub const fn is_active(&self) -> bool {
        matches!(self.status, RecordStatus::Active)
    }

    /// Returns true if a filter excluded this record.
    #[must_use]
    pub const fn is_excluded(&self) -> bool {
        matches!(self.status, RecordStatus::Excluded { .. })
    }

    /// Returns true if an external call for this record failed.
    #[must_use]
    pub const fn is_failed(&self) -> bool {
        matches!(self.status, RecordStatus::Failed { .. })
    }

    /// Flags the record as excluded by `stamp`.
    pub fn exclude(&mut self, stamp: &StepStamp, reason: impl Into<String>) {
        self.status = RecordStatus::Excluded {
            step: stamp.step.clone(),
            ordinal: stamp.ordinal,
            reason: reason.into(),
        };
    }

    /// Flags the record as failed by `stamp`.
    pub fn fail(&mut self, stamp: &StepStamp, error: impl Into<String>) {
        self.status = RecordStatus::Failed {
            step: stamp.step.clone(),
            ordinal: stamp.ordinal,
            error: error.into(),
        };
    }

    /// Returns true if an external call made by `step` failed for this record.
    #[must_use]
    pub fn failed_by(&self, step: &str) -> bool {
        matches!(&self.status, RecordStatus::Failed { step: s, .. } if s == step)
    }
}
