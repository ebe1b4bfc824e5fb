//! Run identity: what is searched, by whom, in which scope.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::utils::{name_uuid, run_stamp, slugify, Timestamp};

/// What a run searches for.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum SearchTarget {
    /// A search keyword.
    Keyword(String),
    /// A reference to an image used for reverse-image search.
    Image(String),
    /// A single listing URL supplied by the operator.
    Url(String),
}

impl SearchTarget {
    /// Interprets `input` as a URL when it parses as one, a keyword otherwise.
    #[must_use]
    pub fn infer(input: &str) -> Self {
        let trimmed = input.trim();
        match url::Url::parse(trimmed) {
            Ok(parsed) if matches!(parsed.scheme(), "http" | "https") => {
                Self::Url(trimmed.to_string())
            }
            _ => Self::Keyword(trimmed.to_string()),
        }
    }

    /// The search term, image reference or URL.
    #[must_use]
    pub fn value(&self) -> &str {
        match self {
            Self::Keyword(v) | Self::Image(v) | Self::Url(v) => v,
        }
    }

    /// Short name of the target kind.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Keyword(_) => "keyword",
            Self::Image(_) => "image",
            Self::Url(_) => "url",
        }
    }
}

impl fmt::Display for SearchTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind(), self.value())
    }
}

/// Regulatory scope of a run. Both parts are optional.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunScope {
    /// Lowercase ISO country code.
    pub country: Option<String>,
    /// Organization name as configured in the settings.
    pub organization: Option<String>,
}

impl RunScope {
    /// An unscoped run: country-specific steps are skipped.
    #[must_use]
    pub fn unscoped() -> Self {
        Self::default()
    }

    /// Scopes to a country.
    #[must_use]
    pub fn with_country(mut self, country: impl AsRef<str>) -> Self {
        let code = country.as_ref().trim().to_lowercase();
        self.country = (!code.is_empty()).then_some(code);
        self
    }

    /// Scopes to an organization.
    #[must_use]
    pub fn with_organization(mut self, organization: impl Into<String>) -> Self {
        self.organization = Some(organization.into());
        self
    }

    /// Whether a country is known.
    #[must_use]
    pub const fn has_country(&self) -> bool {
        self.country.is_some()
    }
}

impl fmt::Display for RunScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.country, &self.organization) {
            (None, None) => f.write_str("unscoped"),
            (Some(c), None) => write!(f, "country={c}"),
            (None, Some(o)) => write!(f, "org={o}"),
            (Some(c), Some(o)) => write!(f, "country={c} org={o}"),
        }
    }
}

/// Identifier of one run, unique per artifact directory.
///
/// Formatted as `{stamp}_{search}_{user}` with millisecond precision, so
/// repeating a search produces a new id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunId(String);

impl RunId {
    /// Builds the id for a run started at `at`.
    #[must_use]
    pub fn generate(search: &str, user: &str, at: &Timestamp) -> Self {
        Self(format!(
            "{}_{}_{}",
            run_stamp(at),
            slugify(search),
            slugify(user)
        ))
    }

    /// Wraps an existing id, as read from the command line or a manifest.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The id as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Name-based correlation id for logs and events.
    #[must_use]
    pub fn uuid(&self) -> Uuid {
        name_uuid(&self.0)
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for RunId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
