//! Country filter: domain lists and URL rules for one country.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::fmt;
use tracing::debug;
use url::Url;

use super::{Step, StepDescriptor, StepOutput};
use crate::context::StepContext;
use crate::core::{fields, Record, Shape, StepKind};
use crate::errors::{Result, UnsupportedScopeError};
use crate::utils::host_of;

fn default_exclude_unknown() -> bool {
    true
}

/// Layered configuration of [`CountryFilterStep`]. All lists are lowercase.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CountryFilterConfig {
    /// Domains always excluded, subdomains included.
    pub blacklist: Vec<String>,
    /// Domains known to sell into the country.
    pub known_positive: Vec<String>,
    /// Domains reviewed without a conclusion.
    pub known_unknown: Vec<String>,
    /// Domains known not to sell into the country.
    pub known_negative: Vec<String>,
    /// Country codes looked for in paths and query values.
    pub countries: Vec<String>,
    /// Accepted top-level domains.
    pub top_level_domains: Vec<String>,
    /// Accepted labels below the top level (e.g. `ch` in `ch.shop.com`).
    pub sub_level_domains: Vec<String>,
    /// Locale tags looked for in paths and query values.
    pub languages: Vec<String>,
    /// Currency codes accepted in paths, query values and prices.
    pub currencies: Vec<String>,
    /// Whether records without a verdict are excluded.
    #[serde(default = "default_exclude_unknown")]
    pub exclude_unknown: bool,
}

impl Default for CountryFilterConfig {
    fn default() -> Self {
        Self {
            blacklist: Vec::new(),
            known_positive: Vec::new(),
            known_unknown: Vec::new(),
            known_negative: Vec::new(),
            countries: Vec::new(),
            top_level_domains: Vec::new(),
            sub_level_domains: Vec::new(),
            languages: Vec::new(),
            currencies: Vec::new(),
            exclude_unknown: default_exclude_unknown(),
        }
    }
}

/// Outcome of the country filter for one record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CountryVerdict {
    /// The listing targets the country.
    Positive,
    /// No rule decided.
    Unknown,
    /// The listing does not target the country.
    Negative,
}

impl fmt::Display for CountryVerdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Positive => write!(f, "positive"),
            Self::Unknown => write!(f, "unknown"),
            Self::Negative => write!(f, "negative"),
        }
    }
}

fn strip_www(host: &str) -> &str {
    host.strip_prefix("www.").unwrap_or(host)
}

fn listed(list: &[String], host: &str) -> bool {
    list.iter().any(|d| strip_www(d) == host)
}

fn blacklisted(list: &[String], host: &str) -> bool {
    list.iter().map(|d| strip_www(d)).any(|d| {
        host == d || host.strip_suffix(d).is_some_and(|rest| rest.ends_with('.'))
    })
}

fn any_in(candidates: &[String], lists: &[&[String]]) -> bool {
    candidates
        .iter()
        .filter(|c| !c.is_empty())
        .any(|c| lists.iter().any(|list| list.contains(c)))
}

impl CountryFilterConfig {
    /// Decides a verdict for `url`, given the record's currency.
    ///
    /// Returns the verdict and the name of the deciding rule.
    #[must_use]
    pub fn evaluate(&self, url: &str, currency: Option<&str>) -> (CountryVerdict, &'static str) {
        let Some(host) = host_of(url) else {
            return (CountryVerdict::Unknown, "unparsable_url");
        };
        if blacklisted(&self.blacklist, &host) {
            return (CountryVerdict::Negative, "blacklist");
        }
        if listed(&self.known_negative, &host) {
            return (CountryVerdict::Negative, "known_negative");
        }
        if listed(&self.known_positive, &host) {
            return (CountryVerdict::Positive, "known_positive");
        }
        if listed(&self.known_unknown, &host) {
            return (CountryVerdict::Unknown, "known_unknown");
        }
        if let Some(rule) = self.url_rule(url, &host) {
            return (CountryVerdict::Positive, rule);
        }
        if currency.is_some_and(|c| self.currencies.contains(&c.to_lowercase())) {
            return (CountryVerdict::Positive, "currency");
        }
        (CountryVerdict::Unknown, "no_rule")
    }

    fn url_rule(&self, url: &str, host: &str) -> Option<&'static str> {
        let labels: Vec<String> = host.split('.').map(str::to_string).collect();
        let (tld, subs) = labels.split_last()?;
        if self.top_level_domains.contains(tld) {
            return Some("top_level_domain");
        }
        if any_in(subs, &[&self.top_level_domains, &self.sub_level_domains]) {
            return Some("sub_level_domain");
        }

        let parsed = Url::parse(&url.to_lowercase()).ok()?;
        let markers: [&[String]; 3] = [&self.countries, &self.languages, &self.currencies];
        let directories: Vec<String> = parsed
            .path_segments()
            .map(|segments| segments.map(str::to_string).collect())
            .unwrap_or_default();
        if any_in(&directories, &markers) {
            return Some("path");
        }
        let query_values: Vec<String> = parsed
            .query_pairs()
            .flat_map(|(_, value)| {
                value
                    .split(|c: char| !(c.is_alphanumeric() || c == '_'))
                    .map(str::to_string)
                    .collect::<Vec<_>>()
            })
            .collect();
        if any_in(&query_values, &markers) {
            return Some("query");
        }
        None
    }
}

/// Excludes records that do not target the run's country.
///
/// Deterministic and idempotent: excluded records are never revisited and
/// kept records get the same annotations again.
#[derive(Debug, Clone)]
pub struct CountryFilterStep {
    descriptor: StepDescriptor,
    config: CountryFilterConfig,
}

impl CountryFilterStep {
    /// Registry identifier.
    pub const ID: &'static str = "country_filter";

    /// Creates the step.
    #[must_use]
    pub fn new(config: CountryFilterConfig) -> Self {
        Self {
            descriptor: StepDescriptor::new(Self::ID, StepKind::Filter)
                .providing(Shape::of(&[fields::DOMAIN, fields::COUNTRY_FILTER]))
                .country_scoped(),
            config,
        }
    }

    /// The resolved configuration.
    #[must_use]
    pub const fn config(&self) -> &CountryFilterConfig {
        &self.config
    }

    /// Applies the filter without a run context.
    pub fn apply(&self, input: &[Record], stamp: &crate::core::StepStamp) -> Result<Vec<Record>> {
        let mut output = input.to_vec();
        for record in output.iter_mut().filter(|r| r.is_active()) {
            let currency = record.derived(fields::CURRENCY).and_then(|v| v.as_str());
            let (verdict, rule) = self.config.evaluate(record.url(), currency);
            let domain = host_of(record.url()).unwrap_or_default();
            record.derive(fields::DOMAIN, json!(domain), stamp)?;
            record.derive(
                fields::COUNTRY_FILTER,
                json!({ "result": verdict, "rule": rule }),
                stamp,
            )?;

            let excluded = match verdict {
                CountryVerdict::Negative => true,
                CountryVerdict::Unknown => self.config.exclude_unknown,
                CountryVerdict::Positive => false,
            };
            debug!(url = %record.url(), %verdict, rule, excluded, "Country filter verdict");
            if excluded {
                record.exclude(stamp, format!("{verdict} ({rule}) for domain {domain}"));
            }
        }
        Ok(output)
    }
}

#[async_trait]
impl Step for CountryFilterStep {
    fn descriptor(&self) -> &StepDescriptor {
        &self.descriptor
    }

    fn validate(&self, _input: &[Record], ctx: &StepContext<'_>) -> Result<()> {
        if ctx.country().is_none() {
            return Err(UnsupportedScopeError {
                step_id: Self::ID.to_string(),
            }
            .into());
        }
        Ok(())
    }

    async fn execute(&self, input: &[Record], ctx: &StepContext<'_>) -> Result<StepOutput> {
        Ok(StepOutput::new(self.apply(input, &ctx.stamp())?))
    }
}
