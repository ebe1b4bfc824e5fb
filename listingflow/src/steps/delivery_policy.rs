//! Delivery-policy filter: does the shop deliver to the run's country?
//!
//! Hand-labelled and previously learned domains decide first. Otherwise the
//! product page's links are searched for a shipping-policy page, which is
//! fetched and handed to the `delivery_policy` model. The model answers
//! `yes`, `no`, or anything else when the policy is unclear; pages are tried
//! in link order until one gives a clear answer.
//!
//! With `known_domains_dir` set, domains the model decided are written back
//! to a per-country file and short-circuit later runs.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info};
use url::Url;

use super::fanout::fan_out;
use super::known_domains::KnownDomains;
use super::{CountryVerdict, Step, StepDescriptor, StepOutput};
use crate::adapters::{ClassificationModel, PageFetcher};
use crate::context::StepContext;
use crate::core::{fields, Record, Shape, StepKind, StepStamp, StepSummary};
use crate::errors::{ConfigurationError, Result, SourceError, UnsupportedScopeError};
use crate::utils::host_of;

/// Rule name for verdicts the model gave on a policy page.
const POLICY_PAGE: &str = "policy_page";
/// Rule name when every policy page was judged unclear.
const POLICY_UNCLEAR: &str = "policy_unclear";

/// Layered configuration of [`DeliveryPolicyStep`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeliveryPolicyConfig {
    /// Model judging policy pages. Defaults to the step id.
    pub model: Option<String>,
    /// Words marking a link as a shipping-policy page, matched in its URL or text.
    pub keywords: Vec<String>,
    /// Domains hand-labelled as delivering to the country.
    pub known_positive: Vec<String>,
    /// Domains hand-labelled as unclear.
    pub known_unknown: Vec<String>,
    /// Domains hand-labelled as not delivering to the country.
    pub known_negative: Vec<String>,
    /// Policy pages tried per record.
    pub max_policy_pages: usize,
    /// Whether records without a clear answer are excluded.
    pub exclude_unknown: bool,
    /// Where learned domains are kept. Learning is off when unset.
    pub known_domains_dir: Option<PathBuf>,
}

impl Default for DeliveryPolicyConfig {
    fn default() -> Self {
        Self {
            model: None,
            keywords: ["shipping", "delivery", "versand", "lieferung", "livraison", "spedizione"]
                .map(String::from)
                .to_vec(),
            known_positive: Vec::new(),
            known_unknown: Vec::new(),
            known_negative: Vec::new(),
            max_policy_pages: 3,
            exclude_unknown: false,
            known_domains_dir: None,
        }
    }
}

#[derive(Debug)]
struct Decision {
    verdict: CountryVerdict,
    rule: &'static str,
    policy_url: Option<String>,
    pages: BTreeMap<String, String>,
    model_version: Option<String>,
}

impl Decision {
    fn by_rule(verdict: CountryVerdict, rule: &'static str) -> Self {
        Self {
            verdict,
            rule,
            policy_url: None,
            pages: BTreeMap::new(),
            model_version: None,
        }
    }
}

/// Excludes records whose shop does not deliver to the run's country.
#[derive(Debug, Clone)]
pub struct DeliveryPolicyStep {
    descriptor: StepDescriptor,
    config: DeliveryPolicyConfig,
    model: String,
}

impl DeliveryPolicyStep {
    /// Registry identifier.
    pub const ID: &'static str = "delivery_policy";

    /// Creates the step.
    #[must_use]
    pub fn new(config: DeliveryPolicyConfig) -> Self {
        Self {
            descriptor: StepDescriptor::new(Self::ID, StepKind::Filter)
                .providing(Shape::of(&[fields::DELIVERY_POLICY]))
                .country_scoped(),
            model: config.model.clone().unwrap_or_else(|| Self::ID.to_string()),
            config,
        }
    }

    /// The resolved configuration.
    #[must_use]
    pub const fn config(&self) -> &DeliveryPolicyConfig {
        &self.config
    }

    fn resolve<'a>(
        &self,
        ctx: &StepContext<'a>,
    ) -> Result<(&'a Arc<dyn PageFetcher>, &'a Arc<dyn ClassificationModel>)> {
        let clients = ctx.run().clients();
        let fetcher = clients.fetcher().ok_or_else(|| {
            ConfigurationError::new("no page fetcher configured")
                .for_step(Self::ID)
                .with_parameter("fetcher")
        })?;
        let model = clients.model(&self.model).ok_or_else(|| {
            ConfigurationError::new(format!("model '{}' is not configured", self.model))
                .for_step(Self::ID)
                .with_parameter("model")
        })?;
        Ok((fetcher, model))
    }

    fn listed(&self, domain: &str) -> Option<(CountryVerdict, &'static str)> {
        let has = |list: &[String]| list.iter().any(|d| d.strip_prefix("www.").unwrap_or(d) == domain);
        if has(&self.config.known_positive) {
            Some((CountryVerdict::Positive, "known_positive"))
        } else if has(&self.config.known_unknown) {
            Some((CountryVerdict::Unknown, "known_unknown"))
        } else if has(&self.config.known_negative) {
            Some((CountryVerdict::Negative, "known_negative"))
        } else {
            None
        }
    }

    /// Policy-page candidates among the record's links, resolved against its URL.
    fn policy_links(&self, record: &Record) -> Vec<String> {
        let Some(links) = record.raw().get("links").and_then(|v| v.as_array()) else {
            return Vec::new();
        };
        let base = Url::parse(record.url()).ok();
        let keywords: Vec<String> = self.config.keywords.iter().map(|k| k.to_lowercase()).collect();

        let mut found: Vec<String> = Vec::new();
        for link in links {
            let href = link
                .get("href")
                .and_then(|v| v.as_str())
                .or_else(|| link.as_str())
                .unwrap_or_default();
            let text = link.get("text").and_then(|v| v.as_str()).unwrap_or_default();
            let haystack = format!("{href} {text}").to_lowercase();
            if href.is_empty() || !keywords.iter().any(|k| haystack.contains(k.as_str())) {
                continue;
            }
            let resolved = match &base {
                Some(base) => base.join(href),
                None => Url::parse(href),
            };
            if let Ok(url) = resolved {
                let url = String::from(url);
                if !found.contains(&url) {
                    found.push(url);
                }
            }
            if found.len() >= self.config.max_policy_pages {
                break;
            }
        }
        found
    }

    async fn judge(
        &self,
        fetcher: &Arc<dyn PageFetcher>,
        model: &Arc<dyn ClassificationModel>,
        record: &Record,
        country: &str,
    ) -> std::result::Result<Decision, SourceError> {
        let links = self.policy_links(record);
        if links.is_empty() {
            return Ok(Decision::by_rule(CountryVerdict::Unknown, "no_policy_link"));
        }

        let mut pages = BTreeMap::new();
        let mut judged = false;
        let mut transient = None;
        for link in links {
            let page = match fetcher.fetch(&link).await {
                Ok(page) => page,
                Err(e) => {
                    pages.insert(link, format!("fetch failed: {e}"));
                    if e.is_transient() {
                        transient = Some(e);
                    }
                    continue;
                }
            };
            let policy = page
                .into_iter()
                .fold(
                    Record::discovered(record.query(), Self::ID, &link, record.discovery_index()),
                    |policy, (key, value)| policy.with_raw(key, value),
                )
                .with_raw("country", json!(country));
            let prediction = match model.predict(&policy).await {
                Ok(prediction) => prediction,
                Err(e) => {
                    pages.insert(link, format!("model failed: {e}"));
                    if e.is_transient() {
                        transient = Some(e);
                    }
                    continue;
                }
            };
            judged = true;
            debug!(url = %record.url(), policy = %link, label = %prediction.label, "Policy page judged");
            pages.insert(link.clone(), prediction.label.clone());

            let verdict = match prediction.label.to_lowercase().as_str() {
                "yes" => CountryVerdict::Positive,
                "no" => CountryVerdict::Negative,
                _ => continue,
            };
            return Ok(Decision {
                verdict,
                rule: POLICY_PAGE,
                policy_url: Some(link),
                pages,
                model_version: Some(prediction.model_version),
            });
        }

        match transient {
            Some(err) if !judged => Err(err),
            _ => Ok(Decision {
                pages,
                ..Decision::by_rule(
                    CountryVerdict::Unknown,
                    if judged { POLICY_UNCLEAR } else { "policy_unreachable" },
                )
            }),
        }
    }

    async fn classify(
        &self,
        clients: (&Arc<dyn PageFetcher>, &Arc<dyn ClassificationModel>),
        learned: &KnownDomains,
        country: &str,
        mut record: Record,
        stamp: &StepStamp,
    ) -> Result<Record> {
        let (fetcher, model) = clients;
        let domain = host_of(record.url()).unwrap_or_default();
        let known = self
            .listed(&domain)
            .or_else(|| learned.verdict(&domain).map(|verdict| (verdict, "learned")));
        let decision = match known {
            Some((verdict, rule)) => Decision::by_rule(verdict, rule),
            None => self.judge(fetcher, model, &record, country).await?,
        };

        let value = json!({
            "result": decision.verdict,
            "rule": decision.rule,
            "policy_url": decision.policy_url,
            "pages": decision.pages,
        });
        match decision.model_version {
            Some(version) => record.derive_with_model(fields::DELIVERY_POLICY, value, stamp, version)?,
            None => record.derive(fields::DELIVERY_POLICY, value, stamp)?,
        }

        let excluded = match decision.verdict {
            CountryVerdict::Negative => true,
            CountryVerdict::Unknown => self.config.exclude_unknown,
            CountryVerdict::Positive => false,
        };
        if excluded {
            record.exclude(
                stamp,
                format!("delivery policy {} ({}) for domain {domain}", decision.verdict, decision.rule),
            );
        }
        Ok(record)
    }

    /// Adds the domains the model decided in `records` to `known`.
    ///
    /// Returns how many entries changed.
    fn learn(records: &[Record], known: &mut KnownDomains) -> usize {
        let mut changed = 0;
        for record in records {
            let Some(decision) = record.derived(fields::DELIVERY_POLICY) else {
                continue;
            };
            let rule = decision["rule"].as_str().unwrap_or_default();
            if rule != POLICY_PAGE && rule != POLICY_UNCLEAR {
                continue;
            }
            let verdict = match decision["result"].as_str() {
                Some("positive") => CountryVerdict::Positive,
                Some("negative") => CountryVerdict::Negative,
                _ => CountryVerdict::Unknown,
            };
            let Some(domain) = host_of(record.url()) else { continue };
            let evidence = json!({
                "policy_url": decision["policy_url"],
                "pages": decision["pages"],
                "listing": record.url(),
            });
            if known.learn(&domain, verdict, evidence) {
                changed += 1;
            }
        }
        changed
    }
}

#[async_trait]
impl Step for DeliveryPolicyStep {
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
        self.resolve(ctx).map(|_| ())
    }

    async fn execute(&self, input: &[Record], ctx: &StepContext<'_>) -> Result<StepOutput> {
        let country = ctx.country().ok_or_else(|| UnsupportedScopeError {
            step_id: Self::ID.to_string(),
        })?;
        let clients = self.resolve(ctx)?;
        let path = self
            .config
            .known_domains_dir
            .as_deref()
            .map(|dir| KnownDomains::path_in(dir, country));
        let mut learned = match &path {
            Some(path) => KnownDomains::load(path).await?,
            None => KnownDomains::default(),
        };

        let stamp = ctx.stamp();
        let output = fan_out(input, ctx, |record| {
            self.classify(clients, &learned, country, record, &stamp)
        })
        .await?;

        if let Some(path) = path {
            let changed = Self::learn(&output.records, &mut learned);
            if changed > 0 {
                learned.save(&path).await?;
                info!(changed, known = learned.len(), path = %path.display(), "Learned delivery policies");
            }
        }
        Ok(output)
    }

    fn summarize(&self, output: &[Record]) -> StepSummary {
        let mut results: BTreeMap<String, usize> = BTreeMap::new();
        for record in output {
            let decided_here = record
                .provenance(fields::DELIVERY_POLICY)
                .is_some_and(|p| p.step == Self::ID);
            if let Some(result) = record
                .derived(fields::DELIVERY_POLICY)
                .and_then(|v| v["result"].as_str())
                .filter(|_| decided_here)
            {
                *results.entry(result.to_string()).or_default() += 1;
            }
        }
        results
            .into_iter()
            .fold(StepSummary::from_records(output), |s, (result, n)| s.with_detail(result, n))
    }
}
