//! Domains whose delivery verdict was settled in an earlier run.
//!
//! One JSON file per country, `known_domains_{country}.json`, holding three
//! maps from domain to the evidence that decided it.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::debug;

use super::CountryVerdict;
use crate::errors::Result;

/// Learned domain verdicts for one country.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct KnownDomains {
    /// Domains that deliver to the country.
    #[serde(default)]
    pub positive: BTreeMap<String, Value>,
    /// Domains whose policy left the question open.
    #[serde(default)]
    pub unknown: BTreeMap<String, Value>,
    /// Domains that do not deliver to the country.
    #[serde(default)]
    pub negative: BTreeMap<String, Value>,
}

impl KnownDomains {
    /// File holding the domains learned for `country` under `dir`.
    #[must_use]
    pub fn path_in(dir: &Path, country: &str) -> PathBuf {
        dir.join(format!("known_domains_{}.json", country.to_lowercase()))
    }

    /// Reads `path`; a missing file is an empty set.
    pub async fn load(path: &Path) -> Result<Self> {
        match fs::read(path).await {
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => Err(e.into()),
        }
    }

    /// Writes the set to `path`, replacing it atomically.
    pub async fn save(&self, path: &Path) -> Result<()> {
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir).await?;
        }
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, serde_json::to_vec_pretty(self)?).await?;
        fs::rename(&tmp, path).await?;
        debug!(path = %path.display(), domains = self.len(), "Saved known domains");
        Ok(())
    }

    /// Verdict recorded for `domain`.
    #[must_use]
    pub fn verdict(&self, domain: &str) -> Option<CountryVerdict> {
        if self.positive.contains_key(domain) {
            Some(CountryVerdict::Positive)
        } else if self.unknown.contains_key(domain) {
            Some(CountryVerdict::Unknown)
        } else if self.negative.contains_key(domain) {
            Some(CountryVerdict::Negative)
        } else {
            None
        }
    }

    /// Records `verdict` for `domain`, dropping any earlier verdict.
    ///
    /// Returns false when the same verdict and evidence were already known.
    pub fn learn(&mut self, domain: &str, verdict: CountryVerdict, evidence: Value) -> bool {
        let target = match verdict {
            CountryVerdict::Positive => &self.positive,
            CountryVerdict::Unknown => &self.unknown,
            CountryVerdict::Negative => &self.negative,
        };
        if target.get(domain) == Some(&evidence) {
            return false;
        }
        self.positive.remove(domain);
        self.unknown.remove(domain);
        self.negative.remove(domain);
        let target = match verdict {
            CountryVerdict::Positive => &mut self.positive,
            CountryVerdict::Unknown => &mut self.unknown,
            CountryVerdict::Negative => &mut self.negative,
        };
        target.insert(domain.to_string(), evidence);
        true
    }

    /// Number of domains across all verdicts.
    #[must_use]
    pub fn len(&self) -> usize {
        self.positive.len() + self.unknown.len() + self.negative.len()
    }

    /// Whether no domain is known.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
