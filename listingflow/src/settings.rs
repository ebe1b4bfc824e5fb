//! Layered settings loaded from TOML.
//!
//! Built-in defaults are embedded from `config/defaults.toml`. A user file is
//! deep-merged on top: tables merge key by key, anything else replaces the
//! default (so a user `pipeline.steps` array replaces the default pipeline).

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::adapters::{
    ClassificationModel, DiscoverySource, ManualUrlSource, ProbabilityThresholdModel, UrlListSource,
};
use crate::context::{Clients, RunOptions, RunScope};
use crate::errors::{ConfigurationError, Result};
use crate::pipeline::PipelineDefinition;
use crate::registry::{merge_json, ConfigLayers, ScopeLayer, StepLayer};

#[cfg(feature = "http")]
use crate::adapters::{HttpConfig, HttpModelEndpoint, HttpPageFetcher};

const DEFAULTS: &str = include_str!("../config/defaults.toml");

fn default_output_dir() -> PathBuf {
    PathBuf::from("artifacts")
}

/// An organization and the countries it acts for.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OrganizationProfile {
    /// Countries in order of preference; the first is implied when a run
    /// names the organization but no country.
    #[serde(default)]
    pub countries: Vec<String>,
    /// Per-step overrides.
    #[serde(default)]
    pub steps: StepLayer,
}

/// How to construct a named classification model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ModelSettings {
    /// Threshold a probability already present in the raw fields.
    Threshold(ProbabilityThresholdModel),
    /// Call a JSON model endpoint.
    Http {
        /// Endpoint URL.
        endpoint: String,
        /// Basic-auth user.
        #[serde(default)]
        username: Option<String>,
        /// Environment variable holding the basic-auth password.
        #[serde(default)]
        password_env: Option<String>,
    },
}

/// A discovery source to register.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SourceSettings {
    /// The search target is itself the listing URL.
    Manual,
    /// A newline-delimited URL file.
    UrlList {
        /// Source name recorded on each record.
        name: String,
        /// File to read.
        path: PathBuf,
    },
}

/// Everything a run needs besides its search target.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Default run options.
    #[serde(default)]
    pub run: RunOptions,
    /// Root of the artifact store.
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
    /// The ordered step list.
    #[serde(default)]
    pub pipeline: PipelineDefinition,
    /// Global step configuration.
    #[serde(default)]
    pub steps: StepLayer,
    /// Country overrides, keyed by lowercase country code.
    #[serde(default)]
    pub countries: BTreeMap<String, ScopeLayer>,
    /// Organization profiles, keyed by name.
    #[serde(default)]
    pub organizations: BTreeMap<String, OrganizationProfile>,
    /// Named classification models.
    #[serde(default)]
    pub models: BTreeMap<String, ModelSettings>,
    /// Discovery sources.
    #[serde(default)]
    pub sources: Vec<SourceSettings>,
    /// HTTP client settings for the page fetcher and model endpoints.
    #[cfg(feature = "http")]
    #[serde(default)]
    pub http: HttpConfig,
}

impl Settings {
    /// The embedded defaults.
    pub fn defaults() -> Result<Self> {
        Self::from_toml_str(DEFAULTS)
    }

    /// Parses settings from TOML without merging defaults.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Loads the defaults, deep-merging the file at `path` on top.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let Some(path) = path else {
            return Self::defaults();
        };
        let content = std::fs::read_to_string(path).map_err(|e| {
            ConfigurationError::new(format!("cannot read settings {}: {e}", path.display()))
        })?;
        Self::merged(&content)
    }

    /// Deep-merges TOML `content` onto the defaults.
    pub fn merged(content: &str) -> Result<Self> {
        let defaults: toml::Value = toml::from_str(DEFAULTS)?;
        let overlay: toml::Value = toml::from_str(content)?;

        let mut merged = serde_json::to_value(defaults)?;
        merge_json(&mut merged, &serde_json::to_value(overlay)?);
        serde_json::from_value(merged)
            .map_err(|e| ConfigurationError::new(format!("invalid settings: {e}")).into())
    }

    /// Configuration layers for the step registry.
    #[must_use]
    pub fn config_layers(&self) -> ConfigLayers {
        let mut layers = ConfigLayers::new().with_global(self.steps.clone());
        for (country, layer) in &self.countries {
            layers = layers.with_country(country, layer.steps.clone());
        }
        for (name, profile) in &self.organizations {
            layers = layers.with_organization(name.clone(), profile.steps.clone());
        }
        layers
    }

    /// Resolves the run scope. An organization without a country implies its
    /// first listed country.
    pub fn resolve_scope(&self, country: Option<&str>, organization: Option<&str>) -> Result<RunScope> {
        let Some(name) = organization else {
            return Ok(match country {
                Some(country) => RunScope::unscoped().with_country(country),
                None => RunScope::unscoped(),
            });
        };
        let profile = self.organizations.get(name).ok_or_else(|| {
            let known: Vec<&str> = self.organizations.keys().map(String::as_str).collect();
            ConfigurationError::new(format!(
                "unknown organization '{name}' (known: {})",
                known.join(", ")
            ))
            .with_parameter("organization")
        })?;
        let scope = RunScope::unscoped().with_organization(name);
        Ok(match country.or_else(|| profile.countries.first().map(String::as_str)) {
            Some(country) => scope.with_country(country),
            None => scope,
        })
    }

    /// Builds the long-lived clients described by these settings.
    pub async fn build_clients(&self) -> Result<Clients> {
        let mut clients = Clients::new();
        for source in &self.sources {
            let source: Arc<dyn DiscoverySource> = match source {
                SourceSettings::Manual => Arc::new(ManualUrlSource),
                SourceSettings::UrlList { name, path } => Arc::new(
                    UrlListSource::from_file(name.clone(), path).await.map_err(|e| {
                        ConfigurationError::new(format!("cannot read {}: {e}", path.display()))
                            .with_parameter("sources")
                    })?,
                ),
            };
            clients = clients.with_source(source);
        }

        #[cfg(feature = "http")]
        {
            clients = clients.with_fetcher(Arc::new(HttpPageFetcher::new(self.http.clone())?));
        }

        for (name, model) in &self.models {
            clients = clients.with_model(name.clone(), self.build_model(name, model)?);
        }
        Ok(clients)
    }

    #[cfg_attr(not(feature = "http"), allow(clippy::unused_self))]
    fn build_model(&self, name: &str, model: &ModelSettings) -> Result<Arc<dyn ClassificationModel>> {
        match model {
            ModelSettings::Threshold(model) => Ok(Arc::new(model.clone())),
            #[cfg(feature = "http")]
            ModelSettings::Http {
                endpoint,
                username,
                password_env,
            } => {
                let mut client = HttpModelEndpoint::new(name, endpoint.clone(), self.http.clone())?;
                if let Some(user) = username {
                    let password = match password_env {
                        Some(var) => std::env::var(var).map_err(|_| {
                            ConfigurationError::new(format!(
                                "model '{name}' needs the {var} environment variable"
                            ))
                            .with_parameter(var.clone())
                        })?,
                        None => String::new(),
                    };
                    client = client.with_basic_auth(user.clone(), password);
                }
                Ok(Arc::new(client))
            }
            #[cfg(not(feature = "http"))]
            ModelSettings::Http { .. } => Err(ConfigurationError::new(format!(
                "model '{name}' needs the http feature"
            ))
            .into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn test_defaults_parse() {
        let settings = Settings::defaults().unwrap();
        assert_eq!(settings.pipeline.steps.len(), 12);
        assert_eq!(settings.run.max_results, 50);
        assert_eq!(settings.output_dir, PathBuf::from("artifacts"));
        assert!(settings.countries.contains_key("ch"));
        assert!(settings.countries.contains_key("at"));
        assert_eq!(
            settings.organizations.keys().collect::<Vec<_>>(),
            vec!["Ages", "Swissmedic AM", "Swissmedic MEP"]
        );
        for classifier in ["page_type", "blocked_content", "relevance", "suspicion"] {
            assert!(settings.models.contains_key(classifier), "{classifier}");
        }
    }

    #[test]
    fn test_user_file_merges_onto_defaults() {
        let settings = Settings::merged(
            r#"
            output_dir = "/tmp/runs"

            [run]
            max_results = 5

            [steps.ranker]
            top_n = 3
            "#,
        )
        .unwrap();
        assert_eq!(settings.run.max_results, 5);
        assert_eq!(settings.run.max_concurrency, 8);
        assert_eq!(settings.output_dir, PathBuf::from("/tmp/runs"));
        assert_eq!(settings.steps["ranker"]["top_n"], json!(3));
        assert!(settings.steps["ranker"]["weights"].is_object());
        assert_eq!(settings.pipeline.steps.len(), 12);
    }

    #[test]
    fn test_user_pipeline_replaces_default() {
        let settings = Settings::merged(
            r#"
            [pipeline]
            steps = [{ id = "discovery" }, { id = "ranker" }]
            "#,
        )
        .unwrap();
        let ids: Vec<&str> = settings.pipeline.steps.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, vec!["discovery", "ranker"]);
    }

    #[test]
    fn test_organization_implies_country() {
        let settings = Settings::defaults().unwrap();
        let scope = settings.resolve_scope(None, Some("Ages")).unwrap();
        assert_eq!(scope.country.as_deref(), Some("at"));
        assert_eq!(scope.organization.as_deref(), Some("Ages"));

        let scope = settings.resolve_scope(Some("CH"), None).unwrap();
        assert_eq!(scope.country.as_deref(), Some("ch"));
        assert_eq!(scope.organization, None);
    }

    #[test]
    fn test_unknown_organization() {
        let err = Settings::defaults()
            .unwrap()
            .resolve_scope(None, Some("FDA"))
            .unwrap_err();
        assert_eq!(err.code(), "CONFIGURATION");
        assert!(err.to_string().contains("Swissmedic AM"));
    }

    #[test]
    fn test_invalid_toml_is_configuration_error() {
        let err = Settings::merged("[run\nmax_results = 1").unwrap_err();
        assert_eq!(err.code(), "CONFIGURATION");
    }

    #[tokio::test]
    async fn test_build_clients_from_url_list() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("urls.txt");
        std::fs::write(&path, "https://a.ch/1\n# note\n\nhttps://b.ch/2\n").unwrap();

        let mut settings = Settings::defaults().unwrap();
        settings.sources = vec![
            SourceSettings::Manual,
            SourceSettings::UrlList {
                name: "curated".to_string(),
                path,
            },
        ];
        let clients = settings.build_clients().await.unwrap();
        let names: Vec<&str> = clients.sources().iter().map(|s| s.name()).collect();
        assert_eq!(names, vec!["manual", "curated"]);
        assert!(clients.model("page_type").is_some());
    }
}
