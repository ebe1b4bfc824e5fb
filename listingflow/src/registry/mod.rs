//! Step registry: maps step identifiers to constructible steps.
//!
//! Each registration pairs a factory with the step's scope. Resolving a step
//! merges its configuration from the global, country and organization layers
//! (later layers win) and hands the merged JSON to the factory.

mod layers;

pub use layers::{merge_json, typed_config, ConfigLayers, ScopeLayer, StepLayer};

use parking_lot::RwLock;
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::core::{fields, StepScope};
use crate::errors::{Result, UnknownStepError, UnsupportedScopeError};
use crate::settings::Settings;
use crate::steps::{
    ClassifierStep, CountryFilterStep, DeliveryPolicyStep, DiscoveryStep, KeywordEnrichmentStep, LabelFilterStep,
    RankerStep, Step, StructuredExtractionStep,
};

/// Builds a step from its merged configuration.
pub type StepFactory = Box<dyn Fn(&Value) -> Result<Arc<dyn Step>> + Send + Sync>;

struct Registration {
    scope: StepScope,
    factory: StepFactory,
}

/// Registry of step factories and their layered configuration.
#[derive(Default)]
pub struct StepRegistry {
    registrations: RwLock<HashMap<String, Registration>>,
    layers: ConfigLayers,
}

impl StepRegistry {
    /// Creates an empty registry with no configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty registry over the given configuration layers.
    #[must_use]
    pub fn with_layers(layers: ConfigLayers) -> Self {
        Self {
            registrations: RwLock::default(),
            layers,
        }
    }

    /// Creates a registry holding every built-in step, configured from `settings`.
    #[must_use]
    pub fn with_builtin_steps(settings: &Settings) -> Self {
        let registry = Self::with_layers(settings.config_layers());
        registry.register_builtin_steps();
        registry
    }

    /// Registers (or replaces) the factory for `id`.
    pub fn register(&self, id: impl Into<String>, scope: StepScope, factory: StepFactory) {
        self.registrations
            .write()
            .insert(id.into(), Registration { scope, factory });
    }

    /// Returns true if `id` has a registered factory.
    #[must_use]
    pub fn contains(&self, id: &str) -> bool {
        self.registrations.read().contains_key(id)
    }

    /// Scope of a registered step.
    #[must_use]
    pub fn scope_of(&self, id: &str) -> Option<StepScope> {
        self.registrations.read().get(id).map(|r| r.scope)
    }

    /// Registered identifiers, sorted.
    #[must_use]
    pub fn step_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.registrations.read().keys().cloned().collect();
        ids.sort();
        ids
    }

    /// The configuration layers.
    #[must_use]
    pub const fn layers(&self) -> &ConfigLayers {
        &self.layers
    }

    /// Merged configuration for `id` under the given scope.
    #[must_use]
    pub fn layered_config(&self, id: &str, country: Option<&str>, organization: Option<&str>) -> Value {
        self.layers.resolve(id, country, organization)
    }

    /// Constructs the step registered as `id` for the given scope.
    pub fn resolve(
        &self,
        id: &str,
        country: Option<&str>,
        organization: Option<&str>,
    ) -> Result<Arc<dyn Step>> {
        let registrations = self.registrations.read();
        let Some(registration) = registrations.get(id) else {
            drop(registrations);
            return Err(UnknownStepError {
                step_id: id.to_string(),
                registered: self.step_ids(),
            }
            .into());
        };
        if registration.scope == StepScope::Country && country.is_none() {
            return Err(UnsupportedScopeError {
                step_id: id.to_string(),
            }
            .into());
        }

        let config = self.layers.resolve(id, country, organization);
        tracing::debug!(step = id, ?country, ?organization, %config, "Resolving step");
        (registration.factory)(&config)
    }

    fn register_builtin_steps(&self) {
        self.register(
            DiscoveryStep::ID,
            StepScope::Global,
            Box::new(|_| Ok(Arc::new(DiscoveryStep::new()))),
        );
        self.register(
            KeywordEnrichmentStep::ID,
            StepScope::Global,
            Box::new(|config| {
                let config = typed_config(KeywordEnrichmentStep::ID, config)?;
                Ok(Arc::new(KeywordEnrichmentStep::new(config)))
            }),
        );
        self.register(
            StructuredExtractionStep::ID,
            StepScope::Global,
            Box::new(|_| Ok(Arc::new(StructuredExtractionStep::new()))),
        );
        self.register(
            CountryFilterStep::ID,
            StepScope::Country,
            Box::new(|config| {
                let config = typed_config(CountryFilterStep::ID, config)?;
                Ok(Arc::new(CountryFilterStep::new(config)))
            }),
        );
        self.register(
            DeliveryPolicyStep::ID,
            StepScope::Country,
            Box::new(|config| {
                let config = typed_config(DeliveryPolicyStep::ID, config)?;
                Ok(Arc::new(DeliveryPolicyStep::new(config)))
            }),
        );

        for field in [
            fields::PAGE_TYPE,
            fields::BLOCKED_CONTENT,
            fields::RELEVANCE,
            fields::SUSPICION,
        ] {
            self.register(
                field,
                StepScope::Global,
                Box::new(move |config| {
                    let config = typed_config(field, config)?;
                    Ok(Arc::new(ClassifierStep::new(field, field, config)))
                }),
            );
        }

        for field in [fields::PAGE_TYPE, fields::BLOCKED_CONTENT, fields::RELEVANCE] {
            let id = format!("{field}_filter");
            let factory_id = id.clone();
            self.register(
                id,
                StepScope::Global,
                Box::new(move |config| {
                    let config = typed_config(&factory_id, config)?;
                    Ok(Arc::new(LabelFilterStep::new(factory_id.clone(), field, config)))
                }),
            );
        }

        self.register(
            RankerStep::ID,
            StepScope::Global,
            Box::new(|config| {
                let config = typed_config(RankerStep::ID, config)?;
                Ok(Arc::new(RankerStep::new(config)))
            }),
        );
    }
}

impl fmt::Debug for StepRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StepRegistry")
            .field("steps", &self.step_ids())
            .field("layers", &self.layers)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::StepKind;
    use crate::steps::CountryVerdict;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn registry() -> StepRegistry {
        StepRegistry::with_builtin_steps(&Settings::defaults().unwrap())
    }

    #[test]
    fn test_builtin_steps_are_registered() {
        let registry = registry();
        assert_eq!(
            registry.step_ids(),
            vec![
                "blocked_content",
                "blocked_content_filter",
                "country_filter",
                "delivery_policy",
                "discovery",
                "keyword_enrichment",
                "page_type",
                "page_type_filter",
                "ranker",
                "relevance",
                "relevance_filter",
                "structured_extraction",
                "suspicion",
            ]
        );
        assert_eq!(registry.scope_of("country_filter"), Some(StepScope::Country));
        assert_eq!(registry.scope_of("delivery_policy"), Some(StepScope::Country));
        assert_eq!(registry.scope_of("ranker"), Some(StepScope::Global));
    }

    #[test]
    fn test_resolve_builds_matching_descriptor() {
        let registry = registry();
        let step = registry.resolve("relevance_filter", None, None).unwrap();
        assert_eq!(step.id(), "relevance_filter");
        assert_eq!(step.descriptor().kind, StepKind::Filter);
        assert!(step.descriptor().requires.contains("relevance"));
    }

    #[test]
    fn test_unknown_step_lists_registered() {
        let err = registry().resolve("sentiment", None, None).unwrap_err();
        assert_eq!(err.code(), "UNKNOWN_STEP");
        assert!(err.to_string().contains("country_filter"));
    }

    #[test]
    fn test_country_step_without_country() {
        let err = registry().resolve("country_filter", None, None).unwrap_err();
        assert_eq!(err.code(), "UNSUPPORTED_SCOPE");
        assert_eq!(err.step_id(), Some("country_filter"));
    }

    #[test]
    fn test_country_layer_reaches_step() {
        let registry = registry();
        let config = registry.layered_config("country_filter", Some("CH"), None);
        assert_eq!(config["currencies"], json!(["chf"]));

        let layers = registry.layers().clone();
        let filter: crate::steps::CountryFilterConfig =
            typed_config("country_filter", &layers.resolve("country_filter", Some("ch"), None)).unwrap();
        let step = CountryFilterStep::new(filter);
        assert_eq!(
            step.config().evaluate("https://www.shop.ch/aspirin", None).0,
            CountryVerdict::Positive
        );
    }

    #[test]
    fn test_custom_registration_replaces_builtin() {
        let registry = registry();
        registry.register(
            "ranker",
            StepScope::Global,
            Box::new(|config| {
                let config = typed_config("ranker", config)?;
                Ok(Arc::new(RankerStep::new(config)))
            }),
        );
        assert!(registry.contains("ranker"));
        assert_eq!(registry.step_ids().len(), 12);
    }

    #[test]
    fn test_invalid_layer_is_configuration_error() {
        let layers = ConfigLayers::new().with_global(StepLayer::from([(
            "ranker".to_string(),
            json!({"top_n": "ten"}),
        )]));
        let registry = StepRegistry::with_layers(layers);
        registry.register(
            "ranker",
            StepScope::Global,
            Box::new(|config| {
                let config = typed_config("ranker", config)?;
                Ok(Arc::new(RankerStep::new(config)))
            }),
        );
        let err = registry.resolve("ranker", None, None).unwrap_err();
        assert_eq!(err.code(), "CONFIGURATION");
    }
}
