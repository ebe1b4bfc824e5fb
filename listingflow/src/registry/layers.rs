//! Layered step configuration: global, then country, then organization.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

use crate::errors::{ConfigurationError, Result};

/// Step configuration keyed by step id.
pub type StepLayer = BTreeMap<String, Value>;

/// Overrides for one country or organization.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScopeLayer {
    /// Per-step overrides.
    #[serde(default)]
    pub steps: StepLayer,
}

/// Deep-merges `overlay` into `base`. Objects merge key by key; anything
/// else in `overlay` replaces the base value.
pub fn merge_json(base: &mut Value, overlay: &Value) {
    match (base, overlay) {
        (Value::Object(base), Value::Object(overlay)) => {
            for (key, value) in overlay {
                merge_json(base.entry(key.clone()).or_insert(Value::Null), value);
            }
        }
        (base, overlay) => *base = overlay.clone(),
    }
}

/// All configuration layers known to the registry.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConfigLayers {
    global: StepLayer,
    countries: BTreeMap<String, StepLayer>,
    organizations: BTreeMap<String, StepLayer>,
}

impl ConfigLayers {
    /// Creates empty layers.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the global layer.
    #[must_use]
    pub fn with_global(mut self, layer: StepLayer) -> Self {
        self.global = layer;
        self
    }

    /// Adds a country layer. Country codes are matched case-insensitively.
    #[must_use]
    pub fn with_country(mut self, country: &str, layer: StepLayer) -> Self {
        self.countries.insert(country.to_lowercase(), layer);
        self
    }

    /// Adds an organization layer.
    #[must_use]
    pub fn with_organization(mut self, organization: impl Into<String>, layer: StepLayer) -> Self {
        self.organizations.insert(organization.into(), layer);
        self
    }

    /// Merged configuration of `step_id`; an empty object when no layer has one.
    #[must_use]
    pub fn resolve(&self, step_id: &str, country: Option<&str>, organization: Option<&str>) -> Value {
        let country_layer = country.and_then(|c| self.countries.get(&c.to_lowercase()));
        let org_layer = organization.and_then(|o| self.organizations.get(o));

        let mut merged = Value::Object(Map::new());
        for layer in [Some(&self.global), country_layer, org_layer].into_iter().flatten() {
            if let Some(config) = layer.get(step_id) {
                merge_json(&mut merged, config);
            }
        }
        merged
    }
}

/// Deserializes a merged configuration into a step's typed config.
pub fn typed_config<T: DeserializeOwned>(step_id: &str, config: &Value) -> Result<T> {
    serde_json::from_value(config.clone()).map_err(|e| {
        ConfigurationError::new(format!("invalid configuration for step '{step_id}': {e}"))
            .for_step(step_id)
            .into()
    })
}
