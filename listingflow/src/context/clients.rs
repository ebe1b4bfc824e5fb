//! Long-lived external clients shared by all steps of a run.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use super::SearchTarget;
use crate::adapters::{ClassificationModel, DiscoverySource, KeywordExpander, PageFetcher};

/// The collaborators a run talks to.
///
/// Built once before the run starts and shared read-only afterwards; every
/// client is behind an `Arc` so concurrent per-record tasks can hold it.
#[derive(Clone, Default)]
pub struct Clients {
    sources: Vec<Arc<dyn DiscoverySource>>,
    fetcher: Option<Arc<dyn PageFetcher>>,
    expander: Option<Arc<dyn KeywordExpander>>,
    models: BTreeMap<String, Arc<dyn ClassificationModel>>,
}

impl Clients {
    /// Creates an empty client set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a discovery source.
    #[must_use]
    pub fn with_source(mut self, source: Arc<dyn DiscoverySource>) -> Self {
        self.sources.push(source);
        self
    }

    /// Sets the structured-extraction adapter.
    #[must_use]
    pub fn with_fetcher(mut self, fetcher: Arc<dyn PageFetcher>) -> Self {
        self.fetcher = Some(fetcher);
        self
    }

    /// Sets the keyword expander.
    #[must_use]
    pub fn with_expander(mut self, expander: Arc<dyn KeywordExpander>) -> Self {
        self.expander = Some(expander);
        self
    }

    /// Registers a model under `name`.
    #[must_use]
    pub fn with_model(mut self, name: impl Into<String>, model: Arc<dyn ClassificationModel>) -> Self {
        self.models.insert(name.into(), model);
        self
    }

    /// All discovery sources, in registration order.
    #[must_use]
    pub fn sources(&self) -> &[Arc<dyn DiscoverySource>] {
        &self.sources
    }

    /// Sources able to handle `target`.
    pub fn sources_for<'a>(
        &'a self,
        target: &'a SearchTarget,
    ) -> impl Iterator<Item = &'a Arc<dyn DiscoverySource>> + 'a {
        self.sources.iter().filter(move |s| s.supports(target))
    }

    /// The structured-extraction adapter.
    #[must_use]
    pub fn fetcher(&self) -> Option<&Arc<dyn PageFetcher>> {
        self.fetcher.as_ref()
    }

    /// The keyword expander.
    #[must_use]
    pub fn expander(&self) -> Option<&Arc<dyn KeywordExpander>> {
        self.expander.as_ref()
    }

    /// The model registered under `name`.
    #[must_use]
    pub fn model(&self, name: &str) -> Option<&Arc<dyn ClassificationModel>> {
        self.models.get(name)
    }

    /// Names of all registered models.
    pub fn model_names(&self) -> impl Iterator<Item = &str> {
        self.models.keys().map(String::as_str)
    }
}

impl fmt::Debug for Clients {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Clients")
            .field(
                "sources",
                &self.sources.iter().map(|s| s.name()).collect::<Vec<_>>(),
            )
            .field("fetcher", &self.fetcher.is_some())
            .field("expander", &self.expander.is_some())
            .field("models", &self.models.keys().collect::<Vec<_>>())
            .finish()
    }
}
