//! Discovery sources that need no provider.

use async_trait::async_trait;
use serde_json::json;
use std::path::Path;

use super::{DiscoverySource, RawListing, SearchQuery};
use crate::context::SearchTarget;
use crate::errors::SourceError;

/// Turns a URL search target into a single listing.
#[derive(Debug, Clone, Default)]
pub struct ManualUrlSource;

#[async_trait]
impl DiscoverySource for ManualUrlSource {
    fn name(&self) -> &str {
        "manual"
    }

    fn supports(&self, target: &SearchTarget) -> bool {
        matches!(target, SearchTarget::Url(_))
    }

    async fn search(
        &self,
        query: &SearchQuery,
        max_results: usize,
    ) -> Result<Vec<RawListing>, SourceError> {
        match &query.target {
            SearchTarget::Url(url) if max_results > 0 => Ok(vec![RawListing::new(url.clone())]),
            _ => Ok(Vec::new()),
        }
    }
}

/// Serves a fixed list of URLs for keyword and image searches.
///
/// Useful for re-processing a hand-curated list through the pipeline.
#[derive(Debug, Clone)]
pub struct UrlListSource {
    name: String,
    urls: Vec<String>,
}

impl UrlListSource {
    /// Creates a source over `urls`.
    #[must_use]
    pub fn new(name: impl Into<String>, urls: Vec<String>) -> Self {
        Self {
            name: name.into(),
            urls,
        }
    }

    /// Reads one URL per line from `path`, skipping blanks and `#` comments.
    pub async fn from_file(name: impl Into<String>, path: impl AsRef<Path>) -> std::io::Result<Self> {
        let content = tokio::fs::read_to_string(path).await?;
        let urls = content
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty() && !line.starts_with('#'))
            .map(str::to_string)
            .collect();
        Ok(Self::new(name, urls))
    }

    /// Number of URLs served.
    #[must_use]
    pub fn len(&self) -> usize {
        self.urls.len()
    }

    /// Returns true if the list is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.urls.is_empty()
    }
}

#[async_trait]
impl DiscoverySource for UrlListSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn supports(&self, target: &SearchTarget) -> bool {
        !matches!(target, SearchTarget::Url(_))
    }

    async fn search(
        &self,
        _query: &SearchQuery,
        max_results: usize,
    ) -> Result<Vec<RawListing>, SourceError> {
        Ok(self
            .urls
            .iter()
            .take(max_results)
            .enumerate()
            .map(|(position, url)| RawListing::new(url.clone()).with_field("position", json!(position)))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[tokio::test]
    async fn test_manual_source_yields_the_url() {
        let source = ManualUrlSource;
        let query = SearchQuery::new(SearchTarget::Url("https://shop.ch/a".to_string()));
        assert!(source.supports(&query.target));

        let listings = source.search(&query, 5).await.unwrap();
        assert_eq!(listings, vec![RawListing::new("https://shop.ch/a")]);
        assert!(source.search(&query, 0).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_manual_source_ignores_keywords() {
        let source = ManualUrlSource;
        assert!(!source.supports(&SearchTarget::Keyword("aspirin".to_string())));
    }

    #[tokio::test]
    async fn test_url_list_caps_results() {
        let source = UrlListSource::new(
            "list",
            vec!["https://a.ch".to_string(), "https://b.ch".to_string()],
        );
        let query = SearchQuery::new(SearchTarget::Keyword("aspirin".to_string()));
        let listings = source.search(&query, 1).await.unwrap();
        assert_eq!(listings.len(), 1);
        assert_eq!(listings[0].fields["position"], 0);
    }

    #[tokio::test]
    async fn test_url_list_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "# curated").unwrap();
        writeln!(file, "https://a.ch/x").unwrap();
        writeln!(file).unwrap();
        writeln!(file, "  https://b.ch/y  ").unwrap();

        let source = UrlListSource::from_file("curated", file.path()).await.unwrap();
        assert_eq!(source.len(), 2);
        assert_eq!(source.name(), "curated");
    }
}
