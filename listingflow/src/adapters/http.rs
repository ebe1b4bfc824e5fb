//! Plain-HTTP adapters: a page fetcher and a JSON model endpoint client.

use async_trait::async_trait;
use reqwest::StatusCode;
use scraper::{Html, Selector};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::time::Duration;

use super::retry::{retry_transient, RetryConfig};
use super::{ClassificationModel, PageFetcher, Prediction, StructuredFields};
use crate::core::Record;
use crate::errors::{ConfigurationError, SourceError};

fn default_timeout() -> f64 {
    30.0
}

fn default_user_agent() -> String {
    concat!("listingflow/", env!("CARGO_PKG_VERSION")).to_string()
}

/// Configuration shared by the HTTP adapters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    /// Request timeout in seconds.
    #[serde(default = "default_timeout")]
    pub timeout_seconds: f64,
    /// User agent string.
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    /// Additional headers to include.
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    /// Retry policy for transient failures.
    #[serde(default)]
    pub retry: RetryConfig,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout_seconds: default_timeout(),
            user_agent: default_user_agent(),
            headers: BTreeMap::new(),
            retry: RetryConfig::default(),
        }
    }
}

impl HttpConfig {
    /// Sets the timeout.
    #[must_use]
    pub const fn with_timeout(mut self, seconds: f64) -> Self {
        self.timeout_seconds = seconds;
        self
    }

    /// Sets the retry policy.
    #[must_use]
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    fn build_client(&self) -> Result<reqwest::Client, ConfigurationError> {
        let mut headers = reqwest::header::HeaderMap::new();
        for (key, value) in &self.headers {
            let name = reqwest::header::HeaderName::from_bytes(key.as_bytes())
                .map_err(|e| ConfigurationError::new(format!("invalid header {key}: {e}")))?;
            let value = reqwest::header::HeaderValue::from_str(value)
                .map_err(|e| ConfigurationError::new(format!("invalid header {key}: {e}")))?;
            headers.insert(name, value);
        }
        reqwest::Client::builder()
            .timeout(Duration::from_secs_f64(self.timeout_seconds))
            .user_agent(&self.user_agent)
            .default_headers(headers)
            .build()
            .map_err(|e| ConfigurationError::new(format!("cannot build HTTP client: {e}")))
    }
}

/// Maps a non-success status to a source error.
fn status_error(adapter: &str, status: StatusCode, url: &str) -> SourceError {
    let message = format!("HTTP {status} for {url}");
    if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
        SourceError::transient(adapter, message)
    } else {
        SourceError::fatal(adapter, message)
    }
}

/// Maps a transport error to a source error.
fn transport_error(adapter: &str, err: &reqwest::Error) -> SourceError {
    if err.is_timeout() || err.is_connect() || err.is_request() || err.is_body() {
        SourceError::transient(adapter, err.to_string())
    } else {
        SourceError::fatal(adapter, err.to_string())
    }
}

/// Fetches listing pages and extracts product metadata from their HTML.
#[derive(Debug, Clone)]
pub struct HttpPageFetcher {
    client: reqwest::Client,
    config: HttpConfig,
}

impl HttpPageFetcher {
    /// Name used in errors.
    pub const NAME: &'static str = "http_page_fetcher";

    /// Creates a fetcher.
    pub fn new(config: HttpConfig) -> Result<Self, ConfigurationError> {
        Ok(Self {
            client: config.build_client()?,
            config,
        })
    }

    async fn fetch_once(&self, url: &str) -> Result<String, SourceError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| transport_error(Self::NAME, &e))?;
        let status = response.status();
        if !status.is_success() {
            return Err(status_error(Self::NAME, status, url));
        }
        response
            .text()
            .await
            .map_err(|e| transport_error(Self::NAME, &e))
    }
}

#[async_trait]
impl PageFetcher for HttpPageFetcher {
    async fn fetch(&self, url: &str) -> Result<StructuredFields, SourceError> {
        let html = retry_transient(&self.config.retry, url, || self.fetch_once(url)).await?;
        Ok(extract_page_fields(&html))
    }
}

fn select_attr(document: &Html, selector: &str, attr: &str) -> Option<String> {
    let selector = Selector::parse(selector).ok()?;
    document
        .select(&selector)
        .filter_map(|el| el.value().attr(attr))
        .map(str::trim)
        .find(|v| !v.is_empty())
        .map(str::to_string)
}

fn select_text(document: &Html, selector: &str) -> Option<String> {
    let selector = Selector::parse(selector).ok()?;
    document
        .select(&selector)
        .next()
        .map(|el| el.text().collect::<String>().trim().to_string())
        .filter(|t| !t.is_empty())
}

/// Characters of visible text kept per page.
const MAX_TEXT_CHARS: usize = 20_000;

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Visible body text, without scripts and styles.
fn visible_text(document: &Html) -> Option<String> {
    let selector = Selector::parse("body").ok()?;
    let body = document.select(&selector).next()?;
    let mut parts = Vec::new();
    for node in body.descendants() {
        let Some(text) = node.value().as_text() else { continue };
        let hidden = node
            .parent()
            .and_then(|parent| parent.value().as_element().map(|e| e.name()))
            .is_some_and(|name| matches!(name, "script" | "style" | "noscript"));
        if !hidden {
            parts.push(&**text);
        }
    }
    let text: String = collapse_whitespace(&parts.join(" ")).chars().take(MAX_TEXT_CHARS).collect();
    Some(text).filter(|t| !t.is_empty())
}

/// Anchors of the page footer, or of the whole page when it has none.
fn footer_links(document: &Html) -> Vec<Value> {
    let anchors = |selector: &str| -> Vec<Value> {
        let Ok(selector) = Selector::parse(selector) else {
            return Vec::new();
        };
        document
            .select(&selector)
            .filter_map(|el| {
                let href = el.value().attr("href")?.trim();
                let skipped = href.is_empty()
                    || href.starts_with('#')
                    || href.starts_with("javascript:")
                    || href.starts_with("mailto:");
                if skipped {
                    return None;
                }
                let text = collapse_whitespace(&el.text().collect::<String>());
                Some(json!({ "href": href, "text": text }))
            })
            .collect()
    };
    let footer = anchors("footer a[href]");
    if footer.is_empty() {
        anchors("a[href]")
    } else {
        footer
    }
}

/// Extracts title, description, price, currency, language, images, the
/// visible text and the footer links.
#[must_use]
pub fn extract_page_fields(html: &str) -> StructuredFields {
    let document = Html::parse_document(html);
    let mut fields = BTreeMap::new();

    let title = select_attr(&document, r#"meta[property="og:title"]"#, "content")
        .or_else(|| select_text(&document, "title"));
    let description = select_attr(&document, r#"meta[name="description"]"#, "content")
        .or_else(|| select_attr(&document, r#"meta[property="og:description"]"#, "content"));
    let price = select_attr(&document, r#"meta[property="product:price:amount"]"#, "content")
        .or_else(|| select_attr(&document, r#"meta[property="og:price:amount"]"#, "content"))
        .or_else(|| select_attr(&document, r#"[itemprop="price"]"#, "content"));
    let currency = select_attr(&document, r#"meta[property="product:price:currency"]"#, "content")
        .or_else(|| select_attr(&document, r#"meta[property="og:price:currency"]"#, "content"))
        .or_else(|| select_attr(&document, r#"[itemprop="priceCurrency"]"#, "content"));
    let language = select_attr(&document, "html", "lang");

    for (key, value) in [
        ("title", title),
        ("description", description),
        ("price", price),
        ("price_currency", currency),
        ("html_lang", language),
    ] {
        if let Some(value) = value {
            fields.insert(key.to_string(), Value::String(value));
        }
    }

    if let Ok(selector) = Selector::parse(r#"meta[property="og:image"]"#) {
        let images: Vec<Value> = document
            .select(&selector)
            .filter_map(|el| el.value().attr("content"))
            .map(|src| Value::String(src.to_string()))
            .collect();
        if !images.is_empty() {
            fields.insert("images".to_string(), Value::Array(images));
        }
    }
    if let Some(text) = visible_text(&document) {
        fields.insert("text".to_string(), Value::String(text));
    }
    let links = footer_links(&document);
    if !links.is_empty() {
        fields.insert("links".to_string(), Value::Array(links));
    }

    fields
}

#[derive(Debug, Deserialize)]
struct ModelResponse {
    label: String,
    score: f64,
    #[serde(default)]
    model_version: Option<String>,
}

/// Calls a JSON model endpoint: `{url, text, fields}` in, `{label, score}` out.
///
/// `text` joins the page's title, description and visible text. Records
/// built for policy pages also carry the run's `country` among the fields.
#[derive(Debug, Clone)]
pub struct HttpModelEndpoint {
    name: String,
    endpoint: String,
    credentials: Option<(String, String)>,
    client: reqwest::Client,
    config: HttpConfig,
}

impl HttpModelEndpoint {
    /// Creates a client for `endpoint`.
    pub fn new(
        name: impl Into<String>,
        endpoint: impl Into<String>,
        config: HttpConfig,
    ) -> Result<Self, ConfigurationError> {
        Ok(Self {
            name: name.into(),
            endpoint: endpoint.into(),
            credentials: None,
            client: config.build_client()?,
            config,
        })
    }

    /// Uses HTTP basic authentication.
    #[must_use]
    pub fn with_basic_auth(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.credentials = Some((username.into(), password.into()));
        self
    }

    fn payload(record: &Record) -> Value {
        let text: Vec<&str> = ["title", "description", "text"]
            .iter()
            .filter_map(|key| record.raw_str(key))
            .collect();
        let derived: BTreeMap<&str, &Value> = record
            .derived_fields()
            .iter()
            .map(|(k, v)| (k.as_str(), &v.value))
            .collect();
        json!({
            "url": record.url(),
            "text": text.join("\n"),
            "fields": derived,
        })
    }

    async fn predict_once(&self, payload: &Value) -> Result<Prediction, SourceError> {
        let mut request = self.client.post(&self.endpoint).json(payload);
        if let Some((user, password)) = &self.credentials {
            request = request.basic_auth(user, Some(password));
        }
        let response = request
            .send()
            .await
            .map_err(|e| transport_error(&self.name, &e))?;
        let status = response.status();
        if !status.is_success() {
            return Err(status_error(&self.name, status, &self.endpoint));
        }
        let body: ModelResponse = response
            .json()
            .await
            .map_err(|e| SourceError::fatal(&self.name, format!("malformed response: {e}")))?;
        Ok(Prediction::new(
            body.label,
            body.score,
            body.model_version.unwrap_or_else(|| self.name.clone()),
        ))
    }
}

#[async_trait]
impl ClassificationModel for HttpModelEndpoint {
    async fn predict(&self, record: &Record) -> Result<Prediction, SourceError> {
        let payload = Self::payload(record);
        retry_transient(&self.config.retry, &self.name, || self.predict_once(&payload)).await
    }
}
