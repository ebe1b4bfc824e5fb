//! Structured extraction: page fetch plus price parsing.

use async_trait::async_trait;
use regex::Regex;
use serde_json::{json, Value};
use std::sync::{Arc, OnceLock};

use super::fanout::fan_out;
use super::{Step, StepDescriptor, StepOutput};
use crate::adapters::PageFetcher;
use crate::context::StepContext;
use crate::core::{fields, Record, Shape, StepKind, StepStamp};
use crate::errors::{ConfigurationError, Result};

/// Currency markers, tried in order against the lowercased text. The first
/// hit wins, so an ISO code beats a symbol elsewhere in the same string.
const CURRENCY_MARKERS: &[(&str, &str)] = &[
    ("chf", "CHF"),
    ("sfr", "CHF"),
    ("fr.", "CHF"),
    ("eur", "EUR"),
    ("€", "EUR"),
    ("usd", "USD"),
    ("$", "USD"),
    ("gbp", "GBP"),
    ("£", "GBP"),
];

fn amount_regex() -> Option<&'static Regex> {
    static AMOUNT: OnceLock<Option<Regex>> = OnceLock::new();
    AMOUNT
        .get_or_init(|| {
            Regex::new(r"\d{1,3}(?:['’ .,]\d{3})+(?:[.,]\d{1,2})?|\d+(?:[.,]\d{1,2})?").ok()
        })
        .as_ref()
}

/// Turns `1'299.50`, `1.299,50` or `12,90` into a number.
fn parse_amount(raw: &str) -> Option<f64> {
    let digits: String = raw.chars().filter(|c| !matches!(c, '\'' | '’' | ' ')).collect();
    let decimal_at = digits
        .rfind(['.', ','])
        .filter(|&i| (1..=2).contains(&(digits.len() - i - 1)));
    let normalized: String = digits
        .char_indices()
        .filter_map(|(i, c)| match c {
            '.' | ',' if Some(i) == decimal_at => Some('.'),
            '.' | ',' => None,
            c => Some(c),
        })
        .collect();
    normalized.parse().ok()
}

/// Parses a free-text price into an amount and an ISO currency.
///
/// ```
/// use listingflow::steps::parse_price;
///
/// assert_eq!(parse_price("CHF 1'299.50"), Some((1299.5, Some("CHF".to_string()))));
/// assert_eq!(parse_price("12,90 €"), Some((12.9, Some("EUR".to_string()))));
/// assert_eq!(parse_price("ask for price"), None);
/// ```
#[must_use]
pub fn parse_price(text: &str) -> Option<(f64, Option<String>)> {
    let lowered = text.to_lowercase();
    let currency = CURRENCY_MARKERS
        .iter()
        .find(|(marker, _)| lowered.contains(marker))
        .map(|(_, code)| (*code).to_string());
    let amount = amount_regex()?.find(text)?;
    Some((parse_amount(amount.as_str())?, currency))
}

/// Fetches each active record's page and derives price, currency and language.
///
/// The three fields are written on every processed record, as `null` when
/// the page does not reveal them.
#[derive(Debug, Clone)]
pub struct StructuredExtractionStep {
    descriptor: StepDescriptor,
}

impl StructuredExtractionStep {
    /// Registry identifier.
    pub const ID: &'static str = "structured_extraction";

    /// Creates the step.
    #[must_use]
    pub fn new() -> Self {
        Self {
            descriptor: StepDescriptor::new(Self::ID, StepKind::Extractor).providing(Shape::of(&[
                fields::PRICE,
                fields::CURRENCY,
                fields::LANGUAGE,
            ])),
        }
    }

    async fn extract(fetcher: &Arc<dyn PageFetcher>, mut record: Record, stamp: &StepStamp) -> Result<Record> {
        let structured = fetcher.fetch(record.url()).await?;
        record.raw_mut().extend(structured);

        let (price, currency) = price_of(&record);
        let language = record
            .raw_str("html_lang")
            .or_else(|| record.raw_str("language"))
            .map(str::to_lowercase);

        record.derive(fields::PRICE, json!(price), stamp)?;
        record.derive(fields::CURRENCY, json!(currency), stamp)?;
        record.derive(fields::LANGUAGE, json!(language), stamp)?;
        Ok(record)
    }
}

impl Default for StructuredExtractionStep {
    fn default() -> Self {
        Self::new()
    }
}

/// Price and currency from the raw fields of a fetched page.
fn price_of(record: &Record) -> (Option<f64>, Option<String>) {
    let declared = ["price_currency", "currency"]
        .iter()
        .find_map(|k| record.raw_str(k))
        .map(|c| c.trim().to_uppercase())
        .filter(|c| !c.is_empty());
    match record.raw().get("price") {
        Some(Value::Number(n)) => (n.as_f64(), declared),
        Some(Value::String(text)) => match parse_price(text) {
            Some((amount, marker)) => (Some(amount), declared.or(marker)),
            None => (None, declared),
        },
        _ => (None, declared),
    }
}

#[async_trait]
impl Step for StructuredExtractionStep {
    fn descriptor(&self) -> &StepDescriptor {
        &self.descriptor
    }

    fn validate(&self, _input: &[Record], ctx: &StepContext<'_>) -> Result<()> {
        if ctx.clients().fetcher().is_none() {
            return Err(ConfigurationError::new("no page fetcher configured")
                .for_step(Self::ID)
                .with_parameter("fetcher")
                .into());
        }
        Ok(())
    }

    async fn execute(&self, input: &[Record], ctx: &StepContext<'_>) -> Result<StepOutput> {
        let fetcher = ctx.clients().fetcher().ok_or_else(|| {
            ConfigurationError::new("no page fetcher configured").for_step(Self::ID)
        })?;
        let stamp = ctx.stamp();
        fan_out(input, ctx, |record| Self::extract(fetcher, record, &stamp)).await
    }
}
