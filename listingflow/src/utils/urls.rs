//! URL normalization used for record identity and domain rules.

use url::Url;

const TRACKING_PARAMS: &[&str] = &["srsltid", "gclid", "fbclid", "msclkid"];

fn is_tracking_param(key: &str) -> bool {
    key.starts_with("utm_") || TRACKING_PARAMS.contains(&key)
}

fn is_ebay_host(host: &str) -> bool {
    host.split('.').any(|label| label == "ebay")
}

/// Normalizes a listing URL so that equivalent links collapse to one identity.
///
/// Scheme and host are lowercased, the fragment is dropped, tracking query
/// parameters are removed and eBay links lose their query entirely. Returns
/// `None` when `raw` is not an absolute URL.
#[must_use]
pub fn normalize_url(raw: &str) -> Option<String> {
    let mut url = Url::parse(raw.trim()).ok()?;
    url.set_fragment(None);

    let host = url.host_str().unwrap_or_default().to_string();
    if is_ebay_host(&host) {
        url.set_query(None);
    } else if url.query().is_some() {
        let kept: Vec<(String, String)> = url
            .query_pairs()
            .filter(|(key, _)| !is_tracking_param(key))
            .map(|(key, value)| (key.into_owned(), value.into_owned()))
            .collect();
        if kept.is_empty() {
            url.set_query(None);
        } else {
            url.query_pairs_mut().clear().extend_pairs(kept.iter());
        }
    }

    Some(url.to_string())
}

/// Host of `raw` without a leading `www.`, lowercased.
#[must_use]
pub fn host_of(raw: &str) -> Option<String> {
    let url = Url::parse(raw.trim()).ok()?;
    let host = url.host_str()?.to_lowercase();
    Some(host.strip_prefix("www.").map_or_else(|| host.clone(), str::to_string))
}

#[cfg(test)]
mod tests {
    use super::*;

    const SRSLTID: &str = "srsltid=AfmBOoqCctfdXwRhSCqHCHO3sxdW0PCZ";

    #[test]
    fn test_removes_tracking_parameters() {
        let base = "https://a.ch/some/levels/";
        let tracked = format!("{base}?{SRSLTID}");
        assert_eq!(normalize_url(base).as_deref(), Some(base));
        assert_eq!(normalize_url(&tracked).as_deref(), Some(base));
        assert_eq!(
            normalize_url(&format!("{tracked}&aa=bb")).as_deref(),
            Some("https://a.ch/some/levels/?aa=bb")
        );
        assert_eq!(
            normalize_url(&format!("{tracked}&aa=bb&utm_source=xx")).as_deref(),
            Some("https://a.ch/some/levels/?aa=bb")
        );
        assert_eq!(
            normalize_url(&format!("{tracked}&aa=bb&source=xx")).as_deref(),
            Some("https://a.ch/some/levels/?aa=bb&source=xx")
        );
    }

    #[test]
    fn test_ebay_drops_all_parameters() {
        let base = "https://www.ebay.ch/some/levels/";
        assert_eq!(normalize_url(base).as_deref(), Some(base));
        assert_eq!(normalize_url(&format!("{base}?a=b&c=d")).as_deref(), Some(base));
    }

    #[test]
    fn test_lowercases_host_and_drops_fragment() {
        assert_eq!(
            normalize_url("HTTPS://Shop.Example.CH/Item#reviews").as_deref(),
            Some("https://shop.example.ch/Item")
        );
    }

    #[test]
    fn test_rejects_relative_urls() {
        assert_eq!(normalize_url("/just/a/path"), None);
    }

    #[test]
    fn test_host_of_strips_www() {
        assert_eq!(host_of("https://www.Apotheke.ch/x").as_deref(), Some("apotheke.ch"));
        assert_eq!(host_of("https://shop.de/x").as_deref(), Some("shop.de"));
        assert_eq!(host_of("not a url"), None);
    }
}
