//! HTML inspection helpers
//!
//! Extracts the page title and named fields for text payloads, and the
//! embedded media URLs a media task should download when its URL points at a
//! page rather than a file.

use crate::adapters::FieldValue;
use crate::plan::DataKind;
use scraper::{ElementRef, Html, Selector};
use std::collections::{BTreeMap, HashSet};
use url::Url;

/// Extracts the trimmed `<title>` text, if present and non-empty
pub fn extract_title(html: &str) -> Option<String> {
    let document = Html::parse_document(html);
    let title_selector = Selector::parse("title").ok()?;

    document
        .select(&title_selector)
        .next()
        .map(|element| element.text().collect::<String>().trim().to_string())
        .filter(|s| !s.is_empty())
}

/// Captures the text of each named selector
///
/// Element text is the element's trimmed text nodes joined by single spaces.
/// Selectors that match nothing, or that do not parse, yield `None`.
pub fn extract_fields(
    html: &str,
    selectors: &BTreeMap<String, String>,
) -> BTreeMap<String, Option<FieldValue>> {
    if selectors.is_empty() {
        return BTreeMap::new();
    }

    let document = Html::parse_document(html);
    selectors
        .iter()
        .map(|(name, css)| {
            let value = match Selector::parse(css) {
                Ok(selector) => {
                    let mut texts: Vec<String> =
                        document.select(&selector).map(element_text).collect();
                    match texts.len() {
                        0 => None,
                        1 => texts.pop().map(FieldValue::One),
                        _ => Some(FieldValue::Many(texts)),
                    }
                }
                Err(_) => {
                    tracing::warn!("Field '{}' has an unusable selector '{}'", name, css);
                    None
                }
            };
            (name.clone(), value)
        })
        .collect()
}

fn element_text(element: ElementRef<'_>) -> String {
    element
        .text()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Extracts absolute URLs of embedded media of the given kind
///
/// # Sources
///
/// | Kind  | Elements |
/// |-------|----------|
/// | image | `img[src]` |
/// | video | `video[src]`, `video source[src]` |
/// | audio | `audio[src]`, `audio source[src]` |
///
/// Data URIs and non-HTTP(S) targets are skipped. Duplicates are removed
/// while keeping document order. Text kinds yield nothing.
///
/// # Example
///
/// ```
/// use sumi_gather::adapters::extract_media_urls;
/// use sumi_gather::DataKind;
/// use url::Url;
///
/// let html = r#"<img src="/a.png"><img src="data:image/png;base64,AAAA">"#;
/// let base = Url::parse("https://example.com/gallery/").unwrap();
/// let urls = extract_media_urls(html, &base, DataKind::Image);
/// assert_eq!(urls, vec![Url::parse("https://example.com/a.png").unwrap()]);
/// ```
pub fn extract_media_urls(html: &str, base_url: &Url, kind: DataKind) -> Vec<Url> {
    let selectors: &[&str] = match kind {
        DataKind::Text => return Vec::new(),
        DataKind::Image => &["img[src]"],
        DataKind::Video => &["video[src]", "video source[src]"],
        DataKind::Audio => &["audio[src]", "audio source[src]"],
    };

    let document = Html::parse_document(html);
    let mut seen = HashSet::new();
    let mut urls = Vec::new();

    for selector in selectors {
        let Ok(selector) = Selector::parse(selector) else {
            continue;
        };

        for element in document.select(&selector) {
            let Some(src) = element.value().attr("src") else {
                continue;
            };
            if let Some(url) = resolve_link(src, base_url) {
                if seen.insert(url.clone()) {
                    urls.push(url);
                }
            }
        }
    }

    urls
}

/// Resolves an attribute value to an absolute HTTP(S) URL
///
/// Returns None for empty values, fragment-only references, `javascript:`,
/// `mailto:`, `tel:` and `data:` targets, and anything that does not resolve
/// to HTTP or HTTPS.
pub fn resolve_link(href: &str, base_url: &Url) -> Option<Url> {
    let href = href.trim();

    if href.is_empty() || href.starts_with('#') {
        return None;
    }

    let lowered = href.to_ascii_lowercase();
    if ["javascript:", "mailto:", "tel:", "data:"]
        .iter()
        .any(|scheme| lowered.starts_with(scheme))
    {
        return None;
    }

    base_url
        .join(href)
        .ok()
        .filter(|url| url.scheme() == "http" || url.scheme() == "https")
}
