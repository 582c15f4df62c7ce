//! Crawl directive handling
//!
//! Fetches, parses and caches robots.txt files. Where the directives come
//! from is abstracted behind [`DirectiveSource`] so the rate limiter can be
//! exercised offline.

mod cache;
mod parser;

pub use cache::CachedRobots;
pub use parser::ParsedRobots;

use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;
use url::Url;

/// Supplies the crawl directives for an origin
///
/// Implementations never fail: an origin whose directives cannot be obtained
/// is treated as allowing everything.
#[async_trait]
pub trait DirectiveSource: Send + Sync {
    /// Returns the directives governing `url`'s origin
    async fn fetch(&self, url: &Url) -> ParsedRobots;
}

/// Fetches `/robots.txt` over HTTP
pub struct HttpDirectiveSource {
    client: Client,
}

impl HttpDirectiveSource {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl DirectiveSource for HttpDirectiveSource {
    async fn fetch(&self, url: &Url) -> ParsedRobots {
        match fetch_robots(&self.client, url).await {
            Ok(robots) => robots,
            Err(e) => {
                tracing::warn!(
                    "Could not fetch robots.txt for {}: {}; allowing all",
                    url.host_str().unwrap_or_default(),
                    e
                );
                ParsedRobots::allow_all()
            }
        }
    }
}

/// Directive source that allows every path
pub struct AllowAllDirectives;

#[async_trait]
impl DirectiveSource for AllowAllDirectives {
    async fn fetch(&self, _url: &Url) -> ParsedRobots {
        ParsedRobots::allow_all()
    }
}

/// Returns the robots.txt location for a URL's origin
///
/// # Example
///
/// ```
/// use sumi_gather::robots::robots_url;
/// use url::Url;
///
/// let url = Url::parse("http://127.0.0.1:8080/a/b?c=d").unwrap();
/// assert_eq!(robots_url(&url).unwrap().as_str(), "http://127.0.0.1:8080/robots.txt");
/// ```
pub fn robots_url(url: &Url) -> Option<Url> {
    url.join("/robots.txt").ok()
}

/// Fetches and parses robots.txt for a URL's origin
///
/// # Status Handling
///
/// | Response | Result |
/// |----------|--------|
/// | 2xx | Parsed content |
/// | 4xx | Allow all (no directives published) |
/// | 5xx | Allow all, logged |
/// | Network error | `Err` |
pub async fn fetch_robots(client: &Client, url: &Url) -> Result<ParsedRobots, reqwest::Error> {
    let Some(location) = robots_url(url) else {
        return Ok(ParsedRobots::allow_all());
    };

    let response = client
        .get(location.clone())
        .timeout(Duration::from_secs(10))
        .send()
        .await?;

    let status = response.status();
    if status.is_success() {
        let body = response.text().await?;
        tracing::debug!("Fetched {} ({} bytes)", location, body.len());
        Ok(ParsedRobots::from_content(&body))
    } else {
        if status.is_server_error() {
            tracing::warn!("{} returned {}; allowing all", location, status);
        } else {
            tracing::debug!("{} returned {}; allowing all", location, status);
        }
        Ok(ParsedRobots::allow_all())
    }
}
