//! Fetch strategies
//!
//! Three adapters share one interface: given a URL and a declared data kind,
//! fetch it within a timeout and return either a payload or a classified
//! error.
//!
//! - [`StaticAdapter`]: plain HTTP GET of the document
//! - [`RenderedAdapter`]: headless-browser render for script-built pages
//! - [`MediaAdapter`]: binary download of images, video and audio to disk
//!
//! Adapters never retry; that belongs to the orchestrator, which also admits
//! each task's request through the rate limiter. The media adapter admits
//! the extra requests it makes for embedded files itself.

mod chrome;
mod media;
mod parser;
mod rendered;
mod session;
mod static_http;

pub use chrome::default_backend;
pub use media::MediaAdapter;
pub use parser::{extract_fields, extract_media_urls, extract_title, resolve_link};
pub use rendered::RenderedAdapter;
pub use session::{BrowserBackend, BrowserSession, RenderedPage, SessionGuard, SessionPool};
pub use static_http::StaticAdapter;

use crate::config::{Config, UserAgentConfig};
use crate::limiter::DomainRateLimiter;
use crate::plan::DataKind;
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, ACCEPT_LANGUAGE};
use reqwest::{redirect::Policy, Client};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use url::Url;

/// Identifies one of the three fetch strategies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AdapterKind {
    Static,
    Rendered,
    Media,
}

impl AdapterKind {
    /// Returns the lowercase name used in plans and reports
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Static => "static",
            Self::Rendered => "rendered",
            Self::Media => "media",
        }
    }
}

impl fmt::Display for AdapterKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classification of a per-task fetch failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FetchErrorKind {
    /// DNS, connect or transport failure
    Network,
    /// The attempt exceeded its time budget
    Timeout,
    /// The server answered with a non-success status
    Http { status: u16 },
    /// The browser did not reach a ready page in time
    RenderTimeout,
    /// The browser could not load the page
    Navigation,
    /// A media body could not be downloaded or verified
    MediaDownload,
    /// The served content does not match the declared media kind
    UnsupportedMediaType,
    /// Crawl directives forbid the path
    Disallowed,
    /// Retries were exhausted while the server kept answering 429
    RateLimitExceeded,
    /// No rate-limit token became available within the wait bound
    RateLimitWait,
    /// The body was present but too thin to be the real content
    EmptyContent,
    /// The run was cancelled before the task could finish
    Cancelled,
}

impl FetchErrorKind {
    /// Returns whether another attempt may succeed
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Network
            | Self::Timeout
            | Self::RenderTimeout
            | Self::EmptyContent
            | Self::RateLimitWait
            | Self::MediaDownload => true,
            Self::Http { status } => *status == 429 || *status >= 500,
            Self::Navigation
            | Self::UnsupportedMediaType
            | Self::Disallowed
            | Self::RateLimitExceeded
            | Self::Cancelled => false,
        }
    }

    /// Returns whether a static fetch failing this way suggests the page
    /// needs a browser
    pub fn suggests_rendering(&self) -> bool {
        matches!(self, Self::EmptyContent | Self::Timeout)
    }

    /// Returns whether this is an HTTP 429 response
    pub fn is_too_many_requests(&self) -> bool {
        matches!(self, Self::Http { status: 429 })
    }

    /// Returns a stable short label for reports
    pub fn label(&self) -> String {
        match self {
            Self::Network => "network".to_string(),
            Self::Timeout => "timeout".to_string(),
            Self::Http { status } => format!("http_{}", status),
            Self::RenderTimeout => "render_timeout".to_string(),
            Self::Navigation => "navigation".to_string(),
            Self::MediaDownload => "media_download".to_string(),
            Self::UnsupportedMediaType => "unsupported_media_type".to_string(),
            Self::Disallowed => "disallowed".to_string(),
            Self::RateLimitExceeded => "rate_limit_exceeded".to_string(),
            Self::RateLimitWait => "rate_limit_wait".to_string(),
            Self::EmptyContent => "empty_content".to_string(),
            Self::Cancelled => "cancelled".to_string(),
        }
    }
}

impl fmt::Display for FetchErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.label())
    }
}

/// A classified fetch failure with a human-readable message
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("{kind}: {message}")]
pub struct FetchError {
    pub kind: FetchErrorKind,
    pub message: String,
}

impl FetchError {
    /// Creates a new fetch error
    pub fn new(kind: FetchErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// Creates an HTTP status error
    pub fn http(status: u16, url: &Url) -> Self {
        Self::new(
            FetchErrorKind::Http { status },
            format!("HTTP {} from {}", status, url),
        )
    }

    /// Returns whether another attempt may succeed
    pub fn is_transient(&self) -> bool {
        self.kind.is_transient()
    }
}

/// Classifies a reqwest error into the fetch error taxonomy
pub fn classify_reqwest_error(error: &reqwest::Error) -> FetchError {
    if error.is_timeout() {
        FetchError::new(FetchErrorKind::Timeout, "Request timeout")
    } else if error.is_connect() {
        FetchError::new(FetchErrorKind::Network, format!("Connection failed: {}", error))
    } else if let Some(status) = error.status() {
        FetchError::new(FetchErrorKind::Http { status: status.as_u16() }, error.to_string())
    } else {
        FetchError::new(FetchErrorKind::Network, error.to_string())
    }
}

/// One downloaded media file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaFile {
    /// Where the file was written
    pub path: PathBuf,
    /// The URL the bytes came from
    pub source_url: String,
    /// Size in bytes
    pub size: u64,
    /// MIME type reported by the server
    pub mime_type: String,
    /// Hex SHA-256 of the file contents
    pub sha256: String,
}

/// Text captured by one field selector
///
/// A selector matching one element yields a single string and one matching
/// several yields a list. A selector matching nothing is stored as `None`
/// next to it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    One(String),
    Many(Vec<String>),
}

/// The raw data a successful fetch produced
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Payload {
    /// A text document (static or rendered HTML, or any textual body)
    Text {
        body: String,
        content_type: String,
        title: Option<String>,
        final_url: String,
        /// Text captured by the task's field selectors
        #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
        fields: BTreeMap<String, Option<FieldValue>>,
    },
    /// One or more media files saved to disk
    Media { files: Vec<MediaFile> },
}

impl Payload {
    /// Returns the hex SHA-256 identifying this payload's content
    ///
    /// Text payloads hash the body. Media payloads hash the concatenation of
    /// their file hashes in order.
    pub fn content_hash(&self) -> String {
        let mut hasher = Sha256::new();
        match self {
            Self::Text { body, .. } => hasher.update(body.as_bytes()),
            Self::Media { files } => {
                for file in files {
                    hasher.update(file.sha256.as_bytes());
                }
            }
        }
        hex::encode(hasher.finalize())
    }

    /// Returns the URL the content was finally served from, when known
    pub fn final_url(&self) -> Option<&str> {
        match self {
            Self::Text { final_url, .. } => Some(final_url),
            Self::Media { files } => files.first().map(|f| f.source_url.as_str()),
        }
    }

    /// Returns the size of the payload in bytes
    pub fn size(&self) -> u64 {
        match self {
            Self::Text { body, .. } => body.len() as u64,
            Self::Media { files } => files.iter().map(|f| f.size).sum(),
        }
    }
}

/// What an adapter is asked to fetch
#[derive(Debug, Clone)]
pub struct FetchRequest {
    pub url: Url,
    pub kind: DataKind,
    pub timeout: Duration,
    /// Named CSS selectors to capture from text documents
    pub selectors: BTreeMap<String, String>,
}

/// A fetch strategy
#[async_trait]
pub trait Adapter: Send + Sync {
    /// Which strategy this adapter implements
    fn kind(&self) -> AdapterKind;

    /// Fetches the resource, enforcing `request.timeout` internally
    async fn fetch(&self, request: &FetchRequest) -> Result<Payload, FetchError>;
}

/// The closed set of adapters available to a run
#[derive(Clone)]
pub struct AdapterSet {
    static_http: Arc<dyn Adapter>,
    rendered: Arc<dyn Adapter>,
    media: Arc<dyn Adapter>,
}

impl AdapterSet {
    /// Creates a set from explicit adapter implementations
    pub fn new(
        static_http: Arc<dyn Adapter>,
        rendered: Arc<dyn Adapter>,
        media: Arc<dyn Adapter>,
    ) -> Self {
        Self {
            static_http,
            rendered,
            media,
        }
    }

    /// Builds the production adapters from configuration
    ///
    /// The rendered adapter uses the headless Chrome backend when the crate is
    /// built with the `chrome` feature, and a backend that reports rendering
    /// as unavailable otherwise. `limiter` admits embedded media downloads.
    pub fn from_config(config: &Config, limiter: Arc<DomainRateLimiter>) -> crate::Result<Self> {
        let client = build_http_client(&config.user_agent)?;
        let adapters = &config.adapters;

        let static_http = StaticAdapter::new(client.clone(), adapters.min_content_bytes);
        let media = MediaAdapter::new(
            client,
            adapters.media_dir.clone(),
            adapters.max_media_bytes,
            adapters.max_media_per_page,
        )
        .with_limiter(limiter);
        let pool = SessionPool::new(default_backend(config)?, adapters.max_browser_sessions);
        let rendered = RenderedAdapter::new(
            pool,
            Duration::from_millis(adapters.render_settle_ms),
            adapters.min_content_bytes,
        );

        Ok(Self::new(
            Arc::new(static_http),
            Arc::new(rendered),
            Arc::new(media),
        ))
    }

    /// Returns the adapter implementing `kind`
    pub fn get(&self, kind: AdapterKind) -> &Arc<dyn Adapter> {
        match kind {
            AdapterKind::Static => &self.static_http,
            AdapterKind::Rendered => &self.rendered,
            AdapterKind::Media => &self.media,
        }
    }
}

/// Formats the identifying user agent string
///
/// Format: `CrawlerName/Version (+ContactURL; ContactEmail)`
pub fn user_agent_string(config: &UserAgentConfig) -> String {
    format!(
        "{}/{} (+{}; {})",
        config.crawler_name, config.crawler_version, config.contact_url, config.contact_email
    )
}

/// Builds the shared HTTP client used by the static and media adapters
///
/// Redirects are followed (up to 10 hops) so the final URL can be recorded
/// for deduplication. Per-request timeouts are set by each adapter from the
/// task's own budget.
///
/// # Example
///
/// ```no_run
/// use sumi_gather::adapters::build_http_client;
/// use sumi_gather::config::UserAgentConfig;
///
/// let config = UserAgentConfig {
///     crawler_name: "SumiGather".to_string(),
///     crawler_version: "1.0".to_string(),
///     contact_url: "https://example.com/about".to_string(),
///     contact_email: "admin@example.com".to_string(),
/// };
///
/// let client = build_http_client(&config).unwrap();
/// ```
pub fn build_http_client(config: &UserAgentConfig) -> Result<Client, reqwest::Error> {
    let mut headers = HeaderMap::new();
    headers.insert(
        ACCEPT,
        HeaderValue::from_static(
            "text/html,application/xhtml+xml,application/xml;q=0.9,image/*,video/*,audio/*;q=0.8,*/*;q=0.5",
        ),
    );
    headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("en-US,en;q=0.9"));

    Client::builder()
        .user_agent(user_agent_string(config))
        .default_headers(headers)
        .connect_timeout(Duration::from_secs(10))
        .redirect(Policy::limited(10))
        .gzip(true)
        .brotli(true)
        .build()
}

/// Returns the media type of a Content-Type header, without parameters
pub(crate) fn mime_essence(content_type: &str) -> String {
    content_type
        .split(';')
        .next()
        .unwrap_or("")
        .trim()
        .to_ascii_lowercase()
}
