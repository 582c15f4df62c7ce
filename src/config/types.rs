use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

/// Main configuration structure for Sumi-Gather
///
/// Every section except `[user-agent]` may be omitted from the TOML file and
/// falls back to its defaults.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub orchestrator: OrchestratorConfig,
    #[serde(rename = "user-agent")]
    pub user_agent: UserAgentConfig,
    #[serde(rename = "rate-limit", default)]
    pub rate_limit: RateLimitConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub adapters: AdaptersConfig,
    #[serde(default)]
    pub output: OutputConfig,
}

/// Worker pool configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OrchestratorConfig {
    /// Number of concurrent workers (global in-flight ceiling)
    pub workers: u32,

    /// Capacity of the progress event channel
    #[serde(rename = "progress-buffer")]
    pub progress_buffer: usize,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            workers: 8,
            progress_buffer: 256,
        }
    }
}

/// User agent identification configuration
#[derive(Debug, Clone, Deserialize)]
pub struct UserAgentConfig {
    /// Name of the crawler, also the token matched against crawl directives
    #[serde(rename = "crawler-name")]
    pub crawler_name: String,

    /// Version of the crawler
    #[serde(rename = "crawler-version")]
    pub crawler_version: String,

    /// URL with information about the crawler
    #[serde(rename = "contact-url")]
    pub contact_url: String,

    /// Email address for crawler-related contact
    #[serde(rename = "contact-email")]
    pub contact_email: String,
}

impl Default for UserAgentConfig {
    fn default() -> Self {
        Self {
            crawler_name: "SumiGather".to_string(),
            crawler_version: env!("CARGO_PKG_VERSION").to_string(),
            contact_url: "https://example.com/about".to_string(),
            contact_email: "admin@example.com".to_string(),
        }
    }
}

/// Per-domain politeness configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Token refill rate per domain
    #[serde(rename = "requests-per-second")]
    pub requests_per_second: f64,

    /// Token bucket capacity per domain
    pub burst: u32,

    /// Longest a single acquisition may wait for a token (milliseconds)
    #[serde(rename = "max-acquire-wait-ms")]
    pub max_acquire_wait_ms: u64,

    /// Longest a worker waits on a bucket before putting the task back in the
    /// queue (milliseconds)
    #[serde(rename = "dispatch-wait-ms")]
    pub dispatch_wait_ms: u64,

    /// How long fetched crawl directives stay valid (hours)
    #[serde(rename = "directive-ttl-hours")]
    pub directive_ttl_hours: u64,

    /// How long a 429 penalty shrinks a domain's bucket (seconds)
    #[serde(rename = "penalty-secs")]
    pub penalty_secs: u64,

    /// Refill rate floor while penalized
    #[serde(rename = "min-penalty-rate")]
    pub min_penalty_rate: f64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            requests_per_second: 1.0,
            burst: 1,
            max_acquire_wait_ms: 30_000,
            dispatch_wait_ms: 100,
            directive_ttl_hours: 24,
            penalty_secs: 60,
            min_penalty_rate: 0.05,
        }
    }
}

impl RateLimitConfig {
    pub fn max_acquire_wait(&self) -> Duration {
        Duration::from_millis(self.max_acquire_wait_ms)
    }

    pub fn dispatch_wait(&self) -> Duration {
        Duration::from_millis(self.dispatch_wait_ms.min(self.max_acquire_wait_ms))
    }

    pub fn penalty_duration(&self) -> Duration {
        Duration::from_secs(self.penalty_secs)
    }

    pub fn directive_ttl(&self) -> chrono::Duration {
        chrono::Duration::hours(self.directive_ttl_hours as i64)
    }
}

/// Backoff configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Delay before the first retry (milliseconds)
    #[serde(rename = "base-delay-ms")]
    pub base_delay_ms: u64,

    /// Upper bound on any single backoff delay (milliseconds)
    #[serde(rename = "max-delay-ms")]
    pub max_delay_ms: u64,

    /// Random spread applied to each delay, as a fraction of it
    pub jitter: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            base_delay_ms: 1_500,
            max_delay_ms: 60_000,
            jitter: 0.2,
        }
    }
}

/// Fetch strategy configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AdaptersConfig {
    /// Text bodies shorter than this after trimming count as empty
    #[serde(rename = "min-content-bytes")]
    pub min_content_bytes: usize,

    /// Hosts (and their subdomains) that always need rendering
    #[serde(rename = "spa-patterns")]
    pub spa_patterns: Vec<String>,

    /// Directory media files are written to
    #[serde(rename = "media-dir")]
    pub media_dir: PathBuf,

    /// Per-file size ceiling for media downloads
    #[serde(rename = "max-media-bytes")]
    pub max_media_bytes: u64,

    /// Cap on files downloaded from one embedding page
    #[serde(rename = "max-media-per-page")]
    pub max_media_per_page: usize,

    /// Browser sessions the rendered adapter may hold open
    #[serde(rename = "max-browser-sessions")]
    pub max_browser_sessions: usize,

    /// Extra wait after DOM-ready before reading a rendered page (milliseconds)
    #[serde(rename = "render-settle-ms")]
    pub render_settle_ms: u64,
}

impl Default for AdaptersConfig {
    fn default() -> Self {
        Self {
            min_content_bytes: 64,
            spa_patterns: default_spa_patterns(),
            media_dir: PathBuf::from("./media"),
            max_media_bytes: 100 * 1024 * 1024,
            max_media_per_page: 20,
            max_browser_sessions: 2,
            render_settle_ms: 500,
        }
    }
}

/// Sites known to build their content client-side
pub fn default_spa_patterns() -> Vec<String> {
    [
        "twitter.com",
        "x.com",
        "facebook.com",
        "instagram.com",
        "youtube.com",
        "linkedin.com",
        "tiktok.com",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

/// Output configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Where the results JSON is written
    #[serde(rename = "results-path")]
    pub results_path: PathBuf,

    /// Where the markdown run report is written
    #[serde(rename = "report-path")]
    pub report_path: PathBuf,

    /// Optional SQLite file that persists crawl directives between runs
    #[serde(rename = "directive-cache-path")]
    pub directive_cache_path: Option<PathBuf>,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            results_path: PathBuf::from("./results.json"),
            report_path: PathBuf::from("./report.md"),
            directive_cache_path: None,
        }
    }
}
