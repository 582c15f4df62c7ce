//! Sumi-Gather: a polite scrape-plan orchestrator
//!
//! This crate turns a structured scrape plan into a consolidated raw dataset.
//! Tasks are dispatched across a bounded worker pool, each one routed to a
//! static, rendered or media fetch strategy, throttled per domain by a token
//! bucket that honours robots.txt, retried with backoff, and deduplicated
//! against equivalent requests. Results come back ordered by task id no matter
//! in which order the fetches completed.

pub mod adapters;
pub mod config;
pub mod limiter;
pub mod orchestrator;
pub mod output;
pub mod plan;
pub mod robots;
pub mod state;
pub mod storage;
pub mod url;

use thiserror::Error;

/// Main error type for Sumi-Gather operations
///
/// Per-task fetch failures are not represented here; they are recorded as
/// [`adapters::FetchError`] values inside the result set and never abort a run.
#[derive(Debug, Error)]
pub enum GatherError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("{0}")]
    Plan(#[from] PlanValidationError),

    #[error("HTTP error for {url}: {source}")]
    Http { url: String, source: reqwest::Error },

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Storage error: {0}")]
    StorageError(#[from] storage::StorageError),

    #[error("URL error: {0}")]
    UrlError(#[from] UrlError),

    #[error("URL parse error: {0}")]
    UrlParse(#[from] ::url::ParseError),

    #[error("HTTP client error: {0}")]
    Reqwest(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Output error: {0}")]
    Output(#[from] output::OutputError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Browser error: {0}")]
    Browser(String),
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid URL in config: {0}")]
    InvalidUrl(String),

    #[error("Invalid domain pattern: {0}")]
    InvalidPattern(String),
}

/// URL-specific errors
#[derive(Debug, Error)]
pub enum UrlError {
    #[error("Failed to parse URL: {0}")]
    Parse(String),

    #[error("Invalid URL scheme: {0}")]
    InvalidScheme(String),

    #[error("Missing domain in URL")]
    MissingDomain,

    #[error("Malformed URL: {0}")]
    Malformed(String),
}

/// A scrape plan that failed structural validation
///
/// Plans are rejected wholesale: nothing is scheduled when any task is
/// malformed. Every problem found is listed, not just the first.
#[derive(Debug, Error)]
#[error("Plan rejected: {}", .problems.join("; "))]
pub struct PlanValidationError {
    pub problems: Vec<String>,
}

/// Result type alias for Sumi-Gather operations
pub type Result<T> = std::result::Result<T, GatherError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Result type alias for URL operations
pub type UrlResult<T> = std::result::Result<T, UrlError>;

// Re-export commonly used types
pub use config::Config;
pub use orchestrator::{CancelHandle, Orchestrator, ProgressEvent};
pub use output::{FetchResult, ResultSet, RunReport};
pub use plan::{DataKind, ScrapePlan, Task};
pub use state::TaskState;
pub use url::{domain_key, normalize_url, DedupKey};
