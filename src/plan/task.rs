use crate::adapters::AdapterKind;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

/// Retry budget applied when a task does not declare one
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Per-attempt timeout applied when a task does not declare one (milliseconds)
pub const DEFAULT_TIMEOUT_MS: u64 = 30_000;

/// The kind of data a task is expected to yield
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataKind {
    Text,
    Image,
    Video,
    Audio,
}

impl DataKind {
    /// Returns true for kinds fetched as binary media files
    pub fn is_media(&self) -> bool {
        matches!(self, Self::Image | Self::Video | Self::Audio)
    }

    /// Returns the MIME top-level type this kind accepts, if it is a media kind
    pub fn mime_prefix(&self) -> Option<&'static str> {
        match self {
            Self::Text => None,
            Self::Image => Some("image/"),
            Self::Video => Some("video/"),
            Self::Audio => Some("audio/"),
        }
    }

    /// Returns the lowercase name used in plans and reports
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Image => "image",
            Self::Video => "video",
            Self::Audio => "audio",
        }
    }
}

impl fmt::Display for DataKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One unit of work: fetch one resource with a declared data kind
///
/// Tasks are created by the planner and never mutated afterwards; retries
/// are tracked as separate attempt records.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    /// Unique id within the plan; results are ordered by it
    pub id: u64,

    /// Target URL
    pub url: String,

    /// Declared data kind
    pub kind: DataKind,

    /// Optional explicit adapter override
    #[serde(default)]
    pub strategy: Option<AdapterKind>,

    /// Scheduling priority (higher runs first)
    #[serde(default)]
    pub priority: i32,

    /// Maximum number of retries after the first attempt
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Per-attempt timeout in milliseconds
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// Named CSS selectors whose text is captured from text documents
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub selectors: BTreeMap<String, String>,
}

fn default_max_retries() -> u32 {
    DEFAULT_MAX_RETRIES
}

fn default_timeout_ms() -> u64 {
    DEFAULT_TIMEOUT_MS
}

impl Task {
    /// Creates a task with default priority, retries and timeout
    pub fn new(id: u64, url: impl Into<String>, kind: DataKind) -> Self {
        Self {
            id,
            url: url.into(),
            kind,
            strategy: None,
            priority: 0,
            max_retries: DEFAULT_MAX_RETRIES,
            timeout_ms: DEFAULT_TIMEOUT_MS,
            selectors: BTreeMap::new(),
        }
    }

    /// Sets the explicit adapter override
    pub fn with_strategy(mut self, strategy: AdapterKind) -> Self {
        self.strategy = Some(strategy);
        self
    }

    /// Sets the scheduling priority
    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    /// Sets the retry budget
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Sets the per-attempt timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout_ms = timeout.as_millis() as u64;
        self
    }

    /// Adds a named field selector
    pub fn with_selector(mut self, name: impl Into<String>, css: impl Into<String>) -> Self {
        self.selectors.insert(name.into(), css.into());
        self
    }

    /// Returns the per-attempt timeout
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Returns the maximum number of attempts this task may make
    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }
}
