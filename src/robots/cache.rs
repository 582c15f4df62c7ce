//! Robots.txt caching
//!
//! Directives are fetched once per domain and reused until their TTL runs
//! out, then refetched lazily on the next request to that domain.

use crate::robots::ParsedRobots;
use chrono::{DateTime, Duration, Utc};

/// Cached robots.txt data for a domain
#[derive(Debug, Clone)]
pub struct CachedRobots {
    /// The parsed robots.txt content
    pub content: ParsedRobots,

    /// When the robots.txt was fetched
    pub fetched_at: DateTime<Utc>,
}

impl CachedRobots {
    /// Wraps freshly fetched directives, stamped with the current time
    pub fn new(content: ParsedRobots) -> Self {
        Self::fetched_at(content, Utc::now())
    }

    /// Wraps directives fetched at a known time (e.g. loaded from storage)
    pub fn fetched_at(content: ParsedRobots, fetched_at: DateTime<Utc>) -> Self {
        Self {
            content,
            fetched_at,
        }
    }

    /// Checks if the cached directives are older than `ttl`
    ///
    /// # Returns
    ///
    /// * `true` - If the directives must be refetched
    /// * `false` - If they are still fresh
    pub fn is_stale(&self, ttl: Duration) -> bool {
        self.age() > ttl
    }

    /// Returns the age of the cached robots.txt
    pub fn age(&self) -> Duration {
        Utc::now() - self.fetched_at
    }

    /// Checks if a URL is allowed according to the cached robots.txt
    pub fn is_allowed(&self, url: &str, user_agent: &str) -> bool {
        self.content.is_allowed(url, user_agent)
    }

    /// Gets the crawl delay from the cached robots.txt, in seconds
    pub fn crawl_delay(&self, user_agent: &str) -> Option<f64> {
        self.content.crawl_delay(user_agent)
    }
}
