//! Per-domain rate limiting
//!
//! Every request passes through [`DomainRateLimiter::acquire`] before an
//! adapter touches the network. The limiter:
//!
//! - consults the domain's crawl directives (fetched once, cached with a TTL)
//!   and refuses disallowed paths without spending a token
//! - spaces requests with a token bucket per domain, slowed further by any
//!   crawl delay the domain asks for
//! - shrinks a domain's bucket for a while after it answers HTTP 429
//!
//! Waiting for a token is bounded, so a worker is never parked forever on
//! one slow domain.

mod bucket;

pub use bucket::TokenBucket;

use crate::config::RateLimitConfig;
use crate::robots::{CachedRobots, DirectiveSource};
use crate::state::{DomainShape, DomainState};
use crate::storage::DirectiveStore;
use crate::url::domain_key;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use thiserror::Error;
use tokio::time::Instant;
use url::Url;

/// Proof that a request to a domain may go out now
#[derive(Debug, Clone)]
pub struct Permit {
    pub domain: String,
    pub granted_at: Instant,
    /// Time spent waiting for the token
    pub waited: Duration,
}

/// Why a request was not admitted
#[derive(Debug, Clone, PartialEq, Error)]
pub enum AcquireError {
    #[error("{url} is disallowed by crawl directives")]
    Disallowed { url: String },

    #[error("no token for {domain} within {waited:?} (next in {retry_after:?})")]
    WaitExceeded {
        domain: String,
        waited: Duration,
        retry_after: Duration,
    },

    #[error("URL has no host: {0}")]
    NoDomain(String),
}

type SharedDomain = Arc<tokio::sync::Mutex<DomainState>>;

/// Token-bucket rate limiter keyed by domain
pub struct DomainRateLimiter {
    config: RateLimitConfig,
    /// Product token matched against `User-agent` groups
    robots_agent: String,
    source: Arc<dyn DirectiveSource>,
    store: Option<Arc<Mutex<dyn DirectiveStore>>>,
    domains: Mutex<HashMap<String, SharedDomain>>,
}

impl DomainRateLimiter {
    /// Creates a limiter
    ///
    /// # Arguments
    ///
    /// * `config` - Rate, burst, wait bound, directive TTL and penalty settings
    /// * `robots_agent` - The crawler name looked up in crawl directives
    /// * `source` - Where crawl directives come from
    pub fn new(
        config: RateLimitConfig,
        robots_agent: impl Into<String>,
        source: Arc<dyn DirectiveSource>,
    ) -> Self {
        Self {
            config,
            robots_agent: robots_agent.into(),
            source,
            store: None,
            domains: Mutex::new(HashMap::new()),
        }
    }

    /// Persists fetched directives through `store` and reuses fresh stored ones
    pub fn with_store(mut self, store: Arc<Mutex<dyn DirectiveStore>>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn config(&self) -> &RateLimitConfig {
        &self.config
    }

    /// Admits one request to `url`'s domain
    ///
    /// # Flow
    ///
    /// 1. Load the domain's crawl directives if missing or stale
    /// 2. Disallowed path → `Disallowed` immediately, no token consumed
    /// 3. Take a token, sleeping until one refills, but never past the
    ///    configured wait bound (`WaitExceeded`)
    pub async fn acquire(&self, url: &Url) -> Result<Permit, AcquireError> {
        self.acquire_within(url, self.config.max_acquire_wait()).await
    }

    /// Admits one request to `url`'s domain, waiting at most `bound` for a
    /// token
    ///
    /// A zero bound only takes a token that is available right now. On
    /// `WaitExceeded` the error's `retry_after` says when the next token is
    /// due.
    pub async fn acquire_within(&self, url: &Url, bound: Duration) -> Result<Permit, AcquireError> {
        let domain = domain_key(url).ok_or_else(|| AcquireError::NoDomain(url.to_string()))?;
        let entry = self.entry(&domain);
        let started = Instant::now();

        {
            let mut state = entry.lock().await;
            self.ensure_directives(&mut state, url, &domain).await;

            let allowed = state
                .directives
                .as_ref()
                .map(|cached| cached.is_allowed(url.as_str(), &self.robots_agent))
                .unwrap_or(true);
            if !allowed {
                tracing::debug!("{} disallowed by crawl directives", url);
                return Err(AcquireError::Disallowed {
                    url: url.to_string(),
                });
            }
        }

        let deadline = started + bound;
        loop {
            let wait = {
                let mut state = entry.lock().await;
                let now = Instant::now();
                match state.try_acquire(now) {
                    Ok(()) => {
                        tracing::trace!("Token granted for {} ({} so far)", domain, state.granted);
                        return Ok(Permit {
                            domain,
                            granted_at: now,
                            waited: now.saturating_duration_since(started),
                        });
                    }
                    Err(wait) => wait,
                }
            };

            let now = Instant::now();
            if now + wait > deadline {
                tracing::debug!("Token wait for {} exceeds bound ({:?})", domain, wait);
                return Err(AcquireError::WaitExceeded {
                    domain,
                    waited: now.saturating_duration_since(started),
                    retry_after: wait,
                });
            }

            tracing::trace!("Waiting {:?} for a {} token", wait, domain);
            tokio::time::sleep(wait).await;
        }
    }

    /// Shrinks a domain's bucket after it answered HTTP 429
    pub async fn penalize(&self, domain: &str) {
        let entry = self.entry(domain);
        let mut state = entry.lock().await;
        state.apply_penalty(self.config.penalty_duration(), Instant::now());

        let shape = state.effective_shape();
        tracing::info!(
            "Rate limited by {}; bucket now {} tokens at {:.3}/s",
            domain,
            shape.capacity,
            shape.refill_rate
        );
    }

    /// Current bucket capacity for a domain, if it has been seen
    pub async fn bucket_capacity(&self, domain: &str) -> Option<f64> {
        let entry = self.existing(domain)?;
        let mut state = entry.lock().await;
        state.expire_penalty(Instant::now());
        Some(state.bucket.capacity())
    }

    /// Tokens currently available for a domain, if it has been seen
    pub async fn available_tokens(&self, domain: &str) -> Option<f64> {
        let entry = self.existing(domain)?;
        let mut state = entry.lock().await;
        let now = Instant::now();
        state.expire_penalty(now);
        Some(state.bucket.available(now))
    }

    /// Number of tokens granted for a domain so far
    pub async fn granted(&self, domain: &str) -> u64 {
        match self.existing(domain) {
            Some(entry) => entry.lock().await.granted,
            None => 0,
        }
    }

    /// Number of domains seen
    pub fn domain_count(&self) -> usize {
        self.domains
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    fn existing(&self, domain: &str) -> Option<SharedDomain> {
        self.domains
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(domain)
            .cloned()
    }

    fn entry(&self, domain: &str) -> SharedDomain {
        let mut domains = self.domains.lock().unwrap_or_else(PoisonError::into_inner);
        domains
            .entry(domain.to_string())
            .or_insert_with(|| {
                let base = DomainShape::from_limits(
                    self.config.requests_per_second,
                    self.config.burst,
                    None,
                );
                Arc::new(tokio::sync::Mutex::new(DomainState::new(
                    base,
                    self.config.min_penalty_rate,
                    Instant::now(),
                )))
            })
            .clone()
    }

    /// Loads directives into `state` when missing or stale
    ///
    /// Runs under the domain lock, so concurrent first requests to a domain
    /// share one fetch.
    async fn ensure_directives(&self, state: &mut DomainState, url: &Url, domain: &str) {
        let ttl = self.config.directive_ttl();
        if !state.needs_directives(ttl) {
            return;
        }

        let cached = match self.load_stored(domain).filter(|c| !c.is_stale(ttl)) {
            Some(stored) => {
                tracing::debug!("Using stored crawl directives for {}", domain);
                stored
            }
            None => {
                let fetched = CachedRobots::new(self.source.fetch(url).await);
                self.save_stored(domain, &fetched);
                fetched
            }
        };

        let crawl_delay = cached.crawl_delay(&self.robots_agent);
        if let Some(delay) = crawl_delay {
            tracing::debug!("{} asks for a crawl delay of {}s", domain, delay);
        }

        state.set_base_shape(
            DomainShape::from_limits(
                self.config.requests_per_second,
                self.config.burst,
                crawl_delay,
            ),
            Instant::now(),
        );
        state.directives = Some(cached);
    }

    fn load_stored(&self, domain: &str) -> Option<CachedRobots> {
        let store = self.store.as_ref()?;
        let store = store.lock().unwrap_or_else(PoisonError::into_inner);
        match store.load_directives(domain) {
            Ok(stored) => stored,
            Err(e) => {
                tracing::warn!("Failed to load stored directives for {}: {}", domain, e);
                None
            }
        }
    }

    fn save_stored(&self, domain: &str, cached: &CachedRobots) {
        let Some(store) = self.store.as_ref() else {
            return;
        };
        let store = store.lock().unwrap_or_else(PoisonError::into_inner);
        if let Err(e) = store.save_directives(domain, cached) {
            tracing::warn!("Failed to store directives for {}: {}", domain, e);
        }
    }
}
