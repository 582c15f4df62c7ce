use crate::limiter::TokenBucket;
use crate::robots::CachedRobots;
use std::time::Duration;
use tokio::time::Instant;

/// Capacity and refill rate of a domain's token bucket
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DomainShape {
    pub capacity: f64,
    pub refill_rate: f64,
}

impl DomainShape {
    /// Derives a domain's base shape from the configured rate and its crawl delay
    ///
    /// A crawl delay slower than the configured rate wins: the bucket then
    /// refills at `1 / delay` with a capacity of one, so requests are spaced at
    /// least `delay` apart.
    pub fn from_limits(requests_per_second: f64, burst: u32, crawl_delay: Option<f64>) -> Self {
        match crawl_delay {
            Some(delay) if delay > 0.0 && 1.0 / delay < requests_per_second => Self {
                capacity: 1.0,
                refill_rate: 1.0 / delay,
            },
            _ => Self {
                capacity: f64::from(burst.max(1)),
                refill_rate: requests_per_second,
            },
        }
    }

    /// Halves capacity and rate once per penalty level, down to the floors
    fn penalized(&self, level: u32, min_rate: f64) -> Self {
        let divisor = 2f64.powi(level as i32);
        Self {
            capacity: (self.capacity / divisor).floor().max(1.0),
            refill_rate: (self.refill_rate / divisor).max(min_rate.min(self.refill_rate)),
        }
    }
}

/// An active 429 penalty on a domain
#[derive(Debug, Clone, Copy)]
pub struct Penalty {
    /// Number of 429s received while the penalty was active
    pub level: u32,
    /// When the domain returns to its base shape
    pub until: Instant,
}

/// Deepest penalty level; further 429s only extend the window
const MAX_PENALTY_LEVEL: u32 = 6;

/// Tracks the state of one domain for rate limiting
///
/// This structure holds the domain's token bucket, its cached crawl
/// directives, and any temporary penalty imposed after HTTP 429 responses.
#[derive(Debug)]
pub struct DomainState {
    /// The domain's token bucket
    pub bucket: TokenBucket,

    /// Cached crawl directives, if fetched
    pub directives: Option<CachedRobots>,

    /// Shape the bucket returns to when no penalty is active
    pub base: DomainShape,

    /// Active 429 penalty
    pub penalty: Option<Penalty>,

    /// Number of tokens granted for this domain
    pub granted: u64,

    /// When the last token was granted
    pub last_granted: Option<Instant>,

    min_penalty_rate: f64,
}

impl DomainState {
    /// Creates the state for a newly seen domain with a full bucket
    pub fn new(base: DomainShape, min_penalty_rate: f64, now: Instant) -> Self {
        Self {
            bucket: TokenBucket::new(base.capacity, base.refill_rate, now),
            directives: None,
            base,
            penalty: None,
            granted: 0,
            last_granted: None,
            min_penalty_rate,
        }
    }

    /// The shape currently in force, penalty included
    pub fn effective_shape(&self) -> DomainShape {
        match self.penalty {
            Some(penalty) => self.base.penalized(penalty.level, self.min_penalty_rate),
            None => self.base,
        }
    }

    /// Replaces the base shape (e.g. after directives with a crawl delay arrive)
    pub fn set_base_shape(&mut self, base: DomainShape, now: Instant) {
        self.base = base;
        self.apply_shape(now);
    }

    /// Shrinks the bucket after an HTTP 429 and empties it
    pub fn apply_penalty(&mut self, duration: Duration, now: Instant) {
        let level = self
            .penalty
            .map(|p| (p.level + 1).min(MAX_PENALTY_LEVEL))
            .unwrap_or(1);
        self.penalty = Some(Penalty {
            level,
            until: now + duration,
        });
        self.apply_shape(now);
        self.bucket.drain(now);
    }

    /// Lifts an expired penalty
    ///
    /// Returns true if the penalty was lifted.
    pub fn expire_penalty(&mut self, now: Instant) -> bool {
        match self.penalty {
            Some(penalty) if penalty.until <= now => {
                self.penalty = None;
                self.apply_shape(now);
                true
            }
            _ => false,
        }
    }

    /// Takes one token, recording the grant
    pub fn try_acquire(&mut self, now: Instant) -> Result<(), Duration> {
        self.expire_penalty(now);
        self.bucket.try_take(now)?;
        self.granted += 1;
        self.last_granted = Some(now);
        Ok(())
    }

    /// Returns whether directives must be (re)fetched before the next request
    pub fn needs_directives(&self, ttl: chrono::Duration) -> bool {
        self.directives
            .as_ref()
            .map(|cached| cached.is_stale(ttl))
            .unwrap_or(true)
    }

    fn apply_shape(&mut self, now: Instant) {
        let shape = self.effective_shape();
        self.bucket.reshape(shape.capacity, shape.refill_rate, now);
    }
}
