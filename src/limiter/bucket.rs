use std::time::Duration;
use tokio::time::Instant;

/// Continuous-refill token bucket
///
/// Holds at most `capacity` tokens and gains `refill_rate` tokens per second.
/// One request costs one token; the level never goes negative.
#[derive(Debug, Clone)]
pub struct TokenBucket {
    capacity: f64,
    refill_rate: f64,
    tokens: f64,
    last_refill: Instant,
}

impl TokenBucket {
    /// Creates a full bucket
    pub fn new(capacity: f64, refill_rate: f64, now: Instant) -> Self {
        let capacity = capacity.max(1.0);
        Self {
            capacity,
            refill_rate,
            tokens: capacity,
            last_refill: now,
        }
    }

    fn refill(&mut self, now: Instant) {
        let elapsed = now.saturating_duration_since(self.last_refill).as_secs_f64();
        self.tokens = (self.tokens + elapsed * self.refill_rate).min(self.capacity);
        self.last_refill = now;
    }

    /// Takes one token if available
    ///
    /// # Returns
    ///
    /// * `Ok(())` - A token was consumed
    /// * `Err(wait)` - How long until one token will be available
    pub fn try_take(&mut self, now: Instant) -> Result<(), Duration> {
        self.refill(now);

        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            return Ok(());
        }

        let missing = 1.0 - self.tokens;
        let secs = if self.refill_rate > 0.0 {
            missing / self.refill_rate
        } else {
            1.0
        };
        // Round up so the retry never lands just short of a whole token
        Err(Duration::from_secs_f64(secs) + Duration::from_micros(1))
    }

    /// Changes capacity and refill rate, keeping accrued tokens up to the new
    /// capacity
    pub fn reshape(&mut self, capacity: f64, refill_rate: f64, now: Instant) {
        self.refill(now);
        self.capacity = capacity.max(1.0);
        self.refill_rate = refill_rate;
        self.tokens = self.tokens.min(self.capacity);
    }

    /// Empties the bucket
    pub fn drain(&mut self, now: Instant) {
        self.refill(now);
        self.tokens = 0.0;
    }

    /// Tokens available at `now`
    pub fn available(&mut self, now: Instant) -> f64 {
        self.refill(now);
        self.tokens
    }

    pub fn capacity(&self) -> f64 {
        self.capacity
    }

    pub fn refill_rate(&self) -> f64 {
        self.refill_rate
    }
}
