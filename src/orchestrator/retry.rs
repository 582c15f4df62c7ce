//! Retry and backoff
//!
//! [`RetryManager::execute`] runs one dispatch of a task: it selects an
//! adapter, takes a rate-limit token and fetches within the task timeout.
//! When the domain has no token ready, or a transient failure calls for a
//! backoff, the task is handed back with the instant it may run again so the
//! worker can move on to other tasks. Permanent failures, spent retry budgets
//! and successes end the task.

use crate::adapters::{AdapterKind, AdapterSet, FetchError, FetchErrorKind, FetchRequest, Payload};
use crate::config::RetryConfig;
use crate::limiter::{AcquireError, DomainRateLimiter};
use crate::orchestrator::queue::QueuedTask;
use crate::orchestrator::{CancelHandle, PreparedTask, ProgressSender, StrategySelector};
use crate::output::{FetchResult, TaskOutcome};
use crate::state::{AttemptOutcome, TaskAttempt};
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

/// Exponential backoff with jitter
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    pub base_delay: Duration,
    pub max_delay: Duration,
    /// Fraction of the delay applied as random spread in both directions
    pub jitter: f64,
}

impl RetryPolicy {
    pub fn new(base_delay: Duration, max_delay: Duration, jitter: f64) -> Self {
        Self {
            base_delay,
            max_delay: max_delay.max(base_delay),
            jitter: jitter.clamp(0.0, 1.0),
        }
    }

    pub fn from_config(config: &RetryConfig) -> Self {
        Self::new(
            Duration::from_millis(config.base_delay_ms),
            Duration::from_millis(config.max_delay_ms),
            config.jitter,
        )
    }

    /// Backoff before retry `retry` (1-based)
    ///
    /// `min(base × 2^(retry-1), max)`, then spread by up to ±jitter of itself.
    pub fn delay_for(&self, retry: u32) -> Duration {
        let exponent = retry.saturating_sub(1).min(31);
        let delay = self
            .base_delay
            .saturating_mul(1u32 << exponent)
            .min(self.max_delay);

        if self.jitter <= 0.0 {
            return delay;
        }

        let spread = rand::random_range(-self.jitter..=self.jitter);
        delay.mul_f64((1.0 + spread).max(0.0))
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&RetryConfig::default())
    }
}

/// What became of one dispatch
pub enum Step {
    /// The task reached its terminal result
    Done(TaskOutcome),
    /// The task goes back to the queue until this instant
    Defer(Instant),
}

enum Admission {
    Granted,
    Later(Instant),
    Refused(FetchError),
}

/// Runs tasks with retry, backoff and adapter escalation
pub struct RetryManager {
    adapters: AdapterSet,
    limiter: Arc<DomainRateLimiter>,
    selector: StrategySelector,
    policy: RetryPolicy,
    progress: ProgressSender,
}

impl RetryManager {
    pub fn new(
        adapters: AdapterSet,
        limiter: Arc<DomainRateLimiter>,
        selector: StrategySelector,
        policy: RetryPolicy,
        progress: ProgressSender,
    ) -> Self {
        Self {
            adapters,
            limiter,
            selector,
            policy,
            progress,
        }
    }

    /// Dispatches a task once
    ///
    /// # Flow
    ///
    /// 1. Select the adapter from the task and its attempt history
    /// 2. Ask for a rate-limit token, waiting at most the dispatch wait;
    ///    without one the task is deferred to when the next token is due,
    ///    until its total token wait would pass `max-acquire-wait-ms`
    /// 3. Fetch within the task timeout and record the attempt
    /// 4. On a transient failure with attempts left, defer the task by the
    ///    backoff delay; an HTTP 429 also penalizes the domain first
    ///
    /// At most `max_retries + 1` attempts are made. A task whose retries run
    /// out while the server keeps answering 429 fails with
    /// `RateLimitExceeded`.
    pub async fn execute(&self, queued: &mut QueuedTask, cancel: &CancelHandle) -> Step {
        let prepared = Arc::clone(&queued.prepared);
        let task = &prepared.task;

        if cancel.is_cancelled() {
            tracing::debug!(
                "Task {} stops after {} attempts: run cancelled",
                task.id,
                queued.attempts.len()
            );
            return Step::Done(self.interrupted(queued));
        }

        let attempt_number = queued.attempts.len() as u32 + 1;
        let adapter = self.selector.select(task, &queued.attempts);
        let started_at = Utc::now();

        let result = match self.admit(queued).await {
            Admission::Later(at) => return Step::Defer(at),
            Admission::Refused(error) => {
                self.progress.running(task.id, attempt_number, adapter);
                Err(error)
            }
            Admission::Granted => {
                if self.selector.should_escalate(task, &queued.attempts) {
                    tracing::info!("Task {} escalating to the rendered adapter", task.id);
                    queued.escalated = true;
                }
                self.progress.running(task.id, attempt_number, adapter);
                self.fetch(&prepared, adapter).await
            }
        };

        let error = match result {
            Ok(payload) => {
                queued.attempts.push(TaskAttempt {
                    task_id: task.id,
                    attempt_number,
                    started_at,
                    adapter,
                    outcome: AttemptOutcome::Success,
                });
                tracing::debug!(
                    "Task {} fetched {} bytes with {} on attempt {}",
                    task.id,
                    payload.size(),
                    adapter,
                    attempt_number
                );
                return Step::Done(TaskOutcome {
                    result: FetchResult::success(task, payload, adapter, attempt_number),
                    attempts: std::mem::take(&mut queued.attempts),
                    escalated: queued.escalated,
                });
            }
            Err(error) => error,
        };

        tracing::debug!("Task {} attempt {} failed: {}", task.id, attempt_number, error);
        queued.attempts.push(TaskAttempt {
            task_id: task.id,
            attempt_number,
            started_at,
            adapter,
            outcome: AttemptOutcome::Failed {
                error: error.clone(),
            },
        });

        if error.kind.is_too_many_requests() {
            self.limiter.penalize(&prepared.domain).await;
        }

        if !error.is_transient() || attempt_number >= task.max_attempts() {
            return Step::Done(self.fail(queued, error));
        }

        let delay = self.policy.delay_for(attempt_number);
        self.progress.retrying(task.id, attempt_number, delay, &error);
        Step::Defer(Instant::now() + delay)
    }

    /// Ends a task the run stopped before it finished
    ///
    /// A task that never made an attempt is skipped as cancelled; one that
    /// did keeps its last failure.
    pub fn interrupted(&self, queued: &mut QueuedTask) -> TaskOutcome {
        let prepared = Arc::clone(&queued.prepared);
        let task = &prepared.task;
        let attempts = std::mem::take(&mut queued.attempts);
        let error = attempts
            .last()
            .and_then(|a| a.error().cloned())
            .unwrap_or_else(|| FetchError::new(FetchErrorKind::Cancelled, "run cancelled"));
        let adapter = attempts.last().map(|a| a.adapter);

        TaskOutcome {
            result: FetchResult::failure(task, error, adapter, attempts.len() as u32),
            attempts,
            escalated: queued.escalated,
        }
    }

    /// Takes a token for the task's domain without holding the worker
    /// longer than the dispatch wait
    async fn admit(&self, queued: &mut QueuedTask) -> Admission {
        let config = self.limiter.config();
        let asked = Instant::now();

        match self
            .limiter
            .acquire_within(&queued.prepared.url, config.dispatch_wait())
            .await
        {
            Ok(permit) => {
                queued.token_wait_since = None;
                tracing::trace!(
                    "Task {} got a {} token after {:?}",
                    queued.task().id,
                    permit.domain,
                    permit.waited
                );
                Admission::Granted
            }
            Err(AcquireError::WaitExceeded {
                domain,
                retry_after,
                ..
            }) => {
                let since = *queued.token_wait_since.get_or_insert(asked);
                let now = Instant::now();
                let waited = now.saturating_duration_since(since);
                if waited + retry_after <= config.max_acquire_wait() {
                    tracing::trace!(
                        "Task {} deferred {:?} for a {} token",
                        queued.task().id,
                        retry_after,
                        domain
                    );
                    return Admission::Later(now + retry_after);
                }

                queued.token_wait_since = None;
                Admission::Refused(acquire_error(AcquireError::WaitExceeded {
                    domain,
                    waited,
                    retry_after,
                }))
            }
            Err(error) => Admission::Refused(acquire_error(error)),
        }
    }

    /// One fetch bounded by the task timeout
    async fn fetch(
        &self,
        prepared: &PreparedTask,
        adapter: AdapterKind,
    ) -> Result<Payload, FetchError> {
        let timeout = prepared.task.timeout();
        let request = FetchRequest {
            url: prepared.url.clone(),
            kind: prepared.task.kind,
            timeout,
            selectors: prepared.task.selectors.clone(),
        };

        match tokio::time::timeout(timeout, self.adapters.get(adapter).fetch(&request)).await {
            Ok(result) => result,
            Err(_) => Err(FetchError::new(
                FetchErrorKind::Timeout,
                format!("no response within {:?}", timeout),
            )),
        }
    }

    fn fail(&self, queued: &mut QueuedTask, error: FetchError) -> TaskOutcome {
        let prepared = Arc::clone(&queued.prepared);
        let task = &prepared.task;
        let attempts = std::mem::take(&mut queued.attempts);
        let exhausted = attempts.len() as u32 >= task.max_attempts();
        let error = if exhausted && error.kind.is_too_many_requests() {
            FetchError::new(
                FetchErrorKind::RateLimitExceeded,
                format!("still rate limited after {} attempts: {}", attempts.len(), error.message),
            )
        } else {
            error
        };

        let adapter = attempts.last().map(|a| a.adapter);
        TaskOutcome {
            result: FetchResult::failure(task, error, adapter, attempts.len() as u32),
            attempts,
            escalated: queued.escalated,
        }
    }
}

fn acquire_error(error: AcquireError) -> FetchError {
    let kind = match &error {
        AcquireError::Disallowed { .. } => FetchErrorKind::Disallowed,
        AcquireError::WaitExceeded { .. } => FetchErrorKind::RateLimitWait,
        AcquireError::NoDomain(_) => FetchErrorKind::Navigation,
    };
    FetchError::new(kind, error.to_string())
}
