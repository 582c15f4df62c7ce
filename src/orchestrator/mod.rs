//! Plan orchestration
//!
//! This module contains the worker pool that executes a scrape plan:
//! - Validating the plan and preparing each task's dedup key and rate-limit
//!   domain
//! - Feeding a priority queue to a fixed number of tokio workers
//! - Collapsing equivalent tasks onto one fetch through the deduplicator
//! - Running each dispatch through the retry manager, which consults the
//!   strategy selector and the rate limiter per attempt
//! - Putting tasks that must wait for a token or a backoff back into the
//!   queue, so one busy domain never holds every worker
//! - Publishing progress events and aggregating terminal results
//! - Cooperative cancellation

mod dedup;
mod progress;
mod queue;
mod retry;
mod selector;

pub use dedup::{Claim, ClaimGuard, Deduplicator, Waiter};
pub use progress::{ProgressEvent, ProgressSender};
pub use queue::{Next, PreparedTask, QueuedTask, TaskQueue};
pub use retry::{RetryManager, RetryPolicy, Step};
pub use selector::StrategySelector;

use crate::adapters::{build_http_client, AdapterSet, Payload};
use crate::config::Config;
use crate::limiter::DomainRateLimiter;
use crate::output::{FetchResult, ProgressSnapshot, ResultAggregator, ResultSet, TaskOutcome};
use crate::plan::{validate_plan, ScrapePlan};
use crate::robots::HttpDirectiveSource;
use crate::storage::open_directive_store;
use crate::url::{domain_key, DedupKey};
use crate::UrlError;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::{broadcast, watch};
use tokio::task::JoinSet;
use tokio::time::Instant;
use url::Url;

/// Cooperative cancellation signal for a run
///
/// Cloning yields handles to the same signal.
#[derive(Debug, Clone)]
pub struct CancelHandle {
    tx: Arc<watch::Sender<bool>>,
}

impl CancelHandle {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    /// Requests cancellation
    ///
    /// Workers stop taking tasks, in-flight attempts finish or time out, and
    /// queued tasks end as skipped.
    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }

    /// Clears a cancellation request
    pub fn reset(&self) {
        self.tx.send_replace(false);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.tx.borrow()
    }

    /// Resolves once cancellation has been requested
    pub async fn cancelled(&self) {
        let mut rx = self.tx.subscribe();
        let _ = rx.wait_for(|cancelled| *cancelled).await;
    }
}

impl Default for CancelHandle {
    fn default() -> Self {
        Self::new()
    }
}

/// Executes scrape plans
pub struct Orchestrator {
    config: Config,
    adapters: AdapterSet,
    limiter: Arc<DomainRateLimiter>,
    progress: ProgressSender,
    cancel: CancelHandle,
    current: Mutex<Option<Arc<ResultAggregator>>>,
}

impl Orchestrator {
    /// Creates an orchestrator from explicit collaborators
    ///
    /// # Arguments
    ///
    /// * `config` - Worker, retry and selection settings
    /// * `adapters` - The fetch strategies
    /// * `limiter` - The per-domain rate limiter shared by all workers
    pub fn new(config: Config, adapters: AdapterSet, limiter: Arc<DomainRateLimiter>) -> Self {
        let progress = ProgressSender::new(config.orchestrator.progress_buffer);
        Self {
            config,
            adapters,
            limiter,
            progress,
            cancel: CancelHandle::new(),
            current: Mutex::new(None),
        }
    }

    /// Builds the production orchestrator: HTTP adapters, crawl directives
    /// fetched over HTTP, and the directive store when one is configured
    pub fn from_config(config: Config) -> crate::Result<Self> {
        let client = build_http_client(&config.user_agent)?;

        let mut limiter = DomainRateLimiter::new(
            config.rate_limit.clone(),
            config.user_agent.crawler_name.clone(),
            Arc::new(HttpDirectiveSource::new(client)),
        );
        if let Some(path) = &config.output.directive_cache_path {
            tracing::info!("Using directive cache at {}", path.display());
            let store = open_directive_store(path)?;
            limiter = limiter.with_store(Arc::new(Mutex::new(store)));
        }

        let limiter = Arc::new(limiter);
        let adapters = AdapterSet::from_config(&config, Arc::clone(&limiter))?;
        Ok(Self::new(config, adapters, limiter))
    }

    /// Subscribes to progress events
    ///
    /// Subscribe before calling [`run`](Self::run) to see the `Queued` events.
    pub fn subscribe(&self) -> broadcast::Receiver<ProgressEvent> {
        self.progress.subscribe()
    }

    /// Handle for cancelling the current run
    ///
    /// The handle stays valid across runs. A cancellation requested while no
    /// run is active applies to the next run; every run clears the request
    /// when it ends.
    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }

    pub fn limiter(&self) -> &Arc<DomainRateLimiter> {
        &self.limiter
    }

    /// Progress of the run in progress, if any
    pub fn snapshot(&self) -> Option<ProgressSnapshot> {
        self.current
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map(|aggregator| aggregator.snapshot())
    }

    /// Executes a plan to completion (or cancellation)
    ///
    /// # Returns
    ///
    /// * `Ok(ResultSet)` - One result per task, ordered by task id
    /// * `Err(GatherError)` - The plan was rejected; nothing was fetched
    pub async fn run(&self, plan: &ScrapePlan) -> crate::Result<ResultSet> {
        validate_plan(plan)?;
        let prepared = prepare_tasks(plan)?;
        let task_ids: Vec<u64> = prepared.iter().map(|p| p.task.id).collect();

        let aggregator = Arc::new(ResultAggregator::new(prepared.len()));
        *self.current.lock().unwrap_or_else(PoisonError::into_inner) =
            Some(Arc::clone(&aggregator));

        for id in &task_ids {
            self.progress.queued(*id);
        }

        let worker_count = (self.config.orchestrator.workers.max(1) as usize).min(prepared.len());
        tracing::info!(
            "Running plan of {} tasks with {} workers",
            prepared.len(),
            worker_count
        );

        let shared = Arc::new(WorkerShared {
            queue: TaskQueue::new(prepared.into_iter().map(QueuedTask::new).collect()),
            dedup: Deduplicator::new(),
            retry: RetryManager::new(
                self.adapters.clone(),
                Arc::clone(&self.limiter),
                StrategySelector::from_config(&self.config.adapters),
                RetryPolicy::from_config(&self.config.retry),
                self.progress.clone(),
            ),
            aggregator: Arc::clone(&aggregator),
            progress: self.progress.clone(),
            cancel: self.cancel.clone(),
            parked: Mutex::new(JoinSet::new()),
        });

        let mut workers = JoinSet::new();
        for worker_id in 0..worker_count {
            workers.spawn(Arc::clone(&shared).work(worker_id));
        }
        while let Some(joined) = workers.join_next().await {
            if let Err(e) = joined {
                tracing::error!("Worker stopped abnormally: {}", e);
                // The task it held is marked cancelled below
                shared.queue.task_done();
            }
        }

        // Whatever is still queued did not finish
        let stopped = shared.queue.drain();
        if !stopped.is_empty() {
            tracing::info!("Run cancelled; stopping {} queued tasks", stopped.len());
        }
        for mut queued in stopped {
            let outcome = shared.retry.interrupted(&mut queued);
            if let Some(guard) = queued.claim.take() {
                guard.complete(outcome.result.clone());
            }
            shared.finish_task(outcome);
        }

        // Duplicates parked on a stopped fetch now have its result
        let mut parked = std::mem::take(
            &mut *shared.parked.lock().unwrap_or_else(PoisonError::into_inner),
        );
        while let Some(joined) = parked.join_next().await {
            if let Err(e) = joined {
                tracing::error!("Parked duplicate stopped abnormally: {}", e);
            }
        }
        drop(shared.queue.drain());

        for id in task_ids.iter().filter(|id| !aggregator.has_result(**id)) {
            if let Some(task) = plan.tasks.iter().find(|t| t.id == *id) {
                shared.finish_task(TaskOutcome::without_attempts(FetchResult::cancelled(task)));
            }
        }

        self.cancel.reset();
        *self.current.lock().unwrap_or_else(PoisonError::into_inner) = None;
        let results = aggregator.finish();
        tracing::info!(
            "Run finished: {} with data, {} failed, {} disallowed, {} cancelled",
            results.report.with_data(),
            results.report.failed,
            results.report.disallowed,
            results.report.cancelled
        );
        Ok(results)
    }
}

/// Parses each task's URL and derives its dedup key and domain
///
/// The URL is kept as planned for fetching and crawl-directive checks; only
/// the dedup key uses the normalized form.
fn prepare_tasks(plan: &ScrapePlan) -> crate::Result<Vec<PreparedTask>> {
    plan.tasks
        .iter()
        .map(|task| -> crate::Result<PreparedTask> {
            let url = Url::parse(task.url.trim()).map_err(|e| UrlError::Parse(e.to_string()))?;
            let domain = domain_key(&url).ok_or(UrlError::MissingDomain)?;
            Ok(PreparedTask {
                key: DedupKey::new(&task.url, task.kind)?,
                task: task.clone(),
                url,
                domain,
            })
        })
        .collect()
}

/// State shared by the workers of one run
struct WorkerShared {
    queue: TaskQueue,
    dedup: Deduplicator,
    retry: RetryManager,
    aggregator: Arc<ResultAggregator>,
    progress: ProgressSender,
    cancel: CancelHandle,
    /// Duplicates waiting on another task's fetch
    parked: Mutex<JoinSet<()>>,
}

impl WorkerShared {
    async fn work(self: Arc<Self>, worker_id: usize) {
        tracing::debug!("Worker {} started", worker_id);
        loop {
            if self.cancel.is_cancelled() {
                tracing::debug!("Worker {} stopping: run cancelled", worker_id);
                break;
            }

            let changed = self.queue.changed();
            match self.queue.next(Instant::now()) {
                Next::Task(queued) => {
                    tracing::debug!(
                        "Worker {} took task {} ({})",
                        worker_id,
                        queued.task().id,
                        queued.prepared.url
                    );
                    Arc::clone(&self).dispatch(queued).await;
                }
                Next::WaitUntil(at) => {
                    tokio::select! {
                        _ = tokio::time::sleep_until(at) => {}
                        _ = changed => {}
                        _ = self.cancel.cancelled() => {}
                    }
                }
                Next::Idle => {
                    tokio::select! {
                        _ = changed => {}
                        _ = self.cancel.cancelled() => {}
                    }
                }
                Next::Finished => break,
            }
        }
        tracing::debug!("Worker {} finished", worker_id);
    }

    /// Claims the task's dedup key if needed, then runs one dispatch step
    async fn dispatch(self: Arc<Self>, mut queued: QueuedTask) {
        if queued.claim.is_none() {
            match self.dedup.claim(&queued.prepared.key) {
                Claim::Cached(winner) => {
                    let outcome = self.duplicate(&queued, &winner);
                    self.finish_task(outcome);
                    return;
                }
                Claim::Wait(waiter) => {
                    self.park(queued, waiter);
                    return;
                }
                Claim::Proceed(guard) => queued.claim = Some(guard),
            }
        }

        match self.retry.execute(&mut queued, &self.cancel).await {
            Step::Defer(until) => self.queue.defer(queued, until),
            Step::Done(outcome) => {
                if let Some(guard) = queued.claim.take() {
                    let redirected = match &outcome.result.payload {
                        Some(Payload::Text { final_url, .. }) => {
                            DedupKey::new(final_url, queued.task().kind).ok()
                        }
                        _ => None,
                    };
                    if let Some(target) = redirected {
                        self.dedup.record_redirect(guard.key(), &target);
                    }
                    guard.complete(outcome.result.clone());
                }
                self.finish_task(outcome);
            }
        }
    }

    /// Waits for an equivalent task's fetch off the worker pool
    ///
    /// If the fetching task gives up its claim, the task goes back into the
    /// queue to claim the key itself.
    fn park(self: Arc<Self>, queued: QueuedTask, waiter: Waiter) {
        tracing::debug!(
            "Task {} waits for the fetch of {}",
            queued.task().id,
            queued.prepared.key
        );
        let shared = Arc::clone(&self);
        self.parked
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .spawn(async move {
                match waiter.wait().await {
                    Some(winner) => {
                        let outcome = shared.duplicate(&queued, &winner);
                        shared.finish_task(outcome);
                    }
                    None => shared.queue.push(queued),
                }
            });
    }

    fn duplicate(&self, queued: &QueuedTask, winner: &FetchResult) -> TaskOutcome {
        tracing::debug!(
            "Task {} shares the fetch of task {} ({})",
            queued.task().id,
            winner.task_id,
            queued.prepared.key
        );
        TaskOutcome::without_attempts(FetchResult::duplicate(queued.task(), winner))
    }

    fn finish_task(&self, outcome: TaskOutcome) {
        let task_id = outcome.result.task_id;
        let status = outcome.result.status;
        if self.aggregator.record(outcome) {
            self.progress.terminal(task_id, status);
            self.queue.task_done();
        }
    }
}
