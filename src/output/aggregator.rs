//! Result aggregation
//!
//! Workers hand every terminal outcome to the [`ResultAggregator`]. Results
//! are keyed by task id and only sorted when the run finishes, so the output
//! order never depends on completion order. The error log keeps arrival order.

use crate::output::{ErrorRecord, FetchResult, ResultSet, RunReport, TaskOutcome, TaskReport};
use crate::state::TaskState;
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

/// Point-in-time view of run progress
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgressSnapshot {
    /// Tasks in the plan
    pub total: usize,
    /// Tasks with a terminal result
    pub completed: usize,
    /// Terminal results per status
    pub by_status: BTreeMap<TaskState, usize>,
    pub elapsed: Duration,
}

impl ProgressSnapshot {
    /// Tasks still queued or in flight
    pub fn remaining(&self) -> usize {
        self.total.saturating_sub(self.completed)
    }

    pub fn count(&self, status: TaskState) -> usize {
        self.by_status.get(&status).copied().unwrap_or(0)
    }
}

#[derive(Default)]
struct Collected {
    results: HashMap<u64, FetchResult>,
    reports: Vec<TaskReport>,
    errors: Vec<ErrorRecord>,
    by_status: BTreeMap<TaskState, usize>,
}

/// Collects terminal outcomes from all workers
pub struct ResultAggregator {
    total: usize,
    started: Instant,
    started_at: DateTime<Utc>,
    collected: Mutex<Collected>,
}

impl ResultAggregator {
    /// Creates an aggregator for a plan of `total` tasks
    pub fn new(total: usize) -> Self {
        Self {
            total,
            started: Instant::now(),
            started_at: Utc::now(),
            collected: Mutex::new(Collected::default()),
        }
    }

    /// Records a task's terminal outcome
    ///
    /// A second outcome for the same task id is ignored; each task has
    /// exactly one terminal result.
    ///
    /// # Returns
    ///
    /// * `true` - The outcome was recorded
    /// * `false` - The task already had a result
    pub fn record(&self, outcome: TaskOutcome) -> bool {
        let report = TaskReport::from_outcome(&outcome);
        let error = ErrorRecord::from_outcome(&outcome);
        let task_id = outcome.result.task_id;
        let status = outcome.result.status;

        let mut collected = self.lock();
        if collected.results.contains_key(&task_id) {
            tracing::warn!("Ignoring second result for task {}", task_id);
            return false;
        }

        collected.results.insert(task_id, outcome.result);
        collected.reports.push(report);
        if let Some(error) = error {
            collected.errors.push(error);
        }
        *collected.by_status.entry(status).or_insert(0) += 1;
        true
    }

    /// Returns true if a task already has a terminal result
    pub fn has_result(&self, task_id: u64) -> bool {
        self.lock().results.contains_key(&task_id)
    }

    /// Takes a progress snapshot
    ///
    /// Only counters are copied, so workers are held up for no longer than
    /// a map clone.
    pub fn snapshot(&self) -> ProgressSnapshot {
        let collected = self.lock();
        ProgressSnapshot {
            total: self.total,
            completed: collected.results.len(),
            by_status: collected.by_status.clone(),
            elapsed: self.started.elapsed(),
        }
    }

    /// Produces the ordered result set, leaving the aggregator empty
    pub fn finish(&self) -> ResultSet {
        let duration_ms = self.started.elapsed().as_millis() as u64;
        let collected = std::mem::take(&mut *self.lock());

        let mut results: Vec<FetchResult> = collected.results.into_values().collect();
        results.sort_by_key(|r| r.task_id);

        ResultSet {
            results,
            errors: collected.errors,
            report: RunReport::build(collected.reports, self.started_at, duration_ms),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Collected> {
        self.collected.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
