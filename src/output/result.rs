//! Per-task results and the final result set

use crate::adapters::{AdapterKind, FetchError, FetchErrorKind, Payload};
use crate::output::RunReport;
use crate::plan::Task;
use crate::state::{TaskAttempt, TaskState};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The single terminal result of one task
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchResult {
    pub task_id: u64,

    /// The URL as given in the plan
    pub url: String,

    pub status: TaskState,

    /// Inline text or media file references; present on success and on
    /// duplicates of a successful fetch
    pub payload: Option<Payload>,

    /// Hex SHA-256 of the payload content
    pub content_hash: Option<String>,

    pub fetched_at: Option<DateTime<Utc>>,

    pub adapter_used: Option<AdapterKind>,

    /// Final error for tasks that did not succeed
    pub error: Option<FetchError>,

    /// Number of attempts this task itself made (zero for duplicates)
    pub attempts: u32,

    /// The task whose fetch this result shares
    pub duplicate_of: Option<u64>,
}

impl FetchResult {
    /// A successful fetch
    pub fn success(task: &Task, payload: Payload, adapter: AdapterKind, attempts: u32) -> Self {
        let content_hash = payload.content_hash();
        Self {
            task_id: task.id,
            url: task.url.clone(),
            status: TaskState::Success,
            payload: Some(payload),
            content_hash: Some(content_hash),
            fetched_at: Some(Utc::now()),
            adapter_used: Some(adapter),
            error: None,
            attempts,
            duplicate_of: None,
        }
    }

    /// A task that ended without a payload
    ///
    /// The status follows the error: `Disallowed` for crawl-directive
    /// refusals, `SkippedCancelled` for cancellation before any attempt,
    /// `Failed` otherwise.
    pub fn failure(
        task: &Task,
        error: FetchError,
        adapter: Option<AdapterKind>,
        attempts: u32,
    ) -> Self {
        let status = match error.kind {
            FetchErrorKind::Disallowed => TaskState::Disallowed,
            FetchErrorKind::Cancelled if attempts == 0 => TaskState::SkippedCancelled,
            _ => TaskState::Failed,
        };

        Self {
            task_id: task.id,
            url: task.url.clone(),
            status,
            payload: None,
            content_hash: None,
            fetched_at: None,
            adapter_used: adapter,
            error: Some(error),
            attempts,
            duplicate_of: None,
        }
    }

    /// A task that never started because the run was cancelled
    pub fn cancelled(task: &Task) -> Self {
        Self::failure(
            task,
            FetchError::new(FetchErrorKind::Cancelled, "run cancelled before the task started"),
            None,
            0,
        )
    }

    /// A task that reuses the terminal result of an equivalent task
    ///
    /// The payload, hash, fetch time, adapter and error are copied from the
    /// winner. The status is `SkippedDuplicate` when the winner succeeded and
    /// the winner's own status otherwise.
    pub fn duplicate(task: &Task, winner: &FetchResult) -> Self {
        let status = if winner.status.is_success() {
            TaskState::SkippedDuplicate
        } else {
            winner.status
        };

        Self {
            task_id: task.id,
            url: task.url.clone(),
            status,
            payload: winner.payload.clone(),
            content_hash: winner.content_hash.clone(),
            fetched_at: winner.fetched_at,
            adapter_used: winner.adapter_used,
            error: winner.error.clone(),
            attempts: 0,
            duplicate_of: Some(winner.duplicate_of.unwrap_or(winner.task_id)),
        }
    }

    /// Returns true if this task has data (its own or shared)
    pub fn has_payload(&self) -> bool {
        self.payload.is_some()
    }

    /// The URL the content was finally served from, when known
    pub fn final_url(&self) -> Option<&str> {
        self.payload.as_ref().and_then(Payload::final_url)
    }
}

/// Everything the orchestrator learned while executing one task
#[derive(Debug, Clone)]
pub struct TaskOutcome {
    pub result: FetchResult,

    /// Attempt history, in order
    pub attempts: Vec<TaskAttempt>,

    /// Whether the rendered adapter was tried after static attempts failed
    pub escalated: bool,
}

impl TaskOutcome {
    /// An outcome for a task that made no attempts of its own
    pub fn without_attempts(result: FetchResult) -> Self {
        Self {
            result,
            attempts: Vec::new(),
            escalated: false,
        }
    }
}

/// One permanently failed task in the error log
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorRecord {
    pub task_id: u64,
    pub url: String,
    pub kind: FetchErrorKind,
    pub message: String,
    pub attempts: Vec<TaskAttempt>,
}

impl ErrorRecord {
    /// Builds an error record from an outcome, if it is a failure
    pub fn from_outcome(outcome: &TaskOutcome) -> Option<Self> {
        if !outcome.result.status.is_error() {
            return None;
        }
        let error = outcome.result.error.as_ref()?;

        Some(Self {
            task_id: outcome.result.task_id,
            url: outcome.result.url.clone(),
            kind: error.kind,
            message: error.message.clone(),
            attempts: outcome.attempts.clone(),
        })
    }
}

/// The consolidated output of a run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResultSet {
    /// One result per task, ordered by task id
    pub results: Vec<FetchResult>,

    /// Failed and disallowed tasks, in the order they finished
    pub errors: Vec<ErrorRecord>,

    pub report: RunReport,
}

impl ResultSet {
    /// Looks up the result for a task
    pub fn get(&self, task_id: u64) -> Option<&FetchResult> {
        self.results
            .binary_search_by_key(&task_id, |r| r.task_id)
            .ok()
            .map(|i| &self.results[i])
    }

    /// Results that carry a payload
    pub fn successes(&self) -> impl Iterator<Item = &FetchResult> {
        self.results.iter().filter(|r| r.has_payload())
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }
}
