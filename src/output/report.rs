//! Run report: per-task classification and totals

use crate::adapters::{AdapterKind, FetchErrorKind};
use crate::output::TaskOutcome;
use crate::state::TaskState;
use crate::url::{domain_key, normalize_url};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// How a task ended, from the consumer's point of view
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "class", rename_all = "snake_case")]
pub enum TaskClass {
    /// Fetched on the first attempt
    Succeeded,
    /// Fetched after one or more retries or an adapter escalation
    Recovered,
    /// Shares the payload of an equivalent task
    Deduplicated,
    /// Ended without data
    Failed { kind: FetchErrorKind },
    /// Refused by crawl directives
    Disallowed,
    /// Never started because the run was cancelled
    Cancelled,
}

impl TaskClass {
    /// Classifies a task outcome
    pub fn of(outcome: &TaskOutcome) -> Self {
        let result = &outcome.result;
        match result.status {
            TaskState::Success if result.attempts <= 1 && !outcome.escalated => Self::Succeeded,
            TaskState::Success => Self::Recovered,
            TaskState::SkippedDuplicate => Self::Deduplicated,
            TaskState::Disallowed => Self::Disallowed,
            TaskState::SkippedCancelled => Self::Cancelled,
            _ => Self::Failed {
                kind: result
                    .error
                    .as_ref()
                    .map(|e| e.kind)
                    .unwrap_or(FetchErrorKind::Network),
            },
        }
    }

    /// Returns true if the task has data
    pub fn has_data(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Recovered | Self::Deduplicated)
    }
}

/// One line of the run report
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskReport {
    pub task_id: u64,
    pub domain: String,
    pub class: TaskClass,
    pub attempts: u32,
    pub adapter: Option<AdapterKind>,
    pub escalated: bool,
}

impl TaskReport {
    pub fn from_outcome(outcome: &TaskOutcome) -> Self {
        let domain = normalize_url(&outcome.result.url)
            .ok()
            .and_then(|url| domain_key(&url))
            .unwrap_or_default();

        Self {
            task_id: outcome.result.task_id,
            domain,
            class: TaskClass::of(outcome),
            attempts: outcome.result.attempts,
            adapter: outcome.result.adapter_used,
            escalated: outcome.escalated,
        }
    }
}

/// Per-domain task counts
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DomainSummary {
    pub tasks: usize,
    pub with_data: usize,
    pub failed: usize,
    /// Total attempts the domain's tasks made
    pub attempts: u64,
}

/// Summary of a finished run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub duration_ms: u64,

    /// SHA-256 of the configuration file the run used, when known
    pub config_hash: Option<String>,

    pub total_tasks: usize,
    pub succeeded: usize,
    pub recovered: usize,
    pub deduplicated: usize,
    pub failed: usize,
    pub disallowed: usize,
    pub cancelled: usize,

    /// Whether the run was cancelled before the plan finished
    pub interrupted: bool,

    pub status_counts: BTreeMap<TaskState, usize>,

    /// Failure counts keyed by error label (e.g. `http_404`)
    pub failure_kinds: BTreeMap<String, usize>,

    pub domains: BTreeMap<String, DomainSummary>,

    /// One entry per task, ordered by task id
    pub tasks: Vec<TaskReport>,
}

impl RunReport {
    /// Builds the report from per-task lines
    ///
    /// # Arguments
    ///
    /// * `tasks` - Task report lines, in any order
    /// * `started_at` - When the run started
    /// * `duration_ms` - Wall-clock duration of the run
    pub fn build(mut tasks: Vec<TaskReport>, started_at: DateTime<Utc>, duration_ms: u64) -> Self {
        tasks.sort_by_key(|t| t.task_id);

        let mut report = Self {
            started_at,
            finished_at: Utc::now(),
            duration_ms,
            config_hash: None,
            total_tasks: tasks.len(),
            succeeded: 0,
            recovered: 0,
            deduplicated: 0,
            failed: 0,
            disallowed: 0,
            cancelled: 0,
            interrupted: false,
            status_counts: BTreeMap::new(),
            failure_kinds: BTreeMap::new(),
            domains: BTreeMap::new(),
            tasks: Vec::new(),
        };

        for task in &tasks {
            let domain = report.domains.entry(task.domain.clone()).or_default();
            domain.tasks += 1;
            domain.attempts += u64::from(task.attempts);
            if task.class.has_data() {
                domain.with_data += 1;
            }

            match task.class {
                TaskClass::Succeeded => report.succeeded += 1,
                TaskClass::Recovered => report.recovered += 1,
                TaskClass::Deduplicated => report.deduplicated += 1,
                TaskClass::Failed { kind } => {
                    report.failed += 1;
                    domain.failed += 1;
                    *report.failure_kinds.entry(kind.label()).or_insert(0) += 1;
                }
                TaskClass::Disallowed => {
                    report.disallowed += 1;
                    domain.failed += 1;
                }
                TaskClass::Cancelled => report.cancelled += 1,
            }

            let status = match task.class {
                TaskClass::Succeeded | TaskClass::Recovered => TaskState::Success,
                TaskClass::Deduplicated => TaskState::SkippedDuplicate,
                TaskClass::Failed { .. } => TaskState::Failed,
                TaskClass::Disallowed => TaskState::Disallowed,
                TaskClass::Cancelled => TaskState::SkippedCancelled,
            };
            *report.status_counts.entry(status).or_insert(0) += 1;
        }

        report.interrupted = report.cancelled > 0;
        report.tasks = tasks;
        report
    }

    /// Sets the configuration hash shown in the report
    pub fn with_config_hash(mut self, hash: impl Into<String>) -> Self {
        self.config_hash = Some(hash.into());
        self
    }

    /// Number of tasks that ended with data
    pub fn with_data(&self) -> usize {
        self.succeeded + self.recovered + self.deduplicated
    }

    /// Percentage of tasks that ended with data
    pub fn success_rate(&self) -> f64 {
        if self.total_tasks == 0 {
            0.0
        } else {
            (self.with_data() as f64 / self.total_tasks as f64) * 100.0
        }
    }
}
