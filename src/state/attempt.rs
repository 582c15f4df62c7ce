use crate::adapters::{AdapterKind, FetchError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// How a single attempt ended
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum AttemptOutcome {
    Success,
    Failed { error: FetchError },
}

/// Record of one fetch attempt for a task
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskAttempt {
    pub task_id: u64,
    /// 1-based attempt number
    pub attempt_number: u32,
    pub started_at: DateTime<Utc>,
    pub adapter: AdapterKind,
    #[serde(flatten)]
    pub outcome: AttemptOutcome,
}

impl TaskAttempt {
    /// Returns the error this attempt failed with, if it failed
    pub fn error(&self) -> Option<&FetchError> {
        match &self.outcome {
            AttemptOutcome::Success => None,
            AttemptOutcome::Failed { error } => Some(error),
        }
    }

    pub fn succeeded(&self) -> bool {
        matches!(self.outcome, AttemptOutcome::Success)
    }
}
