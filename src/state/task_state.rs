/// Task state definitions for tracking run progress
///
/// This module defines every state a task can be in between plan submission
/// and its single terminal result.
use serde::{Deserialize, Serialize};
use std::fmt;

/// Represents the current state of a task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskState {
    // ===== Active States =====
    /// Task is queued and waiting for a worker
    Queued,

    /// An attempt is in progress
    Running,

    /// An attempt failed transiently; waiting out the backoff
    Retrying,

    // ===== Terminal States =====
    /// Payload fetched
    Success,

    /// Fetch failed permanently or retries ran out
    Failed,

    /// Another task already fetched the same resource; its payload is shared
    SkippedDuplicate,

    /// Crawl directives forbid the path
    Disallowed,

    /// The run was cancelled before the task started
    SkippedCancelled,
}

impl TaskState {
    /// Returns true if this is a terminal state
    pub fn is_terminal(&self) -> bool {
        !self.is_active()
    }

    /// Returns true if the task may still change state
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Queued | Self::Running | Self::Retrying)
    }

    /// Returns true if the task ended with a payload of its own
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success)
    }

    /// Returns true if the task ended without being fetched by itself
    pub fn is_skipped(&self) -> bool {
        matches!(self, Self::SkippedDuplicate | Self::SkippedCancelled)
    }

    /// Returns true if the task ended in an error recorded in the error log
    pub fn is_error(&self) -> bool {
        matches!(self, Self::Failed | Self::Disallowed)
    }

    /// Returns the snake_case name used in outputs
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Running => "running",
            Self::Retrying => "retrying",
            Self::Success => "success",
            Self::Failed => "failed",
            Self::SkippedDuplicate => "skipped_duplicate",
            Self::Disallowed => "disallowed",
            Self::SkippedCancelled => "skipped_cancelled",
        }
    }

    /// Parses a state from its snake_case name
    ///
    /// Returns None if the string doesn't match any known state.
    pub fn parse(s: &str) -> Option<Self> {
        Self::all_states().into_iter().find(|state| state.as_str() == s)
    }

    /// Returns all possible task states
    pub fn all_states() -> Vec<Self> {
        vec![
            Self::Queued,
            Self::Running,
            Self::Retrying,
            Self::Success,
            Self::Failed,
            Self::SkippedDuplicate,
            Self::Disallowed,
            Self::SkippedCancelled,
        ]
    }

    /// Returns the terminal states, in report order
    pub fn terminal_states() -> Vec<Self> {
        Self::all_states()
            .into_iter()
            .filter(|s| s.is_terminal())
            .collect()
    }
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
