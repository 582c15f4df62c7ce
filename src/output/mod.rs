//! Output module for run results and reports
//!
//! This module handles:
//! - The per-task [`FetchResult`] record and the ordered [`ResultSet`]
//! - Aggregating outcomes as workers finish, with cheap progress snapshots
//! - Classifying tasks for the run report
//! - Writing the result set as JSON and the report as markdown

mod aggregator;
mod json;
mod markdown;
mod report;
mod result;

pub use aggregator::{ProgressSnapshot, ResultAggregator};
pub use json::{read_results_json, write_results_json};
pub use markdown::{format_markdown_report, write_markdown_report};
pub use report::{DomainSummary, RunReport, TaskClass, TaskReport};
pub use result::{ErrorRecord, FetchResult, ResultSet, TaskOutcome};

pub use crate::state::TaskState;

use thiserror::Error;

/// Errors that can occur during output operations
#[derive(Debug, Error)]
pub enum OutputError {
    #[error("Failed to write output to {path}: {source}")]
    Write {
        path: String,
        source: std::io::Error,
    },

    #[error("Failed to serialize results: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for output operations
pub type OutputResult<T> = Result<T, OutputError>;
