//! State module for tracking run progress
//!
//! # Components
//!
//! - `TaskState`: Lifecycle of an individual task (queued, running, terminal outcomes)
//! - `TaskAttempt`: Record of one fetch attempt, kept for the error log
//! - `DomainState`: Per-domain token bucket, crawl directives and 429 penalty

mod attempt;
mod domain_state;
mod task_state;

// Re-export main types
pub use attempt::{AttemptOutcome, TaskAttempt};
pub use domain_state::{DomainShape, DomainState, Penalty};
pub use task_state::TaskState;
