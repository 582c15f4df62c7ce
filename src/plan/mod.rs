//! Scrape plan input
//!
//! A plan is an ordered list of fetch tasks produced by an external planner.
//! The orchestrator treats it as opaque data: it checks structural
//! well-formedness and rejects malformed plans wholesale before anything is
//! scheduled.
//!
//! # Example
//!
//! ```
//! use sumi_gather::plan::parse_plan;
//!
//! let plan = parse_plan(r#"{"tasks": [{"id": 1, "url": "https://example.com/", "kind": "text"}]}"#).unwrap();
//! assert_eq!(plan.tasks.len(), 1);
//! assert_eq!(plan.tasks[0].max_retries, 3);
//! ```

mod task;
mod validation;

pub use task::{DataKind, Task, DEFAULT_MAX_RETRIES, DEFAULT_TIMEOUT_MS};
pub use validation::validate_plan;

use crate::PlanValidationError;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// An ordered, immutable set of fetch tasks
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScrapePlan {
    pub tasks: Vec<Task>,
}

impl ScrapePlan {
    /// Creates a plan from a list of tasks
    pub fn new(tasks: Vec<Task>) -> Self {
        Self { tasks }
    }

    /// Returns the number of tasks in the plan
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    /// Returns whether the plan has no tasks
    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }
}

/// Parses a plan from JSON text and validates it
///
/// Both malformed JSON and structurally invalid tasks are reported as a
/// [`PlanValidationError`], so callers have a single rejection path.
pub fn parse_plan(json: &str) -> Result<ScrapePlan, PlanValidationError> {
    let plan: ScrapePlan = serde_json::from_str(json).map_err(|e| PlanValidationError {
        problems: vec![format!("invalid plan document: {}", e)],
    })?;

    validate_plan(&plan)?;
    Ok(plan)
}

/// Loads a plan from a JSON file and validates it
pub fn load_plan(path: &Path) -> crate::Result<ScrapePlan> {
    let content = std::fs::read_to_string(path)?;
    Ok(parse_plan(&content)?)
}
