use crate::adapters::AdapterKind;
use crate::plan::{DataKind, ScrapePlan, Task};
use crate::url::normalize_url;
use crate::PlanValidationError;
use scraper::Selector;
use std::collections::HashSet;

/// Validates the structural well-formedness of a plan
///
/// Collects every problem rather than stopping at the first, then rejects the
/// plan as a whole. Retry and timeout non-negativity is guaranteed by the
/// unsigned field types; a zero timeout is still rejected.
pub fn validate_plan(plan: &ScrapePlan) -> Result<(), PlanValidationError> {
    let mut problems = Vec::new();

    if plan.tasks.is_empty() {
        problems.push("plan contains no tasks".to_string());
    }

    let mut seen_ids = HashSet::new();
    for task in &plan.tasks {
        if !seen_ids.insert(task.id) {
            problems.push(format!("task {}: duplicate task id", task.id));
        }
        validate_task(task, &mut problems);
    }

    if problems.is_empty() {
        Ok(())
    } else {
        Err(PlanValidationError { problems })
    }
}

/// Validates a single task, appending any problems found
fn validate_task(task: &Task, problems: &mut Vec<String>) {
    if task.url.trim().is_empty() {
        problems.push(format!("task {}: empty URL", task.id));
    } else if let Err(e) = normalize_url(&task.url) {
        problems.push(format!("task {}: invalid URL '{}': {}", task.id, task.url, e));
    }

    if task.timeout_ms == 0 {
        problems.push(format!("task {}: timeout must be greater than zero", task.id));
    }

    if let Some(hint) = task.strategy {
        if !hint_is_compatible(hint, task.kind) {
            problems.push(format!(
                "task {}: strategy '{}' cannot fetch {} data",
                task.id, hint, task.kind
            ));
        }
    }

    if !task.selectors.is_empty() && task.kind.is_media() {
        problems.push(format!(
            "task {}: field selectors apply to text tasks only",
            task.id
        ));
    }
    for (name, css) in &task.selectors {
        if Selector::parse(css).is_err() {
            problems.push(format!(
                "task {}: field '{}' has an invalid selector '{}'",
                task.id, name, css
            ));
        }
    }
}

/// Returns whether an adapter hint can serve a declared data kind
///
/// Media kinds need the media adapter. Text may be fetched by any adapter,
/// including media for direct text file downloads.
pub fn hint_is_compatible(hint: AdapterKind, kind: DataKind) -> bool {
    !kind.is_media() || hint == AdapterKind::Media
}
