//! Markdown run report
//!
//! This module generates a human-readable markdown report of a run,
//! including the outcome breakdown, per-domain counts and the error log.

use crate::output::{OutputError, OutputResult, ResultSet, TaskClass};
use std::fs::File;
use std::io::Write;
use std::path::Path;

/// Writes the markdown report for a result set
///
/// # Arguments
///
/// * `results` - The finished result set
/// * `output_path` - Path where the markdown file should be written
///
/// # Returns
///
/// * `Ok(())` - Successfully wrote the report
/// * `Err(OutputError)` - Failed to write the report
pub fn write_markdown_report(results: &ResultSet, output_path: &Path) -> OutputResult<()> {
    let markdown = format_markdown_report(results);

    if let Some(parent) = output_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    let mut file = File::create(output_path).map_err(|source| OutputError::Write {
        path: output_path.display().to_string(),
        source,
    })?;
    file.write_all(markdown.as_bytes())?;

    Ok(())
}

/// Formats a result set as a markdown report
pub fn format_markdown_report(results: &ResultSet) -> String {
    let report = &results.report;
    let mut md = String::new();

    md.push_str("# Sumi-Gather Run Report\n\n");

    md.push_str("## Run Information\n\n");
    md.push_str(&format!("- **Started**: {}\n", report.started_at.to_rfc3339()));
    md.push_str(&format!("- **Finished**: {}\n", report.finished_at.to_rfc3339()));
    md.push_str(&format!(
        "- **Duration**: {:.2} seconds\n",
        report.duration_ms as f64 / 1000.0
    ));
    if let Some(hash) = &report.config_hash {
        md.push_str(&format!("- **Config Hash**: {}\n", hash));
    }
    if report.interrupted {
        md.push_str("- **Status**: cancelled before completion\n");
    } else {
        md.push_str("- **Status**: completed\n");
    }
    md.push('\n');

    md.push_str("## Outcome Breakdown\n\n");
    md.push_str("| Outcome | Tasks |\n");
    md.push_str("|---------|-------|\n");
    md.push_str(&format!("| Succeeded (first attempt) | {} |\n", report.succeeded));
    md.push_str(&format!("| Recovered (after retry) | {} |\n", report.recovered));
    md.push_str(&format!("| Deduplicated | {} |\n", report.deduplicated));
    md.push_str(&format!("| Failed | {} |\n", report.failed));
    md.push_str(&format!("| Disallowed | {} |\n", report.disallowed));
    md.push_str(&format!("| Cancelled | {} |\n", report.cancelled));
    md.push_str(&format!("| **Total** | {} |\n\n", report.total_tasks));
    md.push_str(&format!(
        "Tasks with data: {} ({:.2}%)\n\n",
        report.with_data(),
        report.success_rate()
    ));

    if !report.failure_kinds.is_empty() {
        md.push_str("## Failure Kinds\n\n");
        md.push_str("| Kind | Count |\n");
        md.push_str("|------|-------|\n");
        for (kind, count) in &report.failure_kinds {
            md.push_str(&format!("| {} | {} |\n", kind, count));
        }
        md.push('\n');
    }

    if !report.domains.is_empty() {
        md.push_str("## Domains\n\n");
        md.push_str("| Domain | Tasks | With Data | Failed | Attempts |\n");
        md.push_str("|--------|-------|-----------|--------|----------|\n");
        for (domain, summary) in &report.domains {
            md.push_str(&format!(
                "| {} | {} | {} | {} | {} |\n",
                domain, summary.tasks, summary.with_data, summary.failed, summary.attempts
            ));
        }
        md.push('\n');
    }

    let recovered: Vec<_> = report
        .tasks
        .iter()
        .filter(|t| t.class == TaskClass::Recovered)
        .collect();
    if !recovered.is_empty() {
        md.push_str("## Recovered Tasks\n\n");
        md.push_str("| Task | Attempts | Adapter | Escalated |\n");
        md.push_str("|------|----------|---------|-----------|\n");
        for task in recovered {
            md.push_str(&format!(
                "| {} | {} | {} | {} |\n",
                task.task_id,
                task.attempts,
                task.adapter.map(|a| a.as_str()).unwrap_or("-"),
                if task.escalated { "yes" } else { "no" }
            ));
        }
        md.push('\n');
    }

    if !results.errors.is_empty() {
        md.push_str("## Errors\n\n");
        md.push_str("| Task | URL | Kind | Attempts | Message |\n");
        md.push_str("|------|-----|------|----------|---------|\n");
        for error in &results.errors {
            md.push_str(&format!(
                "| {} | {} | {} | {} | {} |\n",
                error.task_id,
                error.url,
                error.kind,
                error.attempts.len(),
                error.message.replace('|', "\\|")
            ));
        }
        md.push('\n');
    }

    md
}
