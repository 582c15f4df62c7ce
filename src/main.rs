//! Sumi-Gather main entry point
//!
//! This is the command-line interface for the Sumi-Gather plan orchestrator.

use clap::Parser;
use std::collections::BTreeMap;
use std::path::PathBuf;
use sumi_gather::config::{load_config_with_hash, Config};
use sumi_gather::orchestrator::StrategySelector;
use sumi_gather::output::{write_markdown_report, write_results_json};
use sumi_gather::plan::load_plan;
use sumi_gather::url::domain_key;
use sumi_gather::{Orchestrator, ProgressEvent, ScrapePlan};
use tokio::sync::broadcast::error::RecvError;
use tracing_subscriber::EnvFilter;

/// Sumi-Gather: a polite scrape-plan orchestrator
///
/// Sumi-Gather executes a scrape plan of static pages, rendered pages and
/// media downloads across many domains while respecting robots.txt and
/// per-domain rate limits, then writes the consolidated results and a run
/// report.
#[derive(Parser, Debug)]
#[command(name = "sumi-gather")]
#[command(version)]
#[command(about = "A polite scrape-plan orchestrator", long_about = None)]
struct Cli {
    /// Path to TOML configuration file
    #[arg(value_name = "CONFIG")]
    config: PathBuf,

    /// Path to the JSON scrape plan
    #[arg(value_name = "PLAN")]
    plan: PathBuf,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,

    /// Validate config and plan and show how the plan would run
    #[arg(long)]
    dry_run: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    setup_logging(cli.verbose, cli.quiet);

    tracing::info!("Loading configuration from: {}", cli.config.display());
    let (config, config_hash) = match load_config_with_hash(&cli.config) {
        Ok((cfg, hash)) => {
            tracing::info!("Configuration loaded successfully (hash: {})", hash);
            (cfg, hash)
        }
        Err(e) => {
            tracing::error!("Failed to load configuration: {}", e);
            return Err(e.into());
        }
    };

    tracing::info!("Loading plan from: {}", cli.plan.display());
    let plan = match load_plan(&cli.plan) {
        Ok(plan) => plan,
        Err(e) => {
            tracing::error!("{}", e);
            return Err(e.into());
        }
    };

    if cli.dry_run {
        handle_dry_run(&config, &plan);
        return Ok(());
    }

    handle_run(config, config_hash, plan).await
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("sumi_gather=info,warn"),
            1 => EnvFilter::new("sumi_gather=debug,info"),
            2 => EnvFilter::new("sumi_gather=trace,debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .init();
}

/// Handles the --dry-run mode: shows the plan breakdown without fetching
fn handle_dry_run(config: &Config, plan: &ScrapePlan) {
    println!("=== Sumi-Gather Dry Run ===\n");

    println!("Orchestrator:");
    println!("  Workers: {}", config.orchestrator.workers);
    println!(
        "  Rate limit: {} req/s per domain, burst {}",
        config.rate_limit.requests_per_second, config.rate_limit.burst
    );
    println!(
        "  Retry backoff: {}ms base, {}ms max",
        config.retry.base_delay_ms, config.retry.max_delay_ms
    );

    println!("\nUser Agent:");
    println!("  Name: {}", config.user_agent.crawler_name);
    println!("  Version: {}", config.user_agent.crawler_version);

    println!("\nOutput:");
    println!("  Results: {}", config.output.results_path.display());
    println!("  Report: {}", config.output.report_path.display());
    println!("  Media: {}", config.adapters.media_dir.display());

    let selector = StrategySelector::from_config(&config.adapters);
    let mut domains: BTreeMap<String, usize> = BTreeMap::new();
    let mut adapters: BTreeMap<&'static str, usize> = BTreeMap::new();
    for task in &plan.tasks {
        let domain = url::Url::parse(task.url.trim())
            .ok()
            .and_then(|url| domain_key(&url))
            .unwrap_or_default();
        *domains.entry(domain).or_insert(0) += 1;
        *adapters.entry(selector.select(task, &[]).as_str()).or_insert(0) += 1;
    }

    println!("\nTasks by domain ({}):", domains.len());
    for (domain, count) in &domains {
        println!("  - {}: {}", domain, count);
    }

    println!("\nTasks by first adapter:");
    for (adapter, count) in &adapters {
        println!("  - {}: {}", adapter, count);
    }

    println!("\n✓ Configuration is valid");
    println!("✓ Plan is valid with {} tasks", plan.len());
}

/// Runs the plan, logging progress, and writes the outputs
async fn handle_run(
    config: Config,
    config_hash: String,
    plan: ScrapePlan,
) -> Result<(), Box<dyn std::error::Error>> {
    let results_path = config.output.results_path.clone();
    let report_path = config.output.report_path.clone();

    let orchestrator = Orchestrator::from_config(config)?;
    let mut events = orchestrator.subscribe();

    let progress = tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => log_event(&event),
                Err(RecvError::Lagged(missed)) => {
                    tracing::debug!("Progress log skipped {} events", missed);
                }
                Err(RecvError::Closed) => break,
            }
        }
    });

    let cancel = orchestrator.cancel_handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupt received; finishing in-flight tasks");
            cancel.cancel();
        }
    });

    let results = match orchestrator.run(&plan).await {
        Ok(results) => results,
        Err(e) => {
            tracing::error!("Run failed: {}", e);
            return Err(e.into());
        }
    };
    drop(orchestrator);
    let _ = progress.await;

    let mut results = results;
    results.report = results.report.with_config_hash(config_hash);

    write_results_json(&results, &results_path)?;
    tracing::info!("Results written to: {}", results_path.display());
    write_markdown_report(&results, &report_path)?;
    tracing::info!("Report written to: {}", report_path.display());

    let report = &results.report;
    tracing::info!(
        "{} of {} tasks have data ({} recovered, {} deduplicated); {} failed, {} disallowed",
        report.with_data(),
        report.total_tasks,
        report.recovered,
        report.deduplicated,
        report.failed,
        report.disallowed
    );

    Ok(())
}

fn log_event(event: &ProgressEvent) {
    match event {
        ProgressEvent::Queued { .. } => {}
        ProgressEvent::Running {
            task_id,
            attempt,
            adapter,
        } => tracing::debug!("Task {} attempt {} via {}", task_id, attempt, adapter),
        ProgressEvent::Retrying {
            task_id,
            attempt,
            delay,
            error,
        } => tracing::info!(
            "Task {} attempt {} failed ({}); retrying in {:?}",
            task_id,
            attempt,
            error,
            delay
        ),
        ProgressEvent::Terminal { task_id, status } => {
            tracing::info!("Task {} finished: {}", task_id, status)
        }
    }
}
