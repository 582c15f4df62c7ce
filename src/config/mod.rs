//! Configuration module for Sumi-Gather
//!
//! This module handles loading, parsing, and validating TOML configuration files.
//!
//! # Example
//!
//! ```no_run
//! use sumi_gather::config::load_config;
//! use std::path::Path;
//!
//! let config = load_config(Path::new("config.toml")).unwrap();
//! println!("Running with {} workers", config.orchestrator.workers);
//! ```

mod parser;
mod types;
mod validation;

// Re-export types
pub use types::{
    default_spa_patterns, AdaptersConfig, Config, OrchestratorConfig, OutputConfig,
    RateLimitConfig, RetryConfig, UserAgentConfig,
};

// Re-export parser functions
pub use parser::{compute_config_hash, load_config, load_config_with_hash, parse_config};
pub use validation::validate;
