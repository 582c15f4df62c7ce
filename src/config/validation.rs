use crate::config::types::{
    AdaptersConfig, Config, OrchestratorConfig, OutputConfig, RateLimitConfig, RetryConfig,
    UserAgentConfig,
};
use crate::ConfigError;
use url::Url;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_orchestrator_config(&config.orchestrator)?;
    validate_user_agent_config(&config.user_agent)?;
    validate_rate_limit_config(&config.rate_limit)?;
    validate_retry_config(&config.retry)?;
    validate_adapters_config(&config.adapters)?;
    validate_output_config(&config.output)?;
    Ok(())
}

/// Validates worker pool configuration
fn validate_orchestrator_config(config: &OrchestratorConfig) -> Result<(), ConfigError> {
    if config.workers < 1 || config.workers > 100 {
        return Err(ConfigError::Validation(format!(
            "workers must be between 1 and 100, got {}",
            config.workers
        )));
    }

    if config.progress_buffer < 1 {
        return Err(ConfigError::Validation(
            "progress-buffer must be at least 1".to_string(),
        ));
    }

    Ok(())
}

/// Validates per-domain politeness configuration
fn validate_rate_limit_config(config: &RateLimitConfig) -> Result<(), ConfigError> {
    if !(config.requests_per_second > 0.0) || !config.requests_per_second.is_finite() {
        return Err(ConfigError::Validation(format!(
            "requests-per-second must be a positive number, got {}",
            config.requests_per_second
        )));
    }

    if config.burst < 1 {
        return Err(ConfigError::Validation(format!(
            "burst must be >= 1, got {}",
            config.burst
        )));
    }

    if config.max_acquire_wait_ms == 0 {
        return Err(ConfigError::Validation(
            "max-acquire-wait-ms must be greater than zero".to_string(),
        ));
    }

    if !(config.min_penalty_rate > 0.0) || config.min_penalty_rate > config.requests_per_second {
        return Err(ConfigError::Validation(format!(
            "min-penalty-rate must be in (0, requests-per-second], got {}",
            config.min_penalty_rate
        )));
    }

    Ok(())
}

/// Validates backoff configuration
fn validate_retry_config(config: &RetryConfig) -> Result<(), ConfigError> {
    if config.max_delay_ms < config.base_delay_ms {
        return Err(ConfigError::Validation(format!(
            "max-delay-ms ({}) must be >= base-delay-ms ({})",
            config.max_delay_ms, config.base_delay_ms
        )));
    }

    if !(0.0..=1.0).contains(&config.jitter) {
        return Err(ConfigError::Validation(format!(
            "jitter must be between 0.0 and 1.0, got {}",
            config.jitter
        )));
    }

    Ok(())
}

/// Validates fetch strategy configuration
fn validate_adapters_config(config: &AdaptersConfig) -> Result<(), ConfigError> {
    for pattern in &config.spa_patterns {
        validate_domain_pattern(pattern)?;
    }

    if config.media_dir.as_os_str().is_empty() {
        return Err(ConfigError::Validation(
            "media-dir cannot be empty".to_string(),
        ));
    }

    if config.max_media_bytes == 0 {
        return Err(ConfigError::Validation(
            "max-media-bytes must be greater than zero".to_string(),
        ));
    }

    if config.max_media_per_page < 1 {
        return Err(ConfigError::Validation(
            "max-media-per-page must be at least 1".to_string(),
        ));
    }

    if config.max_browser_sessions < 1 {
        return Err(ConfigError::Validation(
            "max-browser-sessions must be at least 1".to_string(),
        ));
    }

    Ok(())
}

/// Validates user agent configuration
fn validate_user_agent_config(config: &UserAgentConfig) -> Result<(), ConfigError> {
    // Validate crawler name: non-empty, alphanumeric + hyphens only
    if config.crawler_name.is_empty() {
        return Err(ConfigError::Validation(
            "crawler_name cannot be empty".to_string(),
        ));
    }

    if !config
        .crawler_name
        .chars()
        .all(|c| c.is_alphanumeric() || c == '-')
    {
        return Err(ConfigError::Validation(format!(
            "crawler_name must contain only alphanumeric characters and hyphens, got '{}'",
            config.crawler_name
        )));
    }

    // Validate contact URL
    Url::parse(&config.contact_url)
        .map_err(|e| ConfigError::InvalidUrl(format!("Invalid contact_url: {}", e)))?;

    // Validate contact email (basic validation)
    validate_email(&config.contact_email)?;

    Ok(())
}

/// Validates output configuration
fn validate_output_config(config: &OutputConfig) -> Result<(), ConfigError> {
    if config.results_path.as_os_str().is_empty() {
        return Err(ConfigError::Validation(
            "results-path cannot be empty".to_string(),
        ));
    }

    if config.report_path.as_os_str().is_empty() {
        return Err(ConfigError::Validation(
            "report-path cannot be empty".to_string(),
        ));
    }

    Ok(())
}

/// Validates a host pattern: `example.com` or `*.example.com`
fn validate_domain_pattern(pattern: &str) -> Result<(), ConfigError> {
    let host = pattern.strip_prefix("*.").unwrap_or(pattern);
    let invalid = |reason: &str| {
        Err(ConfigError::InvalidPattern(format!(
            "'{}' {}",
            pattern, reason
        )))
    };

    if host.is_empty() {
        return invalid("has no host");
    }
    if !host.chars().all(|c| c.is_alphanumeric() || c == '.' || c == '-') {
        return invalid("contains characters not allowed in a host name");
    }
    if host.split('.').any(|label| label.is_empty()) {
        return invalid("has an empty label");
    }
    if host.split('.').any(|label| label.starts_with('-') || label.ends_with('-')) {
        return invalid("has a label starting or ending with '-'");
    }
    if !host.contains('.') {
        return invalid("needs at least two labels (e.g. 'example.com')");
    }

    Ok(())
}

/// Checks the contact address has a local part and a dotted domain
fn validate_email(email: &str) -> Result<(), ConfigError> {
    let well_formed = match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty() && !domain.contains('@') && domain.contains('.')
        }
        None => false,
    };

    if well_formed {
        Ok(())
    } else {
        Err(ConfigError::Validation(format!(
            "contact-email '{}' is not a valid address",
            email
        )))
    }
}
