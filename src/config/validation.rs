use crate::config::types::{
    Config, CrawlerConfig, FrontierConfig, IndexerConfig, OutputConfig, QueueConfig,
    UserAgentConfig,
};
use crate::model::CrawlJob;
use crate::ConfigError;
use url::Url;

/// Slowest accepted politeness rate: one request per 1000 seconds
const MIN_REQUESTS_PER_SECOND: f64 = 0.001;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_frontier_config(&config.frontier)?;
    validate_crawler_config(&config.crawler)?;
    validate_indexer_config(&config.indexer)?;
    validate_queue_config(&config.queue)?;
    validate_user_agent_config(&config.user_agent)?;
    validate_output_config(&config.output)?;
    validate_retry_budgets(config)?;
    if let Some(job) = &config.job {
        validate_job(job)?;
    }
    Ok(())
}

fn validate_frontier_config(config: &FrontierConfig) -> Result<(), ConfigError> {
    if config.max_in_flight < 1 {
        return Err(ConfigError::Validation(
            "frontier max_in_flight must be >= 1".to_string(),
        ));
    }

    if config.dedup_shards < 1 || config.dedup_shards > 1024 {
        return Err(ConfigError::Validation(format!(
            "dedup_shards must be between 1 and 1024, got {}",
            config.dedup_shards
        )));
    }

    if config.worker_slots < 1 {
        return Err(ConfigError::Validation(
            "frontier worker_slots must be >= 1".to_string(),
        ));
    }

    Ok(())
}

/// Validates crawler configuration
fn validate_crawler_config(config: &CrawlerConfig) -> Result<(), ConfigError> {
    if config.worker_slots < 1 || config.worker_slots > 1000 {
        return Err(ConfigError::Validation(format!(
            "crawler worker_slots must be between 1 and 1000, got {}",
            config.worker_slots
        )));
    }

    if config.fetch_timeout_ms < 100 {
        return Err(ConfigError::Validation(format!(
            "fetch_timeout_ms must be >= 100ms, got {}ms",
            config.fetch_timeout_ms
        )));
    }

    if !config.requests_per_second.is_finite()
        || config.requests_per_second < MIN_REQUESTS_PER_SECOND
    {
        return Err(ConfigError::Validation(format!(
            "requests_per_second must be at least {}, got {}",
            MIN_REQUESTS_PER_SECOND, config.requests_per_second
        )));
    }

    if config.burst < 1 {
        return Err(ConfigError::Validation(format!(
            "burst must be >= 1, got {}",
            config.burst
        )));
    }

    Ok(())
}

fn validate_indexer_config(config: &IndexerConfig) -> Result<(), ConfigError> {
    if config.batch_size < 1 {
        return Err(ConfigError::Validation(
            "indexer batch_size must be >= 1".to_string(),
        ));
    }

    if config.batch_window_ms < 1 {
        return Err(ConfigError::Validation(
            "indexer batch_window_ms must be >= 1".to_string(),
        ));
    }

    if config.write_attempts < 1 {
        return Err(ConfigError::Validation(
            "indexer write_attempts must be >= 1".to_string(),
        ));
    }

    if config.worker_slots < 1 || config.worker_slots > 1000 {
        return Err(ConfigError::Validation(format!(
            "indexer worker_slots must be between 1 and 1000, got {}",
            config.worker_slots
        )));
    }

    Ok(())
}

fn validate_queue_config(config: &QueueConfig) -> Result<(), ConfigError> {
    if config.max_delivery_attempts < 1 {
        return Err(ConfigError::Validation(
            "queue max_delivery_attempts must be >= 1".to_string(),
        ));
    }

    if config.ack_deadline_ms < 10 {
        return Err(ConfigError::Validation(format!(
            "ack_deadline_ms must be >= 10ms, got {}ms",
            config.ack_deadline_ms
        )));
    }

    Ok(())
}

/// Local retries must finish before the queue redelivers the message
fn validate_retry_budgets(config: &Config) -> Result<(), ConfigError> {
    let ack_deadline = std::time::Duration::from_millis(config.queue.ack_deadline_ms);

    let crawler = config.crawler.task_budget();
    if crawler >= ack_deadline {
        return Err(ConfigError::Validation(format!(
            "crawler retries may hold a task for {}ms, which must be below ack_deadline_ms ({}ms)",
            crawler.as_millis(),
            config.queue.ack_deadline_ms
        )));
    }

    let indexer = config.indexer.hold_budget();
    if indexer >= ack_deadline {
        return Err(ConfigError::Validation(format!(
            "indexer batching and write retries may hold a result for {}ms, which must be below ack_deadline_ms ({}ms)",
            indexer.as_millis(),
            config.queue.ack_deadline_ms
        )));
    }

    Ok(())
}

/// Validates user agent configuration
fn validate_user_agent_config(config: &UserAgentConfig) -> Result<(), ConfigError> {
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

    Url::parse(&config.contact_url)
        .map_err(|e| ConfigError::InvalidUrl(format!("Invalid contact_url: {}", e)))?;

    validate_email(&config.contact_email)?;

    Ok(())
}

fn validate_output_config(config: &OutputConfig) -> Result<(), ConfigError> {
    if config.database_path.is_empty() {
        return Err(ConfigError::Validation(
            "database_path cannot be empty".to_string(),
        ));
    }

    if config.blob_dir.is_empty() {
        return Err(ConfigError::Validation("blob_dir cannot be empty".to_string()));
    }

    Ok(())
}

/// Validates a submitted crawl job
///
/// A job must carry at least one seed, a positive URL budget and
/// well-formed domain patterns. Seeds themselves are checked one by one at
/// submission time so a single bad seed does not reject the whole job.
pub(crate) fn validate_job(job: &CrawlJob) -> Result<(), ConfigError> {
    if job.seed_urls.is_empty() {
        return Err(ConfigError::Validation(
            "job must have at least one seed URL".to_string(),
        ));
    }

    if job.max_urls == 0 {
        return Err(ConfigError::Validation(
            "job max_urls must be >= 1".to_string(),
        ));
    }

    for pattern in job.allow_domains.iter().chain(&job.deny_domains) {
        validate_domain_pattern(pattern)?;
    }

    Ok(())
}

/// Validates a domain pattern (`*.` and `.` prefixes are accepted)
fn validate_domain_pattern(pattern: &str) -> Result<(), ConfigError> {
    if pattern.is_empty() {
        return Err(ConfigError::InvalidPattern(
            "Domain pattern cannot be empty".to_string(),
        ));
    }

    let domain = pattern
        .strip_prefix("*.")
        .or_else(|| pattern.strip_prefix('.'))
        .unwrap_or(pattern);

    validate_domain_string(domain)
}

/// Validates a domain string (without wildcard prefix)
fn validate_domain_string(domain: &str) -> Result<(), ConfigError> {
    if domain.is_empty() {
        return Err(ConfigError::InvalidPattern(
            "Domain cannot be empty".to_string(),
        ));
    }

    if !domain
        .chars()
        .all(|c| c.is_alphanumeric() || c == '.' || c == '-')
    {
        return Err(ConfigError::InvalidPattern(format!(
            "Domain '{}' contains invalid characters",
            domain
        )));
    }

    if domain.starts_with('.')
        || domain.ends_with('.')
        || domain.starts_with('-')
        || domain.ends_with('-')
    {
        return Err(ConfigError::InvalidPattern(format!(
            "Domain '{}' cannot start or end with '.' or '-'",
            domain
        )));
    }

    if domain.contains("..") {
        return Err(ConfigError::InvalidPattern(format!(
            "Domain '{}' cannot contain consecutive dots",
            domain
        )));
    }

    Ok(())
}

/// Basic email validation
fn validate_email(email: &str) -> Result<(), ConfigError> {
    let Some((local, domain)) = email.split_once('@') else {
        return Err(ConfigError::Validation(format!(
            "Invalid email format: '{}'",
            email
        )));
    };

    if local.is_empty() || domain.is_empty() || domain.contains('@') {
        return Err(ConfigError::Validation(format!(
            "Invalid email format: '{}'",
            email
        )));
    }

    if !domain.contains('.') {
        return Err(ConfigError::Validation(format!(
            "Invalid email domain: '{}'",
            email
        )));
    }

    Ok(())
}
