//! Sumi-Swarm: a distributed, polite web crawl and index pipeline
//!
//! This crate implements the crawl-orchestration and indexing pipeline of a
//! distributed crawler: a Frontier that owns URL deduplication and depth
//! bookkeeping, crawler workers that fetch politely and extract links,
//! indexer workers that batch idempotent writes into a search backend, and
//! a metrics aggregator. The roles talk to each other only through an
//! at-least-once [`queue::Queue`].

pub mod config;
pub mod crawler;
pub mod frontier;
pub mod health;
pub mod indexer;
pub mod metrics;
pub mod model;
pub mod pipeline;
pub mod queue;
pub mod robots;
pub mod state;
pub mod storage;
pub mod url;

use thiserror::Error;

/// Main error type for Sumi-Swarm operations
#[derive(Debug, Error)]
pub enum SwarmError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("URL error: {0}")]
    UrlError(#[from] UrlError),

    #[error("Queue error: {0}")]
    Queue(#[from] queue::QueueError),

    #[error("Search backend error: {0}")]
    Backend(#[from] storage::BackendError),

    #[error("Blob store error: {0}")]
    Blob(#[from] storage::BlobError),

    #[error("HTTP client error: {0}")]
    Reqwest(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Job rejected: {0}")]
    InvalidJob(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Failed to parse job file: {0}")]
    Job(#[from] serde_json::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid URL in config: {0}")]
    InvalidUrl(String),

    #[error("Invalid domain pattern: {0}")]
    InvalidPattern(String),
}

/// URL-specific errors
#[derive(Debug, Error)]
pub enum UrlError {
    #[error("Failed to parse URL: {0}")]
    Parse(String),

    #[error("Invalid URL scheme: {0}")]
    InvalidScheme(String),

    #[error("Missing domain in URL")]
    MissingDomain,

    #[error("Malformed URL: {0}")]
    Malformed(String),
}

/// Result type alias for Sumi-Swarm operations
pub type Result<T> = std::result::Result<T, SwarmError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Result type alias for URL operations
pub type UrlResult<T> = std::result::Result<T, UrlError>;

// Re-export commonly used types
pub use config::Config;
pub use frontier::Frontier;
pub use model::{CrawlJob, CrawlResult, CrawlTask, IndexDocument, ProgressMetric};
pub use pipeline::{Pipeline, PipelineOutcome};
pub use state::EntryState;
pub use url::{canonicalize, extract_domain, DomainPolicy};
