use crate::model::CrawlJob;
use serde::Deserialize;
use std::time::Duration;

/// Main configuration structure for Sumi-Swarm
///
/// Every section except `[user-agent]` has defaults, so a minimal file only
/// identifies the crawler.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub frontier: FrontierConfig,
    #[serde(default)]
    pub crawler: CrawlerConfig,
    #[serde(default)]
    pub indexer: IndexerConfig,
    #[serde(default)]
    pub queue: QueueConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
    #[serde(rename = "user-agent")]
    pub user_agent: UserAgentConfig,
    #[serde(default)]
    pub output: OutputConfig,
    #[serde(default)]
    pub health: HealthConfig,
    /// Default job, used when no job file is given on the command line
    #[serde(default)]
    pub job: Option<CrawlJob>,
}

/// Frontier behavior configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct FrontierConfig {
    /// Upper bound on dispatched-but-unfinished tasks
    pub max_in_flight: usize,

    /// Number of independently locked shards of the dedup set
    pub dedup_shards: usize,

    /// Concurrent result/dead-letter consumers
    pub worker_slots: usize,
}

impl Default for FrontierConfig {
    fn default() -> Self {
        Self {
            max_in_flight: 256,
            dedup_shards: 16,
            worker_slots: 2,
        }
    }
}

/// Crawler worker configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct CrawlerConfig {
    /// Concurrent task slots per process
    pub worker_slots: usize,

    /// Per-request timeout (milliseconds)
    pub fetch_timeout_ms: u64,

    /// Local retries on transient failure before handing over to redelivery
    pub local_retries: u32,

    /// First backoff delay; doubles on every retry (milliseconds)
    pub backoff_base_ms: u64,

    /// Token bucket refill rate per domain
    pub requests_per_second: f64,

    /// Token bucket capacity per domain
    pub burst: u32,

    /// How long fetched robots.txt rules stay valid (seconds)
    pub robots_ttl_secs: u64,
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            worker_slots: 8,
            fetch_timeout_ms: 10_000,
            local_retries: 2,
            backoff_base_ms: 500,
            requests_per_second: 1.0,
            burst: 1,
            robots_ttl_secs: 24 * 60 * 60,
        }
    }
}

impl CrawlerConfig {
    /// Longest one slot can hold a task before publishing its result
    ///
    /// One robots.txt fetch plus every fetch attempt and backoff delay.
    /// Politeness waits come on top.
    pub fn task_budget(&self) -> Duration {
        Duration::from_millis(self.fetch_timeout_ms)
            .saturating_mul(self.local_retries.saturating_add(2))
            .saturating_add(total_backoff(self.backoff_base_ms, self.local_retries))
    }
}

/// Indexer worker configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct IndexerConfig {
    /// Flush once this many documents are buffered
    pub batch_size: usize,

    /// Flush once the oldest buffered document is this old (milliseconds)
    pub batch_window_ms: u64,

    /// Total write attempts per document, including the first
    pub write_attempts: u32,

    /// Timeout of one batch write (milliseconds)
    pub write_timeout_ms: u64,

    /// First backoff delay between write attempts (milliseconds)
    pub backoff_base_ms: u64,

    /// Concurrent batching slots per process
    pub worker_slots: usize,
}

impl Default for IndexerConfig {
    fn default() -> Self {
        Self {
            batch_size: 50,
            batch_window_ms: 2_000,
            write_attempts: 3,
            write_timeout_ms: 10_000,
            backoff_base_ms: 200,
            worker_slots: 2,
        }
    }
}

impl IndexerConfig {
    /// Longest a result can wait unacknowledged in a slot
    ///
    /// A full batch window plus every write attempt and backoff delay.
    pub fn hold_budget(&self) -> Duration {
        let attempts = self.write_attempts.max(1);
        Duration::from_millis(self.batch_window_ms)
            .saturating_add(Duration::from_millis(self.write_timeout_ms).saturating_mul(attempts))
            .saturating_add(total_backoff(self.backoff_base_ms, attempts - 1))
    }
}

/// Sum of `retries` exponential backoff delays starting at `base_ms`
fn total_backoff(base_ms: u64, retries: u32) -> Duration {
    (0..retries).fold(Duration::ZERO, |total, n| {
        total.saturating_add(
            Duration::from_millis(base_ms).saturating_mul(2u32.saturating_pow(n)),
        )
    })
}

/// Delivery semantics of the queue
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct QueueConfig {
    /// Unacknowledged deliveries become eligible again after this long (milliseconds)
    pub ack_deadline_ms: u64,

    /// Deliveries before a message is routed to the dead-letter topic
    pub max_delivery_attempts: u32,

    /// Longest a consumer blocks in one receive call (milliseconds)
    pub receive_wait_ms: u64,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            ack_deadline_ms: 60_000,
            max_delivery_attempts: 5,
            receive_wait_ms: 500,
        }
    }
}

/// Progress reporting configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct MetricsConfig {
    /// Node id prefix; defaults to the HOSTNAME environment variable
    pub node_id: Option<String>,

    /// Interval between progress reports (milliseconds)
    pub report_interval_ms: u64,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            node_id: None,
            report_interval_ms: 5_000,
        }
    }
}

/// User agent identification configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct UserAgentConfig {
    /// Name of the crawler
    pub crawler_name: String,

    /// Version of the crawler
    pub crawler_version: String,

    /// URL with information about the crawler
    pub contact_url: String,

    /// Email address for crawler-related contact
    pub contact_email: String,
}

impl UserAgentConfig {
    /// Formats the User-Agent header: `Name/Version (+ContactURL; ContactEmail)`
    pub fn header_value(&self) -> String {
        format!(
            "{}/{} (+{}; {})",
            self.crawler_name, self.crawler_version, self.contact_url, self.contact_email
        )
    }
}

/// Output locations of the embedded collaborators
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct OutputConfig {
    /// Path to the SQLite search index
    pub database_path: String,

    /// Directory of the raw content blob store
    pub blob_dir: String,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            database_path: "./sumi-swarm.db".to_string(),
            blob_dir: "./blobs".to_string(),
        }
    }
}

/// Health endpoint configuration
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct HealthConfig {
    /// Address to serve `GET /health` on; disabled when absent
    pub bind: Option<String>,
}
