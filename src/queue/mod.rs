//! Queue module for Sumi-Swarm
//!
//! Roles never call each other directly: they publish JSON messages to
//! topics and consume them from subscriptions with at-least-once delivery.
//! This module defines the [`Queue`] contract, its message types, the
//! topic layout of the pipeline and an in-process implementation
//! ([`MemoryQueue`]).

mod consumer;
mod memory;
mod traits;

pub use consumer::{consume, Handled};
pub use memory::MemoryQueue;
pub use traits::{publish_json, AckToken, Delivery, Queue, RedeliveryHandle};

use thiserror::Error;

/// Frontier → Crawler
pub const CRAWL_TASKS: &str = "crawl-tasks";
/// Crawler → Indexer and Frontier
pub const CRAWL_RESULTS: &str = "crawl-results";
/// Progress metrics of every role, low priority
pub const PROGRESS_METRICS: &str = "progress-metrics";

pub const CRAWLER_SUBSCRIPTION: &str = "crawler";
pub const INDEXER_SUBSCRIPTION: &str = "indexer";
pub const FRONTIER_SUBSCRIPTION: &str = "frontier";
pub const FRONTIER_DEAD_LETTER_SUBSCRIPTION: &str = "frontier-dead-letter";
/// Results the Frontier or the Indexer gave up on, as seen by the Frontier
pub const FRONTIER_RESULTS_DEAD_LETTER_SUBSCRIPTION: &str = "frontier-results-dead-letter";
/// Results the Frontier or the Indexer gave up on, as seen by the Indexer
pub const INDEXER_DEAD_LETTER_SUBSCRIPTION: &str = "indexer-dead-letter";
pub const AGGREGATOR_SUBSCRIPTION: &str = "aggregator";

/// Name of the topic that receives messages of `topic` whose delivery
/// attempts are exhausted
pub fn dead_letter_topic(topic: &str) -> String {
    format!("{}.dead-letter", topic)
}

/// Queue-specific errors
#[derive(Debug, Error)]
pub enum QueueError {
    #[error("Unknown topic: {0}")]
    UnknownTopic(String),

    #[error("Unknown subscription: {0}")]
    UnknownSubscription(String),

    #[error("Subscription '{subscription}' already bound to topic '{topic}'")]
    SubscriptionConflict { subscription: String, topic: String },

    #[error("Failed to encode message: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Result type alias for queue operations
pub type QueueResult<T> = std::result::Result<T, QueueError>;

/// Declares every topic and subscription the pipeline uses
///
/// Idempotent; each role may call it on startup.
pub async fn declare_pipeline(queue: &dyn Queue) -> QueueResult<()> {
    queue
        .create_subscription(CRAWL_TASKS, CRAWLER_SUBSCRIPTION)
        .await?;
    queue
        .create_subscription(CRAWL_RESULTS, INDEXER_SUBSCRIPTION)
        .await?;
    queue
        .create_subscription(CRAWL_RESULTS, FRONTIER_SUBSCRIPTION)
        .await?;
    queue
        .create_subscription(
            &dead_letter_topic(CRAWL_TASKS),
            FRONTIER_DEAD_LETTER_SUBSCRIPTION,
        )
        .await?;
    queue
        .create_subscription(
            &dead_letter_topic(CRAWL_RESULTS),
            FRONTIER_RESULTS_DEAD_LETTER_SUBSCRIPTION,
        )
        .await?;
    queue
        .create_subscription(
            &dead_letter_topic(CRAWL_RESULTS),
            INDEXER_DEAD_LETTER_SUBSCRIPTION,
        )
        .await?;
    queue
        .create_subscription(PROGRESS_METRICS, AGGREGATOR_SUBSCRIPTION)
        .await?;
    Ok(())
}
