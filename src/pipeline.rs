//! Single-process pipeline runner
//!
//! Runs every role of the pipeline in one process over a shared queue:
//! - Frontier (seeds, dedup, dispatch, result and dead-letter handling)
//! - Crawler workers
//! - Indexer workers
//! - Metrics reporters and the aggregator
//!
//! The run ends once the Frontier is quiescent and every queue is drained,
//! or once the job was cancelled and the remaining tasks were discarded.

use crate::config::Config;
use crate::crawler::CrawlerWorker;
use crate::frontier::{Frontier, FrontierService, FrontierStats};
use crate::health::HealthState;
use crate::indexer::IndexerWorker;
use crate::metrics::{node_id, Counters, MetricsAggregator, MetricsReporter, MetricsSnapshot};
use crate::model::{CrawlJob, Role};
use crate::queue::{
    declare_pipeline, MemoryQueue, Queue, AGGREGATOR_SUBSCRIPTION, CRAWLER_SUBSCRIPTION,
    FRONTIER_DEAD_LETTER_SUBSCRIPTION, FRONTIER_RESULTS_DEAD_LETTER_SUBSCRIPTION,
    FRONTIER_SUBSCRIPTION, INDEXER_DEAD_LETTER_SUBSCRIPTION, INDEXER_SUBSCRIPTION,
};
use crate::storage::{BlobStore, FsBlobStore, SearchBackend, SqliteBackend};
use crate::Result;
use std::future::Future;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinSet;

/// Subscriptions that must be empty before a run may end
const WORK_SUBSCRIPTIONS: &[&str] = &[
    CRAWLER_SUBSCRIPTION,
    INDEXER_SUBSCRIPTION,
    FRONTIER_SUBSCRIPTION,
    FRONTIER_DEAD_LETTER_SUBSCRIPTION,
    FRONTIER_RESULTS_DEAD_LETTER_SUBSCRIPTION,
    INDEXER_DEAD_LETTER_SUBSCRIPTION,
];

/// Longest wait for the final metric reports to be aggregated
const METRICS_DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

/// Summary of a finished run
#[derive(Debug, Clone)]
pub struct PipelineOutcome {
    pub metrics: MetricsSnapshot,
    pub frontier: FrontierStats,
    /// Documents in the search backend after the run
    pub indexed_documents: u64,
    /// Set when the run stopped on a fatal backend error
    pub fatal: Option<String>,
}

/// All roles of one process and the stores they share
pub struct Pipeline {
    config: Config,
    queue: Arc<dyn Queue>,
    backend: Arc<dyn SearchBackend>,
    blobs: Arc<dyn BlobStore>,
    health: Arc<HealthState>,
    node_prefix: Option<String>,
    poll_interval: Duration,
}

impl Pipeline {
    pub fn new(
        config: Config,
        queue: Arc<dyn Queue>,
        backend: Arc<dyn SearchBackend>,
        blobs: Arc<dyn BlobStore>,
    ) -> Self {
        let health = HealthState::new(Arc::clone(&queue), WORK_SUBSCRIPTIONS.to_vec())
            .with_backend(Arc::clone(&backend));

        Self {
            node_prefix: config.metrics.node_id.clone(),
            config,
            queue,
            backend,
            blobs,
            health: Arc::new(health),
            poll_interval: Duration::from_millis(50),
        }
    }

    /// Opens the configured stores: an in-process queue, the SQLite search
    /// backend and the filesystem blob store
    pub fn open(config: Config) -> Result<Self> {
        let queue = MemoryQueue::new(
            Duration::from_millis(config.queue.ack_deadline_ms),
            config.queue.max_delivery_attempts,
        );
        let backend = SqliteBackend::open(Path::new(&config.output.database_path))?;
        let blobs = FsBlobStore::open(Path::new(&config.output.blob_dir))?;

        tracing::info!(
            "Search backend at {}, raw content under {}",
            config.output.database_path,
            config.output.blob_dir
        );

        Ok(Self::new(
            config,
            Arc::new(queue),
            Arc::new(backend),
            Arc::new(blobs),
        ))
    }

    /// Overrides the node id prefix of the metric reporters
    pub fn with_node_prefix(mut self, prefix: Option<String>) -> Self {
        if prefix.is_some() {
            self.node_prefix = prefix;
        }
        self
    }

    pub fn health(&self) -> Arc<HealthState> {
        Arc::clone(&self.health)
    }

    /// Runs `job` to completion
    ///
    /// # Arguments
    ///
    /// * `job` - The crawl job; validated before anything starts
    /// * `cancel` - Resolves when the job should be cancelled (e.g. Ctrl-C)
    ///
    /// # Returns
    ///
    /// * `Ok(PipelineOutcome)` - The run ended, possibly on a fatal error
    /// * `Err(SwarmError)` - The run could not start
    pub async fn run<F>(self, job: CrawlJob, cancel: F) -> Result<PipelineOutcome>
    where
        F: Future<Output = ()>,
    {
        declare_pipeline(self.queue.as_ref()).await?;

        let wait = Duration::from_millis(self.config.queue.receive_wait_ms);
        let interval = Duration::from_millis(self.config.metrics.report_interval_ms);
        let prefix = self.node_prefix.as_deref();

        let frontier_counters = Arc::new(Counters::new());
        let crawler_counters = Arc::new(Counters::new());
        let indexer_counters = Arc::new(Counters::new());

        let frontier = Arc::new(Frontier::new(
            job.clone(),
            &self.config.frontier,
            Arc::clone(&self.queue),
            Arc::clone(&frontier_counters),
        )?);

        let crawler = CrawlerWorker::from_config(
            &self.config,
            Arc::clone(&self.queue),
            Arc::clone(&self.blobs),
            crawler_counters.clone(),
            frontier.cancel_flag(),
        )?;

        let indexer = IndexerWorker::new(
            Arc::clone(&self.queue),
            Arc::clone(&self.backend),
            Arc::clone(&self.blobs),
            indexer_counters.clone(),
            Arc::clone(&self.health),
            self.config.indexer.clone(),
        )
        .with_receive_wait(wait);

        let (stop_tx, stop_rx) = watch::channel(false);
        let mut roles = JoinSet::new();

        roles.spawn(
            FrontierService::new(
                Arc::clone(&frontier),
                Arc::clone(&self.queue),
                self.config.frontier.worker_slots,
                wait,
            )
            .run(stop_rx.clone()),
        );
        roles.spawn(crawler.run(stop_rx.clone()));
        roles.spawn(indexer.run(stop_rx.clone()));

        for (role, counters, depth_of) in [
            (Role::Frontier, frontier_counters, CRAWLER_SUBSCRIPTION),
            (Role::Crawler, crawler_counters, CRAWLER_SUBSCRIPTION),
            (Role::Indexer, indexer_counters, INDEXER_SUBSCRIPTION),
        ] {
            let reporter = MetricsReporter::new(
                Arc::clone(&self.queue),
                node_id(prefix, role),
                role,
                counters,
                interval,
            )
            .with_depth_of(depth_of);
            roles.spawn(reporter.run(stop_rx.clone()));
        }

        let aggregator = Arc::new(MetricsAggregator::new());
        let (aggregator_stop_tx, aggregator_stop_rx) = watch::channel(false);
        let aggregating = tokio::spawn(Arc::clone(&aggregator).run(
            Arc::clone(&self.queue),
            wait,
            aggregator_stop_rx,
        ));

        let submitted = frontier.submit_seeds(&job.seed_urls).await?;
        tracing::info!(
            "Submitted {} seeds: {} accepted, {} already seen, {} excluded, {} invalid",
            job.seed_urls.len(),
            submitted.accepted,
            submitted.already_seen,
            submitted.excluded,
            submitted.invalid
        );

        tokio::pin!(cancel);
        let mut cancel_pending = true;
        loop {
            tokio::select! {
                _ = &mut cancel, if cancel_pending => {
                    cancel_pending = false;
                    tracing::warn!("Cancelling job, in-flight tasks will be discarded");
                    frontier.cancel();
                }
                _ = tokio::time::sleep(self.poll_interval) => {}
            }

            if self.health.is_fatal() {
                tracing::error!("Stopping on fatal error");
                break;
            }
            if (frontier.is_quiescent() || frontier.is_cancelled()) && self.drained().await {
                break;
            }
        }

        let _ = stop_tx.send(true);
        while let Some(joined) = roles.join_next().await {
            if let Err(e) = joined {
                tracing::error!("Pipeline role panicked: {}", e);
            }
        }

        let drain_deadline = tokio::time::Instant::now() + METRICS_DRAIN_TIMEOUT;
        while tokio::time::Instant::now() < drain_deadline {
            match self.queue.depth_estimate(AGGREGATOR_SUBSCRIPTION).await {
                Ok(0) | Err(_) => break,
                Ok(_) => tokio::time::sleep(self.poll_interval).await,
            }
        }
        let _ = aggregator_stop_tx.send(true);
        if let Err(e) = aggregating.await {
            tracing::error!("Metrics aggregator panicked: {}", e);
        }

        let indexed_documents = match self.backend.count().await {
            Ok(count) => count,
            Err(e) => {
                tracing::warn!("Could not count indexed documents: {}", e);
                0
            }
        };

        let outcome = PipelineOutcome {
            metrics: aggregator.snapshot(),
            frontier: frontier.stats(),
            indexed_documents,
            fatal: self.health.fatal_reason(),
        };
        tracing::info!("Run finished: {}", outcome.frontier);
        Ok(outcome)
    }

    /// Returns true when no work subscription holds a message
    async fn drained(&self) -> bool {
        for subscription in WORK_SUBSCRIPTIONS {
            match self.queue.depth_estimate(subscription).await {
                Ok(0) => {}
                Ok(_) => return false,
                Err(e) => {
                    tracing::debug!("No depth for {}: {}", subscription, e);
                    return false;
                }
            }
        }
        true
    }
}
