use crate::config::IndexerConfig;
use crate::crawler::parse_html;
use crate::health::HealthState;
use crate::indexer::{Batcher, PendingDocument};
use crate::metrics::Counters;
use crate::model::{CrawlResult, IndexDocument};
use crate::queue::{
    consume, Delivery, Handled, Queue, RedeliveryHandle, INDEXER_DEAD_LETTER_SUBSCRIPTION,
    INDEXER_SUBSCRIPTION,
};
use crate::storage::{BackendError, BlobStore, DocWriteStatus, SearchBackend};
use crate::url::origin_domain;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tokio::time::Instant;
use url::Url;

/// What became of one flushed batch
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FlushReport {
    /// Deliveries in the batch, duplicates included
    pub received: usize,
    /// Deliveries superseded by a later copy of the same url
    pub duplicates: usize,
    pub written: usize,
    /// Fingerprint already stored; nothing written
    pub unchanged: usize,
    /// urls given up on after every write attempt failed
    pub failed: Vec<String>,
    /// `upsert_batch` calls made
    pub attempts: u32,
}

/// How a received delivery is handled
enum Prepared {
    Document(IndexDocument, RedeliveryHandle),
    Ack(RedeliveryHandle),
    Leave,
}

/// Builds the document of a successful result from its raw bytes
pub fn build_document(result: &CrawlResult, fingerprint: &str, raw: &[u8]) -> IndexDocument {
    let html = String::from_utf8_lossy(raw);
    let base = result
        .final_url
        .as_deref()
        .and_then(|u| Url::parse(u).ok())
        .or_else(|| Url::parse(&result.url).ok());

    let (title, content) = match base {
        Some(base) => {
            let parsed = parse_html(&html, &base);
            (parsed.title, parsed.text)
        }
        None => (None, String::new()),
    };

    IndexDocument {
        url: result.url.clone(),
        title: title.unwrap_or_else(|| result.url.clone()),
        content,
        domain: origin_domain(&result.url).unwrap_or_default(),
        crawl_date: result.fetched_at,
        content_fingerprint: fingerprint.to_string(),
    }
}

/// Batching consumers of the `indexer` subscription
///
/// Runs `worker-slots` independent batching slots plus one consumer of the
/// indexer's dead-letter subscription.
pub struct IndexerWorker {
    queue: Arc<dyn Queue>,
    backend: Arc<dyn SearchBackend>,
    blobs: Arc<dyn BlobStore>,
    counters: Arc<Counters>,
    health: Arc<HealthState>,
    config: IndexerConfig,
    receive_wait: Duration,
}

impl IndexerWorker {
    pub fn new(
        queue: Arc<dyn Queue>,
        backend: Arc<dyn SearchBackend>,
        blobs: Arc<dyn BlobStore>,
        counters: Arc<Counters>,
        health: Arc<HealthState>,
        config: IndexerConfig,
    ) -> Self {
        Self {
            queue,
            backend,
            blobs,
            counters,
            health,
            config,
            receive_wait: Duration::from_millis(500),
        }
    }

    pub fn with_receive_wait(mut self, receive_wait: Duration) -> Self {
        self.receive_wait = receive_wait;
        self
    }

    /// Consumes results until `shutdown` turns true or the backend fails
    /// fatally
    pub async fn run(self, shutdown: watch::Receiver<bool>) {
        let worker = Arc::new(self);
        let mut slots = JoinSet::new();

        for slot in 0..worker.config.worker_slots.max(1) {
            let worker = Arc::clone(&worker);
            let shutdown = shutdown.clone();
            slots.spawn(async move { worker.run_slot(slot, shutdown).await });
        }

        let (stop_tx, stop_rx) = watch::channel(false);
        let dead_letters = {
            let worker = Arc::clone(&worker);
            let queue = Arc::clone(&worker.queue);
            let wait = worker.receive_wait;
            tokio::spawn(async move {
                consume(queue, INDEXER_DEAD_LETTER_SUBSCRIPTION, wait, stop_rx, move |delivery| {
                    let worker = Arc::clone(&worker);
                    async move { worker.handle_dead_letter(delivery).await }
                })
                .await;
            })
        };

        while let Some(joined) = slots.join_next().await {
            if let Err(e) = joined {
                tracing::error!("Indexer slot panicked: {}", e);
            }
        }

        let _ = stop_tx.send(true);
        if let Err(e) = dead_letters.await {
            tracing::error!("Indexer dead-letter consumer panicked: {}", e);
        }
        tracing::debug!("Indexer stopped");
    }

    /// One batching loop; a partial batch is flushed before returning
    async fn run_slot(&self, slot: usize, shutdown: watch::Receiver<bool>) {
        let mut batch = Batcher::new(
            self.config.batch_size,
            Duration::from_millis(self.config.batch_window_ms),
        );

        while !*shutdown.borrow() && !self.health.is_fatal() {
            let wait = match batch.deadline() {
                Some(deadline) => deadline
                    .saturating_duration_since(Instant::now())
                    .min(self.receive_wait),
                None => self.receive_wait,
            };

            match self.queue.receive(INDEXER_SUBSCRIPTION, wait).await {
                Ok(Some(delivery)) => match self.prepare(delivery).await {
                    Prepared::Document(document, handle) => batch.push(document, handle),
                    Prepared::Ack(handle) => self.ack(&handle).await,
                    Prepared::Leave => {}
                },
                Ok(None) => {}
                Err(e) => {
                    tracing::error!("Receive on {} failed: {}", INDEXER_SUBSCRIPTION, e);
                    tokio::time::sleep(self.receive_wait).await;
                }
            }

            if batch.is_due(Instant::now()) && !self.flush_and_ack(batch.take()).await {
                return;
            }
        }

        if !batch.is_empty() && !self.health.is_fatal() {
            self.flush_and_ack(batch.take()).await;
        }
        tracing::debug!("Indexer slot {} stopped", slot);
    }

    /// Accounts for a result that was redelivered until the queue gave up
    ///
    /// A successful result whose document is not in the index is counted
    /// as an error. Error results were counted by the crawler, and results
    /// the Frontier gave up on may have been indexed all the same.
    async fn handle_dead_letter(&self, delivery: Delivery) -> Handled {
        let result: CrawlResult = match delivery.decode() {
            Ok(result) => result,
            Err(e) => {
                tracing::warn!("Dropping undecodable dead result: {}", e);
                return Handled::Ack;
            }
        };

        if result.error.is_some() {
            tracing::debug!("Dead error result for {} ignored", result.url);
            return Handled::Ack;
        }

        if let Some(expected) = result.content_fingerprint.as_deref() {
            match self.backend.fingerprint(&result.url).await {
                Ok(Some(stored)) if stored == expected => {
                    tracing::debug!("Dead result for {} is already indexed", result.url);
                    return Handled::Ack;
                }
                Ok(_) => {}
                Err(e) if e.is_fatal() => {
                    self.health.mark_fatal(format!("search backend: {}", e));
                    return Handled::Retry;
                }
                Err(e) => {
                    tracing::debug!("Fingerprint lookup for {} failed: {}", result.url, e);
                }
            }
        }

        self.counters.add_errors(1);
        tracing::error!(
            "QueueRedeliveryExhausted: result for {} was never indexed",
            result.url
        );
        Handled::Ack
    }

    /// Flushes and acks; returns false once the backend failed fatally
    async fn flush_and_ack(&self, pending: Vec<PendingDocument>) -> bool {
        let handles: Vec<RedeliveryHandle> = pending.iter().map(|p| p.handle.clone()).collect();

        match self.flush(pending).await {
            Ok(report) => {
                tracing::debug!(
                    "Flushed {} documents: {} written, {} unchanged, {} failed",
                    report.received,
                    report.written,
                    report.unchanged,
                    report.failed.len()
                );
                for handle in &handles {
                    self.ack(handle).await;
                }
                true
            }
            Err(e) => {
                self.health.mark_fatal(format!("search backend: {}", e));
                false
            }
        }
    }

    async fn ack(&self, handle: &RedeliveryHandle) {
        match self.queue.ack(handle).await {
            Ok(true) => {}
            Ok(false) => tracing::debug!("Ack of message {} was stale", handle.message_id),
            Err(e) => tracing::error!("Ack on {} failed: {}", handle.subscription, e),
        }
    }

    async fn prepare(&self, delivery: Delivery) -> Prepared {
        let result: CrawlResult = match delivery.decode() {
            Ok(result) => result,
            Err(e) => {
                tracing::warn!("Dropping undecodable crawl result: {}", e);
                return Prepared::Ack(delivery.handle);
            }
        };

        if let Some(error) = &result.error {
            tracing::debug!("Skipping {}: {}", result.url, error);
            return Prepared::Ack(delivery.handle);
        }

        let Some(fingerprint) = result.content_fingerprint.as_deref() else {
            tracing::warn!("Result for {} has no content fingerprint, skipping", result.url);
            return Prepared::Ack(delivery.handle);
        };

        match self.blobs.get(fingerprint).await {
            Ok(Some(raw)) => {
                let document = build_document(&result, fingerprint, &raw);
                Prepared::Document(document, delivery.handle)
            }
            Ok(None) => {
                tracing::warn!(
                    "Raw content {} of {} not found, leaving for redelivery",
                    fingerprint,
                    result.url
                );
                Prepared::Leave
            }
            Err(e) => {
                tracing::error!("Failed to load raw content of {}: {}", result.url, e);
                Prepared::Leave
            }
        }
    }

    /// Writes one batch
    ///
    /// # Flush Steps
    ///
    /// 1. Keep the last copy of each url
    /// 2. Skip documents whose stored fingerprint is unchanged
    /// 3. Upsert the rest under the write timeout
    /// 4. Retry only the documents that failed, with exponential backoff,
    ///    until `write-attempts` is used up
    ///
    /// Documents that fail every attempt are reported in
    /// [`FlushReport::failed`] and counted as errors.
    ///
    /// # Errors
    ///
    /// Only a fatal backend error is returned; the batch is then left
    /// unacknowledged.
    pub async fn flush(
        &self,
        pending: Vec<PendingDocument>,
    ) -> Result<FlushReport, BackendError> {
        let mut report = FlushReport {
            received: pending.len(),
            ..FlushReport::default()
        };

        let mut unique: Vec<IndexDocument> = Vec::new();
        let mut positions: HashMap<String, usize> = HashMap::new();
        for PendingDocument { document, .. } in pending {
            match positions.get(&document.url) {
                Some(&at) => unique[at] = document,
                None => {
                    positions.insert(document.url.clone(), unique.len());
                    unique.push(document);
                }
            }
        }
        report.duplicates = report.received - unique.len();

        let mut to_write = Vec::with_capacity(unique.len());
        for document in unique {
            match self.backend.fingerprint(&document.url).await {
                Ok(Some(stored)) if stored == document.content_fingerprint => {
                    tracing::debug!("DedupNoop: {} unchanged", document.url);
                    report.unchanged += 1;
                }
                Ok(_) => to_write.push(document),
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => {
                    tracing::debug!("Fingerprint lookup for {} failed: {}", document.url, e);
                    to_write.push(document);
                }
            }
        }

        let write_timeout = Duration::from_millis(self.config.write_timeout_ms);
        let max_attempts = self.config.write_attempts.max(1);

        while !to_write.is_empty() {
            report.attempts += 1;

            let statuses = match tokio::time::timeout(
                write_timeout,
                self.backend.upsert_batch(&to_write),
            )
            .await
            {
                Ok(Ok(statuses)) => statuses,
                Ok(Err(e)) if e.is_fatal() => return Err(e),
                Ok(Err(e)) => vec![DocWriteStatus::Failed(e.to_string()); to_write.len()],
                Err(_) => vec![
                    DocWriteStatus::Failed(format!("write timed out after {:?}", write_timeout));
                    to_write.len()
                ],
            };

            let mut statuses = statuses.into_iter();
            let mut failed = Vec::new();
            for document in to_write {
                match statuses
                    .next()
                    .unwrap_or_else(|| DocWriteStatus::Failed("no status returned".to_string()))
                {
                    DocWriteStatus::Written => report.written += 1,
                    DocWriteStatus::Unchanged => {
                        tracing::debug!("DedupNoop: {} unchanged", document.url);
                        report.unchanged += 1;
                    }
                    DocWriteStatus::Failed(reason) => failed.push((document, reason)),
                }
            }

            if failed.is_empty() {
                break;
            }

            if report.attempts >= max_attempts {
                for (document, reason) in failed {
                    tracing::error!(
                        "IndexWriteFailure: {} after {} attempts: {}",
                        document.url,
                        report.attempts,
                        reason
                    );
                    report.failed.push(document.url);
                }
                break;
            }

            let delay = Duration::from_millis(self.config.backoff_base_ms)
                .saturating_mul(2u32.saturating_pow(report.attempts - 1));
            tracing::warn!(
                "{} documents failed to write (attempt {}), retrying in {:?}",
                failed.len(),
                report.attempts,
                delay
            );
            tokio::time::sleep(delay).await;
            to_write = failed.into_iter().map(|(document, _)| document).collect();
        }

        self.counters.add_indexed(report.written as u64);
        self.counters.add_errors(report.failed.len() as u64);
        Ok(report)
    }
}
