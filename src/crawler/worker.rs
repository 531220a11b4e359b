//! Crawler worker loop
//!
//! Each slot pulls one task at a time from the `crawler` subscription and
//! runs it through policy, robots, politeness, fetch and parse. A task is
//! acknowledged only after its result was published.

use crate::config::Config;
use crate::crawler::{
    content_fingerprint, decode_body, parse_html, CrawlError, DomainRateLimiter, Fetcher,
};
use crate::metrics::Counters;
use crate::model::{CancelFlag, CrawlResult, CrawlTask, ExtractedLink};
use crate::queue::{
    consume, publish_json, Delivery, Handled, Queue, CRAWLER_SUBSCRIPTION, CRAWL_RESULTS,
};
use crate::robots::RobotsCache;
use crate::storage::BlobStore;
use crate::url::{canonicalize, extract_domain, PolicyDecision};
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinSet;

/// What to do with a task after processing it
#[derive(Debug, Clone, PartialEq)]
pub enum TaskOutcome {
    /// Publish the result, then acknowledge the task
    Publish(CrawlResult),
    /// Acknowledge without publishing anything
    Discard,
    /// Leave the task unacknowledged for redelivery
    Retry,
}

/// A crawler process's worker, shared by all of its slots
#[derive(Clone)]
pub struct CrawlerWorker {
    queue: Arc<dyn Queue>,
    fetcher: Fetcher,
    robots: Arc<RobotsCache>,
    limiter: Arc<DomainRateLimiter>,
    blobs: Arc<dyn BlobStore>,
    counters: Arc<Counters>,
    cancel: CancelFlag,
    slots: usize,
    receive_wait: Duration,
}

impl CrawlerWorker {
    pub fn new(
        queue: Arc<dyn Queue>,
        fetcher: Fetcher,
        robots: Arc<RobotsCache>,
        limiter: Arc<DomainRateLimiter>,
        blobs: Arc<dyn BlobStore>,
        counters: Arc<Counters>,
        cancel: CancelFlag,
    ) -> Self {
        Self {
            queue,
            fetcher,
            robots,
            limiter,
            blobs,
            counters,
            cancel,
            slots: 1,
            receive_wait: Duration::from_millis(500),
        }
    }

    /// Builds a worker with its fetcher, robots cache and limiter wired
    /// from `config`
    pub fn from_config(
        config: &Config,
        queue: Arc<dyn Queue>,
        blobs: Arc<dyn BlobStore>,
        counters: Arc<Counters>,
        cancel: CancelFlag,
    ) -> Result<Self, reqwest::Error> {
        let crawler = &config.crawler;
        let fetcher = Fetcher::from_config(&config.user_agent, crawler)?;
        let robots = RobotsCache::new(
            fetcher.client().clone(),
            config.user_agent.crawler_name.clone(),
            Duration::from_secs(crawler.robots_ttl_secs),
        );
        let limiter = DomainRateLimiter::new(crawler.requests_per_second, crawler.burst);

        Ok(Self::new(
            queue,
            fetcher,
            Arc::new(robots),
            Arc::new(limiter),
            blobs,
            counters,
            cancel,
        )
        .with_concurrency(crawler.worker_slots, Duration::from_millis(config.queue.receive_wait_ms)))
    }

    /// Sets the number of slots and the per-receive wait
    pub fn with_concurrency(mut self, slots: usize, receive_wait: Duration) -> Self {
        self.slots = slots.max(1);
        self.receive_wait = receive_wait;
        self
    }

    /// Consumes tasks until `shutdown` turns true
    pub async fn run(self, shutdown: watch::Receiver<bool>) {
        let worker = Arc::new(self);
        let mut slots = JoinSet::new();

        for slot in 0..worker.slots {
            let worker = Arc::clone(&worker);
            let queue = Arc::clone(&worker.queue);
            let wait = worker.receive_wait;
            let shutdown = shutdown.clone();
            slots.spawn(async move {
                consume(queue, CRAWLER_SUBSCRIPTION, wait, shutdown, |delivery| {
                    let worker = Arc::clone(&worker);
                    async move { worker.handle_delivery(delivery).await }
                })
                .await;
                tracing::debug!("Crawler slot {} stopped", slot);
            });
        }

        while let Some(joined) = slots.join_next().await {
            if let Err(e) = joined {
                tracing::error!("Crawler slot panicked: {}", e);
            }
        }
    }

    async fn handle_delivery(&self, delivery: Delivery) -> Handled {
        let mut task: CrawlTask = match delivery.decode() {
            Ok(task) => task,
            Err(e) => {
                tracing::warn!("Dropping undecodable crawl task: {}", e);
                return Handled::Ack;
            }
        };
        task.attempt_count = delivery.attempt.saturating_sub(1);

        match self.process(&task).await {
            TaskOutcome::Publish(result) => {
                match publish_json(self.queue.as_ref(), CRAWL_RESULTS, &result).await {
                    Ok(_) => Handled::Ack,
                    Err(e) => {
                        tracing::error!("Failed to publish result for {}: {}", task.url, e);
                        Handled::Retry
                    }
                }
            }
            TaskOutcome::Discard => Handled::Ack,
            TaskOutcome::Retry => Handled::Retry,
        }
    }

    /// Processes one task
    ///
    /// Abandons the task as soon as the job is cancelled, including while
    /// waiting for a rate-limit token or a response.
    pub async fn process(&self, task: &CrawlTask) -> TaskOutcome {
        if self.cancel.is_cancelled() {
            tracing::debug!("Job cancelled, discarding task {}", task.task_id);
            return TaskOutcome::Discard;
        }

        let crawled = tokio::select! {
            crawled = self.crawl(task) => crawled,
            _ = self.cancel.cancelled() => {
                tracing::debug!("Job cancelled while crawling {}", task.url);
                return TaskOutcome::Discard;
            }
        };

        match crawled {
            Ok(result) => {
                self.counters.add_crawled(1);
                tracing::info!(
                    "Crawled {} (depth {}, {} links)",
                    result.url,
                    task.depth,
                    result.extracted_links.len()
                );
                TaskOutcome::Publish(result)
            }
            Err(e) if e.is_transient() => {
                self.counters.add_errors(1);
                tracing::warn!(
                    "{} on {} (attempt {}), leaving for redelivery",
                    e,
                    task.url,
                    task.attempt_count + 1
                );
                TaskOutcome::Retry
            }
            Err(e) => {
                match &e {
                    CrawlError::PermanentFetch { .. } => {
                        self.counters.add_errors(1);
                        tracing::warn!("{} on {}", e, task.url);
                    }
                    _ => tracing::info!("Skipping {}: {}", task.url, e),
                }
                let mut result = CrawlResult::failure(task.url.clone(), e.to_string());
                result.status_code = e.status_code();
                TaskOutcome::Publish(result)
            }
        }
    }

    async fn crawl(&self, task: &CrawlTask) -> Result<CrawlResult, CrawlError> {
        let url = canonicalize(&task.url).map_err(|e| CrawlError::PermanentFetch {
            status_code: None,
            reason: e.to_string(),
        })?;

        if task.depth > task.max_depth {
            return Err(CrawlError::PolicyExcluded(format!(
                "depth {} exceeds max depth {}",
                task.depth, task.max_depth
            )));
        }

        let domain = extract_domain(&url)
            .ok_or_else(|| CrawlError::PolicyExcluded(format!("{} has no domain", url)))?;
        match task.policy().decide(&domain) {
            PolicyDecision::Allowed => {}
            PolicyDecision::Denied => {
                return Err(CrawlError::PolicyExcluded(format!("domain {} is denied", domain)))
            }
            PolicyDecision::NotAllowed => {
                return Err(CrawlError::PolicyExcluded(format!(
                    "domain {} is not allowed",
                    domain
                )))
            }
        }

        if task.respect_robots {
            let verdict = self.robots.check(&url).await;
            if !verdict.allowed {
                return Err(CrawlError::RobotsDisallowed(url.to_string()));
            }
            if let Some(delay) = verdict.crawl_delay {
                self.limiter.apply_crawl_delay(&domain, delay);
            }
        }

        self.limiter.acquire(&domain).await;

        let page = self.fetcher.fetch(&url).await?;
        let html = decode_body(&page.body)?;
        let parsed = parse_html(&html, &page.final_url);

        let fingerprint = content_fingerprint(&page.body);
        match self.blobs.put(&fingerprint, &page.body).await {
            Ok(written) => {
                tracing::trace!("Blob {} for {} (new: {})", fingerprint, url, written)
            }
            Err(e) => {
                return Err(CrawlError::TransientFetch(format!(
                    "failed to store raw content: {}",
                    e
                )))
            }
        }

        let extracted_links = if task.children_within_depth() {
            parsed
                .links
                .into_iter()
                .map(|link| ExtractedLink {
                    url: link.to_string(),
                    depth: task.depth + 1,
                })
                .collect()
        } else {
            Vec::new()
        };

        let final_url = (page.final_url != url).then(|| page.final_url.to_string());

        Ok(CrawlResult {
            url: url.to_string(),
            final_url,
            status_code: Some(page.status_code),
            content_type: Some(page.content_type),
            raw_bytes_ref: Some(self.blobs.reference(&fingerprint)),
            content_fingerprint: Some(fingerprint),
            extracted_links,
            fetched_at: Utc::now(),
            error: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::UserAgentConfig;
    use crate::crawler::build_http_client;
    use crate::model::ResultOutcome;
    use crate::queue::{declare_pipeline, MemoryQueue, CRAWL_TASKS, INDEXER_SUBSCRIPTION};
    use crate::storage::MemoryBlobStore;
    use crate::url::DomainPolicy;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    struct Harness {
        worker: CrawlerWorker,
        queue: Arc<MemoryQueue>,
        blobs: Arc<MemoryBlobStore>,
        counters: Arc<Counters>,
        cancel: CancelFlag,
    }

    async fn harness() -> Harness {
        let user_agent = UserAgentConfig {
            crawler_name: "TestCrawler".to_string(),
            crawler_version: "1.0".to_string(),
            contact_url: "https://example.com/about".to_string(),
            contact_email: "admin@example.com".to_string(),
        };
        let client = build_http_client(&user_agent, Duration::from_millis(500)).unwrap();
        let queue = Arc::new(MemoryQueue::new(Duration::from_secs(30), 3));
        declare_pipeline(queue.as_ref()).await.unwrap();
        let blobs = Arc::new(MemoryBlobStore::new());
        let counters = Arc::new(Counters::new());
        let cancel = CancelFlag::new();

        let worker = CrawlerWorker::new(
            queue.clone(),
            Fetcher::new(client.clone(), 1, Duration::from_millis(5)),
            Arc::new(RobotsCache::new(client, "TestCrawler", Duration::from_secs(60))),
            Arc::new(DomainRateLimiter::new(1000.0, 10)),
            blobs.clone(),
            counters.clone(),
            cancel.clone(),
        )
        .with_concurrency(2, Duration::from_millis(20));

        Harness {
            worker,
            queue,
            blobs,
            counters,
            cancel,
        }
    }

    fn task(url: String, depth: u32, max_depth: u32) -> CrawlTask {
        CrawlTask::new(url, depth, &DomainPolicy::default(), max_depth, true)
    }

    fn html(body: &str) -> ResponseTemplate {
        ResponseTemplate::new(200).set_body_raw(body.as_bytes().to_vec(), "text/html")
    }

    #[tokio::test]
    async fn test_successful_crawl_extracts_links() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/"))
            .respond_with(html(
                r#"<a href="http://b.test/">b</a><a href="/local/">l</a><a href="http://b.test">again</a>"#,
            ))
            .mount(&server)
            .await;

        let h = harness().await;
        let url = format!("{}/", server.uri());
        let outcome = h.worker.process(&task(url.clone(), 0, 1)).await;

        let TaskOutcome::Publish(result) = outcome else {
            panic!("expected a published result");
        };
        assert!(result.is_success());
        assert_eq!(result.url, url);
        assert_eq!(result.status_code, Some(200));
        assert_eq!(
            result.extracted_links,
            vec![
                ExtractedLink { url: "http://b.test/".into(), depth: 1 },
                ExtractedLink { url: format!("{}/local", server.uri()), depth: 1 },
            ]
        );

        let fingerprint = result.content_fingerprint.unwrap();
        assert_eq!(h.blobs.len(), 1);
        assert!(h.blobs.get(&fingerprint).await.unwrap().is_some());
        assert_eq!(result.raw_bytes_ref, Some(h.blobs.reference(&fingerprint)));
        assert_eq!(h.counters.crawled(), 1);
        assert_eq!(h.counters.errors(), 0);
    }

    #[tokio::test]
    async fn test_no_links_at_max_depth() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/leaf"))
            .respond_with(html(r#"<a href="/deeper">d</a>"#))
            .mount(&server)
            .await;

        let h = harness().await;
        let outcome = h.worker.process(&task(format!("{}/leaf", server.uri()), 2, 2)).await;
        let TaskOutcome::Publish(result) = outcome else {
            panic!("expected a published result");
        };
        assert!(result.is_success());
        assert!(result.extracted_links.is_empty());
    }

    #[tokio::test]
    async fn test_denied_domain_is_not_fetched() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(html("<p>x</p>"))
            .expect(0)
            .mount(&server)
            .await;

        let h = harness().await;
        let policy = DomainPolicy::new(vec![], vec!["127.0.0.1".into()]);
        let denied = CrawlTask::new(format!("{}/", server.uri()), 0, &policy, 1, true);

        let TaskOutcome::Publish(result) = h.worker.process(&denied).await else {
            panic!("expected a published result");
        };
        assert_eq!(result.outcome(), ResultOutcome::Excluded);
        assert!(result.error.unwrap().starts_with("PolicyExcluded"));
        assert_eq!(h.counters.crawled(), 0);
        assert_eq!(h.counters.errors(), 0);
    }

    #[tokio::test]
    async fn test_robots_disallow_skips_fetch() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/robots.txt"))
            .respond_with(
                ResponseTemplate::new(200).set_body_string("User-agent: *\nDisallow: /private\n"),
            )
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/private/page"))
            .respond_with(html("<p>secret</p>"))
            .mount(&server)
            .await;

        let h = harness().await;
        let url = format!("{}/private/page", server.uri());

        let TaskOutcome::Publish(result) = h.worker.process(&task(url.clone(), 0, 1)).await else {
            panic!("expected a published result");
        };
        assert_eq!(result.outcome(), ResultOutcome::Excluded);
        assert!(result.error.unwrap().starts_with("RobotsDisallowed"));
        let requests = server.received_requests().await.unwrap();
        assert!(requests.iter().all(|r| r.url.path() != "/private/page"));

        let mut ignoring = task(url, 0, 1);
        ignoring.respect_robots = false;
        assert!(matches!(
            h.worker.process(&ignoring).await,
            TaskOutcome::Publish(ref r) if r.is_success()
        ));
    }

    #[tokio::test]
    async fn test_permanent_failure_is_published() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/gone"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let h = harness().await;
        let TaskOutcome::Publish(result) =
            h.worker.process(&task(format!("{}/gone", server.uri()), 0, 1)).await
        else {
            panic!("expected a published result");
        };
        assert_eq!(result.outcome(), ResultOutcome::Failed);
        assert_eq!(result.status_code, Some(404));
        assert_eq!(h.counters.errors(), 1);
    }

    #[tokio::test]
    async fn test_transient_failure_is_retried() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/busy"))
            .respond_with(ResponseTemplate::new(503))
            .expect(2)
            .mount(&server)
            .await;

        let h = harness().await;
        let outcome = h.worker.process(&task(format!("{}/busy", server.uri()), 0, 1)).await;
        assert_eq!(outcome, TaskOutcome::Retry);
        assert_eq!(h.counters.errors(), 1);
        assert_eq!(h.counters.crawled(), 0);
    }

    #[tokio::test]
    async fn test_cancelled_job_discards_without_fetching() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(html("<p>x</p>"))
            .expect(0)
            .mount(&server)
            .await;

        let h = harness().await;
        h.cancel.cancel();
        let outcome = h.worker.process(&task(format!("{}/", server.uri()), 0, 1)).await;
        assert_eq!(outcome, TaskOutcome::Discard);
    }

    #[tokio::test]
    async fn test_run_publishes_result_and_acks_task() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/"))
            .respond_with(html("<title>Home</title>"))
            .mount(&server)
            .await;

        let h = harness().await;
        let queue = h.queue.clone();
        let published = task(format!("{}/", server.uri()), 0, 0);
        publish_json(queue.as_ref(), CRAWL_TASKS, &published).await.unwrap();

        let (stop_tx, stop_rx) = watch::channel(false);
        let running = tokio::spawn(h.worker.run(stop_rx));

        let delivery = queue
            .receive(INDEXER_SUBSCRIPTION, Duration::from_secs(5))
            .await
            .unwrap()
            .expect("result published");
        let result: CrawlResult = delivery.decode().unwrap();
        assert_eq!(result.url, published.url);
        assert!(result.is_success());

        for _ in 0..100 {
            if queue.depth_estimate(CRAWLER_SUBSCRIPTION).await.unwrap() == 0 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        stop_tx.send(true).unwrap();
        running.await.unwrap();

        assert_eq!(queue.depth_estimate(CRAWLER_SUBSCRIPTION).await.unwrap(), 0);
    }
}
