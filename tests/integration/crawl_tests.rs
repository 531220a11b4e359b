//! Integration tests for the pipeline
//!
//! These tests use wiremock to serve pages and run every role of the
//! pipeline in one process, end to end. Pages served under `localhost`
//! and `127.0.0.1` count as two different domains.

use std::future::pending;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use sumi_swarm::config::{parse_config, Config};
use sumi_swarm::queue::MemoryQueue;
use sumi_swarm::storage::{MemoryBackend, MemoryBlobStore, SearchBackend};
use sumi_swarm::{CrawlJob, EntryState, Pipeline, PipelineOutcome};
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const RUN_TIMEOUT: Duration = Duration::from_secs(20);

/// Creates a test configuration with fast timings
fn create_test_config(dir: &Path, max_delivery_attempts: u32) -> Config {
    let toml = format!(
        r#"
[crawler]
worker-slots = 4
fetch-timeout-ms = 300
local-retries = 0
backoff-base-ms = 5
requests-per-second = 200.0
burst = 10

[indexer]
batch-size = 5
batch-window-ms = 50
write-attempts = 2
write-timeout-ms = 200
backoff-base-ms = 5
worker-slots = 2

[queue]
ack-deadline-ms = 1000
max-delivery-attempts = {attempts}
receive-wait-ms = 20

[metrics]
node-id = "test"
report-interval-ms = 50

[user-agent]
crawler-name = "TestBot"
crawler-version = "1.0.0"
contact-url = "https://example.com/contact"
contact-email = "test@example.com"

[output]
database-path = "{db}"
blob-dir = "{blobs}"
"#,
        attempts = max_delivery_attempts,
        db = dir.join("index.db").display(),
        blobs = dir.join("blobs").display(),
    );
    parse_config(&toml).expect("test config is valid")
}

fn job(seed: String, max_depth: u32) -> CrawlJob {
    CrawlJob {
        seed_urls: vec![seed],
        max_depth,
        allow_domains: vec![],
        deny_domains: vec![],
        max_urls: 100,
        respect_robots: true,
    }
}

fn html(body: String) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_raw(body.into_bytes(), "text/html; charset=utf-8")
}

/// Port of the mock server, for building `localhost` URLs
fn port(server: &MockServer) -> u16 {
    server.address().port()
}

async fn run_in_memory(config: Config, job: CrawlJob) -> (PipelineOutcome, Arc<MemoryBackend>) {
    let queue = Arc::new(MemoryQueue::new(
        Duration::from_millis(config.queue.ack_deadline_ms),
        config.queue.max_delivery_attempts,
    ));
    let backend = Arc::new(MemoryBackend::new());
    let blobs = Arc::new(MemoryBlobStore::new());
    let pipeline = Pipeline::new(config, queue, backend.clone(), blobs);

    let outcome = tokio::time::timeout(RUN_TIMEOUT, pipeline.run(job, pending()))
        .await
        .expect("run finishes")
        .expect("run starts");
    (outcome, backend)
}

async fn requests_to(server: &MockServer, page: &str) -> usize {
    server
        .received_requests()
        .await
        .unwrap_or_default()
        .iter()
        .filter(|r| r.url.path() == page)
        .count()
}

#[tokio::test]
async fn test_full_crawl_depth_one() {
    let server = MockServer::start().await;
    let base = server.uri();
    let other = format!("http://localhost:{}", port(&server));

    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(html(format!(
            r#"<html><head><title>Home</title></head><body>
            <a href="{other}/b">B</a>
            <a href="{other}/c">C</a>
            <a href="{other}/b/">B again</a>
            </body></html>"#
        )))
        .mount(&server)
        .await;
    for page in ["/b", "/c"] {
        Mock::given(method("GET"))
            .and(path(page))
            .respond_with(html(format!(
                r#"<html><head><title>Page {page}</title></head><body>
                <p>content of {page}</p><a href="/deep">deeper</a></body></html>"#
            )))
            .mount(&server)
            .await;
    }

    let dir = TempDir::new().unwrap();
    let config = create_test_config(dir.path(), 3);
    let pipeline = Pipeline::open(config).expect("stores open");
    let outcome = tokio::time::timeout(
        RUN_TIMEOUT,
        pipeline.run(job(format!("{}/", base), 1), pending()),
    )
    .await
    .expect("run finishes")
    .expect("run starts");

    assert_eq!(outcome.frontier.entries, 3);
    assert_eq!(outcome.frontier.count(EntryState::Done), 3);
    assert_eq!(outcome.frontier.urls_reserved, 3);
    assert_eq!(outcome.indexed_documents, 3);
    assert!(outcome.fatal.is_none());
    assert_eq!(requests_to(&server, "/deep").await, 0);
    assert_eq!(requests_to(&server, "/b").await, 1);

    assert_eq!(outcome.metrics.totals.crawled, 3);
    assert_eq!(outcome.metrics.totals.indexed, 3);
    assert_eq!(outcome.metrics.totals.errors, 0);

    let backend = sumi_swarm::storage::SqliteBackend::open(&dir.path().join("index.db")).unwrap();
    let found = backend.search("content of /c", 10).await.unwrap();
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].url, format!("{}/c", other));
    assert_eq!(found[0].domain, "localhost");
}

#[tokio::test]
async fn test_denied_domain_is_never_fetched() {
    let server = MockServer::start().await;
    let other = format!("http://localhost:{}", port(&server));

    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(html(format!(
            r#"<a href="{other}/x">ad</a><a href="/ok">ok</a>"#
        )))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/ok"))
        .respond_with(html("<p>fine</p>".to_string()))
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let mut job = job(format!("{}/", server.uri()), 2);
    job.deny_domains = vec!["localhost".to_string()];
    let (outcome, backend) = run_in_memory(create_test_config(dir.path(), 3), job).await;

    assert_eq!(outcome.frontier.entries, 3);
    assert_eq!(outcome.frontier.count(EntryState::Done), 2);
    assert_eq!(outcome.frontier.count(EntryState::Excluded), 1);
    assert_eq!(requests_to(&server, "/x").await, 0);
    assert_eq!(backend.count().await.unwrap(), 2);
}

#[tokio::test]
async fn test_robots_disallowed_page_is_excluded() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/robots.txt"))
        .respond_with(
            ResponseTemplate::new(200).set_body_string("User-agent: *\nDisallow: /private\n"),
        )
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(html(r#"<a href="/private/data">secret</a>"#.to_string()))
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let (outcome, backend) =
        run_in_memory(create_test_config(dir.path(), 3), job(format!("{}/", server.uri()), 1))
            .await;

    assert_eq!(outcome.frontier.count(EntryState::Done), 1);
    assert_eq!(outcome.frontier.count(EntryState::Excluded), 1);
    assert_eq!(requests_to(&server, "/private/data").await, 0);
    assert_eq!(backend.count().await.unwrap(), 1);
}

#[tokio::test]
async fn test_unreachable_page_fails_after_redelivery() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let (outcome, backend) =
        run_in_memory(create_test_config(dir.path(), 2), job(format!("{}/", server.uri()), 1))
            .await;

    assert_eq!(outcome.frontier.entries, 1);
    assert_eq!(outcome.frontier.count(EntryState::Failed), 1);
    assert_eq!(outcome.frontier.count(EntryState::Done), 0);
    assert_eq!(requests_to(&server, "/").await, 2);
    assert_eq!(backend.count().await.unwrap(), 0);

    // two transient crawl failures plus one exhausted entry
    assert_eq!(outcome.metrics.totals.errors, 3);
    assert_eq!(outcome.metrics.totals.crawled, 0);
}

#[tokio::test]
async fn test_cancelled_job_stops() {
    let server = MockServer::start().await;
    let links: String = (0..20)
        .map(|i| format!(r#"<a href="/p{i}">{i}</a>"#))
        .collect();
    Mock::given(method("GET"))
        .respond_with(html(links).set_delay(Duration::from_millis(100)))
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let config = create_test_config(dir.path(), 3);
    let queue = Arc::new(MemoryQueue::new(Duration::from_millis(300), 3));
    let pipeline = Pipeline::new(
        config,
        queue,
        Arc::new(MemoryBackend::new()),
        Arc::new(MemoryBlobStore::new()),
    );

    let cancel = tokio::time::sleep(Duration::from_millis(150));
    let outcome = tokio::time::timeout(
        RUN_TIMEOUT,
        pipeline.run(job(format!("{}/", server.uri()), 3), cancel),
    )
    .await
    .expect("cancelled run finishes")
    .expect("run starts");

    assert!(outcome.frontier.cancelled);
    assert!(outcome.frontier.count(EntryState::Done) < 21);
}
