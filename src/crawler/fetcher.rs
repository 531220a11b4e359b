//! HTTP fetcher implementation
//!
//! This module handles all page requests of the crawler:
//! - Building the HTTP client with the crawler's user agent
//! - Classifying failures as transient or permanent
//! - Retrying transient failures locally with exponential backoff
//!
//! Local retries are one of two retry layers. Once they are exhausted the
//! task is left unacknowledged and the queue's redelivery takes over.

use crate::config::{CrawlerConfig, UserAgentConfig};
use crate::crawler::CrawlError;
use reqwest::{redirect::Policy, Client, StatusCode};
use std::time::Duration;
use url::Url;

/// Content types accepted as HTML
const HTML_CONTENT_TYPES: &[&str] = &["text/html", "application/xhtml+xml"];

/// A successfully fetched HTML page
#[derive(Debug, Clone)]
pub struct FetchedPage {
    /// URL after redirects
    pub final_url: Url,
    pub status_code: u16,
    pub content_type: String,
    pub body: Vec<u8>,
}

/// Builds an HTTP client with proper configuration
///
/// # Arguments
///
/// * `user_agent` - The user agent configuration
/// * `timeout` - Total time budget of one request
///
/// # Example
///
/// ```no_run
/// use std::time::Duration;
/// use sumi_swarm::config::UserAgentConfig;
/// use sumi_swarm::crawler::build_http_client;
///
/// let config = UserAgentConfig {
///     crawler_name: "SumiSwarm".to_string(),
///     crawler_version: "1.0".to_string(),
///     contact_url: "https://example.com/about".to_string(),
///     contact_email: "admin@example.com".to_string(),
/// };
///
/// let client = build_http_client(&config, Duration::from_secs(10)).unwrap();
/// ```
pub fn build_http_client(
    user_agent: &UserAgentConfig,
    timeout: Duration,
) -> Result<Client, reqwest::Error> {
    Client::builder()
        .user_agent(user_agent.header_value())
        .timeout(timeout)
        .connect_timeout(timeout.min(Duration::from_secs(10)))
        .redirect(Policy::limited(10))
        .gzip(true)
        .brotli(true)
        .build()
}

/// Fetches pages with bounded local retry
#[derive(Clone)]
pub struct Fetcher {
    client: Client,
    local_retries: u32,
    backoff_base: Duration,
}

impl Fetcher {
    pub fn new(client: Client, local_retries: u32, backoff_base: Duration) -> Self {
        Self {
            client,
            local_retries,
            backoff_base,
        }
    }

    /// Builds a fetcher from the crawler section of the config
    pub fn from_config(
        user_agent: &UserAgentConfig,
        config: &CrawlerConfig,
    ) -> Result<Self, reqwest::Error> {
        let client = build_http_client(user_agent, Duration::from_millis(config.fetch_timeout_ms))?;
        Ok(Self::new(
            client,
            config.local_retries,
            Duration::from_millis(config.backoff_base_ms),
        ))
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    /// Fetches `url`, retrying transient failures
    ///
    /// # Retry Logic
    ///
    /// | Condition | Action |
    /// |-----------|--------|
    /// | Timeout, connect error, reset | Retry with backoff |
    /// | HTTP 5xx, HTTP 429 | Retry with backoff |
    /// | Other HTTP 4xx | Permanent |
    /// | Non-HTML content type | Permanent |
    /// | Too many redirects | Permanent |
    ///
    /// The n-th retry waits `backoff_base * 2^n`. After `local_retries`
    /// retries the last transient error is returned.
    pub async fn fetch(&self, url: &Url) -> Result<FetchedPage, CrawlError> {
        let mut attempt: u32 = 0;
        loop {
            match self.fetch_once(url).await {
                Err(CrawlError::TransientFetch(reason)) if attempt < self.local_retries => {
                    let delay = self.backoff_base.saturating_mul(2u32.saturating_pow(attempt));
                    tracing::debug!(
                        "Transient failure on {} ({}), retry {} in {:?}",
                        url,
                        reason,
                        attempt + 1,
                        delay
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                other => return other,
            }
        }
    }

    /// One request, classified
    async fn fetch_once(&self, url: &Url) -> Result<FetchedPage, CrawlError> {
        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(classify_request_error)?;

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
            return Err(CrawlError::TransientFetch(format!("HTTP {}", status.as_u16())));
        }
        if !status.is_success() {
            return Err(CrawlError::PermanentFetch {
                status_code: Some(status.as_u16()),
                reason: format!("HTTP {}", status.as_u16()),
            });
        }

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_string();

        if !is_html(&content_type) {
            return Err(CrawlError::PermanentFetch {
                status_code: Some(status.as_u16()),
                reason: format!("non-HTML content type '{}'", content_type),
            });
        }

        let final_url = response.url().clone();
        let body = response
            .bytes()
            .await
            .map_err(classify_request_error)?
            .to_vec();

        Ok(FetchedPage {
            final_url,
            status_code: status.as_u16(),
            content_type,
            body,
        })
    }
}

/// Accepts a missing content type, rejects anything that is not HTML
fn is_html(content_type: &str) -> bool {
    let mime = content_type
        .split(';')
        .next()
        .unwrap_or("")
        .trim()
        .to_ascii_lowercase();
    mime.is_empty() || HTML_CONTENT_TYPES.contains(&mime.as_str())
}

fn classify_request_error(e: reqwest::Error) -> CrawlError {
    if e.is_redirect() || e.is_builder() {
        CrawlError::PermanentFetch {
            status_code: None,
            reason: e.to_string(),
        }
    } else if e.is_timeout() {
        CrawlError::TransientFetch("request timeout".to_string())
    } else if e.is_connect() {
        CrawlError::TransientFetch(format!("connection failed: {}", e))
    } else {
        CrawlError::TransientFetch(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn user_agent() -> UserAgentConfig {
        UserAgentConfig {
            crawler_name: "TestCrawler".to_string(),
            crawler_version: "1.0".to_string(),
            contact_url: "https://example.com/about".to_string(),
            contact_email: "admin@example.com".to_string(),
        }
    }

    fn fetcher(retries: u32) -> Fetcher {
        let client = build_http_client(&user_agent(), Duration::from_millis(500)).unwrap();
        Fetcher::new(client, retries, Duration::from_millis(5))
    }

    fn html(body: &str) -> ResponseTemplate {
        ResponseTemplate::new(200).set_body_raw(body.as_bytes().to_vec(), "text/html; charset=utf-8")
    }

    #[test]
    fn test_is_html() {
        assert!(is_html("text/html"));
        assert!(is_html("text/html; charset=utf-8"));
        assert!(is_html("TEXT/HTML"));
        assert!(is_html(""));
        assert!(!is_html("application/pdf"));
        assert!(!is_html("image/png"));
    }

    #[tokio::test]
    async fn test_fetch_success() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/page"))
            .respond_with(html("<html><title>Hi</title></html>"))
            .mount(&server)
            .await;

        let url = Url::parse(&format!("{}/page", server.uri())).unwrap();
        let page = fetcher(0).fetch(&url).await.unwrap();

        assert_eq!(page.status_code, 200);
        assert!(page.content_type.starts_with("text/html"));
        assert_eq!(page.body, b"<html><title>Hi</title></html>");
        assert_eq!(page.final_url, url);
    }

    #[tokio::test]
    async fn test_server_error_retried_locally() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .up_to_n_times(2)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .respond_with(html("<p>ok</p>"))
            .mount(&server)
            .await;

        let url = Url::parse(&format!("{}/flaky", server.uri())).unwrap();
        assert!(fetcher(2).fetch(&url).await.is_ok());
    }

    #[tokio::test]
    async fn test_retries_exhausted_is_transient() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(429))
            .expect(3)
            .mount(&server)
            .await;

        let url = Url::parse(&format!("{}/busy", server.uri())).unwrap();
        let err = fetcher(2).fetch(&url).await.unwrap_err();
        assert!(err.is_transient());
    }

    #[tokio::test]
    async fn test_not_found_is_permanent_without_retry() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .expect(1)
            .mount(&server)
            .await;

        let url = Url::parse(&format!("{}/missing", server.uri())).unwrap();
        match fetcher(3).fetch(&url).await {
            Err(CrawlError::PermanentFetch { status_code, .. }) => {
                assert_eq!(status_code, Some(404))
            }
            other => panic!("expected permanent failure, got {:?}", other.map(|p| p.status_code)),
        }
    }

    #[tokio::test]
    async fn test_non_html_is_permanent() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_raw(vec![0u8; 4], "application/pdf"))
            .mount(&server)
            .await;

        let url = Url::parse(&format!("{}/doc.pdf", server.uri())).unwrap();
        let err = fetcher(2).fetch(&url).await.unwrap_err();
        assert!(!err.is_transient());
    }

    #[tokio::test]
    async fn test_connection_refused_is_transient() {
        let url = Url::parse("http://127.0.0.1:9/").unwrap();
        let err = fetcher(0).fetch(&url).await.unwrap_err();
        assert!(err.is_transient());
    }
}
