//! Crawler role: polite fetching and link extraction
//!
//! This module contains the crawler worker and its building blocks:
//! - HTTP fetching with bounded local retry
//! - HTML parsing (title, visible text, outbound links)
//! - Per-domain rate limiting
//! - The queue-driven worker that turns tasks into results

mod fetcher;
mod limiter;
mod parser;
mod worker;

pub use fetcher::{build_http_client, FetchedPage, Fetcher};
pub use limiter::{DomainRateLimiter, RateLimitDecision};
pub use parser::{content_fingerprint, decode_body, parse_html, ParsedPage};
pub use worker::{CrawlerWorker, TaskOutcome};

use thiserror::Error;

/// Failures of one crawl task
///
/// The rendered message becomes the `error` field of the published result,
/// so each variant's message starts with its kind.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CrawlError {
    /// Worth retrying: timeouts, connection failures, 5xx, 429
    #[error("TransientFetchError: {0}")]
    TransientFetch(String),

    #[error("PermanentFetchError: {reason}")]
    PermanentFetch {
        status_code: Option<u16>,
        reason: String,
    },

    #[error("RobotsDisallowed: {0}")]
    RobotsDisallowed(String),

    #[error("PolicyExcluded: {0}")]
    PolicyExcluded(String),
}

impl CrawlError {
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::TransientFetch(_))
    }

    /// HTTP status that caused the failure, if any
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Self::PermanentFetch { status_code, .. } => *status_code,
            _ => None,
        }
    }
}
