use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Error prefixes that mark a result as a policy exclusion
const EXCLUSION_ERRORS: &[&str] = &["RobotsDisallowed", "PolicyExcluded"];

/// An outbound link found on a fetched page
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ExtractedLink {
    pub url: String,
    pub depth: u32,
}

/// Terminal outcome of one processed crawl task
///
/// `url` is always the task's canonical URL so that consumers can key on it;
/// the post-redirect location is informational only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrawlResult {
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub final_url: Option<String>,
    #[serde(default)]
    pub status_code: Option<u16>,
    #[serde(default)]
    pub content_type: Option<String>,
    #[serde(default)]
    pub content_fingerprint: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw_bytes_ref: Option<String>,
    #[serde(default)]
    pub extracted_links: Vec<ExtractedLink>,
    pub fetched_at: DateTime<Utc>,
    #[serde(default)]
    pub error: Option<String>,
}

/// How the Frontier should settle the entry a result belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResultOutcome {
    Success,
    Excluded,
    Failed,
}

impl CrawlResult {
    /// Builds a result that carries only an error
    pub fn failure(url: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            final_url: None,
            status_code: None,
            content_type: None,
            content_fingerprint: None,
            raw_bytes_ref: None,
            extracted_links: Vec::new(),
            fetched_at: Utc::now(),
            error: Some(error.into()),
        }
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }

    /// Classifies the result for frontier bookkeeping
    pub fn outcome(&self) -> ResultOutcome {
        match &self.error {
            None => ResultOutcome::Success,
            Some(error) if EXCLUSION_ERRORS.iter().any(|p| error.starts_with(p)) => {
                ResultOutcome::Excluded
            }
            Some(_) => ResultOutcome::Failed,
        }
    }
}
