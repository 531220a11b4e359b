use crate::url::DomainPolicy;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A unit of crawl work published on the task queue
///
/// Tasks are immutable once published. `attempt_count` is always published
/// as zero; consumers overwrite it from the queue's delivery counter, which
/// is the only authoritative attempt count.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrawlTask {
    pub task_id: String,
    /// Canonical URL to fetch
    pub url: String,
    pub depth: u32,
    #[serde(default)]
    pub allow_domains: Vec<String>,
    #[serde(default)]
    pub deny_domains: Vec<String>,
    pub max_depth: u32,
    #[serde(default)]
    pub attempt_count: u32,
    #[serde(default = "default_respect_robots")]
    pub respect_robots: bool,
}

fn default_respect_robots() -> bool {
    true
}

impl CrawlTask {
    /// Creates a fresh task with a random id and `attempt_count = 0`
    pub fn new(
        url: impl Into<String>,
        depth: u32,
        policy: &DomainPolicy,
        max_depth: u32,
        respect_robots: bool,
    ) -> Self {
        Self {
            task_id: Uuid::new_v4().to_string(),
            url: url.into(),
            depth,
            allow_domains: policy.allow_domains.clone(),
            deny_domains: policy.deny_domains.clone(),
            max_depth,
            attempt_count: 0,
            respect_robots,
        }
    }

    /// The allow/deny policy carried by this task
    pub fn policy(&self) -> DomainPolicy {
        DomainPolicy::new(self.allow_domains.clone(), self.deny_domains.clone())
    }

    /// Returns true if links found on this page may still be followed
    pub fn children_within_depth(&self) -> bool {
        self.depth < self.max_depth
    }
}
