use crate::url::DomainPolicy;
use crate::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;

/// A crawl job as submitted by the dashboard collaborator
///
/// The kebab-case aliases let the same type load from the `[job]` table of
/// the TOML config.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrawlJob {
    #[serde(alias = "seed-urls")]
    pub seed_urls: Vec<String>,
    #[serde(alias = "max-depth")]
    pub max_depth: u32,
    #[serde(default, alias = "allow-domains")]
    pub allow_domains: Vec<String>,
    #[serde(default, alias = "deny-domains")]
    pub deny_domains: Vec<String>,
    #[serde(alias = "max-urls")]
    pub max_urls: u64,
    #[serde(default = "default_respect_robots", alias = "respect-robots")]
    pub respect_robots: bool,
}

fn default_respect_robots() -> bool {
    true
}

impl CrawlJob {
    /// Loads a job from a JSON file in the submission format
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let job: CrawlJob = serde_json::from_str(&content)?;
        job.validate()?;
        Ok(job)
    }

    pub fn policy(&self) -> DomainPolicy {
        DomainPolicy::new(self.allow_domains.clone(), self.deny_domains.clone())
    }

    /// Rejects jobs that could never emit a task
    pub fn validate(&self) -> Result<(), ConfigError> {
        crate::config::validate_job(self)
    }
}

#[derive(Debug, Default)]
struct CancelState {
    cancelled: AtomicBool,
    notify: Notify,
}

/// Job-level cancel flag shared by every role of a process
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<CancelState>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the flag and wakes every waiter; returns true if it was already set
    pub fn cancel(&self) -> bool {
        let was_cancelled = self.0.cancelled.swap(true, Ordering::SeqCst);
        if !was_cancelled {
            self.0.notify.notify_waiters();
        }
        was_cancelled
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.cancelled.load(Ordering::SeqCst)
    }

    /// Resolves once the flag is set
    pub async fn cancelled(&self) {
        loop {
            let notified = self.0.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if self.is_cancelled() {
                return;
            }
            notified.await;
        }
    }
}
