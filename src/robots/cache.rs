//! Per-origin robots.txt cache
//!
//! Entries expire after a configurable TTL and are refetched on next use.
//! Expired entries of other origins are dropped whenever a fetch is stored.

use crate::robots::{fetch_robots, RobotsRules};
use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use tracing::debug;
use url::Url;

/// Rules for one origin and when they were fetched
#[derive(Debug, Clone)]
pub struct CachedRobots {
    pub rules: Arc<RobotsRules>,
    pub fetched_at: DateTime<Utc>,
}

impl CachedRobots {
    pub fn new(rules: RobotsRules) -> Self {
        Self {
            rules: Arc::new(rules),
            fetched_at: Utc::now(),
        }
    }

    /// Returns true once the entry is older than `ttl`
    pub fn is_stale(&self, ttl: Duration) -> bool {
        Utc::now() - self.fetched_at > ttl
    }
}

/// Result of checking a URL against its origin's robots.txt
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RobotsVerdict {
    pub allowed: bool,
    /// Crawl delay declared for our agent, in seconds
    pub crawl_delay: Option<f64>,
}

/// Robots rules shared by every crawler slot of a process
///
/// Reads take a shared lock; a miss or stale entry is fetched without
/// holding any lock, so two slots may occasionally fetch the same file.
pub struct RobotsCache {
    client: reqwest::Client,
    user_agent: String,
    ttl: Duration,
    entries: RwLock<HashMap<String, CachedRobots>>,
}

impl RobotsCache {
    /// Creates an empty cache
    ///
    /// # Arguments
    ///
    /// * `client` - HTTP client used for robots.txt requests
    /// * `user_agent` - Agent string matched against `User-agent` groups
    /// * `ttl` - How long fetched rules stay valid
    pub fn new(client: reqwest::Client, user_agent: impl Into<String>, ttl: std::time::Duration) -> Self {
        Self {
            client,
            user_agent: user_agent.into(),
            ttl: Duration::from_std(ttl).unwrap_or_else(|_| Duration::days(1)),
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Checks `url` against the robots.txt of its origin
    pub async fn check(&self, url: &Url) -> RobotsVerdict {
        let rules = self.rules_for(url).await;
        RobotsVerdict {
            allowed: rules.is_allowed(url.as_str(), &self.user_agent),
            crawl_delay: rules.crawl_delay(&self.user_agent),
        }
    }

    /// Returns the cached rules for the origin of `url`, fetching them if
    /// absent or stale
    pub async fn rules_for(&self, url: &Url) -> Arc<RobotsRules> {
        let origin = origin_key(url);

        if let Some(rules) = self.fresh(&origin) {
            return rules;
        }

        debug!(origin = %origin, "Fetching robots.txt");
        let rules = fetch_robots(&self.client, url, &self.user_agent).await;
        let entry = CachedRobots::new(rules);
        let rules = Arc::clone(&entry.rules);

        let mut entries = self
            .entries
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let before = entries.len();
        entries.retain(|_, cached| !cached.is_stale(self.ttl));
        if entries.len() < before {
            debug!(evicted = before - entries.len(), "Evicted stale robots.txt entries");
        }
        entries.insert(origin, entry);

        rules
    }

    /// Number of cached origins
    pub fn len(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn fresh(&self, origin: &str) -> Option<Arc<RobotsRules>> {
        let entries = self
            .entries
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        entries
            .get(origin)
            .filter(|entry| !entry.is_stale(self.ttl))
            .map(|entry| Arc::clone(&entry.rules))
    }

    #[cfg(test)]
    fn insert_at(&self, url: &Url, rules: RobotsRules, fetched_at: DateTime<Utc>) {
        let mut entry = CachedRobots::new(rules);
        entry.fetched_at = fetched_at;
        self.entries.write().unwrap().insert(origin_key(url), entry);
    }
}

/// `scheme://host[:port]` of a URL
fn origin_key(url: &Url) -> String {
    url.origin().ascii_serialization()
}
