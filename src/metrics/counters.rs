use crate::model::CounterValues;
use std::sync::atomic::{AtomicU64, Ordering};

/// Monotonic progress counters of one process role
///
/// Shared by every worker slot of the role; the reporter snapshots them.
#[derive(Debug, Default)]
pub struct Counters {
    crawled: AtomicU64,
    indexed: AtomicU64,
    errors: AtomicU64,
}

impl Counters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_crawled(&self, n: u64) {
        self.crawled.fetch_add(n, Ordering::Relaxed);
    }

    pub fn add_indexed(&self, n: u64) {
        self.indexed.fetch_add(n, Ordering::Relaxed);
    }

    pub fn add_errors(&self, n: u64) {
        self.errors.fetch_add(n, Ordering::Relaxed);
    }

    pub fn crawled(&self) -> u64 {
        self.crawled.load(Ordering::Relaxed)
    }

    pub fn indexed(&self) -> u64 {
        self.indexed.load(Ordering::Relaxed)
    }

    pub fn errors(&self) -> u64 {
        self.errors.load(Ordering::Relaxed)
    }

    /// Current values, with the given queue depth estimate attached
    pub fn snapshot(&self, queue_depth_estimate: u64) -> CounterValues {
        CounterValues {
            crawled: self.crawled(),
            indexed: self.indexed(),
            errors: self.errors(),
            queue_depth_estimate,
        }
    }
}
