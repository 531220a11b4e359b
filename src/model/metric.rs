use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::AddAssign;

/// Role of the process that emitted a metric
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Frontier,
    Crawler,
    Indexer,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Frontier => "frontier",
            Self::Crawler => "crawler",
            Self::Indexer => "indexer",
        };
        f.write_str(name)
    }
}

/// Point-in-time counter values carried by a [`ProgressMetric`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CounterValues {
    pub crawled: u64,
    pub indexed: u64,
    pub errors: u64,
    pub queue_depth_estimate: u64,
}

impl AddAssign for CounterValues {
    fn add_assign(&mut self, other: Self) {
        self.crawled += other.crawled;
        self.indexed += other.indexed;
        self.errors += other.errors;
        self.queue_depth_estimate += other.queue_depth_estimate;
    }
}

/// Periodic progress report of one node; last value wins per `node_id`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressMetric {
    pub node_id: String,
    pub role: Role,
    pub counters: CounterValues,
    pub timestamp: DateTime<Utc>,
}
