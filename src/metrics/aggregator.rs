use crate::model::{CounterValues, ProgressMetric, Role};
use crate::queue::{consume, Delivery, Handled, Queue, AGGREGATOR_SUBSCRIPTION};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::watch;

/// Latest report of every node plus totals
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    /// Sorted by node id
    pub nodes: Vec<ProgressMetric>,
    pub by_role: HashMap<Role, CounterValues>,
    pub totals: CounterValues,
}

/// Keeps the most recent metric per node
///
/// Reports may arrive late, twice or out of order; an older timestamp
/// never replaces a newer one.
#[derive(Debug, Default)]
pub struct MetricsAggregator {
    latest: Mutex<HashMap<String, ProgressMetric>>,
}

impl MetricsAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, ProgressMetric>> {
        self.latest.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Records `metric`; returns false if a newer one is already held
    pub fn record(&self, metric: ProgressMetric) -> bool {
        let mut latest = self.lock();
        match latest.get(&metric.node_id) {
            Some(current) if current.timestamp > metric.timestamp => {
                tracing::trace!("Ignoring stale metric from {}", metric.node_id);
                false
            }
            _ => {
                latest.insert(metric.node_id.clone(), metric);
                true
            }
        }
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let mut nodes: Vec<ProgressMetric> = self.lock().values().cloned().collect();
        nodes.sort_by(|a, b| a.node_id.cmp(&b.node_id));

        let mut by_role: HashMap<Role, CounterValues> = HashMap::new();
        let mut totals = CounterValues::default();
        for node in &nodes {
            *by_role.entry(node.role).or_default() += node.counters;
            totals += node.counters;
        }

        MetricsSnapshot {
            nodes,
            by_role,
            totals,
        }
    }

    /// Consumes the `aggregator` subscription until shutdown
    pub async fn run(
        self: Arc<Self>,
        queue: Arc<dyn Queue>,
        receive_wait: Duration,
        shutdown: watch::Receiver<bool>,
    ) {
        consume(queue, AGGREGATOR_SUBSCRIPTION, receive_wait, shutdown, |delivery| {
            let aggregator = Arc::clone(&self);
            async move { aggregator.handle_delivery(delivery) }
        })
        .await;
    }

    fn handle_delivery(&self, delivery: Delivery) -> Handled {
        match delivery.decode::<ProgressMetric>() {
            Ok(metric) => {
                self.record(metric);
            }
            Err(e) => tracing::warn!("Dropping undecodable progress metric: {}", e),
        }
        Handled::Ack
    }
}
