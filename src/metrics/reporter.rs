use crate::metrics::Counters;
use crate::model::{ProgressMetric, Role};
use crate::queue::{publish_json, Queue, PROGRESS_METRICS};
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

/// Node id of a role: `<prefix>-<role>`
///
/// The prefix falls back to the `HOSTNAME` environment variable, then to
/// `local`.
pub fn node_id(prefix: Option<&str>, role: Role) -> String {
    let prefix = match prefix {
        Some(prefix) if !prefix.is_empty() => prefix.to_string(),
        _ => std::env::var("HOSTNAME")
            .ok()
            .filter(|h| !h.is_empty())
            .unwrap_or_else(|| "local".to_string()),
    };
    format!("{}-{}", prefix, role)
}

/// Publishes one role's counters at a fixed interval
pub struct MetricsReporter {
    queue: Arc<dyn Queue>,
    node_id: String,
    role: Role,
    counters: Arc<Counters>,
    depth_subscription: Option<&'static str>,
    interval: Duration,
}

impl MetricsReporter {
    pub fn new(
        queue: Arc<dyn Queue>,
        node_id: String,
        role: Role,
        counters: Arc<Counters>,
        interval: Duration,
    ) -> Self {
        Self {
            queue,
            node_id,
            role,
            counters,
            depth_subscription: None,
            interval,
        }
    }

    /// Reports the backlog of `subscription` as the queue depth estimate
    pub fn with_depth_of(mut self, subscription: &'static str) -> Self {
        self.depth_subscription = Some(subscription);
        self
    }

    /// Current metric of this node
    pub async fn metric(&self) -> ProgressMetric {
        let depth = match self.depth_subscription {
            Some(subscription) => self.queue.depth_estimate(subscription).await.unwrap_or_else(|e| {
                tracing::debug!("No depth for {}: {}", subscription, e);
                0
            }),
            None => 0,
        };

        ProgressMetric {
            node_id: self.node_id.clone(),
            role: self.role,
            counters: self.counters.snapshot(depth),
            timestamp: Utc::now(),
        }
    }

    /// Publishes the current metric once
    pub async fn report_once(&self) {
        let metric = self.metric().await;
        if let Err(e) = publish_json(self.queue.as_ref(), PROGRESS_METRICS, &metric).await {
            tracing::warn!("Failed to publish metrics of {}: {}", self.node_id, e);
        }
    }

    /// Reports every interval until shutdown, then once more
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(self.interval.max(Duration::from_millis(1)));
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => self.report_once().await,
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        self.report_once().await;
        tracing::debug!("Metrics reporter {} stopped", self.node_id);
    }
}
