//! Progress metrics
//!
//! Every role keeps [`Counters`], a [`MetricsReporter`] publishes them as
//! [`ProgressMetric`](crate::model::ProgressMetric)s and the
//! [`MetricsAggregator`] keeps the latest report of every node.

mod aggregator;
mod counters;
mod report;
mod reporter;

pub use aggregator::{MetricsAggregator, MetricsSnapshot};
pub use counters::Counters;
pub use report::{print_frontier_stats, print_snapshot};
pub use reporter::{node_id, MetricsReporter};
