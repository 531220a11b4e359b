//! Wire and data model types shared by every role
//!
//! All queue payloads are JSON-encoded with serde. Producers never rely on
//! exactly-once delivery, so every type here is safe to receive twice.

mod document;
mod job;
mod metric;
mod result;
mod task;

pub use document::IndexDocument;
pub use job::{CancelFlag, CrawlJob};
pub use metric::{CounterValues, ProgressMetric, Role};
pub use result::{CrawlResult, ExtractedLink, ResultOutcome};
pub use task::CrawlTask;
