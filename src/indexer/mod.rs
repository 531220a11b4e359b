//! Indexer role: batched, idempotent writes into the search backend
//!
//! The indexer consumes crawl results, rebuilds each page's document from
//! its raw content in the blob store and writes documents in batches.
//! Documents are keyed by url and a write whose fingerprint matches the
//! stored one is skipped, so redelivered results change nothing.

mod batcher;
mod worker;

pub use batcher::{Batcher, PendingDocument};
pub use worker::{build_document, FlushReport, IndexerWorker};
