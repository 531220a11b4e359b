//! Storage module for indexed documents and raw page content
//!
//! This module holds the two storage contracts the pipeline depends on:
//! - [`SearchBackend`]: the search index the indexer writes to
//! - [`BlobStore`]: write-once raw content keyed by content fingerprint
//!
//! It also provides embedded implementations of both (SQLite, filesystem
//! and in-memory).

mod blob;
mod memory;
mod schema;
mod sqlite;
mod traits;

pub use blob::FsBlobStore;
pub use memory::{MemoryBackend, MemoryBlobStore};
pub use schema::{schema_version, SCHEMA_VERSION};
pub use sqlite::SqliteBackend;
pub use traits::{
    BackendError, BackendResult, BlobError, BlobResult, BlobStore, DocWriteStatus, SearchBackend,
};
