//! Storage traits and error types
//!
//! The search backend and the raw content blob store are external
//! collaborators; these traits are the only way the pipeline reaches them.

use crate::model::IndexDocument;
use async_trait::async_trait;
use thiserror::Error;

/// Errors returned by a search backend
#[derive(Debug, Error)]
pub enum BackendError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Backend unavailable: {0}")]
    Unavailable(String),

    /// Misconfiguration or rejected credentials; retrying cannot help
    #[error("Fatal backend error: {0}")]
    Fatal(String),

    #[error("Backend task failed: {0}")]
    Task(String),
}

impl BackendError {
    /// Returns true for errors that should take the process out of service
    pub fn is_fatal(&self) -> bool {
        match self {
            Self::Fatal(_) => true,
            Self::Sqlite(rusqlite::Error::SqliteFailure(err, _)) => matches!(
                err.code,
                rusqlite::ErrorCode::CannotOpen
                    | rusqlite::ErrorCode::NotADatabase
                    | rusqlite::ErrorCode::PermissionDenied
                    | rusqlite::ErrorCode::ReadOnly
                    | rusqlite::ErrorCode::AuthorizationForStatementDenied
            ),
            _ => false,
        }
    }
}

/// Errors returned by a blob store
#[derive(Debug, Error)]
pub enum BlobError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid blob key: {0}")]
    InvalidKey(String),
}

/// Result type for search backend operations
pub type BackendResult<T> = Result<T, BackendError>;

/// Result type for blob store operations
pub type BlobResult<T> = Result<T, BlobError>;

/// Outcome of writing one document of a batch
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DocWriteStatus {
    /// Inserted or replaced
    Written,
    /// Stored fingerprint already matched; nothing changed
    Unchanged,
    /// This document was rejected; others in the batch may have succeeded
    Failed(String),
}

impl DocWriteStatus {
    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed(_))
    }
}

/// Search backend contract
///
/// Documents are keyed by url. Writing a document whose fingerprint
/// matches the stored one must leave the backend untouched.
#[async_trait]
pub trait SearchBackend: Send + Sync {
    /// Upserts a batch, reporting one status per input document in order
    ///
    /// An `Err` means the whole batch failed.
    async fn upsert_batch(&self, docs: &[IndexDocument]) -> BackendResult<Vec<DocWriteStatus>>;

    /// Stored fingerprint for `url`, if indexed
    async fn fingerprint(&self, url: &str) -> BackendResult<Option<String>>;

    /// Documents whose title or content contain `term`
    async fn search(&self, term: &str, limit: usize) -> BackendResult<Vec<IndexDocument>>;

    /// Number of indexed documents
    async fn count(&self) -> BackendResult<u64>;

    /// Cheap liveness probe used by the health endpoint
    async fn ping(&self) -> BackendResult<()>;
}

/// Raw content store keyed by content fingerprint
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Stores `bytes` under `fingerprint` unless already present
    ///
    /// # Returns
    ///
    /// `true` if this call wrote the blob, `false` if it already existed.
    async fn put(&self, fingerprint: &str, bytes: &[u8]) -> BlobResult<bool>;

    /// Loads the blob stored under `fingerprint`
    async fn get(&self, fingerprint: &str) -> BlobResult<Option<Vec<u8>>>;

    /// Reference to the blob as carried in result messages
    fn reference(&self, fingerprint: &str) -> String;
}

/// Rejects keys that are not lowercase hex digests
pub(crate) fn check_blob_key(fingerprint: &str) -> BlobResult<()> {
    let valid = fingerprint.len() >= 8
        && fingerprint
            .chars()
            .all(|c| c.is_ascii_digit() || ('a'..='f').contains(&c));
    if valid {
        Ok(())
    } else {
        Err(BlobError::InvalidKey(fingerprint.to_string()))
    }
}
