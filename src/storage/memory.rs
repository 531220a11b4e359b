//! In-memory search backend and blob store
//!
//! Both keep everything in process memory. The backend can also inject
//! per-document and whole-backend failures, which is how partial-failure
//! handling is exercised.

use crate::model::IndexDocument;
use crate::storage::traits::{
    check_blob_key, BackendError, BackendResult, BlobResult, BlobStore, DocWriteStatus,
    SearchBackend,
};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

#[derive(Debug, Default)]
struct BackendState {
    docs: HashMap<String, IndexDocument>,
    /// url -> number of upcoming writes of that url to reject
    failures: HashMap<String, u32>,
    /// Set when the whole backend should fail
    outage: Option<BackendError>,
    /// urls of every `upsert_batch` call, in call order
    calls: Vec<Vec<String>>,
    /// Successful writes per url
    writes: HashMap<String, u32>,
}

/// Search backend holding documents in a map
#[derive(Debug, Default)]
pub struct MemoryBackend {
    state: Mutex<BackendState>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, BackendState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Rejects the next `times` writes of `url`
    pub fn fail_writes(&self, url: &str, times: u32) {
        self.lock().failures.insert(url.to_string(), times);
    }

    /// Makes every call fail with a fatal error until cleared
    pub fn set_fatal(&self, reason: Option<&str>) {
        self.lock().outage = reason.map(|r| BackendError::Fatal(r.to_string()));
    }

    /// Makes every call fail with a retryable error until cleared
    pub fn set_unavailable(&self, reason: Option<&str>) {
        self.lock().outage = reason.map(|r| BackendError::Unavailable(r.to_string()));
    }

    /// urls passed to each `upsert_batch` call so far
    pub fn calls(&self) -> Vec<Vec<String>> {
        self.lock().calls.clone()
    }

    /// Number of writes that actually changed `url`
    pub fn write_count(&self, url: &str) -> u32 {
        self.lock().writes.get(url).copied().unwrap_or(0)
    }

    pub fn get(&self, url: &str) -> Option<IndexDocument> {
        self.lock().docs.get(url).cloned()
    }

    fn check_outage(state: &BackendState) -> BackendResult<()> {
        match &state.outage {
            Some(BackendError::Fatal(reason)) => Err(BackendError::Fatal(reason.clone())),
            Some(other) => Err(BackendError::Unavailable(other.to_string())),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl SearchBackend for MemoryBackend {
    async fn upsert_batch(&self, docs: &[IndexDocument]) -> BackendResult<Vec<DocWriteStatus>> {
        let mut state = self.lock();
        state.calls.push(docs.iter().map(|d| d.url.clone()).collect());
        Self::check_outage(&state)?;

        let mut statuses = Vec::with_capacity(docs.len());
        for doc in docs {
            if let Some(remaining) = state.failures.get_mut(&doc.url) {
                if *remaining > 0 {
                    *remaining -= 1;
                    statuses.push(DocWriteStatus::Failed("injected failure".to_string()));
                    continue;
                }
            }

            let unchanged = state
                .docs
                .get(&doc.url)
                .is_some_and(|stored| stored.content_fingerprint == doc.content_fingerprint);
            if unchanged {
                statuses.push(DocWriteStatus::Unchanged);
                continue;
            }

            state.docs.insert(doc.url.clone(), doc.clone());
            *state.writes.entry(doc.url.clone()).or_insert(0) += 1;
            statuses.push(DocWriteStatus::Written);
        }

        Ok(statuses)
    }

    async fn fingerprint(&self, url: &str) -> BackendResult<Option<String>> {
        let state = self.lock();
        Self::check_outage(&state)?;
        Ok(state.docs.get(url).map(|d| d.content_fingerprint.clone()))
    }

    async fn search(&self, term: &str, limit: usize) -> BackendResult<Vec<IndexDocument>> {
        let state = self.lock();
        Self::check_outage(&state)?;
        let mut found: Vec<IndexDocument> = state
            .docs
            .values()
            .filter(|d| d.title.contains(term) || d.content.contains(term))
            .cloned()
            .collect();
        found.sort_by(|a, b| a.url.cmp(&b.url));
        found.truncate(limit);
        Ok(found)
    }

    async fn count(&self) -> BackendResult<u64> {
        let state = self.lock();
        Self::check_outage(&state)?;
        Ok(state.docs.len() as u64)
    }

    async fn ping(&self) -> BackendResult<()> {
        Self::check_outage(&self.lock())
    }
}

/// Blob store holding blobs in a map
#[derive(Debug, Default)]
pub struct MemoryBlobStore {
    blobs: Mutex<HashMap<String, Vec<u8>>>,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.blobs.lock().map(|b| b.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drops a blob, simulating an object store that lost it
    pub fn remove(&self, fingerprint: &str) {
        if let Ok(mut blobs) = self.blobs.lock() {
            blobs.remove(fingerprint);
        }
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn put(&self, fingerprint: &str, bytes: &[u8]) -> BlobResult<bool> {
        check_blob_key(fingerprint)?;
        let mut blobs = self.blobs.lock().unwrap_or_else(|p| p.into_inner());
        if blobs.contains_key(fingerprint) {
            return Ok(false);
        }
        blobs.insert(fingerprint.to_string(), bytes.to_vec());
        Ok(true)
    }

    async fn get(&self, fingerprint: &str) -> BlobResult<Option<Vec<u8>>> {
        check_blob_key(fingerprint)?;
        let blobs = self.blobs.lock().unwrap_or_else(|p| p.into_inner());
        Ok(blobs.get(fingerprint).cloned())
    }

    fn reference(&self, fingerprint: &str) -> String {
        format!("memory://{}", fingerprint)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn doc(url: &str, fingerprint: &str) -> IndexDocument {
        IndexDocument {
            url: url.to_string(),
            title: "T".to_string(),
            content: "C".to_string(),
            domain: "a.test".to_string(),
            crawl_date: Utc::now(),
            content_fingerprint: fingerprint.to_string(),
        }
    }

    #[tokio::test]
    async fn test_injected_failures_are_per_document() {
        let backend = MemoryBackend::new();
        backend.fail_writes("http://a.test/2", 1);

        let statuses = backend
            .upsert_batch(&[doc("http://a.test/1", "f1"), doc("http://a.test/2", "f2")])
            .await
            .unwrap();
        assert_eq!(statuses[0], DocWriteStatus::Written);
        assert!(statuses[1].is_failed());

        let retry = backend.upsert_batch(&[doc("http://a.test/2", "f2")]).await.unwrap();
        assert_eq!(retry, vec![DocWriteStatus::Written]);
        assert_eq!(backend.calls().len(), 2);
    }

    #[tokio::test]
    async fn test_unchanged_fingerprint() {
        let backend = MemoryBackend::new();
        backend.upsert_batch(&[doc("http://a.test/", "f1")]).await.unwrap();
        let statuses = backend.upsert_batch(&[doc("http://a.test/", "f1")]).await.unwrap();

        assert_eq!(statuses, vec![DocWriteStatus::Unchanged]);
        assert_eq!(backend.write_count("http://a.test/"), 1);
    }

    #[tokio::test]
    async fn test_outage() {
        let backend = MemoryBackend::new();
        backend.set_fatal(Some("bad credentials"));
        assert!(backend.ping().await.unwrap_err().is_fatal());

        backend.set_unavailable(Some("overloaded"));
        assert!(!backend.ping().await.unwrap_err().is_fatal());

        backend.set_unavailable(None);
        assert!(backend.ping().await.is_ok());
    }

    #[tokio::test]
    async fn test_blob_write_once() {
        let store = MemoryBlobStore::new();
        let key = "0123456789abcdef";

        assert!(store.put(key, b"first").await.unwrap());
        assert!(!store.put(key, b"second").await.unwrap());
        assert_eq!(store.get(key).await.unwrap(), Some(b"first".to_vec()));
        assert_eq!(store.reference(key), "memory://0123456789abcdef");
    }
}
