use crate::model::IndexDocument;
use crate::queue::RedeliveryHandle;
use std::time::Duration;
use tokio::time::Instant;

/// A document waiting to be written, with the delivery it came from
#[derive(Debug, Clone)]
pub struct PendingDocument {
    pub document: IndexDocument,
    pub handle: RedeliveryHandle,
}

/// Collects documents until the batch is full or its window has elapsed
#[derive(Debug)]
pub struct Batcher {
    size: usize,
    window: Duration,
    pending: Vec<PendingDocument>,
    opened_at: Option<Instant>,
}

impl Batcher {
    pub fn new(size: usize, window: Duration) -> Self {
        Self {
            size: size.max(1),
            window,
            pending: Vec::new(),
            opened_at: None,
        }
    }

    /// Adds a document; the first one opens the window
    pub fn push(&mut self, document: IndexDocument, handle: RedeliveryHandle) {
        if self.pending.is_empty() {
            self.opened_at = Some(Instant::now());
        }
        self.pending.push(PendingDocument { document, handle });
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.pending.len() >= self.size
    }

    /// When the open window closes, if a batch is open
    pub fn deadline(&self) -> Option<Instant> {
        self.opened_at.map(|opened| opened + self.window)
    }

    /// Returns true once the batch is full or its window has closed
    pub fn is_due(&self, now: Instant) -> bool {
        self.is_full() || self.deadline().is_some_and(|deadline| now >= deadline)
    }

    /// Takes the buffered documents and closes the window
    pub fn take(&mut self) -> Vec<PendingDocument> {
        self.opened_at = None;
        std::mem::take(&mut self.pending)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn doc(url: &str) -> IndexDocument {
        IndexDocument {
            url: url.to_string(),
            title: String::new(),
            content: String::new(),
            domain: "a.test".to_string(),
            crawl_date: Utc::now(),
            content_fingerprint: "00000000".to_string(),
        }
    }

    fn handle(id: u64) -> RedeliveryHandle {
        RedeliveryHandle {
            subscription: "indexer".to_string(),
            message_id: id,
            delivery: 1,
        }
    }

    #[test]
    fn test_full_by_count() {
        let mut batcher = Batcher::new(2, Duration::from_secs(60));
        assert!(batcher.deadline().is_none());

        batcher.push(doc("http://a.test/1"), handle(1));
        assert!(!batcher.is_due(Instant::now()));
        batcher.push(doc("http://a.test/2"), handle(2));
        assert!(batcher.is_full());
        assert!(batcher.is_due(Instant::now()));

        let taken = batcher.take();
        assert_eq!(taken.len(), 2);
        assert!(batcher.is_empty());
        assert!(batcher.deadline().is_none());
    }

    #[tokio::test]
    async fn test_due_by_window() {
        let mut batcher = Batcher::new(100, Duration::from_millis(20));
        batcher.push(doc("http://a.test/1"), handle(1));
        let deadline = batcher.deadline().unwrap();

        batcher.push(doc("http://a.test/2"), handle(2));
        assert_eq!(batcher.deadline(), Some(deadline));
        assert!(!batcher.is_due(Instant::now()));

        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(batcher.is_due(Instant::now()));
        assert_eq!(batcher.len(), 2);
    }
}
