use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A searchable document, keyed by `url`
///
/// Writing a document whose `content_fingerprint` equals the stored one is
/// a no-op.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexDocument {
    pub url: String,
    pub title: String,
    pub content: String,
    pub domain: String,
    pub crawl_date: DateTime<Utc>,
    pub content_fingerprint: String,
}
