//! SQLite search backend
//!
//! This module provides the embedded implementation of [`SearchBackend`].
//! rusqlite is blocking, so every call runs on tokio's blocking pool.

use crate::model::IndexDocument;
use crate::storage::schema::initialize_schema;
use crate::storage::traits::{BackendError, BackendResult, DocWriteStatus, SearchBackend};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Arc, Mutex};

/// SQLite search backend
#[derive(Clone)]
pub struct SqliteBackend {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteBackend {
    /// Opens (or creates) the index database at `path`
    ///
    /// # Returns
    ///
    /// * `Ok(SqliteBackend)` - Successfully opened/created database
    /// * `Err(BackendError)` - Failed to open database; always fatal
    pub fn open(path: &Path) -> BackendResult<Self> {
        let conn = Connection::open(path).map_err(|e| {
            BackendError::Fatal(format!("cannot open {}: {}", path.display(), e))
        })?;

        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA temp_store = MEMORY;
        ",
        )?;

        initialize_schema(&conn)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Creates an in-memory database
    pub fn open_in_memory() -> BackendResult<Self> {
        let conn = Connection::open_in_memory()?;
        initialize_schema(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Runs `f` with the connection on the blocking pool
    async fn with_conn<T, F>(&self, f: F) -> BackendResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection) -> BackendResult<T> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let mut guard = conn
                .lock()
                .map_err(|_| BackendError::Task("connection mutex poisoned".to_string()))?;
            f(&mut guard)
        })
        .await
        .map_err(|e| BackendError::Task(e.to_string()))?
    }
}

/// Writes one document unless its fingerprint is already stored
fn upsert_one(conn: &Connection, doc: &IndexDocument, now: &str) -> rusqlite::Result<DocWriteStatus> {
    let changed = conn.execute(
        "INSERT INTO documents
             (url, title, content, domain, crawl_date, content_fingerprint, indexed_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
         ON CONFLICT(url) DO UPDATE SET
             title = excluded.title,
             content = excluded.content,
             domain = excluded.domain,
             crawl_date = excluded.crawl_date,
             content_fingerprint = excluded.content_fingerprint,
             indexed_at = excluded.indexed_at
         WHERE documents.content_fingerprint <> excluded.content_fingerprint",
        params![
            doc.url,
            doc.title,
            doc.content,
            doc.domain,
            doc.crawl_date.to_rfc3339(),
            doc.content_fingerprint,
            now,
        ],
    )?;

    Ok(if changed == 0 {
        DocWriteStatus::Unchanged
    } else {
        DocWriteStatus::Written
    })
}

fn row_to_document(row: &rusqlite::Row<'_>) -> rusqlite::Result<IndexDocument> {
    let crawl_date: String = row.get(4)?;
    let crawl_date = DateTime::parse_from_rfc3339(&crawl_date)
        .map(|d| d.with_timezone(&Utc))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(4, rusqlite::types::Type::Text, Box::new(e))
        })?;

    Ok(IndexDocument {
        url: row.get(0)?,
        title: row.get(1)?,
        content: row.get(2)?,
        domain: row.get(3)?,
        crawl_date,
        content_fingerprint: row.get(5)?,
    })
}

#[async_trait]
impl SearchBackend for SqliteBackend {
    async fn upsert_batch(&self, docs: &[IndexDocument]) -> BackendResult<Vec<DocWriteStatus>> {
        let docs = docs.to_vec();
        self.with_conn(move |conn| {
            let now = Utc::now().to_rfc3339();
            let tx = conn.transaction()?;
            let statuses = docs
                .iter()
                .map(|doc| {
                    upsert_one(&tx, doc, &now)
                        .unwrap_or_else(|e| DocWriteStatus::Failed(e.to_string()))
                })
                .collect();
            tx.commit()?;
            Ok(statuses)
        })
        .await
    }

    async fn fingerprint(&self, url: &str) -> BackendResult<Option<String>> {
        let url = url.to_string();
        self.with_conn(move |conn| {
            Ok(conn
                .query_row(
                    "SELECT content_fingerprint FROM documents WHERE url = ?1",
                    params![url],
                    |row| row.get(0),
                )
                .optional()?)
        })
        .await
    }

    async fn search(&self, term: &str, limit: usize) -> BackendResult<Vec<IndexDocument>> {
        let pattern = format!("%{}%", term);
        self.with_conn(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT url, title, content, domain, crawl_date, content_fingerprint
                 FROM documents
                 WHERE title LIKE ?1 OR content LIKE ?1
                 ORDER BY url
                 LIMIT ?2",
            )?;
            let docs = stmt
                .query_map(params![pattern, limit as i64], row_to_document)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(docs)
        })
        .await
    }

    async fn count(&self) -> BackendResult<u64> {
        self.with_conn(|conn| {
            let count: i64 = conn.query_row("SELECT COUNT(*) FROM documents", [], |row| row.get(0))?;
            Ok(count as u64)
        })
        .await
    }

    async fn ping(&self) -> BackendResult<()> {
        self.with_conn(|conn| {
            conn.query_row("SELECT 1", [], |row| row.get::<_, i64>(0))?;
            Ok(())
        })
        .await
    }
}
