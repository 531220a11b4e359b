//! Filesystem blob store
//!
//! Blobs live at `<root>/<first two hex chars>/<fingerprint>`. A blob is
//! written to a temporary file and renamed into place, so readers never
//! see a partial blob and concurrent writers of the same fingerprint
//! converge on one file.

use crate::storage::traits::{check_blob_key, BlobResult, BlobStore};
use async_trait::async_trait;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Blob store backed by a local directory
#[derive(Debug, Clone)]
pub struct FsBlobStore {
    root: PathBuf,
}

impl FsBlobStore {
    /// Opens a store rooted at `root`, creating the directory if needed
    pub fn open(root: &Path) -> BlobResult<Self> {
        std::fs::create_dir_all(root)?;
        Ok(Self {
            root: root.to_path_buf(),
        })
    }

    fn path_for(&self, fingerprint: &str) -> PathBuf {
        self.root.join(&fingerprint[..2]).join(fingerprint)
    }
}

#[async_trait]
impl BlobStore for FsBlobStore {
    async fn put(&self, fingerprint: &str, bytes: &[u8]) -> BlobResult<bool> {
        check_blob_key(fingerprint)?;
        let path = self.path_for(fingerprint);

        if tokio::fs::try_exists(&path).await? {
            return Ok(false);
        }

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let tmp = path.with_extension(format!("tmp-{}", uuid::Uuid::new_v4().simple()));
        tokio::fs::write(&tmp, bytes).await?;
        tokio::fs::rename(&tmp, &path).await?;

        debug!(fingerprint = fingerprint, bytes = bytes.len(), "Blob stored");
        Ok(true)
    }

    async fn get(&self, fingerprint: &str) -> BlobResult<Option<Vec<u8>>> {
        check_blob_key(fingerprint)?;
        match tokio::fs::read(self.path_for(fingerprint)).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn reference(&self, fingerprint: &str) -> String {
        self.path_for(fingerprint).display().to_string()
    }
}
