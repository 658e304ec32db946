//! Local filesystem storage implementation.
//!
//! A single-writer JSON document store. Writes go to a temp file first and
//! are renamed into place, so a crash mid-write leaves the previous document
//! intact instead of a truncated one.

use std::path::PathBuf;

use async_trait::async_trait;
use serde::Serialize;
use tokio::io::AsyncWriteExt;

use crate::error::{AppError, Result};
use crate::storage::{RecordStorage, StoreDocument};

/// Name of the store document inside the storage directory.
const STORE_FILE: &str = "donations.json";

/// Local filesystem storage backend.
#[derive(Clone)]
pub struct LocalStorage {
    root_dir: PathBuf,
    source_tag: String,
}

impl LocalStorage {
    /// Create a new LocalStorage rooted at the given directory.
    pub fn new(root_dir: impl Into<PathBuf>, source_tag: impl Into<String>) -> Self {
        Self {
            root_dir: root_dir.into(),
            source_tag: source_tag.into(),
        }
    }

    /// Get the full path for a relative key.
    fn path(&self, key: &str) -> PathBuf {
        self.root_dir.join(key)
    }

    /// Ensure parent directory exists.
    async fn ensure_dir(&self, path: &PathBuf) -> Result<()> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        Ok(())
    }

    /// Write bytes atomically (write to temp, then rename).
    async fn write_bytes(&self, key: &str, bytes: &[u8]) -> Result<()> {
        let path = self.path(key);
        self.ensure_dir(&path).await?;

        let tmp = path.with_extension("tmp");
        let mut file = tokio::fs::File::create(&tmp).await?;
        file.write_all(bytes).await?;
        file.flush().await?;
        drop(file);

        tokio::fs::rename(&tmp, &path).await?;
        Ok(())
    }

    /// Write JSON data.
    async fn write_json<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> Result<()> {
        let bytes = serde_json::to_vec_pretty(value)?;
        self.write_bytes(key, &bytes).await
    }

    /// Read bytes, returning None if the file doesn't exist.
    async fn read_bytes(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let path = self.path(key);
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(AppError::Io(e)),
        }
    }
}

#[async_trait]
impl RecordStorage for LocalStorage {
    async fn load_store(&self) -> Result<StoreDocument> {
        match self.read_bytes(STORE_FILE).await? {
            None => {
                log::debug!("No {} yet, starting from an empty store", STORE_FILE);
                Ok(StoreDocument::empty(&self.source_tag))
            }
            Some(bytes) => match serde_json::from_slice::<StoreDocument>(&bytes) {
                Ok(document) => Ok(document),
                Err(e) => {
                    // Accepted data-loss path: a corrupt store reads as empty
                    // rather than wedging the loop.
                    log::warn!("{} is unreadable ({}), treating as empty store", STORE_FILE, e);
                    Ok(StoreDocument::empty(&self.source_tag))
                }
            },
        }
    }

    async fn write_store(&self, document: &StoreDocument) -> Result<()> {
        self.write_json(STORE_FILE, document).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::DonationRecord;
    use tempfile::TempDir;

    fn make_record(id: &str, timestamp: &str) -> DonationRecord {
        DonationRecord {
            id: id.to_string(),
            timestamp: timestamp.to_string(),
            donor_name: "팬1".to_string(),
            amount: 100,
            target_name: String::new(),
            message: String::new(),
            cancelled: false,
        }
    }

    #[tokio::test]
    async fn test_write_and_read_roundtrip() {
        let tmp = TempDir::new().unwrap();
        let storage = LocalStorage::new(tmp.path(), "test");

        let document = StoreDocument::new(
            vec![make_record("a", "2025-12-13 10:00:00")],
            "test",
        );
        storage.write_store(&document).await.unwrap();

        let loaded = storage.load_store().await.unwrap();
        assert!(loaded.success);
        assert_eq!(loaded.data.len(), 1);
        assert_eq!(loaded.data[0].id, "a");
        assert_eq!(loaded.source, "test");
    }

    #[tokio::test]
    async fn test_missing_store_reads_empty() {
        let tmp = TempDir::new().unwrap();
        let storage = LocalStorage::new(tmp.path(), "test");

        let loaded = storage.load_store().await.unwrap();
        assert!(loaded.data.is_empty());
        assert_eq!(loaded.source, "test");
    }

    #[tokio::test]
    async fn test_corrupt_store_reads_empty() {
        let tmp = TempDir::new().unwrap();
        let storage = LocalStorage::new(tmp.path(), "test");

        tokio::fs::write(tmp.path().join(STORE_FILE), b"{ truncated")
            .await
            .unwrap();

        let loaded = storage.load_store().await.unwrap();
        assert!(loaded.data.is_empty());
    }

    #[tokio::test]
    async fn test_write_leaves_no_temp_file() {
        let tmp = TempDir::new().unwrap();
        let storage = LocalStorage::new(tmp.path(), "test");

        let document = StoreDocument::empty("test");
        storage.write_store(&document).await.unwrap();

        assert!(tmp.path().join(STORE_FILE).exists());
        assert!(!tmp.path().join("donations.tmp").exists());
    }
}
