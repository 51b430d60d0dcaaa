//! Local filesystem storage implementation.
//!
//! Keeps the record table in a single pretty-printed JSON file. Writes go
//! to a sibling `.tmp` file that is renamed over the table, so a failed
//! write never truncates the previous version.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;

use crate::error::{AppError, Result};
use crate::models::CanonicalRecord;
use crate::pipeline::OpenAction;
use crate::storage::{RecordStorage, StoreDocument, StoreLock};

/// Local filesystem storage backend.
#[derive(Debug, Clone)]
pub struct LocalStorage {
    path: PathBuf,
}

impl LocalStorage {
    /// Create a LocalStorage backed by the given table file.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn tmp_path(&self) -> PathBuf {
        self.path.with_extension("tmp")
    }

    /// Lock file guarding runs against this table.
    pub fn lock_path(&self) -> PathBuf {
        self.path.with_extension("lock")
    }

    /// Write bytes atomically (write to temp, then rename).
    async fn write_bytes(&self, bytes: &[u8]) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let tmp = self.tmp_path();
        let mut file = tokio::fs::File::create(&tmp).await?;
        file.write_all(bytes).await?;
        file.flush().await?;
        file.sync_all().await?;
        drop(file);

        tokio::fs::rename(&tmp, &self.path).await?;
        Ok(())
    }

    /// Read bytes, returning None if the file doesn't exist.
    async fn read_bytes(&self) -> Result<Option<Vec<u8>>> {
        match tokio::fs::read(&self.path).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(AppError::Io(e)),
        }
    }
}

#[async_trait]
impl RecordStorage for LocalStorage {
    async fn load(&self) -> Result<Vec<CanonicalRecord>> {
        let bytes = match self.read_bytes().await {
            Ok(Some(bytes)) => bytes,
            Ok(None) => {
                log::info!("No store at {}; starting empty", self.path.display());
                return Ok(Vec::new());
            }
            Err(e) => return Err(AppError::store_read(format!("{}: {}", self.path.display(), e))),
        };

        let document: StoreDocument = serde_json::from_slice(&bytes)
            .map_err(|e| AppError::store_read(format!("{}: {}", self.path.display(), e)))?;

        let records = document
            .rows
            .into_iter()
            .map(|row| row.into_record())
            .collect::<Result<Vec<_>>>()?;

        log::debug!("Loaded {} records from {}", records.len(), self.path.display());
        Ok(records)
    }

    async fn save(&self, records: &[CanonicalRecord]) -> Result<()> {
        let bytes = serde_json::to_vec_pretty(&StoreDocument::new(records))?;

        if let Err(e) = self.write_bytes(&bytes).await {
            let _ = tokio::fs::remove_file(self.tmp_path()).await;
            return Err(AppError::store_write(format!("{}: {}", self.path.display(), e)));
        }

        log::info!("Saved {} records to {}", records.len(), self.path.display());
        Ok(())
    }

    fn open_action(&self) -> OpenAction {
        let path = std::path::absolute(&self.path).unwrap_or_else(|_| self.path.clone());
        OpenAction::Path(path)
    }

    fn try_lock(&self) -> Result<Option<StoreLock>> {
        StoreLock::try_acquire(&self.lock_path())
    }
}
