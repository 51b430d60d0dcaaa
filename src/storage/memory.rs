//! In-memory storage, used for dry runs and tests.

use std::sync::Mutex;

use async_trait::async_trait;

use crate::error::{AppError, Result};
use crate::models::CanonicalRecord;
use crate::pipeline::OpenAction;
use crate::storage::RecordStorage;

/// A record table that lives only as long as the process.
#[derive(Debug)]
pub struct MemoryStorage {
    records: Mutex<Vec<CanonicalRecord>>,
    label: String,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::with_records(Vec::new())
    }

    /// Seed the table, e.g. from a copy of the on-disk store.
    pub fn with_records(records: Vec<CanonicalRecord>) -> Self {
        Self {
            records: Mutex::new(records),
            label: "memory://hackathons".into(),
        }
    }

    /// Current contents of the table.
    pub fn snapshot(&self) -> Vec<CanonicalRecord> {
        self.records
            .lock()
            .map(|records| records.clone())
            .unwrap_or_default()
    }
}

impl Default for MemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RecordStorage for MemoryStorage {
    async fn load(&self) -> Result<Vec<CanonicalRecord>> {
        self.records
            .lock()
            .map(|records| records.clone())
            .map_err(|e| AppError::store_read(e))
    }

    async fn save(&self, records: &[CanonicalRecord]) -> Result<()> {
        let mut guard = self.records.lock().map_err(|e| AppError::store_write(e))?;
        *guard = records.to_vec();
        Ok(())
    }

    fn open_action(&self) -> OpenAction {
        OpenAction::Reference(self.label.clone())
    }
}
