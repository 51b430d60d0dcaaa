//! Storage abstractions for the canonical record table.
//!
//! The pipeline only needs two things from a backend: load every stored
//! record, and replace the whole table atomically.
//!
//! ## Table Layout
//!
//! ```text
//! {
//!   "updated_at": "...",
//!   "count": 2,
//!   "rows": [
//!     { "Name", "Platform", "URL", "StartDate", "EndDate",
//!       "Tags", "DiscoveredAt", "LastSeenAt" },
//!     ...
//!   ]
//! }
//! ```

pub mod local;
pub mod lock;
pub mod memory;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::models::{CanonicalRecord, StoredRow};
use crate::pipeline::OpenAction;

// Re-export for convenience
pub use local::LocalStorage;
pub use lock::StoreLock;
pub use memory::MemoryStorage;

/// Envelope written to disk around the row table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreDocument {
    /// Latest `LastSeenAt` in the table
    pub updated_at: DateTime<Utc>,
    /// Total row count
    pub count: usize,
    /// One row per canonical record
    pub rows: Vec<StoredRow>,
}

impl StoreDocument {
    pub fn new(records: &[CanonicalRecord]) -> Self {
        let updated_at = records
            .iter()
            .map(|r| r.last_seen_at)
            .max()
            .unwrap_or_else(Utc::now);
        Self {
            updated_at,
            count: records.len(),
            rows: records.iter().map(StoredRow::from).collect(),
        }
    }
}

/// Trait for record storage backends.
#[async_trait]
pub trait RecordStorage: Send + Sync {
    /// Load every stored record.
    ///
    /// A missing table is an empty store. Any other failure is a
    /// `StoreRead` error.
    async fn load(&self) -> Result<Vec<CanonicalRecord>>;

    /// Replace the table with `records`.
    ///
    /// All-or-nothing: on a `StoreWrite` error the previous table is intact.
    async fn save(&self, records: &[CanonicalRecord]) -> Result<()>;

    /// How a user opens the full listing.
    fn open_action(&self) -> OpenAction;

    /// Take the run lock for this table.
    ///
    /// `Ok(None)` means another process is running against it.
    fn try_lock(&self) -> Result<Option<StoreLock>> {
        Ok(Some(StoreLock::in_process()))
    }
}
