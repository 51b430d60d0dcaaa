// src/pipeline/dedup.rs

//! Identity-based change detection against the persisted table.
//!
//! The protocol is read, decide, write: [`DedupStore::diff`] is a pure
//! comparison by identity key and [`DedupStore::commit`] is the only
//! operation that mutates anything.

use std::collections::HashMap;

use serde::Serialize;

use crate::error::{AppError, Result};
use crate::models::CanonicalRecord;
use crate::storage::RecordStorage;

/// Candidates split into never-seen and already-known.
#[derive(Debug, Clone, Default, Serialize)]
pub struct DedupDiff {
    /// Records with an identity key not in the store, in candidate order
    pub added: Vec<CanonicalRecord>,
    /// Fresh sightings of records already in the store
    pub refreshed: Vec<CanonicalRecord>,
}

impl DedupDiff {
    pub fn has_new(&self) -> bool {
        !self.added.is_empty()
    }

    /// Distinct identities across both halves.
    pub fn candidate_count(&self) -> usize {
        self.added.len() + self.refreshed.len()
    }
}

/// The previously committed record set, keyed by identity.
#[derive(Debug, Clone, Default)]
pub struct DedupStore {
    records: Vec<CanonicalRecord>,
    index: HashMap<String, usize>,
}

impl DedupStore {
    /// Load the committed set. Any failure here is a `StoreRead` error.
    pub async fn load(storage: &dyn RecordStorage) -> Result<Self> {
        let records = storage.load().await.map_err(|e| match e {
            AppError::StoreRead(_) => e,
            other => AppError::store_read(other),
        })?;
        Ok(Self::from_records(records))
    }

    /// Build from raw rows, folding any duplicate identities together.
    pub fn from_records(records: Vec<CanonicalRecord>) -> Self {
        let mut store = Self::default();
        for record in records {
            match store.index.get(&record.identity_key) {
                Some(&pos) => {
                    log::warn!(
                        "Duplicate identity {} in store; merging rows",
                        record.identity_key
                    );
                    let existing = &mut store.records[pos];
                    existing.discovered_at = existing.discovered_at.min(record.discovered_at);
                    if record.last_seen_at > existing.last_seen_at {
                        existing.refresh_from(&record);
                    }
                }
                None => {
                    store
                        .index
                        .insert(record.identity_key.clone(), store.records.len());
                    store.records.push(record);
                }
            }
        }
        store
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn records(&self) -> &[CanonicalRecord] {
        &self.records
    }

    pub fn get(&self, identity_key: &str) -> Option<&CanonicalRecord> {
        self.index.get(identity_key).map(|&pos| &self.records[pos])
    }

    /// Split candidates into new and known by identity key.
    ///
    /// Candidates repeating a key within the batch are folded into the
    /// first occurrence. Does not touch the store.
    pub fn diff(&self, candidates: &[CanonicalRecord]) -> DedupDiff {
        let mut batch: Vec<CanonicalRecord> = Vec::with_capacity(candidates.len());
        let mut batch_index: HashMap<&str, usize> = HashMap::new();

        for candidate in candidates {
            match batch_index.get(candidate.identity_key.as_str()) {
                Some(&pos) => batch[pos].absorb(candidate),
                None => {
                    batch_index.insert(candidate.identity_key.as_str(), batch.len());
                    batch.push(candidate.clone());
                }
            }
        }

        let (refreshed, added): (Vec<_>, Vec<_>) = batch
            .into_iter()
            .partition(|c| self.index.contains_key(&c.identity_key));

        DedupDiff { added, refreshed }
    }

    /// Persist `diff` merged into the committed set.
    ///
    /// New records keep their sighting time as `discovered_at`; known ones
    /// keep theirs and only have fields and `last_seen_at` refreshed. If
    /// saving fails the in-memory set is left exactly as it was.
    pub async fn commit(&mut self, diff: &DedupDiff, storage: &dyn RecordStorage) -> Result<()> {
        let mut merged = self.clone();
        for record in diff.refreshed.iter().chain(&diff.added) {
            merged.upsert(record);
        }

        storage.save(&merged.records).await.map_err(|e| match e {
            AppError::StoreWrite(_) => e,
            other => AppError::store_write(other),
        })?;

        *self = merged;
        Ok(())
    }

    /// Refresh the row with `record`'s identity, or append it.
    fn upsert(&mut self, record: &CanonicalRecord) {
        match self.index.get(&record.identity_key) {
            Some(&pos) => self.records[pos].refresh_from(record),
            None => {
                self.index
                    .insert(record.identity_key.clone(), self.records.len());
                self.records.push(record.clone());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Platform, RawItem};
    use crate::pipeline::OpenAction;
    use crate::pipeline::canonicalize::canonicalize;
    use crate::storage::MemoryStorage;
    use async_trait::async_trait;
    use chrono::{DateTime, TimeZone, Utc};

    fn at(day: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 2, day, 6, 0, 0).unwrap()
    }

    fn sighting(slug: &str, seen: DateTime<Utc>) -> CanonicalRecord {
        let raw = RawItem::new(Platform::Devpost, slug.to_uppercase())
            .with_url(format!("https://x.com/{slug}"))
            .with_start_date("2025-03-01");
        canonicalize(&raw, seen).unwrap()
    }

    struct BrokenStorage;

    #[async_trait]
    impl RecordStorage for BrokenStorage {
        async fn load(&self) -> Result<Vec<CanonicalRecord>> {
            Err(AppError::Io(std::io::Error::other("disk gone")))
        }
        async fn save(&self, _records: &[CanonicalRecord]) -> Result<()> {
            Err(AppError::Io(std::io::Error::other("disk full")))
        }
        fn open_action(&self) -> OpenAction {
            OpenAction::Reference("broken".into())
        }
    }

    #[test]
    fn test_diff_against_empty_store() {
        let store = DedupStore::default();
        let diff = store.diff(&[sighting("e1", at(1)), sighting("e2", at(1))]);
        assert_eq!(diff.added.len(), 2);
        assert!(diff.refreshed.is_empty());
        assert!(store.is_empty());
    }

    #[test]
    fn test_diff_splits_known_and_new() {
        let store = DedupStore::from_records(vec![sighting("e1", at(1))]);
        let diff = store.diff(&[sighting("e1", at(2)), sighting("e2", at(2))]);

        assert_eq!(diff.refreshed.len(), 1);
        assert_eq!(diff.refreshed[0].identity_key, "url:https://x.com/e1");
        assert_eq!(diff.added.len(), 1);
        assert_eq!(diff.added[0].identity_key, "url:https://x.com/e2");
    }

    #[test]
    fn test_diff_folds_batch_duplicates() {
        let store = DedupStore::default();
        let mut a = sighting("e1", at(1));
        a.tags.insert("ai".into());
        let mut b = sighting("e1", at(1));
        b.tags.insert("web3".into());

        let diff = store.diff(&[a, b]);
        assert_eq!(diff.added.len(), 1);
        assert_eq!(diff.candidate_count(), 1);
        assert!(diff.added[0].tags.contains("ai"));
        assert!(diff.added[0].tags.contains("web3"));
    }

    #[tokio::test]
    async fn test_commit_preserves_discovered_at() {
        let storage = MemoryStorage::new();
        let mut store = DedupStore::load(&storage).await.unwrap();

        let diff = store.diff(&[sighting("e1", at(1))]);
        store.commit(&diff, &storage).await.unwrap();

        let diff = store.diff(&[sighting("e1", at(3))]);
        assert!(!diff.has_new());
        store.commit(&diff, &storage).await.unwrap();

        let stored = DedupStore::load(&storage).await.unwrap();
        let record = stored.get("url:https://x.com/e1").unwrap();
        assert_eq!(record.discovered_at, at(1));
        assert_eq!(record.last_seen_at, at(3));
        assert_eq!(stored.len(), 1);
    }

    #[tokio::test]
    async fn test_exactly_one_record_per_identity_over_many_runs() {
        let storage = MemoryStorage::new();
        let runs: [&[&str]; 4] = [&["a", "b"], &["b", "c"], &["a", "c", "d"], &["d", "d"]];
        let first_seen = [("a", 1), ("b", 1), ("c", 2), ("d", 3)];

        for (i, slugs) in runs.iter().enumerate() {
            let now = at(i as u32 + 1);
            let mut store = DedupStore::load(&storage).await.unwrap();
            let candidates: Vec<_> = slugs.iter().map(|s| sighting(s, now)).collect();
            let diff = store.diff(&candidates);
            store.commit(&diff, &storage).await.unwrap();
        }

        let store = DedupStore::load(&storage).await.unwrap();
        assert_eq!(store.len(), 4);
        for (slug, day) in first_seen {
            let key = format!("url:https://x.com/{slug}");
            assert_eq!(store.get(&key).unwrap().discovered_at, at(day), "{slug}");
        }
    }

    #[tokio::test]
    async fn test_committing_a_diff_twice_keeps_one_row() {
        let storage = MemoryStorage::new();
        let mut store = DedupStore::load(&storage).await.unwrap();
        let diff = store.diff(&[sighting("e1", at(1))]);

        store.commit(&diff, &storage).await.unwrap();
        store.commit(&diff, &storage).await.unwrap();

        assert_eq!(store.len(), 1);
        assert_eq!(storage.snapshot().len(), 1);
        assert_eq!(store.get("url:https://x.com/e1").unwrap().discovered_at, at(1));
    }

    #[tokio::test]
    async fn test_load_failure_is_store_read_error() {
        let err = DedupStore::load(&BrokenStorage).await.unwrap_err();
        assert!(matches!(err, AppError::StoreRead(_)));
    }

    #[tokio::test]
    async fn test_failed_commit_leaves_store_untouched() {
        let mut store = DedupStore::from_records(vec![sighting("e1", at(1))]);
        let diff = store.diff(&[sighting("e1", at(2)), sighting("e2", at(2))]);

        let err = store.commit(&diff, &BrokenStorage).await.unwrap_err();
        assert!(matches!(err, AppError::StoreWrite(_)));
        assert_eq!(store.len(), 1);
        assert_eq!(
            store.get("url:https://x.com/e1").unwrap().last_seen_at,
            at(1)
        );
    }

    #[test]
    fn test_duplicate_rows_are_healed_on_load() {
        let mut older = sighting("e1", at(1));
        older.last_seen_at = at(2);
        let newer = sighting("e1", at(4));

        let store = DedupStore::from_records(vec![newer, older]);
        assert_eq!(store.len(), 1);
        let record = store.get("url:https://x.com/e1").unwrap();
        assert_eq!(record.discovered_at, at(1));
        assert_eq!(record.last_seen_at, at(4));
    }
}
