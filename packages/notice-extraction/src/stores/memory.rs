//! In-memory storage implementation for testing and development.

use async_trait::async_trait;
use indexmap::IndexMap;
use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use uuid::Uuid;

use crate::error::{StoreError, StoreResult};
use crate::traits::store::{InsertOutcome, RecordStore, ReviewQueue, RunLedger};
use crate::types::{
    record::{Record, RecordKind},
    review::ReviewQueueItem,
    run::IngestionRun,
};

/// In-memory storage for records, review items, and runs.
///
/// Useful for testing and development. Not suitable for production
/// as data is lost on restart.
pub struct MemoryStore {
    /// Records keyed by fingerprint, in insertion order
    records: RwLock<IndexMap<String, Record>>,
    reviews: RwLock<HashMap<Uuid, ReviewQueueItem>>,
    runs: RwLock<HashMap<Uuid, IngestionRun>>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

fn read<T>(lock: &RwLock<T>) -> StoreResult<RwLockReadGuard<'_, T>> {
    lock.read()
        .map_err(|_| StoreError::Unavailable("memory store lock poisoned".into()))
}

fn write<T>(lock: &RwLock<T>) -> StoreResult<RwLockWriteGuard<'_, T>> {
    lock.write()
        .map_err(|_| StoreError::Unavailable("memory store lock poisoned".into()))
}

impl MemoryStore {
    /// Create a new empty memory store.
    pub fn new() -> Self {
        Self {
            records: RwLock::new(IndexMap::new()),
            reviews: RwLock::new(HashMap::new()),
            runs: RwLock::new(HashMap::new()),
        }
    }

    /// All stored records in insertion order.
    pub fn records(&self) -> StoreResult<Vec<Record>> {
        Ok(read(&self.records)?.values().cloned().collect())
    }

    /// Get the number of review items, reviewed or not.
    pub fn review_count(&self) -> StoreResult<usize> {
        Ok(read(&self.reviews)?.len())
    }

    /// Clear all stored data.
    pub fn clear(&self) -> StoreResult<()> {
        write(&self.records)?.clear();
        write(&self.reviews)?.clear();
        write(&self.runs)?.clear();
        Ok(())
    }
}

#[async_trait]
impl RecordStore for MemoryStore {
    async fn contains_fingerprint(&self, fingerprint: &str) -> StoreResult<bool> {
        Ok(read(&self.records)?.contains_key(fingerprint))
    }

    async fn insert_record(&self, record: &Record) -> StoreResult<InsertOutcome> {
        // Check and insert under one write lock
        let mut records = write(&self.records)?;
        if records.contains_key(&record.fingerprint) {
            return Ok(InsertOutcome::Duplicate);
        }
        records.insert(record.fingerprint.clone(), record.clone());
        Ok(InsertOutcome::Inserted)
    }

    async fn get_record(&self, id: Uuid) -> StoreResult<Option<Record>> {
        Ok(read(&self.records)?.values().find(|r| r.id == id).cloned())
    }

    async fn get_record_by_fingerprint(&self, fingerprint: &str) -> StoreResult<Option<Record>> {
        Ok(read(&self.records)?.get(fingerprint).cloned())
    }

    async fn recent_titles(&self, kind: RecordKind, limit: usize) -> StoreResult<Vec<String>> {
        Ok(read(&self.records)?
            .values()
            .rev()
            .filter(|r| r.kind() == kind)
            .filter_map(|r| r.body.near_duplicate_title().map(str::to_string))
            .take(limit)
            .collect())
    }

    async fn count_records(&self) -> StoreResult<usize> {
        Ok(read(&self.records)?.len())
    }
}

#[async_trait]
impl ReviewQueue for MemoryStore {
    async fn enqueue(&self, item: &ReviewQueueItem) -> StoreResult<()> {
        let exists = read(&self.records)?
            .values()
            .any(|r| r.id == item.record_id);
        if !exists {
            return Err(StoreError::NotFound(format!("record {}", item.record_id)));
        }
        write(&self.reviews)?.insert(item.id, item.clone());
        Ok(())
    }

    async fn pending_reviews(&self) -> StoreResult<Vec<ReviewQueueItem>> {
        let mut pending: Vec<_> = read(&self.reviews)?
            .values()
            .filter(|i| !i.reviewed)
            .cloned()
            .collect();
        pending.sort_by(|a, b| {
            b.priority
                .cmp(&a.priority)
                .then(a.created_at.cmp(&b.created_at))
        });
        Ok(pending)
    }

    async fn get_review(&self, id: Uuid) -> StoreResult<Option<ReviewQueueItem>> {
        Ok(read(&self.reviews)?.get(&id).cloned())
    }

    async fn mark_reviewed(&self, id: Uuid, note: Option<&str>) -> StoreResult<ReviewQueueItem> {
        let mut reviews = write(&self.reviews)?;
        let item = reviews
            .get_mut(&id)
            .ok_or_else(|| StoreError::NotFound(format!("review item {id}")))?;
        item.mark_reviewed(note.map(str::to_string));
        Ok(item.clone())
    }
}

#[async_trait]
impl RunLedger for MemoryStore {
    async fn start_run(&self, run: &IngestionRun) -> StoreResult<()> {
        write(&self.runs)?.insert(run.id, run.clone());
        Ok(())
    }

    async fn finish_run(&self, run: &IngestionRun) -> StoreResult<()> {
        let mut runs = write(&self.runs)?;
        if !runs.contains_key(&run.id) {
            return Err(StoreError::NotFound(format!("run {}", run.id)));
        }
        runs.insert(run.id, run.clone());
        Ok(())
    }

    async fn get_run(&self, id: Uuid) -> StoreResult<Option<IngestionRun>> {
        Ok(read(&self.runs)?.get(&id).cloned())
    }
}
