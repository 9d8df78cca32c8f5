//! Storage traits for records, review items, and ingestion runs.
//!
//! The storage layer is split into focused traits:
//! - `RecordStore`: Records keyed by a unique fingerprint
//! - `ReviewQueue`: Manual-review items referencing records
//! - `RunLedger`: One row per pipeline invocation
//! - `Storage`: Composite trait combining all three

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::StoreResult;
use crate::types::{
    record::{Record, RecordKind},
    review::ReviewQueueItem,
    run::IngestionRun,
};

/// Result of an insert-if-absent on fingerprint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    Inserted,
    /// A record with the same fingerprint already existed; nothing was written
    Duplicate,
}

/// Store for persisted records.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Whether a record with this fingerprint exists.
    async fn contains_fingerprint(&self, fingerprint: &str) -> StoreResult<bool>;

    /// Insert a record unless its fingerprint is already present.
    ///
    /// Must be atomic: two concurrent inserts of the same fingerprint yield
    /// exactly one `Inserted`.
    async fn insert_record(&self, record: &Record) -> StoreResult<InsertOutcome>;

    /// Get a record by id.
    async fn get_record(&self, id: Uuid) -> StoreResult<Option<Record>>;

    /// Get a record by fingerprint.
    async fn get_record_by_fingerprint(&self, fingerprint: &str) -> StoreResult<Option<Record>>;

    /// Most recent near-duplicate titles for a kind, newest first.
    async fn recent_titles(&self, kind: RecordKind, limit: usize) -> StoreResult<Vec<String>>;

    /// Count stored records.
    async fn count_records(&self) -> StoreResult<usize>;
}

/// Queue of records awaiting manual review.
///
/// The pipeline only ever enqueues; resolving an item is the reviewer's job.
#[async_trait]
pub trait ReviewQueue: Send + Sync {
    /// Add an item. The referenced record must already exist.
    async fn enqueue(&self, item: &ReviewQueueItem) -> StoreResult<()>;

    /// Unreviewed items, highest priority first, then oldest first.
    async fn pending_reviews(&self) -> StoreResult<Vec<ReviewQueueItem>>;

    /// Get an item by id.
    async fn get_review(&self, id: Uuid) -> StoreResult<Option<ReviewQueueItem>>;

    /// Mark an item reviewed.
    ///
    /// Idempotent: a second call leaves the first note and timestamp in place.
    async fn mark_reviewed(&self, id: Uuid, note: Option<&str>) -> StoreResult<ReviewQueueItem>;
}

/// Ledger of ingestion runs.
#[async_trait]
pub trait RunLedger: Send + Sync {
    /// Persist a newly started run.
    async fn start_run(&self, run: &IngestionRun) -> StoreResult<()>;

    /// Persist the final state of a run.
    async fn finish_run(&self, run: &IngestionRun) -> StoreResult<()>;

    /// Get a run by id.
    async fn get_run(&self, id: Uuid) -> StoreResult<Option<IngestionRun>>;
}

/// Composite trait for everything the pipeline persists.
///
/// Automatically implemented for any type that implements all three.
pub trait Storage: RecordStore + ReviewQueue + RunLedger {}

impl<T: RecordStore + ReviewQueue + RunLedger> Storage for T {}
