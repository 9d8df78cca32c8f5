//! Testing utilities including mock implementations.
//!
//! These are useful for testing applications that use the pipeline without
//! making real oracle calls or reaching a database.

use async_trait::async_trait;
use serde_json::json;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, RwLock};
use uuid::Uuid;

use crate::error::{OracleError, OracleResult, StoreError, StoreResult};
use crate::stores::MemoryStore;
use crate::traits::oracle::{InstructionProfile, Oracle, OracleRequest, OracleResponse};
use crate::traits::store::{InsertOutcome, RecordStore, ReviewQueue, RunLedger};
use crate::types::{
    record::{Record, RecordKind},
    review::ReviewQueueItem,
    run::IngestionRun,
};

/// A mock oracle for testing.
///
/// Scripted responses are served first, in order. Once the script runs out
/// the mock answers every request with a well-formed array of the right
/// length for the request's profile.
#[derive(Clone)]
pub struct MockOracle {
    /// Responses served before falling back to the default responder
    script: Arc<RwLock<VecDeque<OracleResult<String>>>>,

    /// Tokens reported for every successful call
    tokens_per_call: u32,

    /// Call tracking for assertions
    calls: Arc<RwLock<Vec<MockOracleCall>>>,
}

/// Record of a call made to the mock oracle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MockOracleCall {
    pub profile: InstructionProfile,
    pub item_count: usize,
    pub max_output_tokens: usize,
}

impl Default for MockOracle {
    fn default() -> Self {
        Self::new()
    }
}

impl MockOracle {
    /// Create a mock that answers every request with valid defaults.
    pub fn new() -> Self {
        Self {
            script: Arc::new(RwLock::new(VecDeque::new())),
            tokens_per_call: 100,
            calls: Arc::new(RwLock::new(Vec::new())),
        }
    }

    /// Queue a raw response body.
    pub fn with_response(self, body: impl Into<String>) -> Self {
        self.script.write().unwrap().push_back(Ok(body.into()));
        self
    }

    /// Queue a failure.
    pub fn with_error(self, error: OracleError) -> Self {
        self.script.write().unwrap().push_back(Err(error));
        self
    }

    /// Queue the same failure `n` times.
    pub fn with_errors(self, error: OracleError, n: usize) -> Self {
        let mut script = self.script.write().unwrap();
        for _ in 0..n {
            script.push_back(Err(error.clone()));
        }
        drop(script);
        self
    }

    /// Set the token count reported per call.
    pub fn with_tokens_per_call(mut self, tokens: u32) -> Self {
        self.tokens_per_call = tokens;
        self
    }

    /// Get all calls made to this mock.
    pub fn calls(&self) -> Vec<MockOracleCall> {
        self.calls.read().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.read().unwrap().len()
    }

    /// Generate a valid response for a request.
    fn default_response(&self, request: &OracleRequest) -> String {
        let results: Vec<_> = request
            .items
            .iter()
            .enumerate()
            .map(|(i, _)| match request.profile {
                InstructionProfile::Classification => json!({
                    "relevant": true,
                    "category": "litigation",
                    "summary": format!("Mock summary of item {}", i + 1),
                    "risk_signals": ["litigation"],
                    "entities": [],
                    "confidence": 0.9
                }),
                InstructionProfile::NoticeExtraction => json!({
                    "company_name": null,
                    "liquidation_type": null,
                    "liquidator_names": [],
                    "resolution_date": null,
                    "final_meeting_date": null,
                    "claims_deadline": null,
                    "confidence": 0.5
                }),
            })
            .collect();
        serde_json::Value::Array(results).to_string()
    }
}

#[async_trait]
impl Oracle for MockOracle {
    async fn complete(&self, request: &OracleRequest) -> OracleResult<OracleResponse> {
        self.calls.write().unwrap().push(MockOracleCall {
            profile: request.profile,
            item_count: request.items.len(),
            max_output_tokens: request.max_output_tokens,
        });

        // Return scripted response or generate default
        let scripted = self.script.write().unwrap().pop_front();
        let body = match scripted {
            Some(result) => result?,
            None => self.default_response(request),
        };
        Ok(OracleResponse::new(body, self.tokens_per_call))
    }

    fn name(&self) -> &str {
        "mock"
    }
}

/// A store whose record and review operations fail as unreachable.
///
/// The run ledger is kept in memory so tests can inspect how a run was
/// finalized after a storage outage.
#[derive(Default)]
pub struct FailingStore {
    ledger: MemoryStore,
}

impl FailingStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn unavailable<T>() -> StoreResult<T> {
        Err(StoreError::Unavailable("mock connection refused".into()))
    }
}

#[async_trait]
impl RecordStore for FailingStore {
    async fn contains_fingerprint(&self, _fingerprint: &str) -> StoreResult<bool> {
        Self::unavailable()
    }

    async fn insert_record(&self, _record: &Record) -> StoreResult<InsertOutcome> {
        Self::unavailable()
    }

    async fn get_record(&self, _id: Uuid) -> StoreResult<Option<Record>> {
        Self::unavailable()
    }

    async fn get_record_by_fingerprint(&self, _fingerprint: &str) -> StoreResult<Option<Record>> {
        Self::unavailable()
    }

    async fn recent_titles(&self, _kind: RecordKind, _limit: usize) -> StoreResult<Vec<String>> {
        Self::unavailable()
    }

    async fn count_records(&self) -> StoreResult<usize> {
        Self::unavailable()
    }
}

#[async_trait]
impl ReviewQueue for FailingStore {
    async fn enqueue(&self, _item: &ReviewQueueItem) -> StoreResult<()> {
        Self::unavailable()
    }

    async fn pending_reviews(&self) -> StoreResult<Vec<ReviewQueueItem>> {
        Self::unavailable()
    }

    async fn get_review(&self, _id: Uuid) -> StoreResult<Option<ReviewQueueItem>> {
        Self::unavailable()
    }

    async fn mark_reviewed(&self, _id: Uuid, _note: Option<&str>) -> StoreResult<ReviewQueueItem> {
        Self::unavailable()
    }
}

#[async_trait]
impl RunLedger for FailingStore {
    async fn start_run(&self, run: &IngestionRun) -> StoreResult<()> {
        self.ledger.start_run(run).await
    }

    async fn finish_run(&self, run: &IngestionRun) -> StoreResult<()> {
        self.ledger.finish_run(run).await
    }

    async fn get_run(&self, id: Uuid) -> StoreResult<Option<IngestionRun>> {
        self.ledger.get_run(id).await
    }
}

/// An in-memory store with scripted record faults.
///
/// `failing_after_inserts(n)` lets the first `n` inserts through and reports
/// every later insert as unreachable. `hiding_existing()` makes existence
/// checks miss, so a second insert of a fingerprint reaches the store and
/// comes back as `InsertOutcome::Duplicate`, as it does when a concurrent
/// writer wins between check and insert.
#[derive(Default)]
pub struct FlakyStore {
    inner: MemoryStore,
    insert_limit: Option<usize>,
    inserts: AtomicUsize,
    hide_existing: bool,
}

impl FlakyStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_after_inserts(mut self, n: usize) -> Self {
        self.insert_limit = Some(n);
        self
    }

    pub fn hiding_existing(mut self) -> Self {
        self.hide_existing = true;
        self
    }

    /// The backing store, for inspecting what was written.
    pub fn inner(&self) -> &MemoryStore {
        &self.inner
    }
}

#[async_trait]
impl RecordStore for FlakyStore {
    async fn contains_fingerprint(&self, fingerprint: &str) -> StoreResult<bool> {
        if self.hide_existing {
            return Ok(false);
        }
        self.inner.contains_fingerprint(fingerprint).await
    }

    async fn insert_record(&self, record: &Record) -> StoreResult<InsertOutcome> {
        if let Some(limit) = self.insert_limit {
            if self.inserts.fetch_add(1, Ordering::SeqCst) >= limit {
                return Err(StoreError::Unavailable("mock connection dropped".into()));
            }
        }
        self.inner.insert_record(record).await
    }

    async fn get_record(&self, id: Uuid) -> StoreResult<Option<Record>> {
        self.inner.get_record(id).await
    }

    async fn get_record_by_fingerprint(&self, fingerprint: &str) -> StoreResult<Option<Record>> {
        self.inner.get_record_by_fingerprint(fingerprint).await
    }

    async fn recent_titles(&self, kind: RecordKind, limit: usize) -> StoreResult<Vec<String>> {
        self.inner.recent_titles(kind, limit).await
    }

    async fn count_records(&self) -> StoreResult<usize> {
        self.inner.count_records().await
    }
}

#[async_trait]
impl ReviewQueue for FlakyStore {
    async fn enqueue(&self, item: &ReviewQueueItem) -> StoreResult<()> {
        self.inner.enqueue(item).await
    }

    async fn pending_reviews(&self) -> StoreResult<Vec<ReviewQueueItem>> {
        self.inner.pending_reviews().await
    }

    async fn get_review(&self, id: Uuid) -> StoreResult<Option<ReviewQueueItem>> {
        self.inner.get_review(id).await
    }

    async fn mark_reviewed(&self, id: Uuid, note: Option<&str>) -> StoreResult<ReviewQueueItem> {
        self.inner.mark_reviewed(id, note).await
    }
}

#[async_trait]
impl RunLedger for FlakyStore {
    async fn start_run(&self, run: &IngestionRun) -> StoreResult<()> {
        self.inner.start_run(run).await
    }

    async fn finish_run(&self, run: &IngestionRun) -> StoreResult<()> {
        self.inner.finish_run(run).await
    }

    async fn get_run(&self, id: Uuid) -> StoreResult<Option<IngestionRun>> {
        self.inner.get_run(id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traits::oracle::OracleItem;
    use crate::types::candidate::ExtractionMethod;
    use crate::types::record::{CaseFiling, Provenance, RecordBody, RecordStatus};

    fn request(profile: InstructionProfile, n: usize) -> OracleRequest {
        let items = (0..n).map(|i| OracleItem::new(format!("{i}"), "text")).collect();
        OracleRequest::new(profile, items).with_max_output_tokens(512)
    }

    #[tokio::test]
    async fn test_mock_oracle_default_matches_item_count() {
        let oracle = MockOracle::new();
        let response = oracle
            .complete(&request(InstructionProfile::Classification, 3))
            .await
            .unwrap();

        let values: Vec<serde_json::Value> = serde_json::from_str(&response.body).unwrap();
        assert_eq!(values.len(), 3);
        assert_eq!(values[2]["summary"], "Mock summary of item 3");
        assert_eq!(response.tokens_used, 100);
    }

    #[tokio::test]
    async fn test_mock_oracle_script_then_default() {
        let oracle = MockOracle::new()
            .with_error(OracleError::Rejected("401".into()))
            .with_response("[]");

        let req = request(InstructionProfile::NoticeExtraction, 1);
        assert!(oracle.complete(&req).await.is_err());
        assert_eq!(oracle.complete(&req).await.unwrap().body, "[]");
        assert!(oracle.complete(&req).await.unwrap().body.contains("company_name"));

        let calls = oracle.calls();
        assert_eq!(calls.len(), 3);
        assert_eq!(calls[0].max_output_tokens, 512);
    }

    #[tokio::test]
    async fn test_failing_store_keeps_ledger() {
        let store = FailingStore::new();
        let run = IngestionRun::start();
        store.start_run(&run).await.unwrap();
        assert!(store.get_run(run.id).await.unwrap().is_some());
        assert!(matches!(
            store.count_records().await,
            Err(StoreError::Unavailable(_))
        ));
    }

    #[tokio::test]
    async fn test_flaky_store_insert_limit() {
        let store = FlakyStore::new().failing_after_inserts(1);
        let record = |case: &str| {
            Record::new(
                RecordBody::CaseFiling(CaseFiling {
                    case_number: case.to_string(),
                    filing_date: None,
                    title: None,
                    subject: None,
                    claim_amount: None,
                    risk_signals: vec![],
                }),
                RecordStatus::Extracted,
                Provenance {
                    method: ExtractionMethod::Pattern,
                    oracle_tokens: 0,
                    run_id: Uuid::nil(),
                    document_id: "doc".to_string(),
                },
            )
        };

        assert_eq!(
            store.insert_record(&record("FSD 1 of 2024")).await.unwrap(),
            InsertOutcome::Inserted
        );
        assert!(matches!(
            store.insert_record(&record("FSD 2 of 2024")).await,
            Err(StoreError::Unavailable(_))
        ));
        assert_eq!(store.inner().count_records().await.unwrap(), 1);
    }
}
