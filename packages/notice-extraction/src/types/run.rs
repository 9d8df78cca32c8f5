//! Ingestion run ledger entries.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Lifecycle of a pipeline invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Running,
    Completed,
    Failed,
}

/// One pipeline invocation.
///
/// Counts satisfy `new + duplicate + failed <= fetched`; `skipped` counts
/// items the prefilter declined, which are neither new nor duplicate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestionRun {
    pub id: Uuid,
    pub status: RunStatus,
    pub fetched: usize,
    pub new: usize,
    pub duplicate: usize,
    pub failed: usize,
    pub skipped: usize,
    /// Records routed to the review queue
    pub flagged: usize,
    /// Oracle tokens spent across the run
    pub oracle_tokens: u64,
    pub errors: Vec<String>,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl IngestionRun {
    /// Start a new run.
    pub fn start() -> Self {
        Self {
            id: Uuid::now_v7(),
            status: RunStatus::Running,
            fetched: 0,
            new: 0,
            duplicate: 0,
            failed: 0,
            skipped: 0,
            flagged: 0,
            oracle_tokens: 0,
            errors: Vec::new(),
            started_at: Utc::now(),
            finished_at: None,
        }
    }

    /// Record a per-item failure.
    pub fn record_failure(&mut self, error: impl Into<String>) {
        self.failed += 1;
        self.errors.push(error.into());
    }

    /// Fold another tally (e.g. one document's) into this run.
    pub fn absorb(&mut self, tally: RunTally) {
        self.fetched += tally.fetched;
        self.new += tally.new;
        self.duplicate += tally.duplicate;
        self.failed += tally.failed;
        self.skipped += tally.skipped;
        self.flagged += tally.flagged;
        self.oracle_tokens += tally.oracle_tokens;
        self.errors.extend(tally.errors);
    }

    pub fn is_finalized(&self) -> bool {
        self.status != RunStatus::Running
    }

    /// Finalize as completed. Returns false if already finalized.
    pub fn complete(&mut self) -> bool {
        self.finalize(RunStatus::Completed)
    }

    /// Finalize as failed with the causing error. Returns false if already
    /// finalized.
    pub fn fail(&mut self, error: impl Into<String>) -> bool {
        if self.is_finalized() {
            return false;
        }
        self.errors.push(error.into());
        self.finalize(RunStatus::Failed)
    }

    fn finalize(&mut self, status: RunStatus) -> bool {
        if self.is_finalized() {
            return false;
        }
        self.status = status;
        self.finished_at = Some(Utc::now());
        true
    }

    /// Whether the count invariant holds.
    pub fn counts_consistent(&self) -> bool {
        self.new + self.duplicate + self.failed <= self.fetched
    }
}

/// Counts gathered while processing part of a run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunTally {
    pub fetched: usize,
    pub new: usize,
    pub duplicate: usize,
    pub failed: usize,
    pub skipped: usize,
    pub flagged: usize,
    pub oracle_tokens: u64,
    pub errors: Vec<String>,
}

impl RunTally {
    pub fn record_failure(&mut self, error: impl Into<String>) {
        self.failed += 1;
        self.errors.push(error.into());
    }
}
