//! Notice Extraction Library
//!
//! Turns raw regulatory documents (gazette issues, court registry filings and
//! news articles) into deduplicated, quality-scored records, routing anything
//! below the bar to a human review queue.
//!
//! # Design Philosophy
//!
//! - Deterministic patterns first, the oracle only for what patterns miss
//! - Every record carries how its fields were obtained
//! - Oracle outages degrade a run, storage outages fail it
//! - Re-running the same input creates nothing new
//!
//! # Usage
//!
//! ```rust,ignore
//! use notice_extraction::{Document, DocumentKind, MemoryStore, Pipeline, PipelineConfig};
//! use notice_extraction::testing::MockOracle;
//!
//! let pipeline = Pipeline::new(MemoryStore::new(), MockOracle::new(), PipelineConfig::default());
//!
//! let issue = Document::from_text(DocumentKind::Gazette, gazette_text);
//! let run = pipeline.run(&[issue]).await;
//!
//! for item in pipeline.pending_reviews().await? {
//!     println!("{}: {}", item.priority.as_str(), item.reason);
//! }
//! ```
//!
//! # Modules
//!
//! - [`traits`] - Core trait abstractions (Oracle, RecordStore, ReviewQueue, RunLedger)
//! - [`types`] - Documents, candidates, records and run accounting
//! - [`pipeline`] - Segmentation, extraction, classification and routing
//! - [`stores`] - Storage implementations (MemoryStore, PostgresStore)
//! - [`ai`] - Oracle implementations (OpenAiOracle, UnavailableOracle)
//! - [`testing`] - Mock implementations for testing

pub mod ai;
pub mod error;
pub mod pipeline;
pub mod stores;
pub mod testing;
pub mod traits;
pub mod types;

// Re-export core types at crate root
pub use error::{OracleError, PipelineError, StoreError};
pub use traits::{
    oracle::{InstructionProfile, Oracle, OracleItem, OracleRequest, OracleResponse},
    store::{InsertOutcome, RecordStore, ReviewQueue, RunLedger, Storage},
};
pub use types::{
    candidate::{CandidateSet, Confidence, ExtractionCandidate, ExtractionMethod},
    config::{
        Criticality, PipelineConfig, RecordPolicies, RecordPolicy, RequiredField, SectionSpec,
        SectionVocabulary,
    },
    document::{Document, DocumentKind},
    record::{
        ArticleCategory, CaseFiling, ClassifiedArticle, GazetteNotice, LiquidationType,
        NoticeType, Provenance, Record, RecordBody, RecordKind, RecordStatus, RiskSignal,
    },
    review::{ReviewPriority, ReviewQueueItem},
    run::{IngestionRun, RunStatus},
    section::Section,
};

// Re-export pipeline components
pub use pipeline::{
    // Entry points
    run_pipeline, Pipeline,
    // Stages
    assess, extract, fingerprint, plan_batches, process_filing, process_gazette, segment,
    should_process, Batch, Cascade, ClassificationResult, Deduplicator, NaturalKey,
    QualityAssessment, Segmenter,
    // Budgeting and retries
    estimate_tokens, retry_with_backoff, CallBudget, RetryPolicy,
};

// Re-export stores
pub use stores::MemoryStore;

#[cfg(feature = "postgres")]
pub use stores::PostgresStore;

// Re-export oracles
pub use ai::{OpenAiOracle, UnavailableOracle};

// Re-export testing utilities
pub use testing::{FailingStore, FlakyStore, MockOracle};
