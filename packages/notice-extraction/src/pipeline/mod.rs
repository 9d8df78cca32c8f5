//! Notice pipeline - the core of the library.
//!
//! The pipeline orchestrates:
//! - Segmentation of gazette issues into named sections
//! - Pattern extraction with confidence tiers
//! - Batched oracle enrichment and article classification
//! - Fingerprint and near-duplicate deduplication
//! - Quality scoring and review routing
//! - Run accounting (fetch, insert, duplicate, skip, flag)

pub mod batch;
pub mod cascade;
pub mod filing;
pub mod fingerprint;
pub mod gazette;
pub mod patterns;
pub mod prefilter;
pub mod prompts;
pub mod quality;
pub mod retry;
pub mod run;
pub mod segment;
pub mod tokens;

pub use batch::{plan_batches, Batch};
pub use cascade::{heuristic_classification, Cascade, ClassificationResult, ClassifiedBatch};
pub use filing::process_filing;
pub use fingerprint::{fingerprint, is_near_duplicate, DedupVerdict, Deduplicator, NaturalKey};
pub use gazette::{cross_reference, process_gazette, split_notices, GazetteOutcome};
pub use patterns::{detect_risk_signals, extract, extract_set};
pub use prefilter::{should_process, PrefilterDecision, PrefilterReason};
pub use prompts::{format_items, system_prompt, CLASSIFY_PROMPT, NOTICE_EXTRACT_PROMPT};
pub use quality::{assess, score, QualityAssessment};
pub use retry::{retry_with_backoff, RetryPolicy};
pub use run::{run_pipeline, Pipeline};
pub use segment::{segment, Segmenter};
pub use tokens::{estimate_tokens, CallBudget};
