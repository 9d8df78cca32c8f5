//! Configuration types for the pipeline.
//!
//! `PipelineConfig` is built once per run by the embedding application
//! (file, environment, remote store) and passed in immutably.

use std::env;
use std::str::FromStr;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{PipelineError, Result};
use crate::pipeline::patterns::fields;
use crate::pipeline::tokens::CallBudget;
use crate::types::record::RecordKind;

/// Prefix for environment overrides.
pub const ENV_PREFIX: &str = "NOTICE_PIPELINE_";

/// Configuration for a pipeline run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Maximum estimated tokens of section text per oracle batch.
    ///
    /// Capped further by `budget.input_budget()`. Default: 24 000.
    pub max_tokens_per_batch: usize,

    /// Global context ceiling and output clamps for oracle calls.
    pub budget: CallBudget,

    /// Share of prefilter misses admitted anyway (0.0 to 1.0).
    ///
    /// Default: 0.10.
    pub exploration_rate: f64,

    /// Records scoring below this go to review. Default: 85.
    pub quality_threshold: u8,

    /// Review items scoring below this get `high` priority. Default: 60.
    pub review_high_priority_below: u8,

    /// Retries after the first oracle attempt. Default: 3.
    pub max_retries: u32,

    /// Base delay for exponential backoff. Default: 500ms.
    pub backoff_base_ms: u64,

    /// Call-level oracle timeout. Default: 60s.
    pub oracle_timeout_ms: u64,

    /// Pause between sequential classification batches. Default: 250ms.
    pub inter_batch_delay_ms: u64,

    /// Articles per classification request. Default: 10.
    pub classification_batch_size: usize,

    /// Documents processed in parallel. Default: 4.
    pub document_concurrency: usize,

    /// Minimum title similarity for near-duplicates. Default: 0.85.
    pub near_duplicate_threshold: f64,

    /// Stored titles compared against per record kind. Default: 500.
    pub recent_title_window: usize,

    /// Send incomplete gazette notices to the oracle. Default: false.
    pub oracle_enrichment: bool,

    /// Section headings for gazette segmentation.
    pub vocabulary: SectionVocabulary,

    /// Required fields and thresholds per record kind.
    pub policies: RecordPolicies,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_tokens_per_batch: 24_000,
            budget: CallBudget::default(),
            exploration_rate: 0.10,
            quality_threshold: 85,
            review_high_priority_below: 60,
            max_retries: 3,
            backoff_base_ms: 500,
            oracle_timeout_ms: 60_000,
            inter_batch_delay_ms: 250,
            classification_batch_size: 10,
            document_concurrency: 4,
            near_duplicate_threshold: 0.85,
            recent_title_window: 500,
            oracle_enrichment: false,
            vocabulary: SectionVocabulary::default(),
            policies: RecordPolicies::default(),
        }
    }
}

impl PipelineConfig {
    /// Create a new config with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Load defaults, then apply `NOTICE_PIPELINE_*` environment overrides.
    ///
    /// Reads a `.env` file if present (development).
    pub fn from_env() -> Result<Self> {
        let _ = dotenvy::dotenv();
        let mut config = Self::default();

        if let Some(v) = env_parse("MAX_TOKENS_PER_BATCH")? {
            config.max_tokens_per_batch = v;
        }
        if let Some(v) = env_parse("EXPLORATION_RATE")? {
            config.exploration_rate = v;
        }
        if let Some(v) = env_parse("QUALITY_THRESHOLD")? {
            config.quality_threshold = v;
        }
        if let Some(v) = env_parse("MAX_RETRIES")? {
            config.max_retries = v;
        }
        if let Some(v) = env_parse("BACKOFF_BASE_MS")? {
            config.backoff_base_ms = v;
        }
        if let Some(v) = env_parse("ORACLE_TIMEOUT_MS")? {
            config.oracle_timeout_ms = v;
        }
        if let Some(v) = env_parse("INTER_BATCH_DELAY_MS")? {
            config.inter_batch_delay_ms = v;
        }
        if let Some(v) = env_parse("DOCUMENT_CONCURRENCY")? {
            config.document_concurrency = v;
        }
        if let Some(v) = env_parse("ORACLE_ENRICHMENT")? {
            config.oracle_enrichment = v;
        }

        config.validate()?;
        Ok(config)
    }

    /// Parse a JSON config; absent keys take defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Check that the config can drive a run.
    ///
    /// Failures here are fatal to a run.
    pub fn validate(&self) -> Result<()> {
        self.vocabulary.validate()?;
        self.budget.validate()?;

        if self.max_tokens_per_batch == 0 {
            return Err(PipelineError::config("max_tokens_per_batch must be positive"));
        }
        if !(0.0..=1.0).contains(&self.exploration_rate) {
            return Err(PipelineError::config("exploration_rate must be within 0.0..=1.0"));
        }
        if self.quality_threshold > 100 || self.review_high_priority_below > 100 {
            return Err(PipelineError::config("quality thresholds must be within 0..=100"));
        }
        if !(self.near_duplicate_threshold > 0.0 && self.near_duplicate_threshold <= 1.0) {
            return Err(PipelineError::config(
                "near_duplicate_threshold must be within (0.0, 1.0]",
            ));
        }
        if self.classification_batch_size == 0 || self.document_concurrency == 0 {
            return Err(PipelineError::config(
                "classification_batch_size and document_concurrency must be positive",
            ));
        }

        for kind in [RecordKind::GazetteNotice, RecordKind::CaseFiling, RecordKind::Article] {
            let policy = self.policies.for_kind(kind);
            if policy.required_fields.is_empty() {
                return Err(PipelineError::config(format!(
                    "no required fields configured for {}",
                    kind.as_str()
                )));
            }
            if policy.quality_threshold.is_some_and(|t| t > 100) {
                return Err(PipelineError::config(format!(
                    "quality threshold for {} must be within 0..=100",
                    kind.as_str()
                )));
            }
        }

        Ok(())
    }

    /// Batch budget after capping by the global context ceiling.
    pub fn effective_batch_tokens(&self) -> usize {
        self.max_tokens_per_batch.min(self.budget.input_budget())
    }

    /// Review threshold for a record kind.
    pub fn threshold_for(&self, kind: RecordKind) -> u8 {
        self.policies
            .for_kind(kind)
            .quality_threshold
            .unwrap_or(self.quality_threshold)
    }

    pub fn with_max_tokens_per_batch(mut self, max: usize) -> Self {
        self.max_tokens_per_batch = max;
        self
    }

    pub fn with_exploration_rate(mut self, rate: f64) -> Self {
        self.exploration_rate = rate;
        self
    }

    pub fn with_quality_threshold(mut self, threshold: u8) -> Self {
        self.quality_threshold = threshold;
        self
    }

    pub fn with_retries(mut self, max_retries: u32, backoff_base_ms: u64) -> Self {
        self.max_retries = max_retries;
        self.backoff_base_ms = backoff_base_ms;
        self
    }

    pub fn with_inter_batch_delay_ms(mut self, delay_ms: u64) -> Self {
        self.inter_batch_delay_ms = delay_ms;
        self
    }

    pub fn with_oracle_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.oracle_timeout_ms = timeout_ms;
        self
    }

    pub fn with_vocabulary(mut self, vocabulary: SectionVocabulary) -> Self {
        self.vocabulary = vocabulary;
        self
    }

    pub fn with_oracle_enrichment(mut self, enabled: bool) -> Self {
        self.oracle_enrichment = enabled;
        self
    }
}

fn env_parse<T: FromStr>(key: &str) -> Result<Option<T>>
where
    T::Err: std::fmt::Display,
{
    let name = format!("{ENV_PREFIX}{key}");
    match env::var(&name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|e| PipelineError::config(format!("{name} is invalid: {e}"))),
        Err(_) => Ok(None),
    }
}

/// A named heading with one or more regex patterns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SectionSpec {
    pub name: String,
    pub patterns: Vec<String>,
}

impl SectionSpec {
    pub fn new(name: impl Into<String>, patterns: &[&str]) -> Self {
        Self {
            name: name.into(),
            patterns: patterns.iter().map(|p| p.to_string()).collect(),
        }
    }
}

/// Start/end headings of a parent region used when no target section is found.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegionBounds {
    pub start: String,
    pub end: String,
}

/// Ordered target headings plus the headings that end the region of interest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SectionVocabulary {
    pub targets: Vec<SectionSpec>,
    #[serde(default)]
    pub stops: Vec<SectionSpec>,
    #[serde(default)]
    pub bounding_region: Option<RegionBounds>,
}

/// Canonical name of the gazette liquidation section.
pub const LIQUIDATION_SECTION: &str = "Liquidation Notices";

/// Canonical name of the gazette final meeting section.
pub const FINAL_MEETING_SECTION: &str = "Final Meeting Notices";

impl Default for SectionVocabulary {
    fn default() -> Self {
        Self {
            targets: vec![
                SectionSpec::new(
                    LIQUIDATION_SECTION,
                    &[
                        r"(?i)liquidation\s+notices\b",
                        r"(?i)notices\s+of\s+(?:voluntary\s+)?(?:liquidation|winding\s+up)\b",
                    ],
                ),
                SectionSpec::new(
                    FINAL_MEETING_SECTION,
                    &[
                        r"(?i)final\s+meeting\s+notices\b",
                        r"(?i)notices?\s+of\s+final\s+meetings?\b",
                    ],
                ),
                SectionSpec::new("Partnership Notices", &[r"(?i)partnership\s+notices\b"]),
                SectionSpec::new("Bankruptcy Notices", &[r"(?i)bankruptcy\s+notices\b"]),
            ],
            stops: vec![
                SectionSpec::new("Dormant Accounts", &[r"(?i)dormant\s+accounts?\s+notices?\b"]),
                SectionSpec::new("Government Notices", &[r"(?i)government\s+notices\b"]),
            ],
            bounding_region: Some(RegionBounds {
                start: r"(?m)^[ \t]*COMMERCIAL\b".to_string(),
                end: r"(?m)^[ \t]*GOVERNMENT\b".to_string(),
            }),
        }
    }
}

impl SectionVocabulary {
    /// Build a vocabulary from target and stop specs.
    pub fn new(targets: Vec<SectionSpec>, stops: Vec<SectionSpec>) -> Self {
        Self {
            targets,
            stops,
            bounding_region: None,
        }
    }

    fn validate(&self) -> Result<()> {
        if self.targets.is_empty() {
            return Err(PipelineError::config("target-section vocabulary is empty"));
        }
        for spec in self.targets.iter().chain(&self.stops) {
            if spec.patterns.is_empty() {
                return Err(PipelineError::config(format!(
                    "section '{}' has no heading patterns",
                    spec.name
                )));
            }
            for pattern in &spec.patterns {
                Regex::new(pattern)?;
            }
        }
        if let Some(bounds) = &self.bounding_region {
            Regex::new(&bounds.start)?;
            Regex::new(&bounds.end)?;
        }
        Ok(())
    }
}

/// How much a missing or uncertain required field costs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Criticality {
    /// Names, identifiers: the record is unusable without them
    Critical,
    Standard,
    /// Free-text notes and nice-to-haves
    Minor,
}

impl Criticality {
    /// Points subtracted from 100.
    pub fn penalty(&self) -> u8 {
        match self {
            Self::Critical => 25,
            Self::Standard => 15,
            Self::Minor => 5,
        }
    }
}

/// A field a record kind is expected to carry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequiredField {
    pub name: String,
    pub criticality: Criticality,
}

impl RequiredField {
    pub fn new(name: impl Into<String>, criticality: Criticality) -> Self {
        Self {
            name: name.into(),
            criticality,
        }
    }
}

/// Required fields and threshold override for one record kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordPolicy {
    pub required_fields: Vec<RequiredField>,
    /// Overrides `PipelineConfig::quality_threshold` when set
    pub quality_threshold: Option<u8>,
}

/// Policies for every record kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordPolicies {
    pub gazette_notice: RecordPolicy,
    pub case_filing: RecordPolicy,
    pub article: RecordPolicy,
}

impl RecordPolicies {
    pub fn for_kind(&self, kind: RecordKind) -> &RecordPolicy {
        match kind {
            RecordKind::GazetteNotice => &self.gazette_notice,
            RecordKind::CaseFiling => &self.case_filing,
            RecordKind::Article => &self.article,
        }
    }
}

impl Default for RecordPolicies {
    fn default() -> Self {
        use Criticality::*;

        Self {
            gazette_notice: RecordPolicy {
                required_fields: vec![
                    RequiredField::new(fields::COMPANY_NAME, Critical),
                    RequiredField::new(fields::LIQUIDATION_TYPE, Standard),
                    RequiredField::new(fields::LIQUIDATOR_NAMES, Critical),
                    RequiredField::new(fields::RESOLUTION_DATE, Standard),
                    RequiredField::new(fields::FINAL_MEETING_DATE, Minor),
                ],
                quality_threshold: Some(90),
            },
            case_filing: RecordPolicy {
                required_fields: vec![
                    RequiredField::new(fields::CASE_NUMBER, Critical),
                    RequiredField::new(fields::FILING_DATE, Standard),
                    RequiredField::new(fields::CASE_TITLE, Critical),
                    RequiredField::new(fields::SUBJECT, Standard),
                    RequiredField::new(fields::CLAIM_AMOUNT, Minor),
                ],
                quality_threshold: None,
            },
            article: RecordPolicy {
                required_fields: vec![
                    RequiredField::new(fields::TITLE, Critical),
                    RequiredField::new(fields::SUMMARY, Standard),
                    RequiredField::new(fields::CATEGORY, Standard),
                ],
                quality_threshold: None,
            },
        }
    }
}
