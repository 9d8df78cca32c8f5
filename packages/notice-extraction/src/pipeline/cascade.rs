//! Classification cascade: batched oracle call, validation, fallback.
//!
//! One request per batch. Transient failures go through the shared retry
//! utility. A response that cannot be parsed, or whose result count differs
//! from the item count, rejects the whole batch; the batch is resent once
//! as a fresh request before every item falls back to keyword heuristics.

use chrono::NaiveDate;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::error::{OracleError, OracleResult};
use crate::pipeline::patterns::{detect_risk_signals, fields};
use crate::pipeline::prefilter::RELEVANCE_TERMS;
use crate::pipeline::prompts::{format_items, system_prompt};
use crate::pipeline::retry::{retry_with_backoff, RetryPolicy};
use crate::pipeline::tokens::{estimate_tokens, CallBudget};
use crate::traits::oracle::{InstructionProfile, Oracle, OracleItem, OracleRequest};
use crate::types::candidate::{CandidateSet, Confidence, ExtractionCandidate};
use crate::types::record::{ArticleCategory, LiquidationType, RiskSignal};

/// Requests sent per batch when the response breaks the contract.
const CONTRACT_ATTEMPTS: u32 = 2;

/// Confidence assigned to heuristic fallback results.
const FALLBACK_CONFIDENCE: Confidence = Confidence::Low;

/// Longest fallback summary, in characters.
const FALLBACK_SUMMARY_CHARS: usize = 280;

/// Classification of one article.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassificationResult {
    pub relevant: bool,
    pub category: ArticleCategory,
    pub summary: Option<String>,
    pub risk_signals: Vec<RiskSignal>,
    pub entities: Vec<String>,
    pub confidence: Confidence,
    /// Produced by the heuristic fallback rather than the oracle
    pub degraded: bool,
    /// Oracle tokens attributed to this item
    pub tokens: u32,
}

/// Results for one batch plus what it cost.
#[derive(Debug, Clone, PartialEq)]
pub struct ClassifiedBatch {
    /// One result per input item, in input order
    pub results: Vec<ClassificationResult>,
    pub tokens: u64,
}

/// Oracle candidates for each notice of a batch.
#[derive(Debug, Clone, PartialEq)]
pub struct EnrichedBatch {
    /// One set per input item, in input order
    pub candidates: Vec<CandidateSet>,
    pub tokens: u64,
}

/// Classification payload element as the oracle sends it.
#[derive(Debug, Deserialize)]
struct ClassifyPayload {
    relevant: bool,
    #[serde(default)]
    category: Option<String>,
    #[serde(default)]
    summary: Option<String>,
    #[serde(default)]
    risk_signals: Option<Vec<String>>,
    #[serde(default)]
    entities: Option<Vec<String>>,
    #[serde(default)]
    confidence: Option<f32>,
}

/// Notice extraction payload element as the oracle sends it.
#[derive(Debug, Deserialize)]
struct NoticePayload {
    #[serde(default)]
    company_name: Option<String>,
    #[serde(default)]
    liquidation_type: Option<String>,
    #[serde(default)]
    liquidator_names: Option<Vec<String>>,
    #[serde(default)]
    resolution_date: Option<String>,
    #[serde(default)]
    final_meeting_date: Option<String>,
    #[serde(default)]
    claims_deadline: Option<String>,
}

/// Batched oracle access with validation and fallback.
pub struct Cascade<'a, O: ?Sized> {
    oracle: &'a O,
    policy: RetryPolicy,
    budget: CallBudget,
}

impl<'a, O: Oracle + ?Sized> Cascade<'a, O> {
    pub fn new(oracle: &'a O, policy: RetryPolicy, budget: CallBudget) -> Self {
        Self {
            oracle,
            policy,
            budget,
        }
    }

    /// Classify a batch of articles.
    ///
    /// Always returns exactly one result per item. When the oracle cannot
    /// deliver, every result is a degraded heuristic one.
    pub async fn classify(&self, items: &[OracleItem]) -> ClassifiedBatch {
        if items.is_empty() {
            return ClassifiedBatch {
                results: Vec::new(),
                tokens: 0,
            };
        }

        let (outcome, tokens) = self
            .request(InstructionProfile::Classification, items, |payload: ClassifyPayload| {
                classification_from_payload(payload)
            })
            .await;

        let per_item = per_item_tokens(tokens, items.len());
        let results = match outcome {
            Ok(results) => results
                .into_iter()
                .map(|mut r| {
                    r.tokens = per_item;
                    r
                })
                .collect(),
            Err(e) => {
                warn!(
                    items = items.len(),
                    error = %e,
                    "Classification failed, using heuristic fallback"
                );
                items
                    .iter()
                    .map(|item| {
                        let mut r = heuristic_classification(&item.text);
                        r.tokens = per_item;
                        r
                    })
                    .collect()
            }
        };

        ClassifiedBatch { results, tokens }
    }

    /// Ask the oracle for notice fields.
    ///
    /// Returns `None` when the oracle could not deliver; callers keep their
    /// pattern candidates in that case.
    pub async fn extract_notices(&self, items: &[OracleItem]) -> (Option<EnrichedBatch>, u64) {
        if items.is_empty() {
            return (None, 0);
        }

        let (outcome, tokens) = self
            .request(InstructionProfile::NoticeExtraction, items, |payload: NoticePayload| {
                Ok(candidates_from_notice(payload))
            })
            .await;

        match outcome {
            Ok(candidates) => (Some(EnrichedBatch { candidates, tokens }), tokens),
            Err(e) => {
                warn!(items = items.len(), error = %e, "Notice enrichment failed");
                (None, tokens)
            }
        }
    }

    /// Send one batch, validating the result array against the item count.
    ///
    /// Returns the converted results and the tokens spent across attempts.
    async fn request<P, T, F>(
        &self,
        profile: InstructionProfile,
        items: &[OracleItem],
        convert: F,
    ) -> (OracleResult<Vec<T>>, u64)
    where
        P: DeserializeOwned,
        F: Fn(P) -> Result<T, String>,
    {
        let mut request = OracleRequest::new(profile, items.to_vec());
        let input = request.estimated_input_tokens() + estimate_tokens(&system_prompt(&request));
        request.max_output_tokens = self.budget.output_budget(input);

        let mut tokens = 0u64;
        let mut last_error = OracleError::Malformed("no attempt made".into());

        for attempt in 1..=CONTRACT_ATTEMPTS {
            let response = retry_with_backoff(self.policy, profile.as_str(), || {
                self.oracle.complete(&request)
            })
            .await;

            let response = match response {
                Ok(response) => response,
                Err(e) => return (Err(e), tokens),
            };
            tokens += u64::from(response.tokens_used);

            match parse_results::<P>(&response.body, items.len())
                .and_then(|payloads| {
                    payloads
                        .into_iter()
                        .map(&convert)
                        .collect::<Result<Vec<T>, String>>()
                })
            {
                Ok(results) => {
                    debug!(profile = profile.as_str(), attempt, "Oracle batch accepted");
                    return (Ok(results), tokens);
                }
                Err(reason) => {
                    warn!(
                        profile = profile.as_str(),
                        attempt,
                        reason = %reason,
                        "Oracle response rejected"
                    );
                    last_error = OracleError::Malformed(reason);
                }
            }
        }

        info!(profile = profile.as_str(), "Oracle batch rejected after fresh retry");
        (Err(last_error), tokens)
    }
}

pub(crate) fn per_item_tokens(total: u64, items: usize) -> u32 {
    if items == 0 {
        return 0;
    }
    u32::try_from(total.div_ceil(items as u64)).unwrap_or(u32::MAX)
}

/// Parse a result array of exactly `expected` elements.
///
/// Strategies, strictest first: bare array; object with a `results` array;
/// either of those inside a code fence; the outermost `[...]` slice.
pub fn parse_results<T: DeserializeOwned>(body: &str, expected: usize) -> Result<Vec<T>, String> {
    let values = parse_result_array(body).ok_or_else(|| "no JSON result array found".to_string())?;
    if values.len() != expected {
        return Err(format!("expected {expected} results, got {}", values.len()));
    }
    values
        .into_iter()
        .enumerate()
        .map(|(i, v)| serde_json::from_value(v).map_err(|e| format!("result {}: {e}", i + 1)))
        .collect()
}

/// Locate the result array in a possibly wrapped response.
pub fn parse_result_array(body: &str) -> Option<Vec<Value>> {
    let trimmed = body.trim();
    array_from_json(trimmed)
        .or_else(|| array_from_json(strip_code_fence(trimmed)))
        .or_else(|| {
            let start = trimmed.find('[')?;
            let end = trimmed.rfind(']')?;
            (end > start)
                .then(|| serde_json::from_str(&trimmed[start..=end]).ok())
                .flatten()
        })
}

fn array_from_json(text: &str) -> Option<Vec<Value>> {
    match serde_json::from_str::<Value>(text).ok()? {
        Value::Array(values) => Some(values),
        Value::Object(mut map) => match map.remove("results") {
            Some(Value::Array(values)) => Some(values),
            _ => None,
        },
        _ => None,
    }
}

/// Strip a markdown code fence, with or without a language tag.
fn strip_code_fence(text: &str) -> &str {
    let Some(start) = text.find("```") else {
        return text;
    };
    let after = &text[start + 3..];
    let content = after.find('\n').map(|i| &after[i + 1..]).unwrap_or(after);
    match content.find("```") {
        Some(end) => content[..end].trim(),
        None => content.trim(),
    }
}

fn classification_from_payload(payload: ClassifyPayload) -> Result<ClassificationResult, String> {
    let category = match payload.category.as_deref() {
        Some(raw) => raw.parse::<ArticleCategory>()?,
        None => ArticleCategory::Other,
    };
    let risk_signals = payload
        .risk_signals
        .unwrap_or_default()
        .iter()
        .map(|s| s.parse::<RiskSignal>())
        .collect::<Result<Vec<_>, _>>()?;

    Ok(ClassificationResult {
        relevant: payload.relevant,
        category,
        summary: payload.summary.filter(|s| !s.trim().is_empty()),
        risk_signals,
        entities: payload.entities.unwrap_or_default(),
        confidence: Confidence::from_score(payload.confidence.unwrap_or(0.5)),
        degraded: false,
        tokens: 0,
    })
}

fn candidates_from_notice(payload: NoticePayload) -> CandidateSet {
    let mut set = CandidateSet::new();
    let tier = Confidence::Medium;

    if let Some(name) = payload.company_name.filter(|n| !n.trim().is_empty()) {
        set.push(ExtractionCandidate::from_oracle(fields::COMPANY_NAME, name.trim(), tier));
    }
    if let Some(raw) = payload.liquidation_type {
        let candidate = match raw.parse::<LiquidationType>() {
            Ok(t) => ExtractionCandidate::from_oracle(fields::LIQUIDATION_TYPE, t.as_str(), tier),
            Err(_) => ExtractionCandidate::from_oracle(fields::LIQUIDATION_TYPE, raw, Confidence::Low),
        };
        set.push(candidate);
    }
    let names = payload.liquidator_names.unwrap_or_default();
    for name in names.iter().filter(|n| !n.trim().is_empty()) {
        set.push(ExtractionCandidate::from_oracle(fields::LIQUIDATOR_NAMES, name.trim(), tier));
    }
    for (field, raw) in [
        (fields::RESOLUTION_DATE, payload.resolution_date),
        (fields::FINAL_MEETING_DATE, payload.final_meeting_date),
        (fields::CLAIMS_DEADLINE, payload.claims_deadline),
    ] {
        let Some(raw) = raw else { continue };
        // Dates that do not parse stay as evidence at the lowest tier
        let confidence = if NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d").is_ok() {
            tier
        } else {
            Confidence::Low
        };
        set.push(ExtractionCandidate::from_oracle(field, raw.trim(), confidence));
    }
    set
}

/// Keyword-only classification used when the oracle is unavailable.
pub fn heuristic_classification(text: &str) -> ClassificationResult {
    let lower = text.to_lowercase();
    let risk_signals = detect_risk_signals(text);
    let relevant = RELEVANCE_TERMS.iter().any(|t| lower.contains(t));

    let category = if risk_signals.contains(&RiskSignal::Insolvency) {
        ArticleCategory::Insolvency
    } else if risk_signals.contains(&RiskSignal::Litigation) {
        ArticleCategory::Litigation
    } else if risk_signals
        .iter()
        .any(|s| matches!(s, RiskSignal::Regulatory | RiskSignal::Enforcement | RiskSignal::Sanctions))
    {
        ArticleCategory::Regulatory
    } else {
        ArticleCategory::Other
    };

    ClassificationResult {
        relevant,
        category,
        summary: fallback_summary(text),
        risk_signals,
        entities: Vec::new(),
        confidence: FALLBACK_CONFIDENCE,
        degraded: true,
        tokens: 0,
    }
}

/// First sentence of the text, capped in length.
fn fallback_summary(text: &str) -> Option<String> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return None;
    }
    let sentence_end = trimmed
        .find(". ")
        .map(|i| i + 1)
        .unwrap_or(trimmed.len());
    Some(trimmed[..sentence_end].chars().take(FALLBACK_SUMMARY_CHARS).collect())
}
