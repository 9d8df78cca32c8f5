//! Cheap keyword gate in front of oracle classification.
//!
//! An article mentioning a relevance term or a known service provider is
//! always processed. Everything else is admitted at a fixed exploration rate,
//! chosen by hashing the text so reruns make the same choice.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Terms that make an article worth classifying.
pub const RELEVANCE_TERMS: &[&str] = &[
    "liquidat",
    "winding up",
    "wound up",
    "insolven",
    "bankrupt",
    "receivership",
    "restructur",
    "creditor",
    "grand court",
    "petition",
    "lawsuit",
    "litigation",
    "judgment",
    "fraud",
    "sanction",
    "enforcement",
    "money laundering",
    "regulator",
    "monetary authority",
];

/// Restructuring and offshore-law firms whose involvement signals a matter.
pub const PROVIDER_ENTITIES: &[&str] = &[
    "kpmg",
    "pwc",
    "pricewaterhousecoopers",
    "deloitte",
    "ernst & young",
    "grant thornton",
    "bdo",
    "kroll",
    "alvarez & marsal",
    "teneo",
    "interpath",
    "walkers",
    "maples",
    "ogier",
    "mourant",
    "campbells",
    "harneys",
    "appleby",
    "carey olsen",
    "conyers",
];

/// Why the prefilter decided what it did.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reason", content = "matched", rename_all = "snake_case")]
pub enum PrefilterReason {
    RelevanceTerm(String),
    ProviderEntity(String),
    /// No match, admitted by the exploration quota
    Exploration,
    /// No match and outside the quota
    NoMatch,
}

/// Prefilter outcome for one article.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrefilterDecision {
    pub process: bool,
    pub reason: PrefilterReason,
}

impl PrefilterDecision {
    fn process(reason: PrefilterReason) -> Self {
        Self {
            process: true,
            reason,
        }
    }
}

/// Decide whether an article goes to classification.
pub fn should_process(title: &str, excerpt: &str, exploration_rate: f64) -> PrefilterDecision {
    let haystack = format!("{title}\n{excerpt}").to_lowercase();

    if let Some(term) = RELEVANCE_TERMS.iter().find(|t| haystack.contains(*t)) {
        return PrefilterDecision::process(PrefilterReason::RelevanceTerm(term.to_string()));
    }
    if let Some(entity) = PROVIDER_ENTITIES.iter().find(|e| haystack.contains(*e)) {
        return PrefilterDecision::process(PrefilterReason::ProviderEntity(entity.to_string()));
    }

    if exploration_bucket(title, excerpt) < exploration_cutoff(exploration_rate) {
        return PrefilterDecision::process(PrefilterReason::Exploration);
    }

    PrefilterDecision {
        process: false,
        reason: PrefilterReason::NoMatch,
    }
}

/// Stable bucket in `0..100` for a title/excerpt pair.
pub fn exploration_bucket(title: &str, excerpt: &str) -> u64 {
    let mut hasher = Sha256::new();
    hasher.update(title.as_bytes());
    hasher.update(b"\n");
    hasher.update(excerpt.as_bytes());
    let digest = hasher.finalize();

    let mut head = [0u8; 8];
    head.copy_from_slice(&digest[..8]);
    u64::from_be_bytes(head) % 100
}

fn exploration_cutoff(rate: f64) -> u64 {
    (rate.clamp(0.0, 1.0) * 100.0).round() as u64
}
