//! Field candidates produced by pattern or oracle extraction.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Confidence tier of a single candidate.
///
/// Ordered so that `High > Medium > Low`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    Low,
    Medium,
    High,
}

impl Confidence {
    /// Map an oracle's 0.0-1.0 confidence onto a tier.
    pub fn from_score(score: f32) -> Self {
        if score >= 0.8 {
            Self::High
        } else if score >= 0.5 {
            Self::Medium
        } else {
            Self::Low
        }
    }
}

/// How a candidate or record was produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExtractionMethod {
    /// Regex pattern table
    Pattern,
    /// External oracle
    Oracle,
    /// Keyword fallback after the oracle failed
    Heuristic,
}

impl ExtractionMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pattern => "pattern",
            Self::Oracle => "oracle",
            Self::Heuristic => "heuristic",
        }
    }
}

/// One candidate value for one field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractionCandidate {
    /// Field name (e.g. "liquidator_names")
    pub field: String,

    /// Value after transformation
    pub value: String,

    pub confidence: Confidence,

    pub method: ExtractionMethod,

    /// Raw matched span, kept for audit
    pub span: String,

    /// Byte offset of the span within the text it was extracted from
    pub offset: usize,
}

impl ExtractionCandidate {
    /// Create an oracle-sourced candidate (no span offset).
    pub fn from_oracle(
        field: impl Into<String>,
        value: impl Into<String>,
        confidence: Confidence,
    ) -> Self {
        let value = value.into();
        Self {
            field: field.into(),
            span: value.clone(),
            value,
            confidence,
            method: ExtractionMethod::Oracle,
            offset: usize::MAX,
        }
    }
}

/// Candidates grouped by field, in first-seen field order.
///
/// Within a field, candidates keep document order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CandidateSet {
    fields: IndexMap<String, Vec<ExtractionCandidate>>,
}

impl CandidateSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add one candidate.
    pub fn push(&mut self, candidate: ExtractionCandidate) {
        self.fields
            .entry(candidate.field.clone())
            .or_default()
            .push(candidate);
    }

    /// All raw candidates for a field.
    pub fn get(&self, field: &str) -> &[ExtractionCandidate] {
        self.fields.get(field).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Whether any candidate exists for the field.
    pub fn contains(&self, field: &str) -> bool {
        !self.get(field).is_empty()
    }

    /// Field names with at least one candidate.
    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }

    /// Best tier present for a field.
    pub fn best_tier(&self, field: &str) -> Option<Confidence> {
        self.get(field).iter().map(|c| c.confidence).max()
    }

    /// Single-valued consolidation: first candidate at the best tier.
    pub fn best(&self, field: &str) -> Option<&ExtractionCandidate> {
        let tier = self.best_tier(field)?;
        self.get(field).iter().find(|c| c.confidence == tier)
    }

    /// Multi-valued consolidation: every candidate at the best tier, which
    /// is `High` whenever any high match exists. Repeated values collapse.
    pub fn best_values(&self, field: &str) -> Vec<&ExtractionCandidate> {
        let Some(tier) = self.best_tier(field) else {
            return Vec::new();
        };
        let mut seen = std::collections::HashSet::new();
        self.get(field)
            .iter()
            .filter(|c| c.confidence == tier)
            .filter(|c| seen.insert(c.value.to_lowercase()))
            .collect()
    }

    /// Copy over fields this set has no candidates for.
    ///
    /// Returns the number of fields filled.
    pub fn fill_missing(&mut self, other: CandidateSet) -> usize {
        let mut filled = 0;
        for (field, candidates) in other.fields {
            if candidates.is_empty() || self.contains(&field) {
                continue;
            }
            self.fields.insert(field, candidates);
            filled += 1;
        }
        filled
    }

    /// Whether any candidate came from the given method.
    pub fn uses_method(&self, method: ExtractionMethod) -> bool {
        self.fields.values().flatten().any(|c| c.method == method)
    }

    pub fn is_empty(&self) -> bool {
        self.fields.values().all(Vec::is_empty)
    }
}

impl Extend<ExtractionCandidate> for CandidateSet {
    fn extend<T: IntoIterator<Item = ExtractionCandidate>>(&mut self, iter: T) {
        for candidate in iter {
            self.push(candidate);
        }
    }
}

impl FromIterator<ExtractionCandidate> for CandidateSet {
    fn from_iter<T: IntoIterator<Item = ExtractionCandidate>>(iter: T) -> Self {
        let mut set = Self::new();
        set.extend(iter);
        set
    }
}
