//! Quality scoring and review routing.
//!
//! A record starts at 100 and loses its field's penalty for every required
//! field whose best candidate is missing or below `High`. Records under the
//! threshold for their kind, or carrying a high-risk signal, go to review.

use serde::{Deserialize, Serialize};

use crate::types::candidate::{CandidateSet, Confidence};
use crate::types::config::{PipelineConfig, RequiredField};
use crate::types::record::{RecordKind, RiskSignal};
use crate::types::review::ReviewPriority;

/// Outcome of scoring one record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QualityAssessment {
    pub score: u8,
    pub requires_review: bool,
    /// Set when `requires_review` is true
    pub priority: Option<ReviewPriority>,
    /// Human-readable reasons, empty for a clean record
    pub reasons: Vec<String>,
}

impl QualityAssessment {
    /// Reasons joined for the review queue.
    pub fn reason_text(&self) -> String {
        self.reasons.join("; ")
    }
}

/// Score a candidate set against the required fields.
///
/// Returns the clamped score and one note per penalized field.
pub fn score(candidates: &CandidateSet, required: &[RequiredField]) -> (u8, Vec<String>) {
    let mut total: i32 = 100;
    let mut notes = Vec::new();

    for field in required {
        let note = match candidates.best_tier(&field.name) {
            Some(Confidence::High) => continue,
            Some(tier) => format!("{} only {:?} confidence", field.name, tier).to_lowercase(),
            None => format!("{} missing", field.name),
        };
        total -= i32::from(field.criticality.penalty());
        notes.push(note);
    }

    (total.clamp(0, 100) as u8, notes)
}

/// Score a record and decide whether it needs review.
pub fn assess(
    candidates: &CandidateSet,
    kind: RecordKind,
    high_risk: Option<RiskSignal>,
    config: &PipelineConfig,
) -> QualityAssessment {
    let policy = config.policies.for_kind(kind);
    let threshold = config.threshold_for(kind);
    let (score, notes) = score(candidates, &policy.required_fields);

    let mut reasons = Vec::new();
    if score < threshold {
        reasons.push(format!("score {score} below {threshold}"));
        reasons.extend(notes);
    }
    if let Some(signal) = high_risk {
        reasons.push(format!("high-risk signal: {}", signal.as_str()));
    }

    let requires_review = !reasons.is_empty();
    let priority = requires_review.then(|| {
        if score < config.review_high_priority_below || high_risk.is_some() {
            ReviewPriority::High
        } else {
            ReviewPriority::Medium
        }
    });

    QualityAssessment {
        score,
        requires_review,
        priority,
        reasons,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::patterns::fields;
    use crate::types::candidate::ExtractionCandidate;

    fn set(entries: &[(&str, Confidence)]) -> CandidateSet {
        entries
            .iter()
            .map(|(field, tier)| ExtractionCandidate::from_oracle(*field, "value", *tier))
            .collect()
    }

    fn filing_set(subject: Confidence, with_amount: bool) -> CandidateSet {
        let mut entries = vec![
            (fields::CASE_NUMBER, Confidence::High),
            (fields::FILING_DATE, Confidence::High),
            (fields::CASE_TITLE, Confidence::High),
            (fields::SUBJECT, subject),
        ];
        if with_amount {
            entries.push((fields::CLAIM_AMOUNT, Confidence::High));
        }
        set(&entries)
    }

    #[test]
    fn test_complete_record_scores_100() {
        let config = PipelineConfig::default();
        let assessment = assess(&filing_set(Confidence::High, true), RecordKind::CaseFiling, None, &config);
        assert_eq!(assessment.score, 100);
        assert!(!assessment.requires_review);
        assert_eq!(assessment.priority, None);
    }

    #[test]
    fn test_penalties_by_criticality() {
        let required = &PipelineConfig::default().policies.case_filing.required_fields;
        // subject medium (15) + claim amount missing (5)
        let (score, notes) = score(&filing_set(Confidence::Medium, false), required);
        assert_eq!(score, 80);
        assert_eq!(notes, vec!["subject only medium confidence", "claim_amount missing"]);
    }

    #[test]
    fn test_score_clamps_at_zero() {
        let required: Vec<RequiredField> = (0..6)
            .map(|i| RequiredField::new(format!("f{i}"), crate::types::config::Criticality::Critical))
            .collect();
        assert_eq!(score(&CandidateSet::new(), &required).0, 0);
    }

    #[test]
    fn test_exact_threshold_boundary() {
        let candidates = filing_set(Confidence::Medium, false);

        let at = PipelineConfig::default().with_quality_threshold(80);
        assert!(!assess(&candidates, RecordKind::CaseFiling, None, &at).requires_review);

        let above = PipelineConfig::default().with_quality_threshold(81);
        let assessment = assess(&candidates, RecordKind::CaseFiling, None, &above);
        assert!(assessment.requires_review);
        assert_eq!(assessment.priority, Some(ReviewPriority::Medium));
    }

    #[test]
    fn test_monotonic_in_confidence() {
        let required = &PipelineConfig::default().policies.case_filing.required_fields;
        let tiers = [None, Some(Confidence::Low), Some(Confidence::Medium), Some(Confidence::High)];

        let mut previous = 0;
        for tier in tiers {
            let mut candidates = set(&[
                (fields::CASE_NUMBER, Confidence::High),
                (fields::FILING_DATE, Confidence::High),
                (fields::SUBJECT, Confidence::High),
                (fields::CLAIM_AMOUNT, Confidence::High),
            ]);
            if let Some(tier) = tier {
                candidates.push(ExtractionCandidate::from_oracle(fields::CASE_TITLE, "v", tier));
            }
            let (s, _) = score(&candidates, required);
            assert!(s >= previous, "{tier:?} scored {s} < {previous}");
            previous = s;
        }
        assert_eq!(previous, 100);
    }

    #[test]
    fn test_high_risk_forces_review() {
        let config = PipelineConfig::default();
        let assessment = assess(
            &filing_set(Confidence::High, true),
            RecordKind::CaseFiling,
            Some(RiskSignal::Fraud),
            &config,
        );
        assert_eq!(assessment.score, 100);
        assert!(assessment.requires_review);
        assert_eq!(assessment.priority, Some(ReviewPriority::High));
        assert_eq!(assessment.reason_text(), "high-risk signal: fraud");
    }

    #[test]
    fn test_low_score_gets_high_priority() {
        let config = PipelineConfig::default();
        let assessment = assess(&CandidateSet::new(), RecordKind::Article, None, &config);
        assert_eq!(assessment.score, 45);
        assert_eq!(assessment.priority, Some(ReviewPriority::High));
    }
}
