//! Court registry filing extraction.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use tracing::debug;

use crate::pipeline::patterns::{detect_risk_signals, extract_set, fields, FILING_FIELDS};
use crate::types::candidate::{CandidateSet, Confidence, ExtractionCandidate, ExtractionMethod};
use crate::types::document::Document;
use crate::types::record::{CaseFiling, RecordBody, RecordDraft, RecordStatus};

/// Extract a filing record draft from one document.
///
/// Returns `None` when no case number can be found; a filing without one has
/// no identity.
pub fn process_filing(document: &Document) -> Option<RecordDraft> {
    let mut candidates = extract_set(&document.text, FILING_FIELDS);

    // A caption supplied with the document stands in for a missing title line
    if let Some(title) = document.title.as_deref().filter(|t| !t.trim().is_empty()) {
        if !candidates.contains(fields::CASE_TITLE) {
            candidates.push(ExtractionCandidate {
                field: fields::CASE_TITLE.to_string(),
                value: title.trim().to_string(),
                confidence: Confidence::Medium,
                method: ExtractionMethod::Heuristic,
                span: title.to_string(),
                offset: 0,
            });
        }
    }

    let Some(filing) = build_filing(&candidates, &document.text) else {
        debug!(document = %document.id, "Filing without a case number");
        return None;
    };

    Some(RecordDraft::new(
        RecordBody::CaseFiling(filing),
        candidates,
        RecordStatus::Extracted,
        &document.id,
    ))
}

/// Consolidate filing candidates.
pub fn build_filing(candidates: &CandidateSet, text: &str) -> Option<CaseFiling> {
    let best = |field: &str| candidates.best(field).map(|c| c.value.clone());

    Some(CaseFiling {
        case_number: best(fields::CASE_NUMBER)?,
        filing_date: candidates
            .best(fields::FILING_DATE)
            .and_then(|c| NaiveDate::parse_from_str(&c.value, "%Y-%m-%d").ok()),
        title: best(fields::CASE_TITLE),
        subject: best(fields::SUBJECT),
        claim_amount: candidates
            .best(fields::CLAIM_AMOUNT)
            .and_then(|c| c.value.parse::<Decimal>().ok()),
        risk_signals: detect_risk_signals(text),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::document::DocumentKind;
    use crate::types::record::RiskSignal;

    const FILING: &str = "IN THE GRAND COURT OF THE CAYMAN ISLANDS\n\
        FINANCIAL SERVICES DIVISION\n\
        Cause No: FSD 0123 of 2024\n\
        Date of filing: 12th March 2024\n\
        Title: Alpha Fund Ltd v Beta Capital Partners\n\
        Nature of claim: Winding up petition\n\
        Amount claimed: US$1,250,000.50\n";

    #[test]
    fn test_process_filing_fields() {
        let document = Document::new("filing-1", DocumentKind::CaseFiling, FILING);
        let draft = process_filing(&document).unwrap();
        let RecordBody::CaseFiling(filing) = &draft.body else {
            panic!("expected a filing");
        };

        assert_eq!(filing.case_number, "FSD 123 of 2024");
        assert_eq!(filing.filing_date, NaiveDate::from_ymd_opt(2024, 3, 12));
        assert_eq!(filing.title.as_deref(), Some("Alpha Fund Ltd v Beta Capital Partners"));
        assert_eq!(filing.subject.as_deref(), Some("Winding up petition"));
        assert_eq!(filing.claim_amount, Some(Decimal::new(125_000_050, 2)));
        assert_eq!(
            filing.risk_signals,
            vec![RiskSignal::Insolvency, RiskSignal::Litigation]
        );
        assert_eq!(draft.method(), ExtractionMethod::Pattern);
    }

    #[test]
    fn test_missing_case_number_yields_none() {
        let document = Document::new("filing-2", DocumentKind::CaseFiling, "Title: Something v Other");
        assert!(process_filing(&document).is_none());
    }

    #[test]
    fn test_document_title_fills_missing_caption() {
        let document = Document::new("filing-3", DocumentKind::CaseFiling, "Cause No. FSD 7 of 2024")
            .with_title("In the matter of Gamma SPC");
        let draft = process_filing(&document).unwrap();
        assert_eq!(
            draft.candidates.best_tier(fields::CASE_TITLE),
            Some(Confidence::Medium)
        );
        assert_eq!(draft.body.title(), Some("In the matter of Gamma SPC"));
    }

    #[test]
    fn test_fraud_allegation_is_high_risk() {
        let text = format!("{FILING}Particulars: misappropriation of fund assets\n");
        let document = Document::new("filing-4", DocumentKind::CaseFiling, text);
        let draft = process_filing(&document).unwrap();
        assert_eq!(draft.body.high_risk_signal(), Some(RiskSignal::Fraud));
    }
}
