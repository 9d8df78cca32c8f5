//! Gazette processing.
//!
//! A gazette body is segmented into vocabulary sections, each section is
//! split into notices at company header lines, and every notice runs through
//! the pattern table. Incomplete notices can optionally be sent to the oracle,
//! which only fills fields the patterns found nothing for. Final meeting
//! notices are then folded into the liquidation notice of the same company.

use chrono::NaiveDate;
use tracing::{debug, info, instrument, warn};

use crate::pipeline::batch::plan_batches;
use crate::pipeline::cascade::{per_item_tokens, Cascade};
use crate::pipeline::fingerprint::{is_near_duplicate, NaturalKey};
use crate::pipeline::patterns::{
    extract_set, fields, COMPANY_HEADER, GAZETTE_FIELDS, LIQUIDATION_STATUS,
};
use crate::pipeline::segment::Segmenter;
use crate::traits::oracle::{Oracle, OracleItem};
use crate::types::candidate::{CandidateSet, Confidence, ExtractionMethod};
use crate::types::config::{PipelineConfig, RequiredField, FINAL_MEETING_SECTION, LIQUIDATION_SECTION};
use crate::types::document::Document;
use crate::types::record::{GazetteNotice, NoticeType, RecordBody, RecordDraft, RecordStatus};
use crate::types::section::Section;

/// One notice before consolidation.
#[derive(Debug, Clone, PartialEq)]
pub struct NoticeDraft {
    /// Section the notice was found in
    pub section: String,
    pub notice_type: NoticeType,
    pub text: String,
    pub candidates: CandidateSet,
    pub oracle_tokens: u32,
}

impl NoticeDraft {
    fn new(section: &str, text: &str) -> Self {
        let candidates = extract_set(text, GAZETTE_FIELDS);
        Self {
            section: section.to_string(),
            notice_type: notice_type_for(section, &candidates),
            text: text.to_string(),
            candidates,
            oracle_tokens: 0,
        }
    }

    pub fn company_name(&self) -> Option<&str> {
        self.candidates
            .best(fields::COMPANY_NAME)
            .map(|c| c.value.as_str())
    }

    /// Every required field has a high-confidence candidate.
    pub fn is_complete(&self, required: &[RequiredField]) -> bool {
        required
            .iter()
            .all(|f| self.candidates.best_tier(&f.name) == Some(Confidence::High))
    }
}

/// Records built from one gazette document.
#[derive(Debug, Default)]
pub struct GazetteOutcome {
    pub drafts: Vec<RecordDraft>,
    /// Notices dropped for lack of a company name
    pub unusable: usize,
    pub oracle_tokens: u64,
}

fn notice_type_for(section: &str, candidates: &CandidateSet) -> NoticeType {
    match section {
        FINAL_MEETING_SECTION => NoticeType::FinalMeeting,
        LIQUIDATION_SECTION => NoticeType::Liquidation,
        _ if candidates.contains(fields::FINAL_MEETING_DATE)
            && !candidates.contains(fields::RESOLUTION_DATE) =>
        {
            NoticeType::FinalMeeting
        }
        _ => NoticeType::Liquidation,
    }
}

/// Whether the first non-blank line after `end` is a liquidation status line.
fn followed_by_status(text: &str, end: usize) -> bool {
    text[end..]
        .lines()
        .find(|line| !line.trim().is_empty())
        .is_some_and(|line| LIQUIDATION_STATUS.is_match(line))
}

/// Whether the line before `start` is blank or the section heading.
fn opens_block(text: &str, start: usize) -> bool {
    let preceding: Vec<&str> = text[..start].lines().collect();
    preceding.len() <= 1 || preceding.last().is_some_and(|line| line.trim().is_empty())
}

/// Split a section into notices at company header lines.
///
/// A header starts a notice when an `(In ... Liquidation)` line follows it.
/// Sections with no such line split at headers that open a paragraph
/// instead, so a firm name signing off a notice stays part of it. Without
/// any header the section body (minus its heading line) is a single notice.
pub fn split_notices(section_text: &str) -> Vec<&str> {
    let headers: Vec<_> = COMPANY_HEADER.find_iter(section_text).collect();
    let announced: Vec<usize> = headers
        .iter()
        .filter(|m| followed_by_status(section_text, m.end()))
        .map(|m| m.start())
        .collect();
    let starts = if announced.is_empty() {
        headers
            .iter()
            .filter(|m| opens_block(section_text, m.start()))
            .map(|m| m.start())
            .collect()
    } else {
        announced
    };

    if starts.is_empty() {
        let body = section_text
            .split_once('\n')
            .map(|(_, rest)| rest)
            .unwrap_or_default();
        return if body.trim().is_empty() {
            Vec::new()
        } else {
            vec![body.trim()]
        };
    }

    starts
        .iter()
        .enumerate()
        .map(|(i, &start)| {
            let end = starts.get(i + 1).copied().unwrap_or(section_text.len());
            section_text[start..end].trim()
        })
        .collect()
}

/// Pattern-extract every notice of every section, in document order.
pub fn notices_from_sections(sections: &[Section]) -> Vec<NoticeDraft> {
    sections
        .iter()
        .flat_map(|section| {
            split_notices(&section.text)
                .into_iter()
                .map(|text| NoticeDraft::new(&section.name, text))
                .collect::<Vec<_>>()
        })
        .collect()
}

/// Company name with abbreviated legal suffixes spelled out, for matching.
fn canonical_company(name: &str) -> String {
    name.split_whitespace()
        .map(|word| match word.trim_end_matches('.').to_uppercase().as_str() {
            "LTD" => "LIMITED".to_string(),
            "CORP" => "CORPORATION".to_string(),
            "CO" => "COMPANY".to_string(),
            _ => word.to_uppercase(),
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Fold final meeting notices into the liquidation notice of the same
/// company.
///
/// A final meeting notice matches the first liquidation notice whose company
/// name is near-identical once legal suffixes are spelled out. Its final meeting date (and liquidators, when the
/// liquidation notice has none) fill the liquidation notice; unmatched final
/// meeting notices are kept as they are.
pub fn cross_reference(drafts: Vec<NoticeDraft>, threshold: f64) -> Vec<NoticeDraft> {
    let (finals, mut consolidated): (Vec<_>, Vec<_>) = drafts
        .into_iter()
        .partition(|d| d.notice_type == NoticeType::FinalMeeting);

    let mut unmatched = Vec::new();
    for final_notice in finals {
        let target = final_notice
            .company_name()
            .map(canonical_company)
            .and_then(|name| {
                consolidated.iter_mut().find(|d| {
                    d.company_name().is_some_and(|other| {
                        is_near_duplicate(&canonical_company(other), &name, threshold)
                    })
                })
            });

        match target {
            Some(target) => {
                let carried: CandidateSet = [fields::FINAL_MEETING_DATE, fields::LIQUIDATOR_NAMES]
                    .iter()
                    .flat_map(|f| final_notice.candidates.get(f).to_vec())
                    .collect();
                let filled = target.candidates.fill_missing(carried);
                target.oracle_tokens += final_notice.oracle_tokens;
                debug!(
                    company = target.company_name().unwrap_or_default(),
                    fields_filled = filled,
                    "Final meeting notice merged"
                );
            }
            None => unmatched.push(final_notice),
        }
    }

    consolidated.extend(unmatched);
    consolidated
}

fn best_date(candidates: &CandidateSet, field: &str) -> Option<NaiveDate> {
    candidates
        .best(field)
        .and_then(|c| NaiveDate::parse_from_str(&c.value, "%Y-%m-%d").ok())
}

/// Date from a candidate the oracle did not supply.
fn pattern_date(candidates: &CandidateSet, field: &str) -> Option<NaiveDate> {
    candidates
        .best(field)
        .filter(|c| c.method != ExtractionMethod::Oracle)
        .and_then(|c| NaiveDate::parse_from_str(&c.value, "%Y-%m-%d").ok())
}

/// Natural key of a notice built from pattern fields only.
///
/// Oracle-filled dates vary between runs, so they never take part in the
/// fingerprint. The company name is kept whatever its source since a notice
/// without one is dropped.
pub fn notice_identity(draft: &NoticeDraft, notice: &GazetteNotice) -> NaturalKey {
    let keyed = GazetteNotice {
        resolution_date: pattern_date(&draft.candidates, fields::RESOLUTION_DATE),
        final_meeting_date: pattern_date(&draft.candidates, fields::FINAL_MEETING_DATE),
        ..notice.clone()
    };
    RecordBody::GazetteNotice(keyed).natural_key()
}

/// Consolidate a notice's candidates into a typed notice.
///
/// Returns `None` when no company name was found.
pub fn build_notice(draft: &NoticeDraft) -> Option<GazetteNotice> {
    let company_name = draft.company_name()?.to_string();
    let candidates = &draft.candidates;

    Some(GazetteNotice {
        company_name,
        notice_type: draft.notice_type,
        liquidation_type: candidates
            .best(fields::LIQUIDATION_TYPE)
            .and_then(|c| c.value.parse().ok()),
        liquidators: candidates
            .best_values(fields::LIQUIDATOR_NAMES)
            .into_iter()
            .map(|c| c.value.clone())
            .collect(),
        resolution_date: best_date(candidates, fields::RESOLUTION_DATE),
        final_meeting_date: best_date(candidates, fields::FINAL_MEETING_DATE),
        claims_deadline: best_date(candidates, fields::CLAIMS_DEADLINE),
        section: draft.section.clone(),
    })
}

/// Ask the oracle for fields the patterns left incomplete.
///
/// Returns the tokens spent.
async fn enrich<O: Oracle + ?Sized>(
    drafts: &mut [NoticeDraft],
    document_id: &str,
    cascade: &Cascade<'_, O>,
    config: &PipelineConfig,
) -> u64 {
    let required = &config.policies.gazette_notice.required_fields;
    let pending: Vec<usize> = (0..drafts.len())
        .filter(|&i| !drafts[i].is_complete(required))
        .collect();
    if pending.is_empty() {
        return 0;
    }

    let sections = pending
        .iter()
        .map(|&i| {
            let text = &drafts[i].text;
            Section::from_span(format!("{document_id}#{i}"), text, 0, text.len())
        })
        .collect();

    let mut tokens = 0;
    let mut positions = pending.into_iter();
    for batch in plan_batches(sections, config.effective_batch_tokens()) {
        let indices: Vec<usize> = positions.by_ref().take(batch.sections.len()).collect();

        if !config.budget.fits(batch.estimated_tokens) {
            warn!(
                notice = %batch.sections[0].name,
                estimated_tokens = batch.estimated_tokens,
                "Notice exceeds the call budget, keeping pattern fields"
            );
            continue;
        }

        let items: Vec<OracleItem> = batch
            .sections
            .into_iter()
            .map(|s| OracleItem::new(s.name, s.text))
            .collect();
        let (enriched, spent) = cascade.extract_notices(&items).await;
        tokens += spent;

        let Some(enriched) = enriched else { continue };
        let share = per_item_tokens(enriched.tokens, indices.len());
        for (index, candidates) in indices.into_iter().zip(enriched.candidates) {
            let draft = &mut drafts[index];
            let filled = draft.candidates.fill_missing(candidates);
            draft.oracle_tokens += share;
            debug!(notice = index, fields_filled = filled, "Notice enriched");
        }
    }
    tokens
}

/// Extract record drafts from one gazette document.
#[instrument(skip_all, fields(document = %document.id))]
pub async fn process_gazette<O: Oracle + ?Sized>(
    document: &Document,
    segmenter: &Segmenter,
    cascade: &Cascade<'_, O>,
    config: &PipelineConfig,
) -> GazetteOutcome {
    let sections = segmenter.region_of_interest(&document.text);
    let missing = segmenter.missing_targets(&sections);
    if !missing.is_empty() {
        info!(missing = ?missing, sections = sections.len(), "Sections not found");
    }

    let mut drafts = notices_from_sections(&sections);
    let mut outcome = GazetteOutcome::default();
    if config.oracle_enrichment {
        outcome.oracle_tokens = enrich(&mut drafts, &document.id, cascade, config).await;
    }

    let found = drafts.len();
    for draft in cross_reference(drafts, config.near_duplicate_threshold) {
        match build_notice(&draft) {
            Some(notice) => {
                let identity = notice_identity(&draft, &notice);
                outcome.drafts.push(
                    RecordDraft::new(
                        RecordBody::GazetteNotice(notice),
                        draft.candidates,
                        RecordStatus::Extracted,
                        &document.id,
                    )
                    .with_oracle_tokens(draft.oracle_tokens)
                    .with_identity(identity),
                );
            }
            None => {
                debug!(section = %draft.section, "Notice without a company name dropped");
                outcome.unusable += 1;
            }
        }
    }

    info!(
        notices = found,
        records = outcome.drafts.len(),
        unusable = outcome.unusable,
        "Gazette extracted"
    );
    outcome
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::retry::RetryPolicy;
    use crate::pipeline::tokens::CallBudget;
    use crate::testing::MockOracle;
    use crate::types::document::DocumentKind;
    use crate::types::record::LiquidationType;
    use std::time::Duration;

    const LIQUIDATION: &str = "LIQUIDATION NOTICES\n\
        ALPHA HOLDINGS LIMITED\n\
        (In Voluntary Liquidation)\n\
        NOTICE IS HEREBY GIVEN that the following special resolution was passed by the sole shareholder of the Company on 5th March 2024: that the Company be wound up voluntarily.\n\
        Voluntary Liquidator: John Smith\n\
        \n\
        BETA CAPITAL LTD\n\
        (In Official Liquidation)\n\
        Official Liquidators: Jane Doe and Peter Brown\n";

    const FINAL: &str = "FINAL MEETING NOTICES\n\
        ALPHA HOLDINGS LIMITED\n\
        (In Voluntary Liquidation)\n\
        NOTICE IS HEREBY GIVEN that the final general meeting of the Company will be held on 20 June 2024.\n\
        \n\
        GAMMA SPC\n\
        (In Voluntary Liquidation)\n\
        The final meeting of the members will be held on 1st July 2024.\n";

    fn sections() -> Vec<Section> {
        vec![
            Section::from_span(LIQUIDATION_SECTION, LIQUIDATION, 0, LIQUIDATION.len()),
            Section::from_span(FINAL_MEETING_SECTION, FINAL, 0, FINAL.len()),
        ]
    }

    fn cascade(oracle: &MockOracle) -> Cascade<'_, MockOracle> {
        Cascade::new(
            oracle,
            RetryPolicy::new(0, Duration::from_millis(1), Duration::from_secs(5)),
            CallBudget::default(),
        )
    }

    #[test]
    fn test_split_notices_at_company_headers() {
        let notices = split_notices(LIQUIDATION);
        assert_eq!(notices.len(), 2);
        assert!(notices[0].starts_with("ALPHA HOLDINGS LIMITED"));
        assert!(notices[1].starts_with("BETA CAPITAL LTD"));
        assert!(!notices[0].contains("BETA"));
    }

    #[test]
    fn test_split_without_headers_keeps_body() {
        assert_eq!(split_notices("LIQUIDATION NOTICES\nNo notices this week."), vec!["No notices this week."]);
        assert!(split_notices("LIQUIDATION NOTICES\n  \n").is_empty());
    }

    #[test]
    fn test_notice_types_follow_sections() {
        let drafts = notices_from_sections(&sections());
        let types: Vec<_> = drafts.iter().map(|d| d.notice_type).collect();
        assert_eq!(
            types,
            vec![
                NoticeType::Liquidation,
                NoticeType::Liquidation,
                NoticeType::FinalMeeting,
                NoticeType::FinalMeeting
            ]
        );
    }

    #[test]
    fn test_cross_reference_merges_matching_company() {
        let drafts = cross_reference(notices_from_sections(&sections()), 0.85);
        assert_eq!(drafts.len(), 3);

        let alpha = build_notice(&drafts[0]).unwrap();
        assert_eq!(alpha.company_name, "ALPHA HOLDINGS LIMITED");
        assert_eq!(alpha.notice_type, NoticeType::Liquidation);
        assert_eq!(alpha.final_meeting_date, NaiveDate::from_ymd_opt(2024, 6, 20));
        assert_eq!(alpha.resolution_date, NaiveDate::from_ymd_opt(2024, 3, 5));
        assert_eq!(alpha.liquidation_type, Some(LiquidationType::Voluntary));
        assert_eq!(alpha.liquidators, vec!["John Smith"]);

        // GAMMA has no liquidation notice and stays on its own
        let gamma = build_notice(&drafts[2]).unwrap();
        assert_eq!(gamma.company_name, "GAMMA SPC");
        assert_eq!(gamma.notice_type, NoticeType::FinalMeeting);
        assert_eq!(gamma.final_meeting_date, NaiveDate::from_ymd_opt(2024, 7, 1));
    }

    #[test]
    fn test_signature_line_stays_in_notice() {
        let section = "LIQUIDATION NOTICES\n\
            ALPHA HOLDINGS LIMITED\n\
            (In Voluntary Liquidation)\n\
            Voluntary Liquidator: John Smith\n\
            \n\
            KPMG LIMITED\n\
            PO Box 493, Grand Cayman\n\
            \n\
            BETA CAPITAL LTD\n\
            (In Official Liquidation)\n\
            Official Liquidators: Jane Doe and Peter Brown\n";

        let notices = split_notices(section);
        assert_eq!(notices.len(), 2);
        assert!(notices[0].starts_with("ALPHA HOLDINGS LIMITED"));
        assert!(notices[0].contains("KPMG LIMITED"));
        assert!(notices[1].starts_with("BETA CAPITAL LTD"));

        let alpha = NoticeDraft::new(LIQUIDATION_SECTION, notices[0]);
        assert_eq!(alpha.company_name(), Some("ALPHA HOLDINGS LIMITED"));
    }

    #[test]
    fn test_split_without_status_lines_uses_paragraphs() {
        let section = "LIQUIDATION NOTICES\n\
            ALPHA HOLDINGS LIMITED\n\
            Notice of the appointment of liquidators.\n\
            KPMG LIMITED\n\
            \n\
            BETA CAPITAL LTD\n\
            Notice of the appointment of liquidators.\n";

        let notices = split_notices(section);
        assert_eq!(notices.len(), 2);
        assert!(notices[0].ends_with("KPMG LIMITED"));
        assert!(notices[1].starts_with("BETA CAPITAL LTD"));
    }

    #[test]
    fn test_cross_reference_ignores_suffix_abbreviation() {
        let liquidation = NoticeDraft::new(
            LIQUIDATION_SECTION,
            "ALPHA HOLDINGS LIMITED\n(In Voluntary Liquidation)\nVoluntary Liquidator: John Smith",
        );
        let final_meeting = NoticeDraft::new(
            FINAL_MEETING_SECTION,
            "ALPHA HOLDINGS LTD\n(In Voluntary Liquidation)\n\
             The final general meeting of the Company will be held on 20 June 2024.",
        );

        let drafts = cross_reference(vec![liquidation, final_meeting], 0.85);
        assert_eq!(drafts.len(), 1);
        let alpha = build_notice(&drafts[0]).unwrap();
        assert_eq!(alpha.company_name, "ALPHA HOLDINGS LIMITED");
        assert_eq!(alpha.final_meeting_date, NaiveDate::from_ymd_opt(2024, 6, 20));
    }

    #[test]
    fn test_canonical_company_suffixes() {
        assert_eq!(canonical_company("Alpha Holdings Ltd."), "ALPHA HOLDINGS LIMITED");
        assert_eq!(canonical_company("BETA CORP"), "BETA CORPORATION");
        assert_eq!(canonical_company("GAMMA SPC"), "GAMMA SPC");
    }

    #[test]
    fn test_multi_valued_liquidators() {
        let drafts = notices_from_sections(&sections());
        let beta = build_notice(&drafts[1]).unwrap();
        assert_eq!(beta.liquidation_type, Some(LiquidationType::Official));
        assert_eq!(beta.liquidators, vec!["Jane Doe", "Peter Brown"]);
    }

    #[test]
    fn test_build_notice_requires_company() {
        let draft = NoticeDraft::new(LIQUIDATION_SECTION, "Notice is given of nothing in particular.");
        assert!(build_notice(&draft).is_none());
    }

    #[tokio::test]
    async fn test_process_gazette_without_enrichment_makes_no_calls() {
        let text = format!("COMMERCIAL\n{LIQUIDATION}\n{FINAL}\nDORMANT ACCOUNTS NOTICES\nnothing\nGOVERNMENT\n");
        let document = Document::new("gazette-1", DocumentKind::Gazette, text);
        let config = PipelineConfig::default();
        let segmenter = Segmenter::new(&config.vocabulary).unwrap();
        let oracle = MockOracle::new();

        let outcome = process_gazette(&document, &segmenter, &cascade(&oracle), &config).await;
        assert_eq!(outcome.drafts.len(), 3);
        assert_eq!(outcome.oracle_tokens, 0);
        assert_eq!(oracle.call_count(), 0);
        assert!(outcome.drafts.iter().all(|d| d.document_id == "gazette-1"));
    }

    #[tokio::test]
    async fn test_enrichment_fills_missing_fields_only() {
        let text = "LIQUIDATION NOTICES\nDELTA FUND LTD\n(In Voluntary Liquidation)\nCreditors should contact the liquidator.\n";
        let document = Document::new("gazette-2", DocumentKind::Gazette, text);
        let config = PipelineConfig::default().with_oracle_enrichment(true);
        let segmenter = Segmenter::new(&config.vocabulary).unwrap();
        let oracle = MockOracle::new().with_response(
            r#"[{"company_name": "SOMETHING ELSE LTD", "liquidator_names": ["Mary Major"],
                 "resolution_date": "2024-02-01"}]"#,
        );

        let outcome = process_gazette(&document, &segmenter, &cascade(&oracle), &config).await;
        assert_eq!(oracle.call_count(), 1);
        assert_eq!(outcome.oracle_tokens, 100);

        let draft = &outcome.drafts[0];
        let RecordBody::GazetteNotice(notice) = &draft.body else {
            panic!("expected a gazette notice");
        };
        // pattern value wins over the oracle's
        assert_eq!(notice.company_name, "DELTA FUND LTD");
        assert_eq!(notice.liquidators, vec!["Mary Major"]);
        assert_eq!(notice.resolution_date, NaiveDate::from_ymd_opt(2024, 2, 1));
        assert_eq!(draft.oracle_tokens, 100);
        assert_eq!(draft.method(), ExtractionMethod::Oracle);

        // The oracle's date does not reach the fingerprint
        let expected = NaturalKey::new(crate::types::record::RecordKind::GazetteNotice)
            .field("DELTA FUND LTD")
            .field(NoticeType::Liquidation.as_str())
            .field("");
        assert_eq!(draft.identity.as_ref(), Some(&expected));
    }
}
