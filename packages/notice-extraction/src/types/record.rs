//! Persisted structured records.
//!
//! A record is a tagged variant per document kind with explicit optional
//! fields. Loosely shaped oracle JSON is coerced into these types at the
//! response boundary and never travels further.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::pipeline::fingerprint::{fingerprint, NaturalKey};
use crate::types::candidate::{CandidateSet, ExtractionMethod};

/// Which record variant a record is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordKind {
    GazetteNotice,
    CaseFiling,
    Article,
}

impl RecordKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::GazetteNotice => "gazette_notice",
            Self::CaseFiling => "case_filing",
            Self::Article => "article",
        }
    }
}

/// Type of gazette notice a record was built from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NoticeType {
    Liquidation,
    FinalMeeting,
}

impl NoticeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Liquidation => "liquidation",
            Self::FinalMeeting => "final_meeting",
        }
    }
}

/// Liquidation regime named in a notice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LiquidationType {
    Voluntary,
    Official,
}

impl LiquidationType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Voluntary => "Voluntary",
            Self::Official => "Official",
        }
    }
}

impl std::str::FromStr for LiquidationType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.trim().to_lowercase();
        if lower.starts_with("voluntar") {
            Ok(Self::Voluntary)
        } else if lower.starts_with("official") || lower.starts_with("court") {
            Ok(Self::Official)
        } else {
            Err(format!("unknown liquidation type: {s}"))
        }
    }
}

/// A consolidated gazette notice.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GazetteNotice {
    pub company_name: String,
    pub notice_type: NoticeType,
    pub liquidation_type: Option<LiquidationType>,
    #[serde(default)]
    pub liquidators: Vec<String>,
    pub resolution_date: Option<NaiveDate>,
    pub final_meeting_date: Option<NaiveDate>,
    pub claims_deadline: Option<NaiveDate>,
    /// Name of the gazette section the notice was found in
    pub section: String,
}

/// A court registry filing summary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaseFiling {
    pub case_number: String,
    pub filing_date: Option<NaiveDate>,
    pub title: Option<String>,
    pub subject: Option<String>,
    pub claim_amount: Option<Decimal>,
    #[serde(default)]
    pub risk_signals: Vec<RiskSignal>,
}

/// Topic assigned to a news article.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArticleCategory {
    Insolvency,
    Litigation,
    Regulatory,
    Corporate,
    Other,
}

impl ArticleCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Insolvency => "insolvency",
            Self::Litigation => "litigation",
            Self::Regulatory => "regulatory",
            Self::Corporate => "corporate",
            Self::Other => "other",
        }
    }
}

impl std::str::FromStr for ArticleCategory {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "insolvency" | "liquidation" | "restructuring" => Ok(Self::Insolvency),
            "litigation" | "court" | "dispute" => Ok(Self::Litigation),
            "regulatory" | "regulation" | "enforcement" => Ok(Self::Regulatory),
            "corporate" | "business" | "funds" => Ok(Self::Corporate),
            "other" | "" => Ok(Self::Other),
            other => Err(format!("unknown article category: {other}")),
        }
    }
}

/// Risk signal attached to a filing or article.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskSignal {
    Fraud,
    Enforcement,
    Sanctions,
    Insolvency,
    Litigation,
    Regulatory,
}

impl RiskSignal {
    /// Signals that force manual review regardless of score.
    pub fn is_high_risk(&self) -> bool {
        matches!(self, Self::Fraud | Self::Enforcement | Self::Sanctions)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Fraud => "fraud",
            Self::Enforcement => "enforcement",
            Self::Sanctions => "sanctions",
            Self::Insolvency => "insolvency",
            Self::Litigation => "litigation",
            Self::Regulatory => "regulatory",
        }
    }
}

impl std::str::FromStr for RiskSignal {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "fraud" => Ok(Self::Fraud),
            "enforcement" => Ok(Self::Enforcement),
            "sanctions" | "sanction" => Ok(Self::Sanctions),
            "insolvency" => Ok(Self::Insolvency),
            "litigation" => Ok(Self::Litigation),
            "regulatory" => Ok(Self::Regulatory),
            other => Err(format!("unknown risk signal: {other}")),
        }
    }
}

/// A news article after classification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassifiedArticle {
    pub title: String,
    pub url: Option<String>,
    pub published_at: DateTime<Utc>,
    pub relevant: bool,
    pub category: ArticleCategory,
    pub summary: Option<String>,
    #[serde(default)]
    pub risk_signals: Vec<RiskSignal>,
    #[serde(default)]
    pub entities: Vec<String>,
}

/// Record payload, one variant per document kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RecordBody {
    GazetteNotice(GazetteNotice),
    CaseFiling(CaseFiling),
    Article(ClassifiedArticle),
}

impl RecordBody {
    pub fn kind(&self) -> RecordKind {
        match self {
            Self::GazetteNotice(_) => RecordKind::GazetteNotice,
            Self::CaseFiling(_) => RecordKind::CaseFiling,
            Self::Article(_) => RecordKind::Article,
        }
    }

    /// Natural-key fields in their fixed order.
    ///
    /// Changing the order or membership of these fields changes every
    /// fingerprint of that kind.
    pub fn natural_key(&self) -> NaturalKey {
        match self {
            Self::GazetteNotice(n) => {
                let date = match n.notice_type {
                    NoticeType::Liquidation => n.resolution_date,
                    NoticeType::FinalMeeting => n.final_meeting_date,
                };
                NaturalKey::new(RecordKind::GazetteNotice)
                    .field(&n.company_name)
                    .field(n.notice_type.as_str())
                    .field(date.map(|d| d.to_string()).unwrap_or_default())
            }
            Self::CaseFiling(f) => NaturalKey::new(RecordKind::CaseFiling)
                .field(&f.case_number)
                .field(f.filing_date.map(|d| d.to_string()).unwrap_or_default())
                .field(f.title.as_deref().unwrap_or_default())
                .field(f.subject.as_deref().unwrap_or_default()),
            Self::Article(a) => NaturalKey::new(RecordKind::Article)
                .field(&a.title)
                .field(a.published_at.date_naive().to_string()),
        }
    }

    /// Display title of the record.
    pub fn title(&self) -> Option<&str> {
        match self {
            Self::GazetteNotice(n) => Some(&n.company_name),
            Self::CaseFiling(f) => f.title.as_deref(),
            Self::Article(a) => Some(&a.title),
        }
    }

    /// Title compared for near-duplicates.
    ///
    /// Only articles take part: distinct filings and notices routinely share
    /// near-identical captions and are identified by their natural key alone.
    pub fn near_duplicate_title(&self) -> Option<&str> {
        match self {
            Self::Article(a) => Some(&a.title),
            _ => None,
        }
    }

    pub fn risk_signals(&self) -> &[RiskSignal] {
        match self {
            Self::GazetteNotice(_) => &[],
            Self::CaseFiling(f) => &f.risk_signals,
            Self::Article(a) => &a.risk_signals,
        }
    }

    /// First high-risk signal carried by the record, if any.
    pub fn high_risk_signal(&self) -> Option<RiskSignal> {
        self.risk_signals().iter().copied().find(RiskSignal::is_high_risk)
    }
}

/// Processing status of a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordStatus {
    /// Fields came from the pattern table (optionally enriched by the oracle)
    Extracted,
    /// Classified by the oracle
    Classified,
    /// Produced by the heuristic fallback after the oracle failed
    Degraded,
}

impl RecordStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Extracted => "extracted",
            Self::Classified => "classified",
            Self::Degraded => "degraded",
        }
    }
}

/// Where a record came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Provenance {
    pub method: ExtractionMethod,
    /// Oracle tokens attributed to this record
    pub oracle_tokens: u32,
    pub run_id: Uuid,
    pub document_id: String,
}

/// A persisted record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub id: Uuid,
    pub fingerprint: String,
    pub body: RecordBody,
    pub quality_score: u8,
    pub requires_review: bool,
    pub status: RecordStatus,
    pub provenance: Provenance,
    pub created_at: DateTime<Utc>,
}

impl Record {
    /// Build a record; the fingerprint is derived from the body's natural key.
    pub fn new(body: RecordBody, status: RecordStatus, provenance: Provenance) -> Self {
        Self {
            id: Uuid::now_v7(),
            fingerprint: fingerprint(&body.natural_key()),
            body,
            quality_score: 100,
            requires_review: false,
            status,
            provenance,
            created_at: Utc::now(),
        }
    }

    /// Fingerprint from an explicit key instead of the body's own.
    pub fn with_identity(mut self, key: &NaturalKey) -> Self {
        self.fingerprint = fingerprint(key);
        self
    }

    /// Apply a quality assessment.
    pub fn with_quality(mut self, score: u8, requires_review: bool) -> Self {
        self.quality_score = score;
        self.requires_review = requires_review;
        self
    }

    pub fn kind(&self) -> RecordKind {
        self.body.kind()
    }
}

/// An extracted record body with the evidence it was built from.
///
/// Drafts are scored and deduplicated before they become records.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordDraft {
    pub body: RecordBody,
    pub candidates: CandidateSet,
    pub status: RecordStatus,
    pub oracle_tokens: u32,
    pub document_id: String,
    /// Key to fingerprint by when it differs from the body's natural key
    pub identity: Option<NaturalKey>,
}

impl RecordDraft {
    pub fn new(
        body: RecordBody,
        candidates: CandidateSet,
        status: RecordStatus,
        document_id: impl Into<String>,
    ) -> Self {
        Self {
            body,
            candidates,
            status,
            oracle_tokens: 0,
            document_id: document_id.into(),
            identity: None,
        }
    }

    pub fn with_identity(mut self, key: NaturalKey) -> Self {
        self.identity = Some(key);
        self
    }

    pub fn with_oracle_tokens(mut self, tokens: u32) -> Self {
        self.oracle_tokens = tokens;
        self
    }

    /// How the record was produced, for provenance.
    pub fn method(&self) -> ExtractionMethod {
        match self.status {
            RecordStatus::Degraded => ExtractionMethod::Heuristic,
            RecordStatus::Classified => ExtractionMethod::Oracle,
            RecordStatus::Extracted if self.candidates.uses_method(ExtractionMethod::Oracle) => {
                ExtractionMethod::Oracle
            }
            RecordStatus::Extracted => ExtractionMethod::Pattern,
        }
    }

    /// Build the record for a run.
    pub fn into_record(self, run_id: Uuid) -> Record {
        let provenance = Provenance {
            method: self.method(),
            oracle_tokens: self.oracle_tokens,
            run_id,
            document_id: self.document_id,
        };
        let record = Record::new(self.body, self.status, provenance);
        match &self.identity {
            Some(key) => record.with_identity(key),
            None => record,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn filing(case_number: &str) -> RecordBody {
        RecordBody::CaseFiling(CaseFiling {
            case_number: case_number.to_string(),
            filing_date: NaiveDate::from_ymd_opt(2024, 3, 12),
            title: Some("Alpha Fund Ltd v Beta Capital Partners".to_string()),
            subject: Some("Winding up petition".to_string()),
            claim_amount: None,
            risk_signals: vec![RiskSignal::Litigation],
        })
    }

    fn provenance(run_id: Uuid) -> Provenance {
        Provenance {
            method: ExtractionMethod::Pattern,
            oracle_tokens: 0,
            run_id,
            document_id: "doc".to_string(),
        }
    }

    #[test]
    fn test_fingerprint_ignores_run_and_identity() {
        let a = Record::new(filing("FSD 123 of 2024"), RecordStatus::Extracted, provenance(Uuid::now_v7()));
        let b = Record::new(filing("FSD 123 of 2024"), RecordStatus::Extracted, provenance(Uuid::now_v7()));
        assert_ne!(a.id, b.id);
        assert_eq!(a.fingerprint, b.fingerprint);
    }

    #[test]
    fn test_fingerprint_changes_with_natural_key() {
        let a = Record::new(filing("FSD 123 of 2024"), RecordStatus::Extracted, provenance(Uuid::nil()));
        let b = Record::new(filing("FSD 124 of 2024"), RecordStatus::Extracted, provenance(Uuid::nil()));
        assert_ne!(a.fingerprint, b.fingerprint);
    }

    #[test]
    fn test_draft_identity_overrides_body_key() {
        let key = filing("FSD 123 of 2024").natural_key();
        let draft = RecordDraft::new(
            filing("FSD 999 of 2024"),
            CandidateSet::default(),
            RecordStatus::Extracted,
            "doc",
        )
        .with_identity(key.clone());

        let record = draft.into_record(Uuid::nil());
        assert_eq!(record.fingerprint, fingerprint(&key));
        assert_ne!(record.fingerprint, fingerprint(&record.body.natural_key()));
    }

    #[test]
    fn test_body_serializes_with_kind_tag() {
        let json = serde_json::to_value(filing("FSD 1 of 2024")).unwrap();
        assert_eq!(json["kind"], "case_filing");
        assert_eq!(json["case_number"], "FSD 1 of 2024");
    }

    #[test]
    fn test_high_risk_signal() {
        let mut body = filing("FSD 1 of 2024");
        assert_eq!(body.high_risk_signal(), None);
        if let RecordBody::CaseFiling(f) = &mut body {
            f.risk_signals.push(RiskSignal::Fraud);
        }
        assert_eq!(body.high_risk_signal(), Some(RiskSignal::Fraud));
    }

    #[test]
    fn test_liquidation_type_parsing() {
        assert_eq!("Voluntarily".parse::<LiquidationType>(), Ok(LiquidationType::Voluntary));
        assert_eq!("official".parse::<LiquidationType>(), Ok(LiquidationType::Official));
        assert!("members".parse::<LiquidationType>().is_err());
    }
}
