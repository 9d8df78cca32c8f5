//! Declarative field pattern table.
//!
//! Each entry names a field, the trigger keywords that gate it, an ordered
//! list of regexes whose first capture group is the value, and an optional
//! validator and transformer. Adding a field means adding a row here.
//!
//! Confidence is derived from the matched span: two or more distinct field
//! keywords give `High`, exactly one gives `Medium`, none gives `Low`. A
//! failed validator or transformer keeps the candidate but forces `Low`.

use chrono::NaiveDate;
use lazy_static::lazy_static;
use regex::Regex;
use rust_decimal::Decimal;
use std::str::FromStr;

use crate::types::candidate::{CandidateSet, Confidence, ExtractionCandidate, ExtractionMethod};
use crate::types::record::{LiquidationType, RiskSignal};

/// Field names shared by patterns, policies and records.
pub mod fields {
    pub const COMPANY_NAME: &str = "company_name";
    pub const LIQUIDATION_TYPE: &str = "liquidation_type";
    pub const LIQUIDATOR_NAMES: &str = "liquidator_names";
    pub const RESOLUTION_DATE: &str = "resolution_date";
    pub const FINAL_MEETING_DATE: &str = "final_meeting_date";
    pub const CLAIMS_DEADLINE: &str = "claims_deadline";

    pub const CASE_NUMBER: &str = "case_number";
    pub const FILING_DATE: &str = "filing_date";
    pub const CASE_TITLE: &str = "case_title";
    pub const SUBJECT: &str = "subject";
    pub const CLAIM_AMOUNT: &str = "claim_amount";

    pub const TITLE: &str = "title";
    pub const SUMMARY: &str = "summary";
    pub const CATEGORY: &str = "category";
}

/// Fields extracted from every gazette notice.
pub const GAZETTE_FIELDS: &[&str] = &[
    fields::COMPANY_NAME,
    fields::LIQUIDATION_TYPE,
    fields::LIQUIDATOR_NAMES,
    fields::RESOLUTION_DATE,
    fields::FINAL_MEETING_DATE,
    fields::CLAIMS_DEADLINE,
];

/// Fields extracted from a case filing.
pub const FILING_FIELDS: &[&str] = &[
    fields::CASE_NUMBER,
    fields::FILING_DATE,
    fields::CASE_TITLE,
    fields::SUBJECT,
    fields::CLAIM_AMOUNT,
];

/// Long-form date: "5th March 2024", "12 Apr, 2024".
const DATE: &str = r"\d{1,2}(?:st|nd|rd|th)?\s+(?:Jan(?:uary)?|Feb(?:ruary)?|Mar(?:ch)?|Apr(?:il)?|May|June?|July?|Aug(?:ust)?|Sep(?:t(?:ember)?)?|Oct(?:ober)?|Nov(?:ember)?|Dec(?:ember)?),?\s+\d{4}";

/// Company header suffixes.
const COMPANY_SUFFIX: &str = r"(?:LIMITED|LTD\.?|INC\.?|SPC|L\.P\.|CORPORATION|CORP\.?)";

/// One row of the pattern table.
pub struct FieldPattern {
    pub field: &'static str,
    /// Lowercase trigger keywords; also drive the confidence tier
    pub keywords: &'static [&'static str],
    pub patterns: Vec<Regex>,
    pub validator: Option<fn(&str) -> bool>,
    pub transform: Option<fn(&str) -> Option<String>>,
    /// Multi-valued fields split a capture into several values
    pub multi: bool,
}

impl FieldPattern {
    fn new(field: &'static str, keywords: &'static [&'static str], patterns: &[&str]) -> Self {
        Self {
            field,
            keywords,
            patterns: patterns
                .iter()
                .map(|p| Regex::new(p).unwrap())
                .collect(),
            validator: None,
            transform: None,
            multi: false,
        }
    }

    fn validator(mut self, f: fn(&str) -> bool) -> Self {
        self.validator = Some(f);
        self
    }

    fn transform(mut self, f: fn(&str) -> Option<String>) -> Self {
        self.transform = Some(f);
        self
    }

    fn multi(mut self) -> Self {
        self.multi = true;
        self
    }

    /// Whether any trigger keyword occurs in the lowercased text.
    fn triggered(&self, lower: &str) -> bool {
        self.keywords.iter().any(|k| lower.contains(k))
    }

    /// Tier for a matched span.
    pub fn tier(&self, span: &str) -> Confidence {
        let lower = span.to_lowercase();
        match self.keywords.iter().filter(|k| lower.contains(*k)).count() {
            0 => Confidence::Low,
            1 => Confidence::Medium,
            _ => Confidence::High,
        }
    }

    /// Run every regex of this row over `text`.
    fn candidates(&self, text: &str) -> Vec<ExtractionCandidate> {
        let mut found = Vec::new();

        for regex in &self.patterns {
            for caps in regex.captures_iter(text) {
                let (Some(whole), Some(value)) = (caps.get(0), caps.get(1)) else {
                    continue;
                };
                let span = whole.as_str();
                let tier = self.tier(span);

                let raw_values: Vec<&str> = if self.multi {
                    LIST_SEPARATOR
                        .split(value.as_str())
                        .map(str::trim)
                        .filter(|v| !v.is_empty())
                        .collect()
                } else {
                    vec![value.as_str().trim()]
                };

                for raw in raw_values {
                    found.push(self.candidate(raw, span, whole.start(), tier));
                }
            }
        }

        found.sort_by_key(|c| c.offset);
        found
    }

    fn candidate(&self, raw: &str, span: &str, offset: usize, tier: Confidence) -> ExtractionCandidate {
        let mut confidence = tier;
        let mut value = raw.to_string();

        if let Some(transform) = self.transform {
            match transform(raw) {
                Some(transformed) => value = transformed,
                None => confidence = Confidence::Low,
            }
        }
        if let Some(validator) = self.validator {
            if !validator(&value) {
                confidence = Confidence::Low;
            }
        }

        ExtractionCandidate {
            field: self.field.to_string(),
            value,
            confidence,
            method: ExtractionMethod::Pattern,
            span: span.to_string(),
            offset,
        }
    }
}

lazy_static! {
    static ref LIST_SEPARATOR: Regex = Regex::new(r"\s*(?:,|&|\band\b)\s*").unwrap();
    static ref ORDINAL: Regex = Regex::new(r"(?i)(\d)(?:st|nd|rd|th)\b").unwrap();
    static ref WHITESPACE: Regex = Regex::new(r"\s+").unwrap();
    static ref CASE_NUMBER_PARTS: Regex =
        Regex::new(r"(?i)^([a-z]{2,4})\s*(\d+)\s+of\s+(\d{4})$").unwrap();

    /// A company header line, e.g. `ALPHA HOLDINGS LIMITED`.
    pub static ref COMPANY_HEADER: Regex = Regex::new(&format!(
        r"(?m)^[ \t]*([A-Z0-9][A-Z0-9&'.,\- ]*?\b{COMPANY_SUFFIX})[ \t]*\r?$"
    ))
    .unwrap();

    /// The status line under a notice header, e.g. `(In Voluntary Liquidation)`.
    pub static ref LIQUIDATION_STATUS: Regex =
        Regex::new(r"^[ \t]*\((?i:in\s+(?:voluntary\s+|official\s+)?liquidation)\)").unwrap();

    /// Every field the pipeline knows how to pattern-match.
    pub static ref PATTERN_TABLE: Vec<FieldPattern> = vec![
        FieldPattern::new(
            fields::COMPANY_NAME,
            &["limited", "ltd", "inc", "spc", "l.p.", "corporation", "corp", "liquidation"],
            &[
                format!(
                    r"(?m)^[ \t]*([A-Z0-9][A-Z0-9&'.,\- ]*?\b{COMPANY_SUFFIX})[ \t]*\r?\n[ \t]*\((?i:in\s+(?:voluntary\s+|official\s+)?liquidation)\)"
                ).as_str(),
                format!(r"(?m)^[ \t]*([A-Z0-9][A-Z0-9&'.,\- ]*?\b{COMPANY_SUFFIX})[ \t]*\r?$").as_str(),
            ],
        )
        .transform(collapse_whitespace)
        .validator(|v| v.len() >= 3 && v.chars().any(char::is_alphabetic)),
        FieldPattern::new(
            fields::LIQUIDATION_TYPE,
            &["voluntary", "voluntarily", "official", "liquidation", "wound up"],
            &[
                r"(?i)\bin\s+(voluntary|official)\s+liquidation\b",
                r"(?i)\bwound\s+up\s+(voluntarily)\b",
                r"(?i)\b(official)\s+liquidators?\b",
            ],
        )
        .transform(|v| v.parse::<LiquidationType>().ok().map(|t| t.as_str().to_string())),
        FieldPattern::new(
            fields::LIQUIDATOR_NAMES,
            &["liquidator", "joint", "voluntary", "official"],
            &[r"(?i:(?:joint[ \t]+)?(?:voluntary[ \t]+|official[ \t]+)?liquidators?)[ \t]*[:\-]?[ \t]*([A-Z][A-Za-z'.\-]*(?:(?:[ \t]+|,[ \t]*)(?:and[ \t]+|&[ \t]+)?[A-Z][A-Za-z'.\-]*)+)"],
        )
        .multi()
        .transform(collapse_whitespace)
        .validator(is_person_name),
        FieldPattern::new(
            fields::RESOLUTION_DATE,
            &["resolution", "resolved", "passed", "special", "shareholder", "members"],
            &[
                format!(r"(?i)\bresolution[^\n]{{0,160}}?\bon\s+({DATE})").as_str(),
                format!(r"(?i)\bresolved[^\n]{{0,160}}?\bon\s+({DATE})").as_str(),
            ],
        )
        .transform(iso_date),
        FieldPattern::new(
            fields::FINAL_MEETING_DATE,
            &["final", "meeting", "general", "held"],
            &[format!(r"(?i)\bfinal\s+(?:general\s+)?meeting[^\n]{{0,160}}?\bon\s+({DATE})").as_str()],
        )
        .transform(iso_date),
        FieldPattern::new(
            fields::CLAIMS_DEADLINE,
            &["debts", "claims", "before", "creditors"],
            &[format!(
                r"(?i)\b(?:prove\s+their\s+debts|submit\s+(?:their\s+)?claims)[^\n]{{0,160}}?\bbefore\s+({DATE})"
            ).as_str()],
        )
        .transform(iso_date),
        FieldPattern::new(
            fields::CASE_NUMBER,
            &["cause", "case", "fsd", "no"],
            &[r"(?i)\b(?:cause|case)\s+(?:no\.?|number)\s*:?\s*([a-z]{2,4}\s*\d+\s+of\s+\d{4})"],
        )
        .transform(normalize_case_number),
        FieldPattern::new(
            fields::FILING_DATE,
            &["filed", "filing", "date", "lodged"],
            &[format!(
                r"(?i)\b(?:date\s+of\s+filing|filing\s+date|filed\s+on|lodged\s+on)\s*:?\s*({DATE})"
            ).as_str()],
        )
        .transform(iso_date),
        FieldPattern::new(
            fields::CASE_TITLE,
            &["title", " v ", " vs ", "in the matter of", "matter"],
            &[
                r"(?m)^[ \t]*(?i:title)[ \t]*:[ \t]*([^\n]+?)[ \t]*\r?$",
                r"(?im)\b(in\s+the\s+matter\s+of\s+[^\n]+?)[ \t]*\r?$",
            ],
        )
        .transform(collapse_whitespace)
        .validator(|v| v.len() >= 3),
        FieldPattern::new(
            fields::SUBJECT,
            &["nature", "claim", "subject", "proceeding"],
            &[r"(?im)^[ \t]*(?:nature\s+of\s+(?:the\s+)?(?:claim|proceedings?)|subject(?:\s+matter)?)[ \t]*:[ \t]*([^\n]+?)[ \t]*\r?$"],
        )
        .transform(collapse_whitespace),
        FieldPattern::new(
            fields::CLAIM_AMOUNT,
            &["amount", "claim", "sum", "us$", "usd"],
            &[r"(?i)\b(?:amount\s+claimed|claim\s+amount|sum\s+of)\s*:?\s*((?:US\$|USD|KYD|CI\$|\$|£|€)\s?[\d,]+(?:\.\d{1,2})?)"],
        )
        .transform(decimal_amount),
    ];
}

/// Keywords that raise each risk signal, checked case-insensitively.
pub const RISK_KEYWORDS: &[(RiskSignal, &[&str])] = &[
    (RiskSignal::Fraud, &["fraud", "misappropriat", "ponzi", "embezzl"]),
    (RiskSignal::Enforcement, &["enforcement action", "enforcement notice", "freezing order", "asset freeze", "penalty"]),
    (RiskSignal::Sanctions, &["sanction", "ofac", "designated person"]),
    (RiskSignal::Insolvency, &["liquidat", "winding up", "wound up", "insolven", "bankrupt", "receiver"]),
    (RiskSignal::Litigation, &["petition", "lawsuit", "claim", "proceedings", " v "]),
    (RiskSignal::Regulatory, &["regulator", "monetary authority", "licence revoked", "license revoked"]),
];

/// Risk signals mentioned in `text`, in table order.
pub fn detect_risk_signals(text: &str) -> Vec<RiskSignal> {
    let lower = text.to_lowercase();
    RISK_KEYWORDS
        .iter()
        .filter(|(_, keywords)| keywords.iter().any(|k| lower.contains(k)))
        .map(|(signal, _)| *signal)
        .collect()
}

/// Look up a table row by field name.
pub fn pattern_for(field: &str) -> Option<&'static FieldPattern> {
    PATTERN_TABLE.iter().find(|p| p.field == field)
}

/// Extract candidates for `target_fields` from `text`.
///
/// Output is grouped by field in `target_fields` order, document order
/// within a field. Unknown field names are ignored.
pub fn extract(text: &str, target_fields: &[&str]) -> Vec<ExtractionCandidate> {
    let lower = text.to_lowercase();
    target_fields
        .iter()
        .filter_map(|f| pattern_for(f))
        .filter(|p| p.triggered(&lower))
        .flat_map(|p| p.candidates(text))
        .collect()
}

/// Extract and group candidates by field.
pub fn extract_set(text: &str, target_fields: &[&str]) -> CandidateSet {
    extract(text, target_fields).into_iter().collect()
}

/// Parse a long-form date such as "5th March 2024" or "12 Apr, 2024".
pub fn parse_long_date(raw: &str) -> Option<NaiveDate> {
    let cleaned = ORDINAL.replace_all(raw, "$1").replace(',', " ");
    let cleaned = WHITESPACE.replace_all(cleaned.trim(), " ");
    NaiveDate::parse_from_str(&cleaned, "%d %B %Y").ok()
}

fn iso_date(raw: &str) -> Option<String> {
    parse_long_date(raw).map(|d| d.format("%Y-%m-%d").to_string())
}

fn collapse_whitespace(raw: &str) -> Option<String> {
    let collapsed = WHITESPACE.replace_all(raw.trim(), " ").to_string();
    (!collapsed.is_empty()).then_some(collapsed)
}

fn normalize_case_number(raw: &str) -> Option<String> {
    let collapsed = WHITESPACE.replace_all(raw.trim(), " ");
    let caps = CASE_NUMBER_PARTS.captures(&collapsed)?;
    let number: u64 = caps[2].parse().ok()?;
    Some(format!("{} {} of {}", caps[1].to_uppercase(), number, &caps[3]))
}

fn decimal_amount(raw: &str) -> Option<String> {
    let digits: String = raw
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '.')
        .collect();
    Decimal::from_str(&digits).ok().map(|d| d.to_string())
}

/// Title-case name of at least two words. Initials ("J.") are allowed.
fn is_person_name(value: &str) -> bool {
    let words: Vec<&str> = value.split_whitespace().collect();
    value.len() >= 5 && words.len() >= 2 && words.iter().all(|w| is_title_word(w))
}

fn is_title_word(word: &str) -> bool {
    let mut chars = word.chars();
    let Some(first) = chars.next() else {
        return false;
    };
    let rest: String = chars.collect();
    first.is_uppercase()
        && (rest.is_empty() || rest == "." || rest.chars().any(char::is_lowercase))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn values(text: &str, field: &str) -> Vec<(String, Confidence)> {
        extract(text, &[field])
            .into_iter()
            .map(|c| (c.value, c.confidence))
            .collect()
    }

    #[test]
    fn test_every_field_constant_has_a_row_or_is_oracle_only() {
        for field in GAZETTE_FIELDS.iter().chain(FILING_FIELDS) {
            assert!(pattern_for(field).is_some(), "no pattern row for {field}");
        }
        assert!(pattern_for(fields::SUMMARY).is_none());
    }

    #[test]
    fn test_company_name_with_liquidation_line_is_high() {
        let text = "ALPHA HOLDINGS LIMITED\n(In Voluntary Liquidation)\nThe Companies Act";
        let found = values(text, fields::COMPANY_NAME);
        assert_eq!(found[0], ("ALPHA HOLDINGS LIMITED".to_string(), Confidence::High));
    }

    #[test]
    fn test_company_header_alone_is_medium() {
        let text = "Notice is given\nBETA CAPITAL LTD\nTake notice that";
        let found = values(text, fields::COMPANY_NAME);
        assert_eq!(found, vec![("BETA CAPITAL LTD".to_string(), Confidence::Medium)]);
    }

    #[test]
    fn test_liquidation_type_transform() {
        let found = values("GAMMA SPC\n(In Official Liquidation)", fields::LIQUIDATION_TYPE);
        assert_eq!(found[0], ("Official".to_string(), Confidence::High));

        let found = values("that the Company be wound up voluntarily.", fields::LIQUIDATION_TYPE);
        assert_eq!(found[0], ("Voluntary".to_string(), Confidence::High));
    }

    #[test]
    fn test_resolution_date_to_iso() {
        let text = "the following special resolution was passed by the sole shareholder of the Company on 5th March 2024: that";
        let found = values(text, fields::RESOLUTION_DATE);
        assert_eq!(found, vec![("2024-03-05".to_string(), Confidence::High)]);
    }

    #[test]
    fn test_unparseable_date_kept_at_low() {
        // "Sept" matches the date shape but chrono does not accept it
        let text = "special resolution passed on 5 Sept 2024";
        let found = values(text, fields::RESOLUTION_DATE);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].1, Confidence::Low);
        assert_eq!(found[0].0, "5 Sept 2024");
    }

    #[test]
    fn test_final_meeting_date() {
        let text = "the final general meeting of the Company will be held on 20 June 2024 at 10:00 am";
        let found = values(text, fields::FINAL_MEETING_DATE);
        assert_eq!(found, vec![("2024-06-20".to_string(), Confidence::High)]);
    }

    #[test]
    fn test_claims_deadline() {
        let text = "Creditors are required to prove their debts to the Voluntary Liquidator on or before 12 April 2024.";
        let found = values(text, fields::CLAIMS_DEADLINE);
        assert_eq!(found, vec![("2024-04-12".to_string(), Confidence::High)]);
    }

    #[test]
    fn test_liquidator_names_multi_valued() {
        let text = "Joint Voluntary Liquidators: John Smith and Mary Jones";
        let found = values(text, fields::LIQUIDATOR_NAMES);
        assert_eq!(
            found,
            vec![
                ("John Smith".to_string(), Confidence::High),
                ("Mary Jones".to_string(), Confidence::High),
            ]
        );
    }

    #[test]
    fn test_liquidator_name_shape() {
        let text = "Voluntary Liquidator: Smith";
        // Needs two capitalised words to match at all
        assert!(values(text, fields::LIQUIDATOR_NAMES).is_empty());

        let text = "Voluntary Liquidator: JOHN SMITH";
        let found = values(text, fields::LIQUIDATOR_NAMES);
        assert_eq!(found, vec![("JOHN SMITH".to_string(), Confidence::Low)]);
    }

    #[test]
    fn test_liquidator_in_running_text_not_matched() {
        let text = "prove their debts to the Voluntary Liquidator on or before 12 April 2024";
        assert!(values(text, fields::LIQUIDATOR_NAMES).is_empty());
    }

    #[test]
    fn test_case_number_normalized() {
        let found = values("Cause No: fsd 0123 of 2024 (IKJ)", fields::CASE_NUMBER);
        assert_eq!(found, vec![("FSD 123 of 2024".to_string(), Confidence::High)]);
    }

    #[test]
    fn test_filing_fields() {
        let text = "Date of filing: 12 March 2024\nTitle: Alpha Fund Ltd v Beta Capital Partners\nNature of claim: Winding up petition\nAmount claimed: US$1,250,000.00\n";
        assert_eq!(values(text, fields::FILING_DATE)[0].0, "2024-03-12");
        assert_eq!(
            values(text, fields::CASE_TITLE)[0],
            ("Alpha Fund Ltd v Beta Capital Partners".to_string(), Confidence::High)
        );
        assert_eq!(
            values(text, fields::SUBJECT)[0],
            ("Winding up petition".to_string(), Confidence::High)
        );
        assert_eq!(values(text, fields::CLAIM_AMOUNT)[0].0, "1250000.00");
    }

    #[test]
    fn test_keyword_gate_rejects_fast() {
        assert!(extract("nothing relevant here", GAZETTE_FIELDS).is_empty());
    }

    #[test]
    fn test_extract_set_groups_by_field() {
        let text = "ALPHA HOLDINGS LIMITED\n(In Voluntary Liquidation)\nVoluntary Liquidator: John Smith\n";
        let set = extract_set(text, GAZETTE_FIELDS);
        assert_eq!(set.best(fields::COMPANY_NAME).unwrap().value, "ALPHA HOLDINGS LIMITED");
        assert_eq!(set.best(fields::LIQUIDATION_TYPE).unwrap().value, "Voluntary");
        assert_eq!(set.best(fields::LIQUIDATOR_NAMES).unwrap().value, "John Smith");
        assert!(!set.contains(fields::RESOLUTION_DATE));
    }

    #[test]
    fn test_detect_risk_signals() {
        let signals = detect_risk_signals("Petition alleging FRAUD; court appoints receiver");
        assert_eq!(
            signals,
            vec![RiskSignal::Fraud, RiskSignal::Insolvency, RiskSignal::Litigation]
        );
        assert!(detect_risk_signals("Annual tourism figures").is_empty());
    }

    #[test]
    fn test_parse_long_date_variants() {
        let expected = NaiveDate::from_ymd_opt(2024, 4, 12);
        assert_eq!(parse_long_date("12th April 2024"), expected);
        assert_eq!(parse_long_date("12 Apr, 2024"), expected);
        assert_eq!(parse_long_date("April 2024"), None);
    }
}
