//! Oracle prompts for the classification and notice-extraction profiles.
//!
//! Both prompts demand a bare JSON array with exactly one element per input
//! item, in input order. The cascade enforces that contract on the way back.

use crate::traits::oracle::{InstructionProfile, OracleItem, OracleRequest};

/// System prompt for article classification.
pub const CLASSIFY_PROMPT: &str = r#"You classify news articles for an offshore insolvency and litigation monitoring service.

For EACH numbered item, decide:
- relevant: true if the article concerns insolvency, liquidation, litigation, regulatory action or fraud involving a company
- category: one of "insolvency", "litigation", "regulatory", "corporate", "other"
- summary: one or two sentences, factual, no speculation
- risk_signals: any of "fraud", "enforcement", "sanctions", "insolvency", "litigation", "regulatory"
- entities: company and person names mentioned
- confidence: 0.0 to 1.0

Output ONLY a JSON array with exactly {count} objects, in the same order as the items:
[
    {"relevant": true, "category": "...", "summary": "...", "risk_signals": [], "entities": [], "confidence": 0.9}
]"#;

/// System prompt for gazette notice extraction.
pub const NOTICE_EXTRACT_PROMPT: &str = r#"You extract structured fields from government gazette notices.

For EACH numbered item (one notice), extract:
- company_name: the company the notice is about, exactly as printed
- liquidation_type: "Voluntary" or "Official", or null
- liquidator_names: array of liquidator person names
- resolution_date: date the winding-up resolution was passed (YYYY-MM-DD) or null
- final_meeting_date: date of the final general meeting (YYYY-MM-DD) or null
- claims_deadline: date creditors must prove debts by (YYYY-MM-DD) or null
- confidence: 0.0 to 1.0

Never invent values. Use null when a field is not stated.

Output ONLY a JSON array with exactly {count} objects, in the same order as the items:
[
    {"company_name": "...", "liquidation_type": null, "liquidator_names": [], "resolution_date": null, "final_meeting_date": null, "claims_deadline": null, "confidence": 0.8}
]"#;

/// System prompt for a request, with the expected count filled in.
pub fn system_prompt(request: &OracleRequest) -> String {
    let template = match request.profile {
        InstructionProfile::Classification => CLASSIFY_PROMPT,
        InstructionProfile::NoticeExtraction => NOTICE_EXTRACT_PROMPT,
    };
    template.replace("{count}", &request.items.len().to_string())
}

/// User message listing the numbered items.
pub fn format_items(items: &[OracleItem]) -> String {
    items
        .iter()
        .enumerate()
        .map(|(i, item)| format!("=== ITEM {} ({}) ===\n{}\n", i + 1, item.id, item.text))
        .collect::<Vec<_>>()
        .join("\n---\n")
}
