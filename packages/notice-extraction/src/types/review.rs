//! Manual review queue items.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Review urgency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReviewPriority {
    Medium,
    High,
}

impl ReviewPriority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Medium => "medium",
            Self::High => "high",
        }
    }
}

/// A record waiting for (or past) manual review.
///
/// `reviewed = true` is terminal. The pipeline only ever creates items;
/// resolving them is the reviewer's job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReviewQueueItem {
    pub id: Uuid,
    pub record_id: Uuid,
    pub reason: String,
    pub priority: ReviewPriority,
    pub reviewed: bool,
    pub reviewer_note: Option<String>,
    pub created_at: DateTime<Utc>,
    pub reviewed_at: Option<DateTime<Utc>>,
}

impl ReviewQueueItem {
    /// Create an unreviewed item.
    pub fn new(record_id: Uuid, reason: impl Into<String>, priority: ReviewPriority) -> Self {
        Self {
            id: Uuid::now_v7(),
            record_id,
            reason: reason.into(),
            priority,
            reviewed: false,
            reviewer_note: None,
            created_at: Utc::now(),
            reviewed_at: None,
        }
    }

    /// Mark as reviewed. A second call keeps the original timestamp and note.
    pub fn mark_reviewed(&mut self, note: Option<String>) {
        if self.reviewed {
            return;
        }
        self.reviewed = true;
        self.reviewer_note = note;
        self.reviewed_at = Some(Utc::now());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reviewed_is_terminal() {
        let mut item = ReviewQueueItem::new(Uuid::nil(), "score 70 below 85", ReviewPriority::Medium);
        item.mark_reviewed(Some("checked against gazette".to_string()));
        let first_seen = item.reviewed_at;

        item.mark_reviewed(Some("second pass".to_string()));

        assert!(item.reviewed);
        assert_eq!(item.reviewed_at, first_seen);
        assert_eq!(item.reviewer_note.as_deref(), Some("checked against gazette"));
    }
}
