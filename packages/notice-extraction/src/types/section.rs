//! Named sections of a segmented document.

use serde::{Deserialize, Serialize};

use crate::pipeline::tokens::estimate_tokens;

/// A named span of a document.
///
/// Recomputed on every segmentation pass and never persisted on its own.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Section {
    /// Name from the target vocabulary
    pub name: String,

    /// Byte offset of the heading start
    pub start: usize,

    /// Byte offset where the section ends (exclusive)
    pub end: usize,

    /// Text between `start` and `end`
    pub text: String,

    /// Estimated token cost of `text`
    pub estimated_tokens: usize,
}

impl Section {
    /// Build a section by slicing `document[start..end]`.
    pub fn from_span(name: impl Into<String>, document: &str, start: usize, end: usize) -> Self {
        let text = document[start..end].to_string();
        let estimated_tokens = estimate_tokens(&text);
        Self {
            name: name.into(),
            start,
            end,
            text,
            estimated_tokens,
        }
    }

    /// Length of the span in bytes.
    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }
}
