//! Batch planning - pack sections into oracle-sized groups.

use crate::types::section::Section;

/// A group of sections sent to the oracle together.
#[derive(Debug, Clone, PartialEq)]
pub struct Batch {
    pub sections: Vec<Section>,
    pub estimated_tokens: usize,
}

impl Batch {
    fn new() -> Self {
        Self {
            sections: Vec::new(),
            estimated_tokens: 0,
        }
    }

    fn push(&mut self, section: Section) {
        self.estimated_tokens += section.estimated_tokens;
        self.sections.push(section);
    }

    /// A batch holding a single section larger than the budget.
    pub fn is_oversized(&self, max_tokens: usize) -> bool {
        self.sections.len() == 1 && self.estimated_tokens > max_tokens
    }
}

/// Greedily pack sections in document order.
///
/// Each batch's estimated cost stays within `max_tokens`, except that a
/// section larger than the budget is placed alone in its own batch. Sections
/// are never split or reordered.
pub fn plan_batches(sections: Vec<Section>, max_tokens: usize) -> Vec<Batch> {
    let mut batches = Vec::new();
    let mut current = Batch::new();

    for section in sections {
        if section.estimated_tokens > max_tokens {
            if !current.sections.is_empty() {
                batches.push(std::mem::replace(&mut current, Batch::new()));
            }
            let mut oversized = Batch::new();
            oversized.push(section);
            batches.push(oversized);
            continue;
        }

        if current.estimated_tokens + section.estimated_tokens > max_tokens {
            batches.push(std::mem::replace(&mut current, Batch::new()));
        }
        current.push(section);
    }

    if !current.sections.is_empty() {
        batches.push(current);
    }
    batches
}
