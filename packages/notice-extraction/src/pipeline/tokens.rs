//! Token estimation and per-call budgets.
//!
//! Estimates use a fixed character ratio rather than a tokenizer, so every
//! figure here is an upper-bound approximation. Budgets always hold back a
//! safety buffer of at least 1% of the context ceiling.

use serde::{Deserialize, Serialize};

use crate::error::{PipelineError, Result};

/// Characters per estimated token.
pub const CHARS_PER_TOKEN: usize = 4;

/// Floor for the safety buffer, as a share of the context ceiling.
pub const MIN_SAFETY_RATIO: f64 = 0.01;

/// Estimated token cost of a text span (rounded up).
pub fn estimate_tokens(text: &str) -> usize {
    text.chars().count().div_ceil(CHARS_PER_TOKEN)
}

/// Context ceiling and output clamps for oracle calls.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CallBudget {
    /// Total tokens a single call may use (input + output)
    pub context_ceiling: usize,

    /// Share of the ceiling held back; values below 1% are raised to 1%
    pub safety_buffer_ratio: f64,

    /// Output tokens always reserved for the response
    pub min_output_tokens: usize,

    /// Upper clamp on requested output tokens
    pub max_output_tokens: usize,
}

impl Default for CallBudget {
    fn default() -> Self {
        Self {
            context_ceiling: 128_000,
            safety_buffer_ratio: MIN_SAFETY_RATIO,
            min_output_tokens: 1_024,
            max_output_tokens: 8_192,
        }
    }
}

impl CallBudget {
    /// Tokens held back from the ceiling.
    pub fn safety_buffer(&self) -> usize {
        let ratio = self.safety_buffer_ratio.max(MIN_SAFETY_RATIO);
        (self.context_ceiling as f64 * ratio).ceil() as usize
    }

    /// Largest input a call may carry while keeping the minimum output.
    pub fn input_budget(&self) -> usize {
        self.context_ceiling
            .saturating_sub(self.safety_buffer())
            .saturating_sub(self.min_output_tokens)
    }

    /// Output budget for a call carrying `input_tokens`, clamped to the
    /// configured range.
    pub fn output_budget(&self, input_tokens: usize) -> usize {
        self.context_ceiling
            .saturating_sub(self.safety_buffer())
            .saturating_sub(input_tokens)
            .max(self.min_output_tokens)
            .min(self.max_output_tokens)
    }

    /// Whether `input_tokens` fits without eating into the reserved output.
    pub fn fits(&self, input_tokens: usize) -> bool {
        input_tokens <= self.input_budget()
    }

    pub(crate) fn validate(&self) -> Result<()> {
        if self.safety_buffer_ratio < 0.0 || self.safety_buffer_ratio >= 1.0 {
            return Err(PipelineError::config("safety_buffer_ratio must be within 0.0..1.0"));
        }
        if self.min_output_tokens > self.max_output_tokens {
            return Err(PipelineError::config(
                "min_output_tokens must not exceed max_output_tokens",
            ));
        }
        if self.input_budget() == 0 {
            return Err(PipelineError::config(
                "context_ceiling leaves no room for input after buffer and reserved output",
            ));
        }
        Ok(())
    }
}
