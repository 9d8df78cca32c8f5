//! Oracle trait for batched classification and extraction.
//!
//! An oracle takes an ordered list of items plus an instruction profile and
//! returns one result per item, in the same order, as a JSON payload. The
//! pipeline treats it as an opaque external service: payload validation
//! happens in the cascade, not in implementations.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::OracleResult;
use crate::pipeline::tokens::estimate_tokens;

/// What the oracle is asked to do with the items.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstructionProfile {
    /// Relevance, category, summary and risk signals for articles
    Classification,
    /// Structured fields for gazette notices
    NoticeExtraction,
}

impl InstructionProfile {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Classification => "classification",
            Self::NoticeExtraction => "notice_extraction",
        }
    }
}

/// One input item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OracleItem {
    /// Position-independent label echoed in logs
    pub id: String,
    pub text: String,
}

impl OracleItem {
    pub fn new(id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            text: text.into(),
        }
    }
}

/// A batched oracle request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OracleRequest {
    pub profile: InstructionProfile,
    pub items: Vec<OracleItem>,
    /// Output budget for this call
    pub max_output_tokens: usize,
}

impl OracleRequest {
    pub fn new(profile: InstructionProfile, items: Vec<OracleItem>) -> Self {
        Self {
            profile,
            items,
            max_output_tokens: 0,
        }
    }

    pub fn with_max_output_tokens(mut self, max: usize) -> Self {
        self.max_output_tokens = max;
        self
    }

    /// Estimated input cost of the item texts.
    pub fn estimated_input_tokens(&self) -> usize {
        self.items.iter().map(|i| estimate_tokens(&i.text)).sum()
    }
}

/// Raw oracle response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OracleResponse {
    /// Response payload; expected to hold a JSON array, possibly wrapped
    pub body: String,
    /// Tokens billed for the call
    pub tokens_used: u32,
}

impl OracleResponse {
    pub fn new(body: impl Into<String>, tokens_used: u32) -> Self {
        Self {
            body: body.into(),
            tokens_used,
        }
    }
}

/// Text-classification / extraction oracle.
///
/// Implementations wrap a specific provider and map its failures onto
/// `OracleError`: rate limits and 5xx are `Transient`, auth and bad requests
/// are `Rejected`.
#[async_trait]
pub trait Oracle: Send + Sync {
    /// Send one batched request.
    async fn complete(&self, request: &OracleRequest) -> OracleResult<OracleResponse>;

    /// Name used in logs.
    fn name(&self) -> &str {
        "oracle"
    }
}

#[async_trait]
impl<T: Oracle + ?Sized> Oracle for Arc<T> {
    async fn complete(&self, request: &OracleRequest) -> OracleResult<OracleResponse> {
        (**self).complete(request).await
    }

    fn name(&self) -> &str {
        (**self).name()
    }
}
