//! Typed errors for the notice extraction library.
//!
//! Uses `thiserror` for library errors (not `anyhow`) to provide
//! strongly-typed, composable error handling.

use std::time::Duration;

use thiserror::Error;

/// Errors that abort or fail a pipeline operation.
///
/// Only storage and configuration failures are fatal to a run. Oracle
/// failures are absorbed by the classification cascade and never surface
/// from `Pipeline::run`.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Configuration missing or invalid (empty vocabulary, bad thresholds)
    #[error("config error: {reason}")]
    Config { reason: String },

    /// Storage layer failed
    #[error("storage error: {0}")]
    Storage(#[from] StoreError),

    /// Oracle call failed
    #[error("oracle error: {0}")]
    Oracle(#[from] OracleError),

    /// A heading or field pattern failed to compile
    #[error("invalid pattern: {0}")]
    Pattern(#[from] regex::Error),

    /// JSON parsing error
    #[error("JSON parse error: {0}")]
    JsonParse(#[from] serde_json::Error),
}

impl PipelineError {
    /// Shorthand for a configuration error.
    pub fn config(reason: impl Into<String>) -> Self {
        Self::Config {
            reason: reason.into(),
        }
    }
}

/// Errors returned by an extraction/classification oracle.
#[derive(Debug, Clone, Error)]
pub enum OracleError {
    /// Network failure, rate limit or 5xx - worth retrying
    #[error("transient oracle failure: {0}")]
    Transient(String),

    /// The call exceeded its call-level timeout
    #[error("oracle call timed out after {0:?}")]
    Timeout(Duration),

    /// The oracle refused the request (auth, bad request, unavailable)
    #[error("oracle rejected request: {0}")]
    Rejected(String),

    /// The response could not be parsed or did not match the request
    #[error("malformed oracle response: {0}")]
    Malformed(String),
}

impl OracleError {
    /// Whether a retry with backoff may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transient(_) | Self::Timeout(_))
    }
}

/// Errors from a storage backend.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Backend cannot be reached
    #[error("storage unavailable: {0}")]
    Unavailable(String),

    /// A query or write failed
    #[error("storage query failed: {0}")]
    Query(String),

    /// Referenced row does not exist
    #[error("not found: {0}")]
    NotFound(String),
}

/// Result type alias for pipeline operations.
pub type Result<T> = std::result::Result<T, PipelineError>;

/// Result type alias for storage operations.
pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Result type alias for oracle operations.
pub type OracleResult<T> = std::result::Result<T, OracleError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        assert!(OracleError::Transient("429".into()).is_retryable());
        assert!(OracleError::Timeout(Duration::from_secs(1)).is_retryable());
        assert!(!OracleError::Rejected("401".into()).is_retryable());
        assert!(!OracleError::Malformed("not json".into()).is_retryable());
    }

    #[test]
    fn test_store_error_converts_to_pipeline_error() {
        let err: PipelineError = StoreError::Unavailable("connection refused".into()).into();
        assert!(matches!(err, PipelineError::Storage(_)));
        assert!(err.to_string().contains("connection refused"));
    }
}
