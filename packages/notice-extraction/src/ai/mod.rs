//! Oracle implementations.
//!
//! `OpenAiOracle` is the production backend. `UnavailableOracle` rejects
//! every call, which drives the cascade straight to its heuristic fallback
//! for offline runs.

mod openai;

pub use openai::OpenAiOracle;

use async_trait::async_trait;

use crate::error::{OracleError, OracleResult};
use crate::traits::oracle::{Oracle, OracleRequest, OracleResponse};

/// Oracle that is never reachable.
#[derive(Debug, Clone, Copy, Default)]
pub struct UnavailableOracle;

#[async_trait]
impl Oracle for UnavailableOracle {
    async fn complete(&self, _request: &OracleRequest) -> OracleResult<OracleResponse> {
        Err(OracleError::Rejected("oracle disabled".into()))
    }

    fn name(&self) -> &str {
        "unavailable"
    }
}
