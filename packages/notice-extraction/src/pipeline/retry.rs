//! Bounded retry with exponential backoff for oracle calls.
//!
//! Every oracle call in the crate goes through `retry_with_backoff`, which
//! also applies the call-level timeout. A timeout is treated like any other
//! transient failure.

use std::future::Future;
use std::time::Duration;

use tracing::{debug, warn};

use crate::error::{OracleError, OracleResult};
use crate::types::config::PipelineConfig;

/// Longest single backoff sleep.
const MAX_BACKOFF: Duration = Duration::from_secs(60);

/// How many times and how patiently to retry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt
    pub max_retries: u32,
    pub base_delay: Duration,
    pub call_timeout: Duration,
}

impl RetryPolicy {
    pub fn new(max_retries: u32, base_delay: Duration, call_timeout: Duration) -> Self {
        Self {
            max_retries,
            base_delay,
            call_timeout,
        }
    }

    pub fn from_config(config: &PipelineConfig) -> Self {
        Self::new(
            config.max_retries,
            Duration::from_millis(config.backoff_base_ms),
            Duration::from_millis(config.oracle_timeout_ms),
        )
    }

    /// Delay before retry number `retry` (0-based): `base * 2^retry`, capped.
    pub fn delay_for(&self, retry: u32) -> Duration {
        let factor = 2u32.saturating_pow(retry);
        self.base_delay.saturating_mul(factor).min(MAX_BACKOFF)
    }
}

/// Run `call` until it succeeds, fails with a non-retryable error, or the
/// retry budget is spent.
///
/// Returns the last error on exhaustion.
pub async fn retry_with_backoff<T, F, Fut>(
    policy: RetryPolicy,
    operation: &str,
    mut call: F,
) -> OracleResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = OracleResult<T>>,
{
    let mut retry = 0;
    loop {
        let outcome = match tokio::time::timeout(policy.call_timeout, call()).await {
            Ok(result) => result,
            Err(_) => Err(OracleError::Timeout(policy.call_timeout)),
        };

        match outcome {
            Ok(value) => return Ok(value),
            Err(e) if e.is_retryable() && retry < policy.max_retries => {
                let delay = policy.delay_for(retry);
                warn!(
                    operation = %operation,
                    attempt = retry + 1,
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "Oracle call failed, retrying"
                );
                tokio::time::sleep(delay).await;
                retry += 1;
            }
            Err(e) => {
                debug!(operation = %operation, attempts = retry + 1, error = %e, "Giving up");
                return Err(e);
            }
        }
    }
}
