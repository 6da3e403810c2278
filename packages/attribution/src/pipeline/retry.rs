//! Bounded retry with exponential backoff and jitter for model calls.

use rand::Rng;
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;

use crate::error::ModelError;
use crate::types::config::RetryPolicy;

/// Why a retried call gave up.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryFailure {
    /// Attempts made, including the first
    pub attempts: u32,

    /// Error from the last attempt
    pub error: ModelError,
}

fn delay_with_jitter(policy: &RetryPolicy, attempt: u32) -> Duration {
    let jitter = if policy.max_jitter_ms == 0 {
        0
    } else {
        rand::thread_rng().gen_range(0..=policy.max_jitter_ms)
    };
    policy.backoff(attempt) + Duration::from_millis(jitter)
}

/// Run `operation` until it succeeds, fails with an error `retryable`
/// rejects, or `policy.max_attempts` is reached.
///
/// The closure receives the 1-based attempt number and the previous
/// attempt's error, so callers can shrink a request that was too large.
pub async fn with_retry<T, F, Fut, R>(
    policy: &RetryPolicy,
    label: &str,
    retryable: R,
    mut operation: F,
) -> Result<T, RetryFailure>
where
    F: FnMut(u32, Option<&ModelError>) -> Fut,
    Fut: Future<Output = Result<T, ModelError>>,
    R: Fn(&ModelError) -> bool,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut last_error: Option<ModelError> = None;
    let mut attempt = 0;

    loop {
        attempt += 1;
        match operation(attempt, last_error.as_ref()).await {
            Ok(value) => return Ok(value),
            Err(e) if attempt < max_attempts && retryable(&e) => {
                let delay = delay_with_jitter(policy, attempt);
                tracing::warn!(
                    error = %e,
                    retry = attempt,
                    max_retries = max_attempts - 1,
                    delay_ms = delay.as_millis() as u64,
                    "{label} failed, retrying..."
                );
                sleep(delay).await;
                last_error = Some(e);
            }
            Err(e) => {
                return Err(RetryFailure {
                    attempts: attempt,
                    error: e,
                })
            }
        }
    }
}
