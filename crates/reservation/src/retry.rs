//! Retrying store reads that failed for transient reasons.

use std::future::Future;

use inventory_store::StoreError;

use crate::policy::ConflictPolicy;

/// Runs `operation` until it succeeds, fails permanently, or the policy's
/// attempt budget is spent on transient failures.
///
/// Only use this for calls that are safe to repeat.
pub async fn retry_transient<F, Fut, T>(
    policy: &ConflictPolicy,
    what: &'static str,
    mut operation: F,
) -> Result<T, StoreError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, StoreError>>,
{
    let mut attempt = 1;
    loop {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(err) if err.is_transient() && policy.should_retry(attempt) => {
                let delay = policy.backoff(attempt);
                tracing::debug!(what, attempt, ?delay, error = %err, "transient store failure, retrying");
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}
