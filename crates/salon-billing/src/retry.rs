//! Optimistic-concurrency retry loop.
//!
//! ```text
//!   attempt ──► Ok / non-conflict error ──► return
//!      │
//!      └─ DbError::Conflict ──► sleep (exponential) ──► attempt again
//!                                   │
//!                      budget spent └──► BillingError::Contention
//! ```

use backoff::backoff::Backoff;
use std::future::Future;
use tracing::{debug, warn};

use crate::config::ConcurrencySettings;
use crate::error::{BillingError, BillingResult};

/// Runs `op` until it returns something other than a version conflict.
///
/// Each attempt must re-read whatever it plans against; only
/// `DbError::Conflict` is retried.
pub async fn with_conflict_retry<T, F, Fut>(
    settings: &ConcurrencySettings,
    resource: &str,
    mut op: F,
) -> BillingResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = BillingResult<T>>,
{
    let mut backoff = settings.backoff();
    let mut attempt: u32 = 0;

    loop {
        attempt += 1;

        match op().await {
            Err(err) if err.is_conflict() => {
                if attempt >= settings.max_conflict_retries {
                    warn!(resource, attempts = attempt, "Conflict retries exhausted");
                    return Err(BillingError::Contention {
                        resource: resource.to_string(),
                        attempts: attempt,
                    });
                }

                let delay = backoff
                    .next_backoff()
                    .unwrap_or(backoff.max_interval);
                debug!(resource, attempt, ?delay, "Version conflict, retrying");
                tokio::time::sleep(delay).await;
            }
            other => return other,
        }
    }
}
