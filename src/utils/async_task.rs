use std::future::Future;

use tokio::time::sleep;
use tokio::time::timeout;
use tracing::debug;
use tracing::warn;

use crate::BackoffPolicy;

/// Runs `task` until it reports `true`, each attempt bounded by the policy
/// timeout, with exponential backoff in between.
///
/// Returns `false` once `max_retries` attempts are used up.
pub(crate) async fn poll_with_exponential_backoff<F, T>(
    task: F,
    policy: &BackoffPolicy,
) -> bool
where
    F: Fn() -> T,
    T: Future<Output = bool>,
{
    for attempt in 0..policy.max_retries {
        match timeout(policy.attempt_timeout(), task()).await {
            Ok(true) => return true,
            Ok(false) => debug!(attempt, "not ready yet"),
            Err(_) => warn!(attempt, "attempt timed out after {:?}", policy.attempt_timeout()),
        }

        if attempt + 1 < policy.max_retries {
            sleep(policy.delay_for(attempt)).await;
        }
    }
    warn!("gave up after {} attempts", policy.max_retries);
    false
}
