//! Bounded exponential-backoff retry for fallible async operations.

use std::future::Future;
use std::time::Duration;

use tokio::time::sleep;
use tracing::debug;

use config::shared::RetryConfig;

use crate::error::{ErrorKind, IngestError, IngestResult};

/// Runs `operation` with bounded exponential backoff.
///
/// The operation is attempted once, then retried up to
/// `config.max_attempts` times while `should_retry` accepts the error. The
/// delay before retry attempt `n` (1-based) is
/// `base_delay * backoff_factor ^ n`. `on_retry` is invoked before each
/// backoff sleep with the attempt number, the delay, and the error that
/// triggered it.
///
/// Returns the first success, or the last error once retries are exhausted
/// or the error is not retryable.
pub async fn execute_with_retry<T, F, Fut, P, R>(
    mut operation: F,
    config: &RetryConfig,
    mut should_retry: P,
    mut on_retry: R,
) -> IngestResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = IngestResult<T>>,
    P: FnMut(&IngestError) -> bool,
    R: FnMut(u32, Duration, &IngestError),
{
    let mut attempt = 0u32;

    loop {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(err) => {
                if attempt >= config.max_attempts || !should_retry(&err) {
                    return Err(err);
                }

                attempt += 1;
                let delay = config.delay_for(attempt);

                debug!(attempt, delay_ms = delay.as_millis() as u64, error = %err, "retrying after backoff");
                on_retry(attempt, delay, &err);

                sleep(delay).await;
            }
        }
    }
}

/// Recognizes rate-limiting signals in an error.
///
/// Matches the [`ErrorKind::QuotaExceeded`] classification as well as common
/// rate-limit phrasings in the rendered message, case-insensitively.
pub fn is_rate_limited(err: &IngestError) -> bool {
    if err.kind() == ErrorKind::QuotaExceeded {
        return true;
    }

    // Only the description and detail are inspected; the rendered form also
    // contains the callsite, whose line number could spell 429.
    let description = err.description().to_lowercase();
    let detail = err.detail().map(str::to_lowercase).unwrap_or_default();

    ["rate limit", "too many requests", "429"]
        .iter()
        .any(|needle| description.contains(needle) || detail.contains(needle))
}
