//! Exponential backoff bounded by a total time budget.

use lambda_runtime::tracing::{debug, warn};
use std::fmt::Display;
use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;

/// Delay doubles after every failed attempt, capped at `max_delay`. No new
/// attempt starts once `max_elapsed` has passed since the first one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub max_elapsed: Duration,
}

impl RetryPolicy {
    /// Ten second budget shared by the SSM lookup and the upstream call.
    pub const DEFAULT: Self = Self {
        initial_delay: Duration::from_secs(1),
        max_delay: Duration::from_secs(8),
        max_elapsed: Duration::from_secs(10),
    };

    /// Single attempt, no retries.
    pub const NONE: Self = Self {
        initial_delay: Duration::ZERO,
        max_delay: Duration::ZERO,
        max_elapsed: Duration::ZERO,
    };
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// Runs `operation` until it succeeds, fails with an error `is_retryable`
/// rejects, or the policy's budget runs out. The last error is returned.
///
/// # Errors
///
/// Returns the error of the final attempt.
pub async fn retry<T, E, F, Fut, P>(
    policy: &RetryPolicy,
    mut operation: F,
    is_retryable: P,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    P: Fn(&E) -> bool,
    E: Display,
{
    let started = Instant::now();
    let mut delay = policy.initial_delay;
    let mut attempt: u32 = 1;

    loop {
        let error = match operation().await {
            Ok(value) => return Ok(value),
            Err(error) if !is_retryable(&error) => return Err(error),
            Err(error) => error,
        };

        let elapsed = started.elapsed();
        if elapsed >= policy.max_elapsed {
            warn!(
                attempt,
                elapsed_ms = elapsed.as_millis(),
                error = %error,
                "Giving up after exhausting retry budget"
            );
            return Err(error);
        }

        let wait = delay.min(policy.max_elapsed.saturating_sub(elapsed));
        debug!(
            attempt,
            delay_ms = wait.as_millis(),
            error = %error,
            "Retrying after transient failure"
        );
        tokio::time::sleep(wait).await;

        delay = delay.saturating_mul(2).min(policy.max_delay);
        attempt += 1;
    }
}
