//! # Shared Retry Combinator
//!
//! Both the language-model client and the destination store client recover
//! from transient failures the same way: exponential backoff with jitter,
//! honoring any server-indicated retry interval. This module holds the one
//! combinator they share instead of each call site rolling its own loop.

use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

/// Classifies an error for the retry loop.
pub trait Retryable {
    /// Whether another attempt could plausibly succeed.
    fn is_transient(&self) -> bool;

    /// A server-indicated wait (e.g. a `Retry-After` header). Takes
    /// precedence over the computed backoff when present.
    fn retry_after(&self) -> Option<Duration> {
        None
    }
}

/// Backoff policy for [`retry_with_backoff`].
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl RetryPolicy {
    /// Provider calls: up to 4 attempts, 1s doubling to a 10s cap.
    pub fn provider() -> Self {
        Self {
            max_attempts: 4,
            initial_backoff: Duration::from_secs(1),
            max_backoff: Duration::from_secs(10),
        }
    }

    /// Destination store calls: up to 3 retries, capped at 60s to respect
    /// long rate-limit windows.
    pub fn store() -> Self {
        Self {
            max_attempts: 4,
            initial_backoff: Duration::from_secs(1),
            max_backoff: Duration::from_secs(60),
        }
    }

    /// The delay before retry number `attempt` (1-based), before jitter.
    fn backoff_for(&self, attempt: u32) -> Duration {
        let exp = self
            .initial_backoff
            .saturating_mul(2u32.saturating_pow(attempt.saturating_sub(1)));
        exp.min(self.max_backoff)
    }
}

/// Spreads a delay over `[delay/2, delay)` so simultaneous retriers do not
/// stampede the provider.
fn jittered(delay: Duration) -> Duration {
    let half = delay / 2;
    half + delay.mul_f64(0.5 * fastrand::f64())
}

/// Runs `op` until it succeeds, fails non-transiently, or exhausts the
/// policy's attempts. The final error is returned unchanged.
pub async fn retry_with_backoff<T, E, F, Fut>(policy: RetryPolicy, mut op: F) -> Result<T, E>
where
    E: Retryable + std::fmt::Display,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let mut attempt = 1u32;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) if err.is_transient() && attempt < policy.max_attempts => {
                let delay = err
                    .retry_after()
                    .unwrap_or_else(|| jittered(policy.backoff_for(attempt)))
                    .min(policy.max_backoff);
                warn!(
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    "transient failure, backing off: {err}"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(err) => {
                if attempt > 1 {
                    debug!(attempt, "giving up after retries: {err}");
                }
                return Err(err);
            }
        }
    }
}
