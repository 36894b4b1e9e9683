use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use tokio::time::sleep;

/// Classifies an error for the retry policy.
pub trait Retryable {
    /// Whether another attempt may succeed
    fn is_retryable(&self) -> bool {
        true
    }

    /// Factor applied to the wait before the next attempt
    fn backoff_multiplier(&self) -> u32 {
        1
    }
}

/// Exponential backoff policy with up to 10% jitter.
///
/// A policy with `max_retries = n` makes at most `n + 1` attempts. The wait
/// before retry `r` (0-indexed) is `initial_delay * 2^r` plus a uniformly
/// random jitter in `[0, 10%)` of that base.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    max_retries: u32,
    initial_delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_retries: u32, initial_delay: Duration) -> Self {
        Self {
            max_retries,
            initial_delay,
        }
    }

    /// Total number of attempts the policy allows
    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    /// Base delay (before jitter) preceding retry number `retry`
    pub fn base_delay(&self, retry: u32) -> Duration {
        let multiplier = 2u32.saturating_pow(retry);
        self.initial_delay.saturating_mul(multiplier)
    }

    fn jittered(base: Duration) -> Duration {
        let jitter = base.mul_f64(rand::random::<f64>() * 0.1);
        base.saturating_add(jitter)
    }

    /// Run `operation` until it succeeds, fails with a non-retryable error,
    /// or the attempt budget is spent. The last error is returned unchanged.
    pub async fn execute<F, Fut, T, E>(&self, label: &str, mut operation: F) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Retryable + Display,
    {
        let mut retry = 0;
        loop {
            match operation().await {
                Ok(value) => return Ok(value),
                Err(e) if !e.is_retryable() => {
                    ::log::debug!("{} failed with non-retryable error: {}", label, e);
                    return Err(e);
                }
                Err(e) if retry >= self.max_retries => {
                    ::log::error!(
                        "{} failed after {} attempts: {}",
                        label,
                        self.max_attempts(),
                        e
                    );
                    return Err(e);
                }
                Err(e) => {
                    let wait = Self::jittered(self.base_delay(retry))
                        .saturating_mul(e.backoff_multiplier());
                    ::log::warn!(
                        "{} failed: {}. Retry {}/{} in {:.2}s",
                        label,
                        e,
                        retry + 1,
                        self.max_retries,
                        wait.as_secs_f64()
                    );
                    sleep(wait).await;
                    retry += 1;
                }
            }
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3, Duration::from_secs(1))
    }
}
