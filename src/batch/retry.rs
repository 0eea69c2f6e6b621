//! Bounded retry with exponential backoff and jitter

use std::future::Future;
use std::time::Duration;

use crate::s3::S3Error;

/// Retry settings for transient transport failures
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts including the first one (minimum 1)
    pub max_attempts: u32,
    /// Delay before the second attempt; doubles per attempt
    pub base_delay: Duration,
    /// Upper bound for a single backoff sleep
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(5),
        }
    }
}

impl RetryPolicy {
    /// A policy that never retries
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// Backoff before retry number `retry` (1-based): base * 2^(retry-1), capped, plus up to 20% jitter
    pub fn backoff(&self, retry: u32) -> Duration {
        let factor = 1u32 << retry.saturating_sub(1).min(16);
        let delay = self.base_delay.saturating_mul(factor).min(self.max_delay);
        let jitter = delay.mul_f64(0.2 * rand::random::<f64>());
        delay + jitter
    }

    /// Run `op` until it succeeds, fails with a non-transient error, or attempts run out
    pub async fn run<T, F, Fut>(&self, key: &str, mut op: F) -> Result<T, S3Error>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, S3Error>>,
    {
        let max_attempts = self.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(err) if err.is_transient() && attempt < max_attempts => {
                    let delay = self.backoff(attempt);
                    tracing::debug!(
                        key,
                        attempt,
                        max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "transient failure, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }
}
