use std::future::Future;
use std::time::Duration;
use thiserror::Error;
use tracing::warn;

use crate::external::ExternalError;

/// Why a retried call ultimately failed
#[derive(Error, Debug)]
pub enum RetryError {
    #[error("{0}")]
    Permanent(ExternalError),

    #[error("gave up after {attempts} attempts: {last}")]
    Exhausted { attempts: u32, last: ExternalError },
}

/// Bounded retry with exponential backoff and a per-attempt timeout
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(10),
            timeout: Duration::from_secs(120),
        }
    }
}

impl RetryPolicy {
    /// Delay before retry number `attempt` (1-based)
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }

    /// Run `operation` until it succeeds, fails permanently or runs out of
    /// attempts. Attempts that exceed the timeout count as retryable.
    pub async fn run<T, F, Fut>(&self, operation: &str, mut call: F) -> Result<T, RetryError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ExternalError>>,
    {
        let max_attempts = self.max_attempts.max(1);
        let mut attempt = 0;

        loop {
            attempt += 1;
            let result = match tokio::time::timeout(self.timeout, call()).await {
                Ok(result) => result,
                Err(_) => Err(ExternalError::Timeout(self.timeout)),
            };

            match result {
                Ok(value) => return Ok(value),
                Err(e) if !e.is_retryable() => return Err(RetryError::Permanent(e)),
                Err(e) if attempt >= max_attempts => {
                    return Err(RetryError::Exhausted {
                        attempts: attempt,
                        last: e,
                    })
                }
                Err(e) => {
                    let delay = self.delay_for(attempt);
                    warn!(
                        operation,
                        attempt,
                        max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "retrying after transient failure"
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }
}
