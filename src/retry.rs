//! Bounded retry with exponential backoff and jitter.
//!
//! One policy wraps every network-bound call site (embedding, completion,
//! vector store) instead of each module growing its own loop. Callers
//! classify failures as transient or permanent; the policy sleeps between
//! transient failures, doubling the delay up to a cap, with random jitter to
//! avoid thundering-herd retries against a rate-limited provider.

use rand::Rng;
use std::future::Future;
use std::time::Duration;
use tracing::warn;

use crate::error::EngineError;

/// Failure classification made at the call site.
#[derive(Debug)]
pub enum RetryError {
    /// Worth another attempt: rate limit, server error, network failure.
    Transient(EngineError),
    /// Not worth retrying: auth failure, malformed request.
    Permanent(EngineError),
}

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    /// Policy with the default delays and a configured attempt count.
    /// `max_attempts` of 0 is treated as 1 (the call always runs once).
    pub fn from_attempts(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            ..Self::default()
        }
    }

    /// Run `op` until it succeeds, fails permanently, or attempts run out.
    ///
    /// Returns the last transient error when attempts are exhausted.
    pub async fn run<T, F, Fut>(&self, label: &str, mut op: F) -> Result<T, EngineError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, RetryError>>,
    {
        let mut delay = self.base_delay;
        let mut attempt = 1u32;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(RetryError::Permanent(e)) => return Err(e),
                Err(RetryError::Transient(e)) => {
                    if attempt >= self.max_attempts {
                        return Err(e);
                    }
                    warn!(
                        label,
                        attempt,
                        max_attempts = self.max_attempts,
                        error = %e,
                        "transient failure, backing off"
                    );
                    tokio::time::sleep(with_jitter(delay)).await;
                    delay = (delay * 2).min(self.max_delay);
                    attempt += 1;
                }
            }
        }
    }
}

/// Add up to 50% random jitter on top of the base delay.
fn with_jitter(delay: Duration) -> Duration {
    let half = delay.as_millis() as u64 / 2;
    if half == 0 {
        return delay;
    }
    delay + Duration::from_millis(rand::thread_rng().gen_range(0..=half))
}
