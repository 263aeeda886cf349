//! Bounded retry with exponential backoff for sink operations

use serde::{Deserialize, Serialize};
use std::fmt::Display;
use std::time::Duration;

/// Default number of attempts per sink operation
const DEFAULT_MAX_ATTEMPTS: u32 = 3;
/// Delay before the first retry
const DEFAULT_BASE_DELAY_MS: u64 = 50;
/// Upper bound on any single delay
const DEFAULT_MAX_DELAY_MS: u64 = 2_000;

/// Retry policy for row writes and batch deletes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            base_delay_ms: DEFAULT_BASE_DELAY_MS,
            max_delay_ms: DEFAULT_MAX_DELAY_MS,
        }
    }
}

impl RetryPolicy {
    /// Single attempt, no retries
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// Delay after the given (zero-based) failed attempt
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exp = 1u64 << attempt.min(16);
        Duration::from_millis(
            self.base_delay_ms
                .saturating_mul(exp)
                .min(self.max_delay_ms),
        )
    }

    /// Run `op` until it succeeds or attempts run out; returns the last error
    pub async fn run<T, E, F>(&self, what: &str, mut op: F) -> Result<T, E>
    where
        E: Display,
        F: FnMut() -> Result<T, E>,
    {
        let limit = self.max_attempts.max(1);
        let mut attempt = 0;
        loop {
            match op() {
                Ok(value) => return Ok(value),
                Err(err) if attempt + 1 < limit => {
                    let delay = self.backoff(attempt);
                    tracing::debug!(
                        "{} failed (attempt {}/{}): {}; retrying in {:?}",
                        what,
                        attempt + 1,
                        limit,
                        err,
                        delay
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(err) => {
                    tracing::warn!("{} failed after {} attempts: {}", what, limit, err);
                    return Err(err);
                }
            }
        }
    }
}
