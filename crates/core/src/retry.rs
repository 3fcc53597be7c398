//! Retry policy: exponential backoff bounded by a cap (§3 RetryConfig, §4.E.10).

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Retry policy for a delivery, overridable per endpoint.
///
/// `delay_for(k)` computes the delay before the k-th retry attempt as
/// `min(initial_delay * backoff_multiplier^(k-1), max_delay)` — the exact
/// formula §8 quantifies as a testable property. No jitter: the spec
/// pins an exact value per attempt, and jitter would make that value
/// non-deterministic.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Maximum number of retries after the first attempt (total attempts
    /// made is `max_retries + 1`).
    pub max_retries: u32,
    /// Delay before the first retry.
    pub initial_delay: Duration,
    /// Upper bound on any computed delay.
    pub max_delay: Duration,
    /// Multiplier applied per additional retry. Must be >= 1.0.
    pub backoff_multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 5,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(3600),
            backoff_multiplier: 2.0,
        }
    }
}

impl RetryConfig {
    /// Total attempts allowed before the delivery is terminal: the first
    /// attempt plus the retry budget.
    pub fn max_attempts(&self) -> u32 {
        self.max_retries + 1
    }

    /// Whether another attempt may be made after `attempts` have already
    /// run.
    pub fn should_retry(&self, attempts: u32) -> bool {
        attempts <= self.max_retries
    }

    /// Delay before the k-th retry (`k` is 1-indexed: the delay before
    /// the first retry is `delay_for(1)`).
    pub fn delay_for(&self, k: u32) -> Duration {
        let k = k.max(1);
        let exponent = (k - 1) as i32;
        let multiplier = self.backoff_multiplier.powi(exponent);
        let scaled_millis = self.initial_delay.as_secs_f64() * multiplier * 1000.0;
        let delay = Duration::from_millis(scaled_millis.round().max(0.0) as u64);
        std::cmp::min(delay, self.max_delay)
    }
}
