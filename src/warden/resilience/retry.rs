// SPDX-License-Identifier: MIT

//! Retry eligibility and exponential backoff

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::category::ErrorCategory;

/// Decides whether a failed step is re-invoked and how long to wait first.
///
/// Delays grow as `base_delay * 2^attempt`, are capped at `max_delay`, and
/// are scaled by a random factor in `[0.5, 1.0]` unless jitter is disabled.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 1_000,
            max_delay_ms: 60_000,
            jitter: true,
        }
    }
}

impl RetryPolicy {
    /// `attempt` counts failures already seen for this node
    pub fn should_retry(&self, category: ErrorCategory, attempt: u32) -> bool {
        attempt < self.max_attempts && category.is_retryable()
    }

    pub fn get_delay(&self, attempt: u32) -> Duration {
        let capped = self.delay_without_jitter(attempt);
        if !self.jitter {
            return capped;
        }
        let factor: f64 = rand::rng().random_range(0.5..=1.0);
        Duration::from_secs_f64(capped.as_secs_f64() * factor)
    }

    /// The capped exponential delay before jitter is applied
    pub fn delay_without_jitter(&self, attempt: u32) -> Duration {
        // 2^30 already dwarfs any sensible cap
        let factor = 1u64 << attempt.min(30);
        let ms = self
            .base_delay_ms
            .saturating_mul(factor)
            .min(self.max_delay_ms);
        Duration::from_millis(ms)
    }
}
