//! Retry policy for store transactions
//!
//! Exponential backoff with optional jitter. Conflicts are retried without a
//! bound; outages get `max_unavailable_retries` attempts before surfacing.

use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};

/// Backoff and retry limits for `ExperimentStore::update`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Delay before the first retry, in milliseconds
    pub initial_backoff_ms: u64,
    /// Upper bound on any single delay, in milliseconds
    pub max_backoff_ms: u64,
    /// Growth factor between consecutive delays
    pub multiplier: f64,
    /// Randomize each delay by ±30%
    pub jitter: bool,
    /// How many times a `StoreUnavailable` failure is retried before it is returned
    pub max_unavailable_retries: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            initial_backoff_ms: 1,
            max_backoff_ms: 50,
            multiplier: 2.0,
            jitter: true,
            max_unavailable_retries: 3,
        }
    }
}

impl RetryPolicy {
    /// Retry immediately (yielding to the scheduler) with no outage retries.
    ///
    /// Handy in tests where wall-clock delays only slow things down.
    #[must_use]
    pub const fn immediate() -> Self {
        Self {
            initial_backoff_ms: 0,
            max_backoff_ms: 0,
            multiplier: 1.0,
            jitter: false,
            max_unavailable_retries: 0,
        }
    }

    /// Set the number of outage retries.
    #[must_use]
    pub const fn with_max_unavailable_retries(mut self, retries: u32) -> Self {
        self.max_unavailable_retries = retries;
        self
    }

    /// Delay before retry number `attempt` (1-based).
    #[must_use]
    #[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn backoff(&self, attempt: u32) -> Duration {
        if self.initial_backoff_ms == 0 || self.max_backoff_ms == 0 {
            return Duration::ZERO;
        }

        let exponent = i32::try_from(attempt.saturating_sub(1)).unwrap_or(i32::MAX);
        let base = (self.initial_backoff_ms as f64 * self.multiplier.powi(exponent))
            .min(self.max_backoff_ms as f64);

        let millis = if self.jitter {
            base * (1.0 + rand::thread_rng().gen_range(-0.3..0.3))
        } else {
            base
        };

        Duration::from_micros((millis.max(0.0) * 1000.0) as u64)
    }

    /// Sleep for the backoff of `attempt`, or just yield when it is zero.
    pub async fn wait(&self, attempt: u32) {
        let delay = self.backoff(attempt);
        if delay.is_zero() {
            tokio::task::yield_now().await;
        } else {
            tokio::time::sleep(delay).await;
        }
    }
}
