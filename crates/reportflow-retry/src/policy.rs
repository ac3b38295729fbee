use rand::Rng;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use reportflow_classifier::{Classification, ErrorCategory};
use reportflow_config::{
    Config, DEFAULT_BACKOFF_MULTIPLIER, DEFAULT_BASE_DELAY_MS, DEFAULT_JITTER_RATIO,
    DEFAULT_MAX_ATTEMPTS, DEFAULT_MAX_DELAY_MS,
};

/// Retry policy with exponential backoff and jitter.
///
/// The pre-jitter delay before attempt `n + 1` (after attempt `n` failed) is:
///
/// ```text
/// delay = min(base_delay * backoff_multiplier ^ (n - 1), max_delay)
/// ```
///
/// then `± jitter_ratio` random jitter is applied. For `rateLimit` failures a
/// server `Retry-After` hint raises the delay to at least the hint, still
/// bounded by `max_delay`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Total attempts including the first; values below 1 behave as 1
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub backoff_multiplier: f64,
    /// Cap for a single pre-jitter delay
    pub max_delay: Duration,
    /// Symmetric jitter as a fraction of the delay, in `[0, 1]`
    pub jitter_ratio: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            base_delay: Duration::from_millis(DEFAULT_BASE_DELAY_MS),
            backoff_multiplier: DEFAULT_BACKOFF_MULTIPLIER,
            max_delay: Duration::from_millis(DEFAULT_MAX_DELAY_MS),
            jitter_ratio: DEFAULT_JITTER_RATIO,
        }
    }
}

impl RetryPolicy {
    #[must_use]
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts,
            base_delay,
            ..Self::default()
        }
    }

    /// Single attempt, no retries
    #[must_use]
    pub fn no_retry() -> Self {
        Self::new(1, Duration::ZERO)
    }

    /// Policy from the `[retry]` section of a resolved configuration
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        Self {
            max_attempts: config.max_attempts(),
            base_delay: config.base_delay(),
            backoff_multiplier: config.backoff_multiplier(),
            max_delay: config.max_delay(),
            jitter_ratio: config.jitter_ratio(),
        }
    }

    #[must_use]
    pub fn with_backoff_multiplier(mut self, multiplier: f64) -> Self {
        self.backoff_multiplier = multiplier;
        self
    }

    #[must_use]
    pub fn with_max_delay(mut self, max_delay: Duration) -> Self {
        self.max_delay = max_delay;
        self
    }

    #[must_use]
    pub fn with_jitter_ratio(mut self, ratio: f64) -> Self {
        self.jitter_ratio = ratio;
        self
    }

    pub(crate) fn attempt_limit(&self) -> u32 {
        self.max_attempts.max(1)
    }

    /// Pre-jitter delay after the given failed attempt (1-indexed)
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    #[allow(clippy::cast_possible_truncation)]
    #[allow(clippy::cast_sign_loss)]
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        let base_ms = self.base_delay.as_millis() as f64;
        let max_ms = self.max_delay.as_millis() as f64;
        let multiplier = if self.backoff_multiplier.is_finite() {
            self.backoff_multiplier.max(1.0)
        } else {
            1.0
        };

        // Exponent is capped; the max_delay cap is reached long before
        let exp = attempt.saturating_sub(1).min(63) as i32;
        let delay_ms = (base_ms * multiplier.powi(exp)).min(max_ms);
        Duration::from_millis(delay_ms.max(0.0) as u64)
    }

    /// Delay to wait after the given failed attempt, with jitter and the
    /// `Retry-After` floor applied
    #[must_use]
    pub fn delay_for(&self, attempt: u32, classification: &Classification) -> Duration {
        let delay = apply_jitter(self.backoff_delay(attempt), self.jitter_ratio);
        match classification.retry_after {
            Some(hint) if classification.category == ErrorCategory::RateLimit => {
                delay.max(hint.min(self.max_delay))
            }
            _ => delay,
        }
    }
}

#[allow(clippy::cast_precision_loss)]
#[allow(clippy::cast_possible_truncation)]
#[allow(clippy::cast_sign_loss)]
fn apply_jitter(delay: Duration, ratio: f64) -> Duration {
    if ratio.is_nan() || ratio <= 0.0 || delay.is_zero() {
        return delay;
    }
    let ratio = ratio.min(1.0);
    let delay_ms = delay.as_millis() as f64;
    let jitter_range = delay_ms * ratio;
    let jitter = rand::rng().random_range(-jitter_range..=jitter_range);
    Duration::from_millis((delay_ms + jitter).max(0.0) as u64)
}
