use reportflow_utils::error::{ConfigError, ReportflowError};

use super::Config;

fn invalid(key: &str, value: impl Into<String>) -> ReportflowError {
    ReportflowError::Config(ConfigError::InvalidValue {
        key: key.to_string(),
        value: value.into(),
    })
}

impl Config {
    /// Validate configuration values.
    ///
    /// Stage profiles are validated on construction, so only scalar settings
    /// and their cross-field relationships are checked here.
    pub(crate) fn validate(&self) -> Result<(), ReportflowError> {
        let hard = self.hard_timeout();
        let warn = self.warn_threshold();

        if hard.is_zero() {
            return Err(invalid("hard_timeout_secs", "must be greater than 0"));
        }
        if hard.as_secs() > 7200 {
            return Err(invalid(
                "hard_timeout_secs",
                "exceeds maximum limit of 7200 seconds (2 hours)",
            ));
        }
        if warn >= hard {
            return Err(invalid(
                "warn_threshold_secs",
                format!(
                    "must be less than hard_timeout_secs ({} >= {})",
                    warn.as_secs(),
                    hard.as_secs()
                ),
            ));
        }

        if self.tick_interval().is_zero() {
            return Err(invalid("tick_interval_ms", "must be greater than 0"));
        }
        if self.tick_interval() > hard {
            return Err(invalid(
                "tick_interval_ms",
                "must not exceed the hard timeout",
            ));
        }

        if self.grace_period().as_secs() > 3600 {
            return Err(invalid(
                "grace_period_secs",
                "exceeds maximum limit of 3600 seconds (1 hour)",
            ));
        }

        let max_attempts = self.max_attempts();
        if max_attempts == 0 {
            return Err(invalid("max_attempts", "must be at least 1"));
        }
        if max_attempts > 20 {
            return Err(invalid("max_attempts", "exceeds maximum limit of 20"));
        }

        let multiplier = self.backoff_multiplier();
        if !multiplier.is_finite() || multiplier < 1.0 {
            return Err(invalid("backoff_multiplier", "must be a finite value >= 1.0"));
        }

        let jitter = self.jitter_ratio();
        if !(0.0..=1.0).contains(&jitter) {
            return Err(invalid("jitter_ratio", "must be between 0.0 and 1.0"));
        }

        if self.max_delay() < self.base_delay() {
            return Err(invalid(
                "max_delay_ms",
                "must be greater than or equal to base_delay_ms",
            ));
        }

        if self.profiles.is_empty() {
            return Err(ReportflowError::Config(ConfigError::InvalidProfile {
                profile: "*".to_string(),
                reason: "at least one stage profile must be configured".to_string(),
            }));
        }

        Ok(())
    }
}
