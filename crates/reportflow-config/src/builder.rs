use std::time::Duration;

use reportflow_utils::error::ReportflowError;

use super::{Config, ConfigSource, StageProfile};

impl Config {
    /// Create a builder for programmatic configuration.
    ///
    /// ```rust
    /// use reportflow_config::Config;
    /// use std::time::Duration;
    ///
    /// let config = Config::builder()
    ///     .hard_timeout(Duration::from_secs(90))
    ///     .warn_threshold(Duration::from_secs(60))
    ///     .max_attempts(4)
    ///     .build()
    ///     .expect("valid config");
    /// assert_eq!(config.max_attempts(), 4);
    /// ```
    #[must_use]
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::new()
    }
}

/// Builder for programmatic configuration.
///
/// Values set here are attributed to [`ConfigSource::Programmatic`]. A builder
/// may start from a discovered configuration via [`ConfigBuilder::from_config`],
/// so programmatic values override file values.
#[derive(Debug, Clone)]
pub struct ConfigBuilder {
    base: Option<Config>,
    hard_timeout: Option<Duration>,
    warn_threshold: Option<Duration>,
    tick_interval: Option<Duration>,
    grace_period: Option<Duration>,
    max_attempts: Option<u32>,
    base_delay: Option<Duration>,
    backoff_multiplier: Option<f64>,
    max_delay: Option<Duration>,
    jitter_ratio: Option<f64>,
    profiles: Vec<StageProfile>,
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self {
            base: None,
            hard_timeout: None,
            warn_threshold: None,
            tick_interval: None,
            grace_period: None,
            max_attempts: None,
            base_delay: None,
            backoff_multiplier: None,
            max_delay: None,
            jitter_ratio: None,
            profiles: Vec::new(),
        }
    }

    /// Start from an existing configuration (e.g. one returned by discovery)
    #[must_use]
    pub fn from_config(config: Config) -> Self {
        Self {
            base: Some(config),
            ..Self::new()
        }
    }

    /// Deadline after which a request is marked timed out. Whole seconds.
    #[must_use]
    pub fn hard_timeout(mut self, timeout: Duration) -> Self {
        self.hard_timeout = Some(timeout);
        self
    }

    /// Deadline after which a "taking long" warning fires. Whole seconds.
    #[must_use]
    pub fn warn_threshold(mut self, threshold: Duration) -> Self {
        self.warn_threshold = Some(threshold);
        self
    }

    #[must_use]
    pub fn tick_interval(mut self, interval: Duration) -> Self {
        self.tick_interval = Some(interval);
        self
    }

    /// How long a finished tracker stays queryable. Whole seconds.
    #[must_use]
    pub fn grace_period(mut self, grace: Duration) -> Self {
        self.grace_period = Some(grace);
        self
    }

    #[must_use]
    pub fn max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = Some(attempts);
        self
    }

    #[must_use]
    pub fn base_delay(mut self, delay: Duration) -> Self {
        self.base_delay = Some(delay);
        self
    }

    #[must_use]
    pub fn backoff_multiplier(mut self, multiplier: f64) -> Self {
        self.backoff_multiplier = Some(multiplier);
        self
    }

    #[must_use]
    pub fn max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = Some(delay);
        self
    }

    #[must_use]
    pub fn jitter_ratio(mut self, ratio: f64) -> Self {
        self.jitter_ratio = Some(ratio);
        self
    }

    /// Add (or replace by name) a stage profile
    #[must_use]
    pub fn profile(mut self, profile: StageProfile) -> Self {
        self.profiles.push(profile);
        self
    }

    /// Build and validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns `ReportflowError::Config` if a value is out of range or the
    /// warning threshold is not below the hard timeout.
    pub fn build(self) -> Result<Config, ReportflowError> {
        let mut config = self.base.unwrap_or_default();

        let set = |config: &mut Config, key: &str| {
            config
                .source_attribution
                .insert(key.to_string(), ConfigSource::Programmatic);
        };

        if let Some(t) = self.hard_timeout {
            config.defaults.hard_timeout_secs = Some(t.as_secs());
            set(&mut config, "hard_timeout_secs");
        }
        if let Some(t) = self.warn_threshold {
            config.defaults.warn_threshold_secs = Some(t.as_secs());
            set(&mut config, "warn_threshold_secs");
        }
        if let Some(t) = self.tick_interval {
            config.defaults.tick_interval_ms = Some(t.as_millis() as u64);
            set(&mut config, "tick_interval_ms");
        }
        if let Some(t) = self.grace_period {
            config.defaults.grace_period_secs = Some(t.as_secs());
            set(&mut config, "grace_period_secs");
        }
        if let Some(n) = self.max_attempts {
            config.retry.max_attempts = Some(n);
            set(&mut config, "max_attempts");
        }
        if let Some(d) = self.base_delay {
            config.retry.base_delay_ms = Some(d.as_millis() as u64);
            set(&mut config, "base_delay_ms");
        }
        if let Some(m) = self.backoff_multiplier {
            config.retry.backoff_multiplier = Some(m);
            set(&mut config, "backoff_multiplier");
        }
        if let Some(d) = self.max_delay {
            config.retry.max_delay_ms = Some(d.as_millis() as u64);
            set(&mut config, "max_delay_ms");
        }
        if let Some(r) = self.jitter_ratio {
            config.retry.jitter_ratio = Some(r);
            set(&mut config, "jitter_ratio");
        }
        if !self.profiles.is_empty() {
            for profile in &self.profiles {
                set(&mut config, &format!("profiles.{}", profile.name()));
            }
            config.profiles = config.profiles.merged_with(self.profiles);
        }

        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Stage;

    #[test]
    fn test_builder_defaults_match_default_config() {
        let config = ConfigBuilder::new().build().unwrap();
        assert_eq!(config.hard_timeout(), Duration::from_secs(60));
        assert_eq!(config.warn_threshold(), Duration::from_secs(45));
        assert_eq!(config.max_attempts(), 3);
        assert_eq!(
            config.source_attribution.get("max_attempts"),
            Some(&ConfigSource::Defaults)
        );
    }

    #[test]
    fn test_builder_values_are_programmatic() {
        let config = Config::builder()
            .hard_timeout(Duration::from_secs(120))
            .warn_threshold(Duration::from_secs(90))
            .jitter_ratio(0.0)
            .build()
            .unwrap();

        assert_eq!(config.hard_timeout(), Duration::from_secs(120));
        assert_eq!(config.jitter_ratio(), 0.0);
        assert_eq!(
            config.source_attribution.get("hard_timeout_secs"),
            Some(&ConfigSource::Programmatic)
        );
        assert_eq!(
            config.source_attribution.get("tick_interval_ms"),
            Some(&ConfigSource::Defaults)
        );
    }

    #[test]
    fn test_builder_rejects_inverted_deadlines() {
        let result = Config::builder()
            .hard_timeout(Duration::from_secs(10))
            .warn_threshold(Duration::from_secs(20))
            .build();
        assert!(result.is_err());
    }

    #[test]
    fn test_builder_adds_profile() {
        let profile = StageProfile::new(
            "audit",
            vec![Stage::new("init", "Starting", 0), Stage::new("done", "Done", 100)],
        )
        .unwrap();
        let config = Config::builder().profile(profile).build().unwrap();
        assert!(config.profiles.contains("audit"));
        assert!(config.profiles.contains("standard"));
    }
}
