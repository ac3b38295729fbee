use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use crate::profile::StageProfileTable;

/// Default hard timeout for a tracked request (seconds)
pub const DEFAULT_HARD_TIMEOUT_SECS: u64 = 60;
/// Default warning threshold (seconds)
pub const DEFAULT_WARN_THRESHOLD_SECS: u64 = 45;
/// Default progress tick interval (milliseconds)
pub const DEFAULT_TICK_INTERVAL_MS: u64 = 1_000;
/// Default time a finished tracker stays queryable (seconds)
pub const DEFAULT_GRACE_PERIOD_SECS: u64 = 30;

/// Default total attempts, including the first
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;
/// Default delay before the second attempt (milliseconds)
pub const DEFAULT_BASE_DELAY_MS: u64 = 1_000;
/// Default exponential growth factor between attempts
pub const DEFAULT_BACKOFF_MULTIPLIER: f64 = 2.0;
/// Default ceiling for a single backoff delay (milliseconds)
pub const DEFAULT_MAX_DELAY_MS: u64 = 30_000;
/// Default symmetric jitter applied to each delay
pub const DEFAULT_JITTER_RATIO: f64 = 0.1;

/// Where a configuration value came from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConfigSource {
    /// Built-in default
    Defaults,
    /// Loaded from the given TOML file
    ConfigFile(PathBuf),
    /// Set through [`ConfigBuilder`](crate::ConfigBuilder)
    Programmatic,
}

/// `[defaults]` section: request deadlines and timer cadence
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Defaults {
    pub hard_timeout_secs: Option<u64>,
    pub warn_threshold_secs: Option<u64>,
    pub tick_interval_ms: Option<u64>,
    pub grace_period_secs: Option<u64>,
}

/// `[retry]` section: defaults for the retry policy
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RetryConfig {
    pub max_attempts: Option<u32>,
    pub base_delay_ms: Option<u64>,
    pub backoff_multiplier: Option<f64>,
    pub max_delay_ms: Option<u64>,
    pub jitter_ratio: Option<f64>,
}

/// Configuration for the orchestrator.
///
/// Values are resolved with precedence programmatic > file > defaults. Each
/// resolved key records its origin in `source_attribution`.
///
/// # Configuration File Format
///
/// ```toml
/// [defaults]
/// hard_timeout_secs = 60
/// warn_threshold_secs = 45
/// tick_interval_ms = 1000
/// grace_period_secs = 30
///
/// [retry]
/// max_attempts = 3
/// base_delay_ms = 1000
/// backoff_multiplier = 2.0
/// max_delay_ms = 30000
/// jitter_ratio = 0.1
///
/// [profiles.quarterly]
/// stages = [
///   { name = "init", message = "Preparing", percent = 0 },
///   { name = "generate", message = "Writing", percent = 50 },
///   { name = "done", message = "Ready", percent = 100 },
/// ]
/// ```
#[derive(Debug, Clone)]
pub struct Config {
    pub defaults: Defaults,
    pub retry: RetryConfig,
    pub profiles: StageProfileTable,
    pub source_attribution: HashMap<String, ConfigSource>,
}

impl Default for Config {
    fn default() -> Self {
        let mut source_attribution = HashMap::new();
        for key in ATTRIBUTED_KEYS {
            source_attribution.insert((*key).to_string(), ConfigSource::Defaults);
        }
        Self {
            defaults: Defaults::default(),
            retry: RetryConfig::default(),
            profiles: StageProfileTable::builtin(),
            source_attribution,
        }
    }
}

/// Keys tracked in the source attribution map
pub(crate) const ATTRIBUTED_KEYS: &[&str] = &[
    "hard_timeout_secs",
    "warn_threshold_secs",
    "tick_interval_ms",
    "grace_period_secs",
    "max_attempts",
    "base_delay_ms",
    "backoff_multiplier",
    "max_delay_ms",
    "jitter_ratio",
];

impl Config {
    #[must_use]
    pub fn hard_timeout(&self) -> Duration {
        Duration::from_secs(
            self.defaults
                .hard_timeout_secs
                .unwrap_or(DEFAULT_HARD_TIMEOUT_SECS),
        )
    }

    #[must_use]
    pub fn warn_threshold(&self) -> Duration {
        Duration::from_secs(
            self.defaults
                .warn_threshold_secs
                .unwrap_or(DEFAULT_WARN_THRESHOLD_SECS),
        )
    }

    #[must_use]
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(
            self.defaults
                .tick_interval_ms
                .unwrap_or(DEFAULT_TICK_INTERVAL_MS),
        )
    }

    #[must_use]
    pub fn grace_period(&self) -> Duration {
        Duration::from_secs(
            self.defaults
                .grace_period_secs
                .unwrap_or(DEFAULT_GRACE_PERIOD_SECS),
        )
    }

    #[must_use]
    pub fn max_attempts(&self) -> u32 {
        self.retry.max_attempts.unwrap_or(DEFAULT_MAX_ATTEMPTS)
    }

    #[must_use]
    pub fn base_delay(&self) -> Duration {
        Duration::from_millis(self.retry.base_delay_ms.unwrap_or(DEFAULT_BASE_DELAY_MS))
    }

    #[must_use]
    pub fn backoff_multiplier(&self) -> f64 {
        self.retry
            .backoff_multiplier
            .unwrap_or(DEFAULT_BACKOFF_MULTIPLIER)
    }

    #[must_use]
    pub fn max_delay(&self) -> Duration {
        Duration::from_millis(self.retry.max_delay_ms.unwrap_or(DEFAULT_MAX_DELAY_MS))
    }

    #[must_use]
    pub fn jitter_ratio(&self) -> f64 {
        self.retry.jitter_ratio.unwrap_or(DEFAULT_JITTER_RATIO)
    }
}
