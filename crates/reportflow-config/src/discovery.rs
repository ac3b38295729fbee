use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::env;
use std::path::{Path, PathBuf};
use tracing::debug;

use super::{Config, ConfigSource, Defaults, RetryConfig, Stage, StageProfile};

/// Directory searched for upward from the start directory
pub const CONFIG_DIR_NAME: &str = ".reportflow";
/// File name inside [`CONFIG_DIR_NAME`] or `$REPORTFLOW_HOME`
pub const CONFIG_FILE_NAME: &str = "config.toml";
/// Environment variable naming a directory that holds `config.toml`
pub const HOME_ENV_VAR: &str = "REPORTFLOW_HOME";

/// TOML configuration file structure
#[derive(Debug, Default, Deserialize, Serialize)]
struct TomlConfig {
    defaults: Option<Defaults>,
    retry: Option<RetryConfig>,
    profiles: Option<BTreeMap<String, TomlProfile>>,
}

#[derive(Debug, Deserialize, Serialize)]
struct TomlProfile {
    stages: Vec<Stage>,
}

impl Config {
    /// Discover and load configuration with precedence: file > defaults.
    ///
    /// Uses `$REPORTFLOW_HOME/config.toml` when the variable is set, otherwise
    /// searches upward from the current directory for `.reportflow/config.toml`.
    pub fn discover() -> Result<Self> {
        let start_dir = env::current_dir().context("Failed to get current directory")?;
        Self::discover_from(&start_dir)
    }

    /// Discover and load configuration starting from a specific directory.
    ///
    /// This is the path-driven variant used by tests to avoid depending on the
    /// process working directory.
    pub fn discover_from(start_dir: &Path) -> Result<Self> {
        match Self::discover_config_file_from(start_dir)? {
            Some(path) => Self::from_file(&path),
            None => {
                debug!(start_dir = %start_dir.display(), "No config file found, using defaults");
                Ok(Self::default())
            }
        }
    }

    /// Load configuration from an explicit TOML file, layered over defaults.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let file_config: TomlConfig = toml::from_str(&content)
            .with_context(|| format!("Failed to parse TOML config file: {}", path.display()))?;

        let mut config = Config::default();
        let source = ConfigSource::ConfigFile(path.to_path_buf());
        config.apply_file(file_config, &source)?;
        config
            .validate()
            .with_context(|| format!("Invalid configuration in {}", path.display()))?;

        debug!(path = %path.display(), profiles = config.profiles.len(), "Loaded config file");
        Ok(config)
    }

    /// Locate the configuration file without loading it.
    ///
    /// `$REPORTFLOW_HOME` takes priority; the upward search stops at the
    /// filesystem root or at a repository root (`.git`, `.hg`, `.svn`).
    pub fn discover_config_file_from(start_dir: &Path) -> Result<Option<PathBuf>> {
        if let Some(home) = env::var_os(HOME_ENV_VAR).filter(|v| !v.is_empty()) {
            let path = PathBuf::from(home).join(CONFIG_FILE_NAME);
            if path.exists() {
                return Ok(Some(path));
            }
            anyhow::bail!(
                "{} is set but {} does not exist",
                HOME_ENV_VAR,
                path.display()
            );
        }

        let mut current_dir = start_dir.to_path_buf();
        loop {
            let config_path = current_dir.join(CONFIG_DIR_NAME).join(CONFIG_FILE_NAME);
            if config_path.exists() {
                return Ok(Some(config_path));
            }

            if current_dir.join(".git").exists()
                || current_dir.join(".hg").exists()
                || current_dir.join(".svn").exists()
            {
                break;
            }

            match current_dir.parent() {
                Some(parent) => current_dir = parent.to_path_buf(),
                None => break,
            }
        }

        Ok(None)
    }

    fn apply_file(&mut self, file: TomlConfig, source: &ConfigSource) -> Result<()> {
        let mut attribute = |key: &str, present: bool| {
            if present {
                self.source_attribution.insert(key.to_string(), source.clone());
            }
        };

        if let Some(d) = &file.defaults {
            attribute("hard_timeout_secs", d.hard_timeout_secs.is_some());
            attribute("warn_threshold_secs", d.warn_threshold_secs.is_some());
            attribute("tick_interval_ms", d.tick_interval_ms.is_some());
            attribute("grace_period_secs", d.grace_period_secs.is_some());
        }
        if let Some(r) = &file.retry {
            attribute("max_attempts", r.max_attempts.is_some());
            attribute("base_delay_ms", r.base_delay_ms.is_some());
            attribute("backoff_multiplier", r.backoff_multiplier.is_some());
            attribute("max_delay_ms", r.max_delay_ms.is_some());
            attribute("jitter_ratio", r.jitter_ratio.is_some());
        }

        if let Some(d) = file.defaults {
            self.defaults = d;
        }
        if let Some(r) = file.retry {
            self.retry = r;
        }

        if let Some(profiles) = file.profiles {
            let parsed = profiles
                .into_iter()
                .map(|(name, p)| StageProfile::new(name, p.stages))
                .collect::<Result<Vec<_>, _>>()?;
            for profile in &parsed {
                self.source_attribution
                    .insert(format!("profiles.{}", profile.name()), source.clone());
            }
            self.profiles = self.profiles.merged_with(parsed);
        }

        Ok(())
    }
}
