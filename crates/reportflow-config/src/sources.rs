use std::collections::HashMap;

use super::{Config, ConfigSource};

fn stable_source_label(source: &ConfigSource) -> &'static str {
    match source {
        ConfigSource::ConfigFile(_) => "config",
        ConfigSource::Programmatic => "programmatic",
        ConfigSource::Defaults => "default",
    }
}

fn source_label(source: Option<&ConfigSource>) -> String {
    stable_source_label(source.unwrap_or(&ConfigSource::Defaults)).to_string()
}

impl Config {
    /// Get effective configuration as key-value pairs with source attribution.
    ///
    /// Every scalar setting is reported with its resolved value, including
    /// built-in defaults. Profiles appear as `profiles.<name>` with the stage
    /// names joined by ` > `.
    #[must_use]
    pub fn effective_config(&self) -> HashMap<String, (String, String)> {
        let mut config = HashMap::new();

        let mut add_config = |key: &str, value: String| {
            let source = source_label(self.source_attribution.get(key));
            config.insert(key.to_string(), (value, source));
        };

        add_config("hard_timeout_secs", self.hard_timeout().as_secs().to_string());
        add_config(
            "warn_threshold_secs",
            self.warn_threshold().as_secs().to_string(),
        );
        add_config(
            "tick_interval_ms",
            self.tick_interval().as_millis().to_string(),
        );
        add_config(
            "grace_period_secs",
            self.grace_period().as_secs().to_string(),
        );
        add_config("max_attempts", self.max_attempts().to_string());
        add_config("base_delay_ms", self.base_delay().as_millis().to_string());
        add_config("backoff_multiplier", self.backoff_multiplier().to_string());
        add_config("max_delay_ms", self.max_delay().as_millis().to_string());
        add_config("jitter_ratio", self.jitter_ratio().to_string());

        for name in self.profiles.names() {
            let Some(profile) = self.profiles.get(name) else {
                continue;
            };
            let stages = profile
                .stages()
                .iter()
                .map(|s| s.name.as_str())
                .collect::<Vec<_>>()
                .join(" > ");
            add_config(&format!("profiles.{name}"), stages);
        }

        config
    }
}
