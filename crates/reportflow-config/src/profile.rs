//! Stage profiles: named, ordered progress checkpoints for one report type

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use reportflow_utils::error::ConfigError;

/// One progress checkpoint within a profile
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stage {
    /// Stable stage name used by `advance_to_stage`
    pub name: String,
    /// Default human-readable message shown while in this stage
    pub message: String,
    /// Declared progress percentage at which this stage begins
    pub percent: u8,
}

impl Stage {
    #[must_use]
    pub fn new(name: impl Into<String>, message: impl Into<String>, percent: u8) -> Self {
        Self {
            name: name.into(),
            message: message.into(),
            percent,
        }
    }
}

/// A validated, immutable stage sequence.
///
/// Invariants (checked by [`StageProfile::new`]):
/// - at least one stage
/// - stage names are unique
/// - percentages strictly increase
/// - the last stage is exactly 100
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StageProfile {
    name: String,
    stages: Vec<Stage>,
}

impl StageProfile {
    /// Build and validate a profile.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidProfile` if any invariant is violated.
    pub fn new(name: impl Into<String>, stages: Vec<Stage>) -> Result<Self, ConfigError> {
        let name = name.into();
        let invalid = |reason: String| ConfigError::InvalidProfile {
            profile: name.clone(),
            reason,
        };

        if name.trim().is_empty() {
            return Err(invalid("profile name must not be empty".to_string()));
        }
        let Some(last) = stages.last() else {
            return Err(invalid("profile must declare at least one stage".to_string()));
        };
        if last.percent != 100 {
            return Err(invalid(format!(
                "last stage '{}' must be at 100 percent, found {}",
                last.name, last.percent
            )));
        }

        let mut seen = HashSet::new();
        for stage in &stages {
            if stage.name.trim().is_empty() {
                return Err(invalid("stage names must not be empty".to_string()));
            }
            if !seen.insert(stage.name.as_str()) {
                return Err(invalid(format!("duplicate stage name '{}'", stage.name)));
            }
        }

        for pair in stages.windows(2) {
            if pair[1].percent <= pair[0].percent {
                return Err(invalid(format!(
                    "stage '{}' ({}%) must be above stage '{}' ({}%)",
                    pair[1].name, pair[1].percent, pair[0].name, pair[0].percent
                )));
            }
        }

        Ok(Self { name, stages })
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn stages(&self) -> &[Stage] {
        &self.stages
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.stages.len()
    }

    /// Always false for a validated profile; present for API symmetry.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    #[must_use]
    pub fn stage(&self, index: usize) -> Option<&Stage> {
        self.stages.get(index)
    }

    /// Position of the named stage, if declared
    #[must_use]
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.stages.iter().position(|s| s.name == name)
    }
}

/// Read-only table of stage profiles keyed by report type.
///
/// Cloning is cheap; all clones share the same immutable map.
#[derive(Debug, Clone, Default)]
pub struct StageProfileTable {
    profiles: Arc<BTreeMap<String, Arc<StageProfile>>>,
}

impl StageProfileTable {
    /// Build a table from validated profiles. Later duplicates replace earlier ones.
    pub fn from_profiles(profiles: impl IntoIterator<Item = StageProfile>) -> Self {
        let map = profiles
            .into_iter()
            .map(|p| (p.name.clone(), Arc::new(p)))
            .collect();
        Self {
            profiles: Arc::new(map),
        }
    }

    /// Profiles shipped with reportflow, used when no configuration overrides them
    #[must_use]
    pub fn builtin() -> Self {
        Self::from_profiles(builtin_profiles())
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<Arc<StageProfile>> {
        self.profiles.get(name).cloned()
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.profiles.contains_key(name)
    }

    /// Profile names in sorted order
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.profiles.keys().map(String::as_str)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.profiles.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.profiles.is_empty()
    }

    /// Return a new table with `overrides` layered over this one
    #[must_use]
    pub fn merged_with(&self, overrides: impl IntoIterator<Item = StageProfile>) -> Self {
        let mut map: BTreeMap<_, _> = (*self.profiles).clone();
        for profile in overrides {
            map.insert(profile.name.clone(), Arc::new(profile));
        }
        Self {
            profiles: Arc::new(map),
        }
    }
}

fn builtin_profiles() -> Vec<StageProfile> {
    let specs: [(&str, &[(&str, &str, u8)]); 3] = [
        (
            "standard",
            &[
                ("init", "Preparing request", 0),
                ("analyze", "Analyzing input", 15),
                ("generate", "Generating report content", 40),
                ("format", "Formatting report", 85),
                ("done", "Report ready", 100),
            ],
        ),
        (
            "detailed",
            &[
                ("init", "Preparing request", 0),
                ("analyze", "Analyzing input and attachments", 10),
                ("research", "Gathering supporting material", 25),
                ("generate", "Generating report sections", 45),
                ("review", "Reviewing generated content", 75),
                ("format", "Formatting report", 90),
                ("done", "Report ready", 100),
            ],
        ),
        (
            "summary",
            &[
                ("init", "Preparing request", 0),
                ("generate", "Writing summary", 30),
                ("done", "Summary ready", 100),
            ],
        ),
    ];

    specs
        .iter()
        .filter_map(|(name, stages)| {
            let stages = stages
                .iter()
                .map(|(n, m, p)| Stage::new(*n, *m, *p))
                .collect();
            // Built-in tables are covered by tests; an invalid one is skipped, not fatal.
            StageProfile::new(*name, stages).ok()
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stages(defs: &[(&str, u8)]) -> Vec<Stage> {
        defs.iter()
            .map(|(n, p)| Stage::new(*n, format!("{n} message"), *p))
            .collect()
    }

    #[test]
    fn test_valid_profile() {
        let profile =
            StageProfile::new("report", stages(&[("init", 0), ("process", 50), ("done", 100)]))
                .unwrap();
        assert_eq!(profile.len(), 3);
        assert_eq!(profile.index_of("process"), Some(1));
        assert_eq!(profile.index_of("missing"), None);
        assert_eq!(profile.stage(2).unwrap().percent, 100);
    }

    #[test]
    fn test_single_stage_profile_at_100_is_valid() {
        let profile = StageProfile::new("instant", stages(&[("done", 100)])).unwrap();
        assert_eq!(profile.len(), 1);
    }

    #[test]
    fn test_rejects_empty_profile() {
        let err = StageProfile::new("empty", Vec::new()).unwrap_err();
        assert!(err.to_string().contains("at least one stage"));
    }

    #[test]
    fn test_rejects_profile_not_ending_at_100() {
        let err = StageProfile::new("short", stages(&[("init", 0), ("done", 90)])).unwrap_err();
        assert!(err.to_string().contains("100"));
    }

    #[test]
    fn test_rejects_non_increasing_percent() {
        let err = StageProfile::new(
            "flat",
            stages(&[("init", 0), ("a", 50), ("b", 50), ("done", 100)]),
        )
        .unwrap_err();
        assert!(err.to_string().contains("must be above"));
    }

    #[test]
    fn test_rejects_duplicate_stage_names() {
        let err = StageProfile::new("dup", stages(&[("init", 0), ("init", 50), ("done", 100)]))
            .unwrap_err();
        assert!(err.to_string().contains("duplicate"));
    }

    #[test]
    fn test_builtin_profiles_are_all_valid() {
        let table = StageProfileTable::builtin();
        assert_eq!(table.len(), 3);
        for name in ["standard", "detailed", "summary"] {
            let profile = table.get(name).unwrap();
            assert_eq!(profile.stage(0).unwrap().percent, 0);
            assert_eq!(profile.stages().last().unwrap().percent, 100);
        }
    }

    #[test]
    fn test_merged_with_replaces_by_name() {
        let table = StageProfileTable::builtin();
        let custom = StageProfile::new("summary", stages(&[("start", 0), ("done", 100)])).unwrap();
        let merged = table.merged_with([custom]);
        assert_eq!(merged.len(), 3);
        assert_eq!(merged.get("summary").unwrap().stage(0).unwrap().name, "start");
        // Original table is untouched
        assert_eq!(table.get("summary").unwrap().stage(0).unwrap().name, "init");
    }
}
