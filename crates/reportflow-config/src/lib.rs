//! Configuration management for reportflow
//!
//! Hierarchical configuration with discovery and precedence:
//! programmatic > file > defaults. Configuration files are TOML with
//! `[defaults]`, `[retry]` and `[profiles.<name>]` sections.

mod builder;
mod discovery;
mod model;
mod profile;
mod sources;
mod validation;

pub use builder::ConfigBuilder;
pub use discovery::{CONFIG_DIR_NAME, CONFIG_FILE_NAME, HOME_ENV_VAR};
pub use model::*;
pub use profile::{Stage, StageProfile, StageProfileTable};

pub use reportflow_utils::error::{ConfigError, ReportflowError};
