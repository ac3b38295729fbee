use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use strum::{EnumIter, IntoEnumIterator};
use thiserror::Error;

/// Library-level error type for registry and configuration operations.
///
/// Failures of the orchestrated operation itself are reported through
/// `reportflow_retry::RetryError`, which carries a full classification.
/// `ReportflowError` covers the orchestrator's own contract violations:
/// bad configuration and invalid registry requests.
///
/// Use [`display_for_user()`](Self::display_for_user) to get a formatted
/// message with context and suggestions.
#[derive(Error, Debug)]
pub enum ReportflowError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Registry error: {0}")]
    Registry(#[from] RegistryError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Trait for providing user-friendly error reporting with context and suggestions
pub trait UserFriendlyError {
    /// Get a user-friendly error message
    fn user_message(&self) -> String;

    /// Get contextual information about the error
    fn context(&self) -> Option<String>;

    /// Get suggested actions to resolve the error
    fn suggestions(&self) -> Vec<String>;
}

/// Closed failure taxonomy for orchestrated operations.
///
/// Each category carries a fixed retryability verdict, a fixed user-facing
/// message and a fixed list of suggested actions. Assignment of a raw failure
/// to a category is done by `reportflow_classifier::classify`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, EnumIter)]
#[serde(rename_all = "camelCase")]
pub enum ErrorCategory {
    /// The request itself was rejected (HTTP 400, malformed input)
    Validation,
    /// Credentials missing, invalid or insufficient (HTTP 401/403)
    Authentication,
    /// Provider throttled the request (HTTP 429)
    RateLimit,
    /// Provider-side failure (HTTP 5xx)
    ServiceFault,
    /// Connectivity failure before a response was received
    NetworkFault,
    /// An uploaded or generated document could not be processed
    FileProcessing,
    /// Nothing matched; never retried
    Unknown,
}

impl ErrorCategory {
    /// Whether automatic re-attempt is sanctioned for this category.
    ///
    /// True only for `RateLimit`, `ServiceFault` and `NetworkFault`.
    #[must_use]
    pub fn is_retryable(self) -> bool {
        matches!(
            self,
            Self::RateLimit | Self::ServiceFault | Self::NetworkFault
        )
    }

    /// Stable identifier used in logs and serialized output
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Validation => "validation",
            Self::Authentication => "authentication",
            Self::RateLimit => "rateLimit",
            Self::ServiceFault => "serviceFault",
            Self::NetworkFault => "networkFault",
            Self::FileProcessing => "fileProcessing",
            Self::Unknown => "unknown",
        }
    }

    /// Fixed user-facing message template for this category
    #[must_use]
    pub fn user_message(self) -> &'static str {
        match self {
            Self::Validation => "The request could not be processed because some input is invalid.",
            Self::Authentication => "The report service could not authenticate with the model provider.",
            Self::RateLimit => "The model provider is receiving too many requests right now.",
            Self::ServiceFault => "The model provider is temporarily unavailable.",
            Self::NetworkFault => "The report service could not reach the model provider.",
            Self::FileProcessing => "The attached document could not be processed.",
            Self::Unknown => "An unexpected error occurred while generating the report.",
        }
    }

    /// Fixed suggested actions for this category
    #[must_use]
    pub fn suggested_actions(self) -> Vec<String> {
        let actions: &[&str] = match self {
            Self::Validation => &[
                "Correct the highlighted input and submit again",
                "Do not retry the same request unchanged",
            ],
            Self::Authentication => &[
                "Check that the provider API key is configured and valid",
                "Contact an administrator if the problem persists",
            ],
            Self::RateLimit => &[
                "Wait a minute and retry",
                "Reduce the number of reports generated in parallel",
            ],
            Self::ServiceFault => &[
                "Retry in a few moments",
                "Check the provider status page if the problem persists",
            ],
            Self::NetworkFault => &[
                "Check the network connection and retry",
                "Verify that the provider endpoint is reachable",
            ],
            Self::FileProcessing => &[
                "Check that the file is a valid, unencrypted PDF or document",
                "Try a smaller file or export it again",
            ],
            Self::Unknown => &[
                "Retry the request",
                "Report the problem with the request id if it happens again",
            ],
        };
        actions.iter().map(|s| (*s).to_string()).collect()
    }

    /// All categories in declaration order
    pub fn all() -> impl Iterator<Item = Self> {
        Self::iter()
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Configuration-related errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid configuration file: {0}")]
    InvalidFile(String),

    #[error("Invalid configuration value for {key}: {value}")]
    InvalidValue { key: String, value: String },

    #[error("Invalid stage profile '{profile}': {reason}")]
    InvalidProfile { profile: String, reason: String },

    #[error("Configuration file not found at {path}")]
    NotFound { path: String },

    #[error("Configuration discovery failed: {reason}")]
    DiscoveryFailed { reason: String },
}

impl UserFriendlyError for ConfigError {
    fn user_message(&self) -> String {
        match self {
            Self::InvalidFile(reason) => {
                format!("Configuration file has invalid format: {reason}")
            }
            Self::InvalidValue { key, value } => {
                format!("Configuration '{key}' has invalid value: {value}")
            }
            Self::InvalidProfile { profile, reason } => {
                format!("Stage profile '{profile}' is invalid: {reason}")
            }
            Self::NotFound { path } => {
                format!("Configuration file not found: {path}")
            }
            Self::DiscoveryFailed { reason } => {
                format!("Failed to discover configuration: {reason}")
            }
        }
    }

    fn context(&self) -> Option<String> {
        match self {
            Self::InvalidFile(_) => Some(
                "Configuration files must be valid TOML with [defaults], [retry] and [profiles.*] sections."
                    .to_string(),
            ),
            Self::InvalidValue { key, .. } => Some(format!(
                "The '{key}' configuration option has specific range requirements."
            )),
            Self::InvalidProfile { .. } => Some(
                "Stage profiles are ordered checkpoints whose percentages strictly increase and end at 100."
                    .to_string(),
            ),
            Self::NotFound { .. } | Self::DiscoveryFailed { .. } => Some(
                "reportflow searches for .reportflow/config.toml upward from the start directory, or uses $REPORTFLOW_HOME."
                    .to_string(),
            ),
        }
    }

    fn suggestions(&self) -> Vec<String> {
        match self {
            Self::InvalidFile(_) => vec![
                "Check the TOML syntax using a TOML validator".to_string(),
                "Compare with the example configuration in the documentation".to_string(),
            ],
            Self::InvalidValue { key, .. } => match key.as_str() {
                "warn_threshold_secs" | "hard_timeout_secs" => vec![
                    "Make warn_threshold_secs strictly smaller than hard_timeout_secs".to_string(),
                ],
                "jitter_ratio" => vec!["Use a value between 0.0 and 1.0".to_string()],
                _ => vec!["Use a positive value within the documented range".to_string()],
            },
            Self::InvalidProfile { profile, .. } => vec![
                format!("Review the [profiles.{profile}] section"),
                "Make the last stage's percent exactly 100".to_string(),
            ],
            Self::NotFound { .. } => vec![
                "Create .reportflow/config.toml or unset REPORTFLOW_HOME".to_string(),
            ],
            Self::DiscoveryFailed { .. } => vec![
                "Check directory permissions".to_string(),
                "Pass an explicit configuration path".to_string(),
            ],
        }
    }
}

/// Errors raised by the request registry
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    #[error("Request '{id}' is already being tracked")]
    DuplicateRequest { id: String },

    #[error("Stage profile '{profile}' not found")]
    ProfileNotFound { profile: String },

    #[error("Warning threshold {warn:?} must be shorter than hard timeout {hard:?}")]
    InvalidDeadlines { warn: Duration, hard: Duration },
}

impl UserFriendlyError for RegistryError {
    fn user_message(&self) -> String {
        match self {
            Self::DuplicateRequest { id } => {
                format!("A report request with id '{id}' is already in progress")
            }
            Self::ProfileNotFound { profile } => {
                format!("Unknown report type '{profile}'")
            }
            Self::InvalidDeadlines { warn, hard } => format!(
                "Warning threshold ({warn:?}) must be shorter than the hard timeout ({hard:?})"
            ),
        }
    }

    fn context(&self) -> Option<String> {
        match self {
            Self::DuplicateRequest { .. } => Some(
                "Request ids are unique among active and recently finished requests.".to_string(),
            ),
            Self::ProfileNotFound { .. } => Some(
                "Report types map to stage profiles loaded from configuration at startup."
                    .to_string(),
            ),
            Self::InvalidDeadlines { .. } => None,
        }
    }

    fn suggestions(&self) -> Vec<String> {
        match self {
            Self::DuplicateRequest { .. } => vec![
                "Wait for the existing request to finish".to_string(),
                "Let the registry generate a fresh id".to_string(),
            ],
            Self::ProfileNotFound { profile } => vec![
                format!("Add a [profiles.{profile}] section to the configuration"),
                "Use one of the configured report types".to_string(),
            ],
            Self::InvalidDeadlines { .. } => {
                vec!["Lower the warning threshold or raise the hard timeout".to_string()]
            }
        }
    }
}

impl UserFriendlyError for ReportflowError {
    fn user_message(&self) -> String {
        match self {
            Self::Config(err) => err.user_message(),
            Self::Registry(err) => err.user_message(),
            Self::Io(err) => format!("File system error: {err}"),
        }
    }

    fn context(&self) -> Option<String> {
        match self {
            Self::Config(err) => err.context(),
            Self::Registry(err) => err.context(),
            Self::Io(_) => None,
        }
    }

    fn suggestions(&self) -> Vec<String> {
        match self {
            Self::Config(err) => err.suggestions(),
            Self::Registry(err) => err.suggestions(),
            Self::Io(_) => vec!["Check file permissions and available disk space".to_string()],
        }
    }
}

impl ReportflowError {
    /// Get a user-friendly error message with context and actionable suggestions.
    ///
    /// ```text
    /// Error: <user message>
    ///
    /// Context: <context if available>
    ///
    /// Suggestions:
    ///   • <suggestion 1>
    /// ```
    #[must_use]
    pub fn display_for_user(&self) -> String {
        render_for_user(self)
    }
}

/// Render any [`UserFriendlyError`] in the standard three-part layout.
#[must_use]
pub fn render_for_user(err: &dyn UserFriendlyError) -> String {
    let mut output = format!("Error: {}\n", err.user_message());

    if let Some(ctx) = err.context() {
        output.push_str(&format!("\nContext: {ctx}\n"));
    }

    let suggestions = err.suggestions();
    if !suggestions.is_empty() {
        output.push_str("\nSuggestions:\n");
        for suggestion in suggestions {
            output.push_str(&format!("  • {suggestion}\n"));
        }
    }

    output
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_transient_categories_are_retryable() {
        let retryable: Vec<_> = ErrorCategory::all().filter(|c| c.is_retryable()).collect();
        assert_eq!(
            retryable,
            vec![
                ErrorCategory::RateLimit,
                ErrorCategory::ServiceFault,
                ErrorCategory::NetworkFault
            ]
        );
    }

    #[test]
    fn test_every_category_has_message_and_actions() {
        for category in ErrorCategory::all() {
            assert!(!category.user_message().is_empty(), "{category}");
            assert!(!category.suggested_actions().is_empty(), "{category}");
        }
    }

    #[test]
    fn test_category_serializes_camel_case() {
        let json = serde_json::to_string(&ErrorCategory::RateLimit).unwrap();
        assert_eq!(json, "\"rateLimit\"");
        let json = serde_json::to_string(&ErrorCategory::FileProcessing).unwrap();
        assert_eq!(json, "\"fileProcessing\"");
        assert_eq!(ErrorCategory::ServiceFault.to_string(), "serviceFault");
    }

    #[test]
    fn test_display_for_user_layout() {
        let err = ReportflowError::from(RegistryError::ProfileNotFound {
            profile: "quarterly".to_string(),
        });
        let rendered = err.display_for_user();
        assert!(rendered.starts_with("Error: Unknown report type 'quarterly'"));
        assert!(rendered.contains("Context:"));
        assert!(rendered.contains("Suggestions:"));
        assert!(rendered.contains("[profiles.quarterly]"));
    }

    #[test]
    fn test_invalid_deadlines_message() {
        let err = RegistryError::InvalidDeadlines {
            warn: Duration::from_secs(10),
            hard: Duration::from_secs(5),
        };
        assert!(err.to_string().contains("must be shorter"));
        assert!(err.context().is_none());
    }
}
