use std::time::Duration;
use thiserror::Error;

use reportflow_classifier::{Classification, ErrorCategory, RawError};
use reportflow_utils::error::{UserFriendlyError, render_for_user};

/// Terminal failure of a retried operation.
///
/// Intermediate retryable failures are never surfaced; this carries the final
/// one together with everything needed to render it for a user.
#[derive(Error, Debug, Clone)]
pub enum RetryError {
    #[error(
        "{} failure after {attempts} attempt(s) in {elapsed:?}: {source}",
        .classification.category
    )]
    Failed {
        classification: Classification,
        source: RawError,
        attempts: u32,
        elapsed: Duration,
    },

    #[error("Cancelled after {attempts} attempt(s) in {elapsed:?}: {reason}")]
    Cancelled {
        reason: String,
        attempts: u32,
        elapsed: Duration,
    },
}

impl RetryError {
    /// Number of attempts that were started
    #[must_use]
    pub fn attempts(&self) -> u32 {
        match self {
            Self::Failed { attempts, .. } | Self::Cancelled { attempts, .. } => *attempts,
        }
    }

    /// Time from the first attempt to the failure, including backoff waits
    #[must_use]
    pub fn elapsed(&self) -> Duration {
        match self {
            Self::Failed { elapsed, .. } | Self::Cancelled { elapsed, .. } => *elapsed,
        }
    }

    #[must_use]
    pub fn classification(&self) -> Option<&Classification> {
        match self {
            Self::Failed { classification, .. } => Some(classification),
            Self::Cancelled { .. } => None,
        }
    }

    #[must_use]
    pub fn category(&self) -> Option<ErrorCategory> {
        self.classification().map(|c| c.category)
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled { .. })
    }

    /// Whether the final failure was itself retryable (attempts ran out)
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        self.classification().is_some_and(|c| c.retryable)
    }

    #[must_use]
    pub fn display_for_user(&self) -> String {
        render_for_user(self)
    }
}

impl UserFriendlyError for RetryError {
    fn user_message(&self) -> String {
        match self {
            Self::Failed { classification, .. } => classification.user_message.clone(),
            Self::Cancelled { .. } => "The report request was cancelled.".to_string(),
        }
    }

    fn context(&self) -> Option<String> {
        match self {
            Self::Failed {
                classification,
                attempts,
                elapsed,
                ..
            } => Some(format!(
                "Gave up after {attempts} attempt(s) over {:.1}s ({} error{}).",
                elapsed.as_secs_f64(),
                classification.category,
                if classification.retryable {
                    ", retries exhausted"
                } else {
                    ", not retryable"
                }
            )),
            Self::Cancelled { reason, .. } => Some(format!("Reason: {reason}")),
        }
    }

    fn suggestions(&self) -> Vec<String> {
        match self {
            Self::Failed { classification, .. } => classification.suggested_actions.clone(),
            Self::Cancelled { .. } => {
                vec!["Start the request again if it was cancelled by mistake".to_string()]
            }
        }
    }
}
