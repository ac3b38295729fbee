use std::time::Duration;
use thiserror::Error;

use reportflow_retry::RetryError;
use reportflow_tracker::{RegistryError, RequestStatus, TrackerSnapshot};
use reportflow_utils::error::{UserFriendlyError, render_for_user};

/// Outcome of a tracked run that did not produce a value.
#[derive(Error, Debug)]
pub enum RunError {
    #[error("Could not start request: {0}")]
    Registry(#[from] RegistryError),

    /// The operation failed for good, or its attempts were aborted.
    #[error(transparent)]
    Retry(#[from] RetryError),

    #[error("Request {id} timed out after {elapsed:?}")]
    TimedOut { id: String, elapsed: Duration },

    #[error("Request {id} was cancelled: {reason}")]
    Cancelled { id: String, reason: String },
}

impl RunError {
    /// Build the error for a tracker that finished as `cancelled` or `timedOut`.
    ///
    /// Returns `None` for any other status.
    pub(crate) fn from_snapshot(snapshot: &TrackerSnapshot) -> Option<Self> {
        match snapshot.status {
            RequestStatus::TimedOut => Some(Self::TimedOut {
                id: snapshot.id.clone(),
                elapsed: snapshot.elapsed,
            }),
            RequestStatus::Cancelled => Some(Self::Cancelled {
                id: snapshot.id.clone(),
                reason: snapshot
                    .failure_reason
                    .clone()
                    .unwrap_or_else(|| reportflow_retry::CANCELLED_REASON.to_string()),
            }),
            _ => None,
        }
    }

    /// Terminal tracker status this error corresponds to, if a tracker was started
    #[must_use]
    pub fn status(&self) -> Option<RequestStatus> {
        match self {
            Self::Registry(_) => None,
            Self::Retry(RetryError::Cancelled { .. }) => Some(RequestStatus::Cancelled),
            Self::Retry(RetryError::Failed { .. }) => Some(RequestStatus::Failed),
            Self::TimedOut { .. } => Some(RequestStatus::TimedOut),
            Self::Cancelled { .. } => Some(RequestStatus::Cancelled),
        }
    }

    #[must_use]
    pub fn display_for_user(&self) -> String {
        render_for_user(self)
    }
}

impl UserFriendlyError for RunError {
    fn user_message(&self) -> String {
        match self {
            Self::Registry(err) => err.user_message(),
            Self::Retry(err) => err.user_message(),
            Self::TimedOut { .. } => "The report took too long and was stopped.".to_string(),
            Self::Cancelled { .. } => "The report request was cancelled.".to_string(),
        }
    }

    fn context(&self) -> Option<String> {
        match self {
            Self::Registry(err) => err.context(),
            Self::Retry(err) => err.context(),
            Self::TimedOut { elapsed, .. } => Some(format!(
                "No result arrived within {:.1}s.",
                elapsed.as_secs_f64()
            )),
            Self::Cancelled { reason, .. } => Some(format!("Reason: {reason}")),
        }
    }

    fn suggestions(&self) -> Vec<String> {
        match self {
            Self::Registry(err) => err.suggestions(),
            Self::Retry(err) => err.suggestions(),
            Self::TimedOut { .. } => vec![
                "Try again with a shorter or simpler request".to_string(),
                "Raise defaults.hard_timeout_secs if long reports are expected".to_string(),
            ],
            Self::Cancelled { .. } => {
                vec!["Start the request again if it was cancelled by mistake".to_string()]
            }
        }
    }
}
