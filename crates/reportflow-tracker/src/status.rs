use serde::{Deserialize, Serialize};
use std::fmt;
use strum::EnumIter;

/// Lifecycle status of a tracked request.
///
/// `Running` is the only non-terminal status; no transition leaves a terminal one.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, EnumIter,
)]
#[serde(rename_all = "camelCase")]
pub enum RequestStatus {
    Running,
    Completed,
    Cancelled,
    TimedOut,
    Failed,
}

impl RequestStatus {
    #[must_use]
    pub fn is_terminal(self) -> bool {
        self != Self::Running
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
            Self::TimedOut => "timedOut",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for RequestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
