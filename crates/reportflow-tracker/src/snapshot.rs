use chrono::{DateTime, Utc};
use serde::Serialize;
use std::time::Duration;

use crate::RequestStatus;

/// Point-in-time view of one tracker, handed to subscribers and callers
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackerSnapshot {
    pub id: String,
    pub profile: String,
    /// Name of the current stage
    pub stage: String,
    pub stage_index: usize,
    pub stage_count: usize,
    /// Progress percentage in `[0, 100]`
    pub progress: f64,
    pub message: String,
    pub status: RequestStatus,
    /// Time since the tracker started; frozen at the terminal transition
    #[serde(serialize_with = "serialize_millis")]
    pub elapsed: Duration,
    pub started_at: DateTime<Utc>,
    /// Set once the warning threshold has passed while running
    pub nearing_timeout: bool,
    /// Latest attempt reported by the retry executor; 0 before the first
    pub attempt: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<String>,
}

impl TrackerSnapshot {
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}

fn serialize_millis<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    serializer.serialize_u64(u64::try_from(duration.as_millis()).unwrap_or(u64::MAX))
}
