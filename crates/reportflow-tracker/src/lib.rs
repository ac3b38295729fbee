//! Request tracking for slow, progress-reporting operations
//!
//! A [`RequestTracker`] owns the lifecycle of one in-flight request: staged
//! progress, a one-shot warning threshold, a hard timeout, cooperative
//! cancellation and a typed subscriber interface. A [`Registry`] owns the
//! concurrent collection of trackers, arms their timers, evicts finished
//! ones after a grace period and aggregates statistics.
//!
//! State machine: `running -> {completed, cancelled, timedOut, failed}`.
//! Every terminal status is final, and calls made after it are silent no-ops.

mod driver;
mod registry;
mod snapshot;
mod status;
mod subscriber;
mod tracker;

pub use registry::{Registry, RegistryStats, TrackerSettings};
pub use snapshot::TrackerSnapshot;
pub use status::RequestStatus;
pub use subscriber::{EventFn, SubscriptionId, TrackerEvent, TrackerSubscriber};
pub use tracker::RequestTracker;

pub use reportflow_utils::error::RegistryError;
