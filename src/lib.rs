//! reportflow - request-lifecycle orchestration for slow report-generation calls
//!
//! A report request can take tens of seconds, can fail transiently, and can be
//! abandoned by the user half way. reportflow keeps each such request honest:
//! staged progress that only moves forward, a warning before the deadline, a
//! hard timeout, cooperative cancellation, and classified retries with
//! exponential backoff.
//!
//! The pieces live in separate crates and are re-exported here:
//!
//! - [`classifier`] - maps raw failures (HTTP status, network code, message)
//!   onto a closed [`ErrorCategory`] taxonomy
//! - [`retry`] - [`RetryExecutor`] with backoff, jitter and cancellation
//! - [`tracker`] - [`RequestTracker`] state machine, subscribers and the
//!   [`Registry`] of in-flight requests
//! - [`config`] - stage profiles, deadline and retry defaults, TOML discovery
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use reportflow::{
//!     CancellationToken, Config, FnOperation, RawError, Registry, RetryPolicy, run_operation,
//! };
//!
//! # async fn demo() -> anyhow::Result<()> {
//! let config = Config::discover()?;
//! let registry = Registry::from_config(&config);
//! let policy = RetryPolicy::from_config(&config);
//!
//! let op = FnOperation(|_cancel: CancellationToken| async {
//!     // call the model provider here
//!     Ok::<_, RawError>("# Quarterly report".to_string())
//! });
//! let report = run_operation(&registry, "standard", policy, &op).await?;
//! # let _ = report;
//! # Ok(())
//! # }
//! ```
//!
//! For long requests served over HTTP, [`spawn_operation`] returns the
//! tracker immediately so its id can be handed to the client, and
//! [`RequestTracker::events`] streams progress.
//!
//! # Timeouts and cancellation
//!
//! The hard timeout is authoritative for tracking state: once it fires the
//! tracker reports `timedOut` even if the operation is still running.
//! Cancellation is cooperative. Operations receive the tracker's abort token
//! and should watch it at their own suspension points; the retry executor
//! stops at its next backoff wait.

mod error;
mod operation;
mod run;

pub use error::RunError;
pub use operation::{FnOperation, Operation};
pub use run::{run_operation, run_tracked, spawn_operation};

pub use reportflow_classifier as classifier;
pub use reportflow_config as config;
pub use reportflow_retry as retry;
pub use reportflow_tracker as tracker;
pub use reportflow_utils as utils;

pub use reportflow_classifier::{Classification, ErrorCategory, RawError, classify};
pub use reportflow_config::{Config, ConfigBuilder, Stage, StageProfile, StageProfileTable};
pub use reportflow_retry::{AttemptInfo, RetryError, RetryExecutor, RetryPolicy};
pub use reportflow_tracker::{
    EventFn, Registry, RegistryError, RegistryStats, RequestStatus, RequestTracker,
    SubscriptionId, TrackerEvent, TrackerSettings, TrackerSnapshot, TrackerSubscriber,
};
pub use reportflow_utils::error::{UserFriendlyError, render_for_user};
pub use tokio_util::sync::CancellationToken;
