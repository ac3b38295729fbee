//! Retry executor for orchestrated operations
//!
//! [`RetryExecutor`] invokes an operation, classifies each failure with
//! `reportflow_classifier::classify`, and retries transient failures with
//! exponential backoff and jitter. Only the final failure is surfaced, as a
//! [`RetryError`] annotated with the attempt count and elapsed time.
//!
//! ```rust,no_run
//! use reportflow_classifier::RawError;
//! use reportflow_retry::{RetryExecutor, RetryPolicy};
//! use std::time::Duration;
//!
//! # async fn demo() -> Result<(), reportflow_retry::RetryError> {
//! let executor = RetryExecutor::new(RetryPolicy::new(3, Duration::from_secs(1)))
//!     .on_attempt(|info| println!("attempt {} of {}", info.attempt, info.max_attempts));
//! let report = executor
//!     .execute(|| async { Ok::<_, RawError>("generated".to_string()) })
//!     .await?;
//! # let _ = report;
//! # Ok(())
//! # }
//! ```

mod error;
mod executor;
mod policy;

pub use error::RetryError;
pub use executor::{AttemptCallback, AttemptInfo, CANCELLED_REASON, RetryExecutor, execute};
pub use policy::RetryPolicy;
