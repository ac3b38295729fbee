//! Error classification for orchestrated operations
//!
//! [`classify`] maps a [`RawError`] (HTTP status, network fault code, message
//! text) onto the closed [`ErrorCategory`] taxonomy together with a
//! retryability verdict, a user-facing message and suggested actions.
//!
//! The classifier is a pure function with no shared mutable state; it is safe
//! to call from any number of tasks concurrently.

mod classify;
mod raw;

pub use classify::{
    Classification, MatchedSignal, classify, classify_code, classify_message, classify_status,
};
pub use raw::RawError;

pub use reportflow_utils::error::ErrorCategory;
