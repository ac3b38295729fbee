use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use reportflow_classifier::{Classification, RawError, classify};

use crate::{RetryError, RetryPolicy};

/// Reason recorded when the cancellation token fires
pub const CANCELLED_REASON: &str = "cancellation requested";

/// Reported to the attempt callback before each attempt starts
#[derive(Debug, Clone, PartialEq)]
pub struct AttemptInfo {
    /// 1-indexed attempt about to run
    pub attempt: u32,
    pub max_attempts: u32,
    /// Backoff waited before this attempt; zero for the first
    pub delay: Duration,
    /// Classification of the failure that triggered this attempt
    pub previous_error: Option<Classification>,
    /// Time since the first attempt started
    pub elapsed: Duration,
}

impl AttemptInfo {
    #[must_use]
    pub fn is_retry(&self) -> bool {
        self.attempt > 1
    }
}

/// Callback invoked synchronously before each attempt
pub type AttemptCallback = Arc<dyn Fn(&AttemptInfo) + Send + Sync>;

/// Runs an operation under a [`RetryPolicy`], classifying every failure.
///
/// Backoff waits use `tokio::time::sleep`, so only the calling task is
/// suspended. A cancellation token aborts a backoff wait immediately; a
/// running attempt is never interrupted.
#[derive(Clone)]
pub struct RetryExecutor {
    policy: RetryPolicy,
    cancel: Option<CancellationToken>,
    on_attempt: Option<AttemptCallback>,
}

impl std::fmt::Debug for RetryExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetryExecutor")
            .field("policy", &self.policy)
            .field("cancellable", &self.cancel.is_some())
            .field("on_attempt", &self.on_attempt.is_some())
            .finish()
    }
}

impl RetryExecutor {
    #[must_use]
    pub fn new(policy: RetryPolicy) -> Self {
        Self {
            policy,
            cancel: None,
            on_attempt: None,
        }
    }

    /// Abort backoff waits when `token` is cancelled
    #[must_use]
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    /// Invoke `callback` before every attempt, e.g. to show "retrying" progress
    #[must_use]
    pub fn on_attempt<F>(mut self, callback: F) -> Self
    where
        F: Fn(&AttemptInfo) + Send + Sync + 'static,
    {
        self.on_attempt = Some(Arc::new(callback));
        self
    }

    #[must_use]
    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Run `operation` until it succeeds, fails with a non-retryable error,
    /// exhausts the attempt budget or is cancelled.
    ///
    /// # Errors
    ///
    /// Returns [`RetryError::Failed`] with the final failure, or
    /// [`RetryError::Cancelled`] if the token fired before or between attempts.
    pub async fn execute<T, F, Fut>(&self, mut operation: F) -> Result<T, RetryError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, RawError>>,
    {
        let start = Instant::now();
        let max_attempts = self.policy.attempt_limit();
        let mut delay = Duration::ZERO;
        let mut previous_error: Option<Classification> = None;

        for attempt in 1..=max_attempts {
            if self.is_cancelled() {
                return Err(cancelled(attempt - 1, start));
            }

            if let Some(callback) = &self.on_attempt {
                callback(&AttemptInfo {
                    attempt,
                    max_attempts,
                    delay,
                    previous_error: previous_error.take(),
                    elapsed: start.elapsed(),
                });
            }

            debug!(attempt, max_attempts, "Starting attempt");

            let raw = match operation().await {
                Ok(value) => {
                    if attempt > 1 {
                        info!(
                            attempt,
                            elapsed_ms = start.elapsed().as_millis() as u64,
                            "Operation succeeded after retry"
                        );
                    }
                    return Ok(value);
                }
                Err(raw) => raw,
            };

            let classification = classify(&raw);
            if !classification.retryable || attempt == max_attempts {
                debug!(
                    attempt,
                    category = %classification.category,
                    retryable = classification.retryable,
                    error = %raw,
                    "Giving up"
                );
                return Err(RetryError::Failed {
                    classification,
                    source: raw,
                    attempts: attempt,
                    elapsed: start.elapsed(),
                });
            }

            delay = self.policy.delay_for(attempt, &classification);
            warn!(
                attempt,
                max_attempts,
                delay_ms = delay.as_millis() as u64,
                category = %classification.category,
                error = %raw,
                "Attempt failed, will retry"
            );

            if let Some(token) = &self.cancel {
                tokio::select! {
                    biased;
                    () = token.cancelled() => {
                        warn!(attempt, "Cancelled during retry backoff");
                        return Err(cancelled(attempt, start));
                    }
                    () = tokio::time::sleep(delay) => {}
                }
            } else {
                tokio::time::sleep(delay).await;
            }

            previous_error = Some(classification);
        }

        // The loop returns on its last iteration
        Err(cancelled(max_attempts, start))
    }

    fn is_cancelled(&self) -> bool {
        self.cancel.as_ref().is_some_and(CancellationToken::is_cancelled)
    }
}

fn cancelled(attempts: u32, start: Instant) -> RetryError {
    RetryError::Cancelled {
        reason: CANCELLED_REASON.to_string(),
        attempts,
        elapsed: start.elapsed(),
    }
}

/// Run `operation` under `policy` without cancellation or callbacks
///
/// # Errors
///
/// See [`RetryExecutor::execute`].
pub async fn execute<T, F, Fut>(policy: &RetryPolicy, operation: F) -> Result<T, RetryError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, RawError>>,
{
    RetryExecutor::new(policy.clone()).execute(operation).await
}
