//! Glue between the retry executor and a request tracker

use serde::Serialize;
use serde_json::Value;
use std::future::Future;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, warn};

use reportflow_classifier::RawError;
use reportflow_retry::{RetryError, RetryExecutor, RetryPolicy};
use reportflow_tracker::{Registry, RegistryError, RequestTracker};
use reportflow_utils::error::UserFriendlyError;
use reportflow_utils::logging::request_span;

use crate::{Operation, RunError};

/// Run `operation` under `policy`, reporting into `tracker`.
///
/// Every attempt receives the tracker's abort token. Retries show up as
/// "retrying" messages on the tracker, and the final outcome moves it to
/// `completed`, `failed` or `cancelled`. If the tracker was cancelled or
/// timed out in the meantime, that status wins and the operation's result
/// is discarded.
///
/// # Errors
///
/// - `Retry` when the operation failed for good
/// - `Cancelled` / `TimedOut` when the tracker finished that way first
pub async fn run_tracked<T, F, Fut>(
    tracker: &RequestTracker,
    policy: RetryPolicy,
    mut operation: F,
) -> Result<T, RunError>
where
    T: Serialize,
    F: FnMut(CancellationToken) -> Fut,
    Fut: Future<Output = Result<T, RawError>>,
{
    let abort = tracker.cancellation_token();
    let reporter = tracker.clone();
    let executor = RetryExecutor::new(policy)
        .with_cancellation(abort.clone())
        .on_attempt(move |info| {
            reporter.note_attempt(info);
        });

    let outcome = executor.execute(|| operation(abort.clone())).await;
    settle(tracker, outcome)
}

fn settle<T: Serialize>(
    tracker: &RequestTracker,
    outcome: Result<T, RetryError>,
) -> Result<T, RunError> {
    match &outcome {
        Ok(value) => {
            let result = serde_json::to_value(value).unwrap_or_else(|err| {
                warn!(request_id = %tracker.id(), error = %err, "Result is not valid JSON; recording null");
                Value::Null
            });
            tracker.complete(result);
        }
        Err(err @ RetryError::Failed { .. }) => {
            tracker.fail(err.user_message());
        }
        Err(RetryError::Cancelled { reason, .. }) => {
            tracker.cancel(reason.clone());
        }
    }

    match RunError::from_snapshot(&tracker.snapshot()) {
        Some(err) => {
            if outcome.is_ok() {
                debug!(request_id = %tracker.id(), "Discarding result of a request that already finished");
            }
            Err(err)
        }
        None => outcome.map_err(RunError::from),
    }
}

/// Start a request with the registry defaults and run `operation` to the end.
///
/// # Errors
///
/// `Registry` if the request could not be started, otherwise as
/// [`run_tracked`].
pub async fn run_operation<O>(
    registry: &Registry,
    profile: &str,
    policy: RetryPolicy,
    operation: &O,
) -> Result<O::Output, RunError>
where
    O: Operation + ?Sized,
    O::Output: Serialize,
{
    let tracker = registry.start_with_defaults(profile)?;
    let span = request_span(tracker.id(), profile);
    run_tracked(&tracker, policy, move |cancel| operation.invoke(cancel))
        .instrument(span)
        .await
}

/// Start a request and run `operation` on a background task.
///
/// The tracker is returned right away so callers can hand its id to a client
/// and stream progress while the task runs.
///
/// # Errors
///
/// Returns the registry error if the request could not be started; nothing
/// is spawned in that case.
pub fn spawn_operation<O>(
    registry: &Registry,
    profile: &str,
    policy: RetryPolicy,
    operation: Arc<O>,
) -> Result<(RequestTracker, JoinHandle<Result<O::Output, RunError>>), RegistryError>
where
    O: Operation + ?Sized + 'static,
    O::Output: Serialize + 'static,
{
    let tracker = registry.start_with_defaults(profile)?;
    let span = request_span(tracker.id(), profile);
    let driven = tracker.clone();
    let handle = tokio::spawn(
        async move {
            run_tracked(&driven, policy, move |cancel| {
                let operation = Arc::clone(&operation);
                async move { operation.invoke(cancel).await }
            })
            .await
        }
        .instrument(span),
    );
    Ok((tracker, handle))
}
