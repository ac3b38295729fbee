use async_trait::async_trait;
use std::future::Future;
use tokio_util::sync::CancellationToken;

use reportflow_classifier::RawError;

/// A slow call whose lifecycle the orchestrator manages.
///
/// Implementations know nothing about trackers or retries. They produce a
/// value or a [`RawError`], and may watch `cancel` at their own suspension
/// points; it fires when the request is cancelled or times out.
#[async_trait]
pub trait Operation: Send + Sync {
    type Output: Send;

    /// Run one attempt.
    ///
    /// # Errors
    ///
    /// Returns the raw failure; classification and retry decisions are made
    /// by the caller.
    async fn invoke(&self, cancel: CancellationToken) -> Result<Self::Output, RawError>;
}

/// Adapts a closure to [`Operation`].
///
/// ```rust,no_run
/// use reportflow::{CancellationToken, FnOperation, RawError};
///
/// let op = FnOperation(|_cancel: CancellationToken| async {
///     Ok::<_, RawError>("done".to_string())
/// });
/// # let _ = op;
/// ```
#[derive(Debug, Clone)]
pub struct FnOperation<F>(pub F);

#[async_trait]
impl<F, Fut, T> Operation for FnOperation<F>
where
    F: Fn(CancellationToken) -> Fut + Send + Sync,
    Fut: Future<Output = Result<T, RawError>> + Send,
    T: Send,
{
    type Output = T;

    async fn invoke(&self, cancel: CancellationToken) -> Result<T, RawError> {
        (self.0)(cancel).await
    }
}
