use std::collections::VecDeque;
use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde_json::Value;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use reportflow_config::{Stage, StageProfile};
use reportflow_retry::AttemptInfo;
use reportflow_utils::error::RegistryError;
use reportflow_utils::logging::{log_request_finished, log_subscriber_panic};

use crate::subscriber::ChannelSubscriber;
use crate::{
    EventFn, RequestStatus, SubscriptionId, TrackerEvent, TrackerSnapshot, TrackerSubscriber,
};

/// Lock a mutex, recovering the data if a previous holder panicked
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Debug, Clone, Copy)]
enum EventKind {
    Progress,
    Warning,
    TimedOut,
    Cancelled,
    Completed,
    Failed,
}

impl EventKind {
    fn wrap(self, snapshot: TrackerSnapshot) -> TrackerEvent {
        match self {
            Self::Progress => TrackerEvent::Progress(snapshot),
            Self::Warning => TrackerEvent::Warning(snapshot),
            Self::TimedOut => TrackerEvent::TimedOut(snapshot),
            Self::Cancelled => TrackerEvent::Cancelled(snapshot),
            Self::Completed => TrackerEvent::Completed(snapshot),
            Self::Failed => TrackerEvent::Failed(snapshot),
        }
    }

    fn terminal(status: RequestStatus) -> Self {
        match status {
            RequestStatus::Running | RequestStatus::Completed => Self::Completed,
            RequestStatus::Cancelled => Self::Cancelled,
            RequestStatus::TimedOut => Self::TimedOut,
            RequestStatus::Failed => Self::Failed,
        }
    }
}

struct TrackerState {
    status: RequestStatus,
    stage_index: usize,
    progress: f64,
    message: String,
    nearing_timeout: bool,
    attempt: u32,
    result: Option<Value>,
    failure_reason: Option<String>,
    finished: Option<Instant>,
    subscribers: Vec<(SubscriptionId, Arc<dyn TrackerSubscriber>)>,
}

/// Events waiting for delivery, in transition order.
///
/// Events are queued while the state lock is held and delivered after it is
/// released. Whichever caller finds the queue idle drains it; re-entrant or
/// concurrent transitions only enqueue, so per-tracker order is preserved.
#[derive(Default)]
struct DispatchQueue {
    pending: VecDeque<(Vec<Arc<dyn TrackerSubscriber>>, TrackerEvent)>,
    draining: bool,
}

pub(crate) struct TrackerInner {
    id: String,
    profile: Arc<StageProfile>,
    hard_timeout: Duration,
    warn_threshold: Duration,
    started: Instant,
    started_at: DateTime<Utc>,
    state: Mutex<TrackerState>,
    dispatch: Mutex<DispatchQueue>,
    abort: CancellationToken,
    pub(crate) disarm: CancellationToken,
    pub(crate) armed: AtomicBool,
    next_subscription: AtomicU64,
}

/// Mutable lifecycle record for one in-flight request.
///
/// Cloning is cheap and every clone refers to the same tracker. Mutating
/// operations never fail: on a terminal tracker they are silent no-ops and
/// return `false`. Exactly one terminal transition ever succeeds.
#[derive(Clone)]
pub struct RequestTracker {
    pub(crate) inner: Arc<TrackerInner>,
}

impl fmt::Debug for RequestTracker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestTracker")
            .field("id", &self.inner.id)
            .field("profile", &self.inner.profile.name())
            .field("status", &self.status())
            .finish_non_exhaustive()
    }
}

impl RequestTracker {
    /// Create a running tracker at the first stage of `profile`.
    ///
    /// Timers are not armed; call [`arm`](Self::arm) or let the registry do it.
    ///
    /// # Errors
    ///
    /// Returns `RegistryError::InvalidDeadlines` unless `warn_threshold < hard_timeout`.
    pub fn new(
        id: impl Into<String>,
        profile: Arc<StageProfile>,
        hard_timeout: Duration,
        warn_threshold: Duration,
    ) -> Result<Self, RegistryError> {
        if warn_threshold >= hard_timeout {
            return Err(RegistryError::InvalidDeadlines {
                warn: warn_threshold,
                hard: hard_timeout,
            });
        }

        let (message, progress) = profile
            .stage(0)
            .map(|s| (s.message.clone(), f64::from(s.percent)))
            .unwrap_or_default();

        Ok(Self {
            inner: Arc::new(TrackerInner {
                id: id.into(),
                profile,
                hard_timeout,
                warn_threshold,
                started: Instant::now(),
                started_at: Utc::now(),
                state: Mutex::new(TrackerState {
                    status: RequestStatus::Running,
                    stage_index: 0,
                    progress,
                    message,
                    nearing_timeout: false,
                    attempt: 0,
                    result: None,
                    failure_reason: None,
                    finished: None,
                    subscribers: Vec::new(),
                }),
                dispatch: Mutex::new(DispatchQueue::default()),
                abort: CancellationToken::new(),
                disarm: CancellationToken::new(),
                armed: AtomicBool::new(false),
                next_subscription: AtomicU64::new(1),
            }),
        })
    }

    #[must_use]
    pub fn id(&self) -> &str {
        &self.inner.id
    }

    #[must_use]
    pub fn profile(&self) -> &Arc<StageProfile> {
        &self.inner.profile
    }

    #[must_use]
    pub fn hard_timeout(&self) -> Duration {
        self.inner.hard_timeout
    }

    #[must_use]
    pub fn warn_threshold(&self) -> Duration {
        self.inner.warn_threshold
    }

    #[must_use]
    pub fn started_at(&self) -> DateTime<Utc> {
        self.inner.started_at
    }

    pub(crate) fn started(&self) -> Instant {
        self.inner.started
    }

    #[must_use]
    pub fn status(&self) -> RequestStatus {
        lock(&self.inner.state).status
    }

    #[must_use]
    pub fn is_terminal(&self) -> bool {
        self.status().is_terminal()
    }

    #[must_use]
    pub fn progress(&self) -> f64 {
        lock(&self.inner.state).progress
    }

    #[must_use]
    pub fn snapshot(&self) -> TrackerSnapshot {
        let state = lock(&self.inner.state);
        self.snapshot_locked(&state)
    }

    /// Abort signal for the orchestrated operation.
    ///
    /// Fires on [`cancel`](Self::cancel) and on hard timeout. Operations may
    /// observe it at their own suspension points; the retry executor aborts
    /// its backoff wait when it fires.
    #[must_use]
    pub fn cancellation_token(&self) -> CancellationToken {
        self.inner.abort.clone()
    }

    /// Wait until the tracker reaches a terminal status
    pub async fn finished(&self) -> TrackerSnapshot {
        self.inner.disarm.cancelled().await;
        self.snapshot()
    }

    /// Register a subscriber. On a terminal tracker nothing is registered.
    pub fn subscribe(&self, subscriber: Arc<dyn TrackerSubscriber>) -> SubscriptionId {
        let id = SubscriptionId(self.inner.next_subscription.fetch_add(1, Ordering::Relaxed));
        let mut state = lock(&self.inner.state);
        if !state.status.is_terminal() {
            state.subscribers.push((id, subscriber));
        }
        id
    }

    /// Register a closure receiving every event
    pub fn subscribe_fn<F>(&self, f: F) -> SubscriptionId
    where
        F: Fn(&TrackerEvent) + Send + Sync + 'static,
    {
        self.subscribe(Arc::new(EventFn(f)))
    }

    /// Remove a subscriber; returns whether it was registered
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut state = lock(&self.inner.state);
        let before = state.subscribers.len();
        state.subscribers.retain(|(sid, _)| *sid != id);
        state.subscribers.len() != before
    }

    /// Stream of events for async consumers.
    ///
    /// The stream ends after the terminal event. On a tracker that is
    /// already terminal it ends immediately.
    #[must_use]
    pub fn events(&self) -> mpsc::UnboundedReceiver<TrackerEvent> {
        let (subscriber, receiver) = ChannelSubscriber::new();
        self.subscribe(Arc::new(subscriber));
        receiver
    }

    /// Move forward to the named stage with its declared message.
    ///
    /// No-op if terminal, if the stage is unknown, or if it is not after the
    /// current stage.
    pub fn advance_to_stage(&self, name: &str) -> bool {
        self.advance(name, None)
    }

    /// Like [`advance_to_stage`](Self::advance_to_stage) with a custom message
    pub fn advance_to_stage_with_message(&self, name: &str, message: impl Into<String>) -> bool {
        self.advance(name, Some(message.into()))
    }

    fn advance(&self, name: &str, message: Option<String>) -> bool {
        let Some(index) = self.inner.profile.index_of(name) else {
            debug!(request_id = %self.inner.id, stage = %name, "Ignoring unknown stage");
            return false;
        };
        self.update(|inner, state| {
            if index <= state.stage_index {
                return None;
            }
            let stage = inner.profile.stage(index)?;
            state.stage_index = index;
            state.progress = state.progress.max(f64::from(stage.percent));
            state.message = message.unwrap_or_else(|| stage.message.clone());
            debug!(
                request_id = %inner.id,
                stage = %stage.name,
                progress = state.progress,
                "Advanced to stage"
            );
            Some(EventKind::Progress)
        })
    }

    /// Replace the current message without moving the stage
    pub fn update_message(&self, message: impl Into<String>) -> bool {
        let message = message.into();
        self.update(|_, state| {
            if state.message == message {
                return None;
            }
            state.message = message;
            Some(EventKind::Progress)
        })
    }

    /// Interpolate progress from elapsed time.
    ///
    /// Auto-advances one stage per `hard_timeout / stage_count` of elapsed
    /// time but never into the final stage. Interpolated progress stays below
    /// the next stage's declared percent and never decreases. Fires progress
    /// subscribers only when something changed.
    #[allow(clippy::cast_precision_loss)]
    pub fn tick(&self) -> bool {
        let elapsed = self.inner.started.elapsed().as_secs_f64();
        self.update(|inner, state| {
            let stages = inner.profile.stages();
            let count = stages.len();
            let hard = inner.hard_timeout.as_secs_f64();
            let before = (state.stage_index, state.progress);

            while state.stage_index + 2 < count
                && elapsed >= (state.stage_index + 1) as f64 / count as f64 * hard
            {
                state.stage_index += 1;
                let stage = &stages[state.stage_index];
                state.message = stage.message.clone();
                state.progress = state.progress.max(f64::from(stage.percent));
            }

            if let Some(target) = interpolated_progress(stages, state.stage_index, elapsed, hard) {
                state.progress = state.progress.max(target);
            }

            ((state.stage_index, state.progress) != before).then_some(EventKind::Progress)
        })
    }

    /// Mark the request as nearing its deadline. Fires at most once.
    pub fn fire_warning(&self) -> bool {
        self.update(|inner, state| {
            if state.nearing_timeout {
                return None;
            }
            state.nearing_timeout = true;
            warn!(
                request_id = %inner.id,
                warn_threshold_ms = inner.warn_threshold.as_millis() as u64,
                progress = state.progress,
                "Request is taking long"
            );
            Some(EventKind::Warning)
        })
    }

    /// Transition to `timedOut`. Progress keeps its last value.
    pub fn fire_timeout(&self) -> bool {
        let reason = format!(
            "hard timeout of {}s exceeded",
            self.inner.hard_timeout.as_secs_f64()
        );
        self.finish(RequestStatus::TimedOut, |state| {
            state.failure_reason = Some(reason);
        })
    }

    /// Transition to `cancelled`, recording `reason`
    pub fn cancel(&self, reason: impl Into<String>) -> bool {
        let reason = reason.into();
        self.finish(RequestStatus::Cancelled, |state| {
            state.failure_reason = Some(reason);
        })
    }

    /// Transition to `completed` at 100% with `result`
    pub fn complete(&self, result: Value) -> bool {
        let last = self.inner.profile.len().saturating_sub(1);
        let message = self.inner.profile.stage(last).map(|s| s.message.clone());
        self.finish(RequestStatus::Completed, |state| {
            state.progress = 100.0;
            state.stage_index = state.stage_index.max(last);
            if let Some(message) = message {
                state.message = message;
            }
            state.result = Some(result);
        })
    }

    /// Transition to `failed` after an unrecoverable error
    pub fn fail(&self, reason: impl Into<String>) -> bool {
        let reason = reason.into();
        self.finish(RequestStatus::Failed, |state| {
            state.failure_reason = Some(reason);
        })
    }

    /// Reflect a retry attempt in the tracker.
    ///
    /// Retries replace the message with "retrying" text and notify progress
    /// subscribers; a first attempt is recorded silently.
    pub fn note_attempt(&self, info: &AttemptInfo) -> bool {
        self.update(|_, state| {
            state.attempt = info.attempt;
            if !info.is_retry() {
                return None;
            }
            state.message = format!(
                "Retrying after a temporary problem (attempt {} of {})",
                info.attempt, info.max_attempts
            );
            Some(EventKind::Progress)
        })
    }

    fn update<F>(&self, f: F) -> bool
    where
        F: FnOnce(&TrackerInner, &mut TrackerState) -> Option<EventKind>,
    {
        {
            let mut state = lock(&self.inner.state);
            if state.status.is_terminal() {
                return false;
            }
            let Some(kind) = f(&self.inner, &mut state) else {
                return false;
            };
            self.enqueue(&state, kind);
        }
        self.publish();
        true
    }

    fn finish<F>(&self, status: RequestStatus, f: F) -> bool
    where
        F: FnOnce(&mut TrackerState),
    {
        let elapsed = {
            let mut state = lock(&self.inner.state);
            if state.status.is_terminal() {
                return false;
            }
            let now = Instant::now();
            state.status = status;
            state.finished = Some(now);
            f(&mut state);
            self.enqueue(&state, EventKind::terminal(status));
            state.subscribers.clear();
            now.duration_since(self.inner.started)
        };

        self.inner.disarm.cancel();
        if matches!(status, RequestStatus::Cancelled | RequestStatus::TimedOut) {
            self.inner.abort.cancel();
        }
        log_request_finished(&self.inner.id, status.as_str(), elapsed);
        self.publish();
        true
    }

    fn snapshot_locked(&self, state: &TrackerState) -> TrackerSnapshot {
        let profile = &self.inner.profile;
        let elapsed = state
            .finished
            .unwrap_or_else(Instant::now)
            .duration_since(self.inner.started);
        TrackerSnapshot {
            id: self.inner.id.clone(),
            profile: profile.name().to_string(),
            stage: profile
                .stage(state.stage_index)
                .map(|s| s.name.clone())
                .unwrap_or_default(),
            stage_index: state.stage_index,
            stage_count: profile.len(),
            progress: state.progress,
            message: state.message.clone(),
            status: state.status,
            elapsed,
            started_at: self.inner.started_at,
            nearing_timeout: state.nearing_timeout,
            attempt: state.attempt,
            result: state.result.clone(),
            failure_reason: state.failure_reason.clone(),
        }
    }

    /// Queue an event for the current subscribers. Caller holds the state lock.
    fn enqueue(&self, state: &TrackerState, kind: EventKind) {
        if state.subscribers.is_empty() {
            return;
        }
        let targets = state.subscribers.iter().map(|(_, s)| Arc::clone(s)).collect();
        let event = kind.wrap(self.snapshot_locked(state));
        lock(&self.inner.dispatch).pending.push_back((targets, event));
    }

    /// Deliver queued events unless another caller is already delivering
    fn publish(&self) {
        {
            let mut queue = lock(&self.inner.dispatch);
            if queue.draining || queue.pending.is_empty() {
                return;
            }
            queue.draining = true;
        }

        loop {
            let (targets, event) = {
                let mut queue = lock(&self.inner.dispatch);
                match queue.pending.pop_front() {
                    Some(next) => next,
                    None => {
                        queue.draining = false;
                        return;
                    }
                }
            };

            for subscriber in targets {
                if catch_unwind(AssertUnwindSafe(|| subscriber.on_event(&event))).is_err() {
                    log_subscriber_panic(&self.inner.id, event.kind());
                }
            }
        }
    }
}

/// Progress within the current stage's time window, capped one point below
/// the next stage's percent. `None` at the final stage.
#[allow(clippy::cast_precision_loss)]
fn interpolated_progress(stages: &[Stage], index: usize, elapsed: f64, hard: f64) -> Option<f64> {
    let current = f64::from(stages.get(index)?.percent);
    let next = f64::from(stages.get(index + 1)?.percent);
    let count = stages.len() as f64;

    let window = hard / count;
    let window_start = index as f64 * window;
    let fraction = if window > 0.0 {
        ((elapsed - window_start) / window).clamp(0.0, 1.0)
    } else {
        0.0
    };

    let ceiling = (next - 1.0).max(current);
    let value = (current + (next - current) * fraction).min(ceiling);
    Some((value * 10.0).floor() / 10.0)
}
