use serde::Serialize;
use tokio::sync::mpsc;

use crate::TrackerSnapshot;

/// Handle returned by `RequestTracker::subscribe`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(pub(crate) u64);

/// One observable transition of a tracker
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum TrackerEvent {
    Progress(TrackerSnapshot),
    Warning(TrackerSnapshot),
    TimedOut(TrackerSnapshot),
    Cancelled(TrackerSnapshot),
    Completed(TrackerSnapshot),
    Failed(TrackerSnapshot),
}

impl TrackerEvent {
    #[must_use]
    pub fn snapshot(&self) -> &TrackerSnapshot {
        match self {
            Self::Progress(s)
            | Self::Warning(s)
            | Self::TimedOut(s)
            | Self::Cancelled(s)
            | Self::Completed(s)
            | Self::Failed(s) => s,
        }
    }

    /// Stable event name used in logs
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Progress(_) => "progress",
            Self::Warning(_) => "warning",
            Self::TimedOut(_) => "timedOut",
            Self::Cancelled(_) => "cancelled",
            Self::Completed(_) => "completed",
            Self::Failed(_) => "failed",
        }
    }

    #[must_use]
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Progress(_) | Self::Warning(_))
    }
}

/// Typed observer of tracker transitions.
///
/// Every method has a no-op default, so implementors override only the
/// events they care about. Callbacks run outside every tracker and registry
/// lock, so they may call back into the tracker or registry.
///
/// Delivery is ordered per tracker but not always on the caller's thread: if
/// another transition is already delivering events, a new transition only
/// queues its event and returns, and the delivering thread runs the callback
/// later. A transition made from inside a callback is likewise delivered
/// after that callback returns. A panicking subscriber is logged and skipped;
/// the remaining subscribers still run.
pub trait TrackerSubscriber: Send + Sync {
    fn on_progress(&self, _snapshot: &TrackerSnapshot) {}

    /// Warning threshold passed; status is still running
    fn on_warning(&self, _snapshot: &TrackerSnapshot) {}

    fn on_timeout(&self, _snapshot: &TrackerSnapshot) {}

    fn on_cancel(&self, _snapshot: &TrackerSnapshot) {}

    fn on_complete(&self, _snapshot: &TrackerSnapshot) {}

    fn on_failure(&self, _snapshot: &TrackerSnapshot) {}

    /// Entry point used by the tracker; routes to the typed methods above
    fn on_event(&self, event: &TrackerEvent) {
        match event {
            TrackerEvent::Progress(s) => self.on_progress(s),
            TrackerEvent::Warning(s) => self.on_warning(s),
            TrackerEvent::TimedOut(s) => self.on_timeout(s),
            TrackerEvent::Cancelled(s) => self.on_cancel(s),
            TrackerEvent::Completed(s) => self.on_complete(s),
            TrackerEvent::Failed(s) => self.on_failure(s),
        }
    }
}

/// Adapts a closure over [`TrackerEvent`] into a subscriber
pub struct EventFn<F>(pub F);

impl<F> TrackerSubscriber for EventFn<F>
where
    F: Fn(&TrackerEvent) + Send + Sync,
{
    fn on_event(&self, event: &TrackerEvent) {
        (self.0)(event);
    }
}

/// Forwards every event into an unbounded channel
pub(crate) struct ChannelSubscriber {
    sender: mpsc::UnboundedSender<TrackerEvent>,
}

impl ChannelSubscriber {
    pub(crate) fn new() -> (Self, mpsc::UnboundedReceiver<TrackerEvent>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }
}

impl TrackerSubscriber for ChannelSubscriber {
    fn on_event(&self, event: &TrackerEvent) {
        // A dropped receiver just means nobody is listening any more
        let _ = self.sender.send(event.clone());
    }
}
