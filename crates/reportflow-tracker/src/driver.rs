//! Per-tracker timer task: warning, hard timeout and progress ticks

use std::sync::atomic::Ordering;
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::time::{MissedTickBehavior, interval_at, sleep_until};
use tracing::{Instrument, debug, warn};

use reportflow_utils::logging::request_span;

use crate::RequestTracker;

impl RequestTracker {
    /// Arm the warning, hard-timeout and tick timers.
    ///
    /// Spawns one task on the current tokio runtime that lives until the
    /// tracker reaches a terminal status. Deadlines are measured from the
    /// tracker's start. Returns `false` if already armed, already terminal,
    /// or called outside a runtime (the tracker then only moves on explicit
    /// calls).
    pub fn arm(&self, tick_interval: Duration) -> bool {
        if self.is_terminal() || self.inner.armed.swap(true, Ordering::AcqRel) {
            return false;
        }
        let Ok(handle) = Handle::try_current() else {
            warn!(request_id = %self.id(), "No tokio runtime; tracker timers not armed");
            self.inner.armed.store(false, Ordering::Release);
            return false;
        };

        let span = request_span(self.id(), self.profile().name());
        handle.spawn(drive(self.clone(), tick_interval).instrument(span));
        true
    }
}

async fn drive(tracker: RequestTracker, tick_interval: Duration) {
    let started = tracker.started();
    let hard_at = started + tracker.hard_timeout();
    let warn_at = started + tracker.warn_threshold();
    let disarm = tracker.inner.disarm.clone();

    let tick_interval = tick_interval.max(Duration::from_millis(1));
    let mut ticker = interval_at(started + tick_interval, tick_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut warned = false;

    loop {
        tokio::select! {
            biased;
            () = disarm.cancelled() => break,
            () = sleep_until(hard_at) => {
                tracker.fire_timeout();
                break;
            }
            () = sleep_until(warn_at), if !warned => {
                warned = true;
                tracker.fire_warning();
            }
            _ = ticker.tick() => {
                tracker.tick();
            }
        }
    }

    debug!(status = %tracker.status(), "Tracker timers disarmed");
}
