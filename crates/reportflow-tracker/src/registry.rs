use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

use tokio::runtime::Handle;
use tracing::debug;

use reportflow_config::{Config, StageProfileTable};
use reportflow_utils::error::RegistryError;
use reportflow_utils::logging::log_request_start;
use reportflow_utils::request_id::generate_request_id;

use crate::tracker::{TrackerInner, lock};
use crate::{RequestStatus, RequestTracker, TrackerEvent, TrackerSubscriber};

/// Deadlines and timer cadence applied by a [`Registry`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrackerSettings {
    pub hard_timeout: Duration,
    pub warn_threshold: Duration,
    pub tick_interval: Duration,
    /// How long a finished tracker stays retrievable before eviction
    pub grace_period: Duration,
}

impl TrackerSettings {
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        Self {
            hard_timeout: config.hard_timeout(),
            warn_threshold: config.warn_threshold(),
            tick_interval: config.tick_interval(),
            grace_period: config.grace_period(),
        }
    }
}

impl Default for TrackerSettings {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

/// Cross-request statistics snapshot
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistryStats {
    /// Trackers still running
    pub active_count: usize,
    /// Every retained tracker, including finished ones inside their grace period
    pub tracked_count: usize,
    /// Running trackers per profile
    pub counts_by_profile: BTreeMap<String, usize>,
    /// Retained trackers per status
    pub counts_by_status: BTreeMap<RequestStatus, usize>,
    /// Terminal transitions since the registry was created
    pub totals_by_status: BTreeMap<RequestStatus, u64>,
}

#[derive(Default)]
struct RegistryState {
    entries: HashMap<String, RequestTracker>,
    totals: BTreeMap<RequestStatus, u64>,
}

struct RegistryInner {
    profiles: StageProfileTable,
    settings: TrackerSettings,
    state: Mutex<RegistryState>,
}

impl RegistryInner {
    /// Remove `id` only if it still maps to the given tracker
    fn evict(&self, id: &str, tracker: &Weak<TrackerInner>) {
        let mut state = lock(&self.state);
        let same = state
            .entries
            .get(id)
            .is_some_and(|t| std::ptr::eq(Arc::as_ptr(&t.inner), tracker.as_ptr()));
        if same {
            state.entries.remove(id);
            debug!(request_id = %id, "Evicted finished tracker");
        }
    }
}

/// Concurrent collection of request trackers.
///
/// Cloning is cheap; clones share the same collection. All mutations go
/// through one mutex scoped to the collection, and subscriber callbacks never
/// run while it is held. Finished trackers stay retrievable for the grace
/// period, then are evicted.
#[derive(Clone)]
pub struct Registry {
    inner: Arc<RegistryInner>,
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry")
            .field("settings", &self.inner.settings)
            .field("tracked", &self.len())
            .finish_non_exhaustive()
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new(StageProfileTable::builtin(), TrackerSettings::default())
    }
}

impl Registry {
    #[must_use]
    pub fn new(profiles: StageProfileTable, settings: TrackerSettings) -> Self {
        Self {
            inner: Arc::new(RegistryInner {
                profiles,
                settings,
                state: Mutex::new(RegistryState::default()),
            }),
        }
    }

    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        Self::new(config.profiles.clone(), TrackerSettings::from_config(config))
    }

    #[must_use]
    pub fn settings(&self) -> &TrackerSettings {
        &self.inner.settings
    }

    #[must_use]
    pub fn profiles(&self) -> &StageProfileTable {
        &self.inner.profiles
    }

    /// Start tracking a request and arm its timers.
    ///
    /// A finished tracker still inside its grace period is replaced; a
    /// running one is not.
    ///
    /// # Errors
    ///
    /// - `InvalidDeadlines` unless `warn_threshold < hard_timeout`
    /// - `ProfileNotFound` if `profile` is not in the stage profile table
    /// - `DuplicateRequest` if `id` is already running
    pub fn start(
        &self,
        id: impl Into<String>,
        profile: &str,
        hard_timeout: Duration,
        warn_threshold: Duration,
    ) -> Result<RequestTracker, RegistryError> {
        let id = id.into();
        let stages = self
            .inner
            .profiles
            .get(profile)
            .ok_or_else(|| RegistryError::ProfileNotFound {
                profile: profile.to_string(),
            })?;
        let tracker = RequestTracker::new(id.clone(), stages, hard_timeout, warn_threshold)?;
        tracker.subscribe(Arc::new(Reaper {
            registry: Arc::downgrade(&self.inner),
            tracker: Arc::downgrade(&tracker.inner),
            grace_period: self.inner.settings.grace_period,
        }));

        {
            let mut state = lock(&self.inner.state);
            if state.entries.get(&id).is_some_and(|t| !t.is_terminal()) {
                return Err(RegistryError::DuplicateRequest { id });
            }
            state.entries.insert(id.clone(), tracker.clone());
        }

        log_request_start(&id, profile, hard_timeout);
        tracker.arm(self.inner.settings.tick_interval);
        Ok(tracker)
    }

    /// Start a request with a generated id and the configured deadlines
    ///
    /// # Errors
    ///
    /// Returns `ProfileNotFound` if `profile` is not configured.
    pub fn start_with_defaults(&self, profile: &str) -> Result<RequestTracker, RegistryError> {
        let settings = self.inner.settings;
        self.start(
            generate_request_id(),
            profile,
            settings.hard_timeout,
            settings.warn_threshold,
        )
    }

    #[must_use]
    pub fn get(&self, id: &str) -> Option<RequestTracker> {
        lock(&self.inner.state).entries.get(id).cloned()
    }

    /// Cancel one request; returns whether this call cancelled it
    pub fn cancel(&self, id: &str, reason: &str) -> bool {
        // Look up under the lock, cancel outside it
        self.get(id).is_some_and(|tracker| tracker.cancel(reason))
    }

    /// Cancel every running request, e.g. at shutdown. Returns how many were cancelled.
    pub fn cancel_all(&self, reason: &str) -> usize {
        let trackers: Vec<RequestTracker> =
            lock(&self.inner.state).entries.values().cloned().collect();
        let cancelled = trackers.iter().filter(|t| t.cancel(reason)).count();
        debug!(cancelled, reason = %reason, "Cancelled all running requests");
        cancelled
    }

    /// Ids of running requests, sorted
    #[must_use]
    pub fn active_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self
            .retained()
            .into_iter()
            .filter(|t| !t.is_terminal())
            .map(|t| t.id().to_string())
            .collect();
        ids.sort();
        ids
    }

    /// Retained trackers, running or inside their grace period
    #[must_use]
    pub fn len(&self) -> usize {
        lock(&self.inner.state).entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[must_use]
    pub fn stats(&self) -> RegistryStats {
        let (trackers, totals) = {
            let state = lock(&self.inner.state);
            (
                state.entries.values().cloned().collect::<Vec<_>>(),
                state.totals.clone(),
            )
        };

        let mut stats = RegistryStats {
            tracked_count: trackers.len(),
            totals_by_status: totals,
            ..RegistryStats::default()
        };
        for tracker in &trackers {
            let status = tracker.status();
            *stats.counts_by_status.entry(status).or_default() += 1;
            if !status.is_terminal() {
                stats.active_count += 1;
                *stats
                    .counts_by_profile
                    .entry(tracker.profile().name().to_string())
                    .or_default() += 1;
            }
        }
        stats
    }

    fn retained(&self) -> Vec<RequestTracker> {
        lock(&self.inner.state).entries.values().cloned().collect()
    }
}

/// Registry-side subscriber: counts terminal transitions and schedules eviction
struct Reaper {
    registry: Weak<RegistryInner>,
    tracker: Weak<TrackerInner>,
    grace_period: Duration,
}

impl TrackerSubscriber for Reaper {
    fn on_event(&self, event: &TrackerEvent) {
        if !event.is_terminal() {
            return;
        }
        let Some(registry) = self.registry.upgrade() else {
            return;
        };
        let snapshot = event.snapshot();
        *lock(&registry.state)
            .totals
            .entry(snapshot.status)
            .or_default() += 1;

        let id = snapshot.id.clone();
        let tracker = self.tracker.clone();
        match Handle::try_current() {
            Ok(handle) if !self.grace_period.is_zero() => {
                let registry = Arc::downgrade(&registry);
                let grace = self.grace_period;
                handle.spawn(async move {
                    tokio::time::sleep(grace).await;
                    if let Some(registry) = registry.upgrade() {
                        registry.evict(&id, &tracker);
                    }
                });
            }
            _ => registry.evict(&id, &tracker),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reportflow_config::{Stage, StageProfile};
    use serde_json::Value;

    fn registry(grace_secs: u64) -> Registry {
        let scenario = StageProfile::new(
            "scenario",
            vec![
                Stage::new("init", "Starting", 0),
                Stage::new("process", "Processing", 50),
                Stage::new("done", "Done", 100),
            ],
        )
        .unwrap();
        Registry::new(
            StageProfileTable::builtin().merged_with([scenario]),
            TrackerSettings {
                hard_timeout: Duration::from_secs(60),
                warn_threshold: Duration::from_secs(45),
                tick_interval: Duration::from_secs(1),
                grace_period: Duration::from_secs(grace_secs),
            },
        )
    }

    fn secs(s: u64) -> Duration {
        Duration::from_secs(s)
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_and_get() {
        let reg = registry(30);
        let t = reg.start("a", "scenario", secs(5), secs(3)).unwrap();
        assert_eq!(t.id(), "a");
        assert_eq!(reg.get("a").unwrap().id(), "a");
        assert!(reg.get("b").is_none());
        assert_eq!(reg.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_duplicate_running_id_rejected() {
        let reg = registry(30);
        reg.start("a", "scenario", secs(5), secs(3)).unwrap();
        let err = reg.start("a", "standard", secs(5), secs(3)).unwrap_err();
        assert_eq!(err, RegistryError::DuplicateRequest { id: "a".to_string() });
    }

    #[tokio::test(start_paused = true)]
    async fn test_finished_id_can_be_reused_during_grace() {
        let reg = registry(30);
        let first = reg.start("a", "scenario", secs(5), secs(3)).unwrap();
        first.complete(Value::Null);
        let second = reg.start("a", "scenario", secs(5), secs(3)).unwrap();

        // The first tracker's eviction must not remove the replacement
        tokio::time::sleep(secs(31)).await;
        let retained = reg.get("a").unwrap();
        assert!(Arc::ptr_eq(&retained.inner, &second.inner));
    }

    #[tokio::test(start_paused = true)]
    async fn test_unknown_profile_rejected() {
        let reg = registry(30);
        let err = reg.start("a", "quarterly", secs(5), secs(3)).unwrap_err();
        assert_eq!(
            err,
            RegistryError::ProfileNotFound {
                profile: "quarterly".to_string()
            }
        );
        assert!(reg.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_invalid_deadlines_rejected() {
        let reg = registry(30);
        let err = reg.start("a", "scenario", secs(3), secs(5)).unwrap_err();
        assert!(matches!(err, RegistryError::InvalidDeadlines { .. }));
        assert!(reg.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_terminal_tracker_evicted_after_grace() {
        let reg = registry(10);
        let t = reg.start("a", "scenario", secs(60), secs(45)).unwrap();
        t.complete(serde_json::json!("report body"));

        tokio::time::sleep(secs(5)).await;
        let retained = reg.get("a").unwrap();
        assert_eq!(retained.snapshot().result, Some(serde_json::json!("report body")));

        tokio::time::sleep(secs(6)).await;
        assert!(reg.get("a").is_none());
        assert!(reg.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_grace_evicts_immediately() {
        let reg = registry(0);
        let t = reg.start("a", "scenario", secs(60), secs(45)).unwrap();
        t.fail("provider rejected the request");
        assert!(reg.get("a").is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_timed_out_tracker_is_evicted() {
        let reg = registry(2);
        reg.start("a", "scenario", secs(5), secs(3)).unwrap();
        tokio::time::sleep(Duration::from_millis(5_100)).await;
        assert_eq!(reg.get("a").unwrap().status(), RequestStatus::TimedOut);
        tokio::time::sleep(secs(3)).await;
        assert!(reg.get("a").is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_by_id() {
        let reg = registry(30);
        let t = reg.start("a", "scenario", secs(5), secs(3)).unwrap();
        assert!(reg.cancel("a", "user request"));
        assert!(!reg.cancel("a", "again"));
        assert!(!reg.cancel("missing", "nothing"));
        assert_eq!(t.status(), RequestStatus::Cancelled);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_all() {
        let reg = registry(30);
        let a = reg.start("a", "scenario", secs(60), secs(45)).unwrap();
        let b = reg.start("b", "standard", secs(60), secs(45)).unwrap();
        let c = reg.start("c", "summary", secs(60), secs(45)).unwrap();
        c.complete(Value::Null);

        assert_eq!(reg.cancel_all("shutdown"), 2);
        assert_eq!(a.status(), RequestStatus::Cancelled);
        assert_eq!(b.snapshot().failure_reason.as_deref(), Some("shutdown"));
        assert_eq!(c.status(), RequestStatus::Completed);
        assert!(reg.active_ids().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_stats() {
        let reg = registry(30);
        reg.start("a", "scenario", secs(60), secs(45)).unwrap();
        reg.start("b", "scenario", secs(60), secs(45)).unwrap();
        let c = reg.start("c", "summary", secs(60), secs(45)).unwrap();
        let d = reg.start("d", "standard", secs(60), secs(45)).unwrap();
        c.complete(Value::Null);
        d.cancel("user request");

        let stats = reg.stats();
        assert_eq!(stats.active_count, 2);
        assert_eq!(stats.tracked_count, 4);
        assert_eq!(stats.counts_by_profile.get("scenario"), Some(&2));
        assert_eq!(stats.counts_by_profile.get("summary"), None);
        assert_eq!(stats.counts_by_status.get(&RequestStatus::Running), Some(&2));
        assert_eq!(stats.counts_by_status.get(&RequestStatus::Completed), Some(&1));
        assert_eq!(stats.totals_by_status.get(&RequestStatus::Cancelled), Some(&1));
        assert_eq!(reg.active_ids(), vec!["a".to_string(), "b".to_string()]);

        let json = serde_json::to_value(&stats).unwrap();
        assert_eq!(json["activeCount"], 2);
        assert_eq!(json["countsByStatus"]["running"], 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_totals_survive_eviction() {
        let reg = registry(1);
        let a = reg.start("a", "scenario", secs(60), secs(45)).unwrap();
        a.complete(Value::Null);
        tokio::time::sleep(secs(2)).await;

        let stats = reg.stats();
        assert_eq!(stats.tracked_count, 0);
        assert_eq!(stats.totals_by_status.get(&RequestStatus::Completed), Some(&1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_with_defaults_generates_id() {
        let reg = registry(30);
        let t = reg.start_with_defaults("standard").unwrap();
        assert!(t.id().starts_with("req-"));
        assert_eq!(t.hard_timeout(), secs(60));
        assert_eq!(t.warn_threshold(), secs(45));
        assert!(reg.get(t.id()).is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_subscriber_may_reenter_registry() {
        let reg = registry(30);
        let t = reg.start("a", "scenario", secs(60), secs(45)).unwrap();
        let observer = reg.clone();
        let seen = Arc::new(Mutex::new(None));
        let sink = Arc::clone(&seen);
        t.subscribe_fn(move |event| {
            if event.is_terminal() {
                *sink.lock().unwrap() = Some(observer.stats().active_count);
                observer.cancel_all("cascade");
            }
        });

        t.complete(Value::Null);
        assert_eq!(*seen.lock().unwrap(), Some(0));
    }

    #[tokio::test(start_paused = true)]
    async fn test_independent_registries_are_isolated() {
        let one = registry(30);
        let two = registry(30);
        one.start("a", "scenario", secs(60), secs(45)).unwrap();
        assert!(two.get("a").is_none());
        two.start("a", "scenario", secs(60), secs(45)).unwrap();
        assert_eq!(one.len(), 1);
        assert_eq!(two.len(), 1);
    }

    #[test]
    fn test_from_config_uses_configured_profiles() {
        let profile = StageProfile::new(
            "audit",
            vec![Stage::new("init", "Starting", 0), Stage::new("done", "Done", 100)],
        )
        .unwrap();
        let config = Config::builder()
            .hard_timeout(secs(90))
            .warn_threshold(secs(60))
            .profile(profile)
            .build()
            .unwrap();
        let reg = Registry::from_config(&config);
        assert!(reg.profiles().contains("audit"));
        assert_eq!(reg.settings().hard_timeout, secs(90));
    }
}
