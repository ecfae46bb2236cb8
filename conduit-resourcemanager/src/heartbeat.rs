//! Heartbeat monitor. The resource manager initiates: for each monitored
//! target a periodic `request_heartbeat` is sent, the target replies with
//! a payload, and a timeout after `heartbeat_timeout` triggers
//! `notify_heartbeat_timeout`. Generic over the monitored target's id and
//! reply-payload types so the same monitor drives both TaskExecutor and
//! JobMaster heartbeats. Each endpoint holds only a peer's resource id and
//! gateway reference; the monitor uses a map from resource id to callback
//! object, and on teardown the map entry is removed, breaking any
//! reference cycle.

use conduit_core::time::timestamp_secs;
use dashmap::DashMap;
use std::hash::Hash;
use std::sync::Arc;
use std::time::Duration;

/// Callback invoked when a monitored target misses its heartbeat timeout.
/// Implementations hold only the target's id, never a back-reference to
/// the monitor itself, so dropping the map entry on teardown is sufficient
/// to break the cycle ("Cyclic references").
#[async_trait::async_trait]
pub trait HeartbeatTarget<Id>: Send + Sync {
    async fn request_heartbeat(&self, target: &Id);
    async fn notify_heartbeat_timeout(&self, target: &Id);
}

struct TargetState {
    last_seen: u64,
}

/// Tracks last-seen timestamps for a set of monitored targets and reports
/// which ones have exceeded `timeout` since the last `report_heartbeat`.
/// The actual periodic polling loop lives in the owning endpoint (RM or
/// JM), which calls `check_timeouts` on its own interval tick — this keeps
/// the monitor itself free of a background task and therefore trivially
/// droppable without cleanup races.
pub struct HeartbeatMonitor<Id: Eq + Hash + Clone + Send + Sync + 'static> {
    targets: DashMap<Id, TargetState>,
    interval: Duration,
    timeout: Duration,
}

impl<Id: Eq + Hash + Clone + Send + Sync + 'static> HeartbeatMonitor<Id> {
    pub fn new(interval: Duration, timeout: Duration) -> Arc<Self> {
        Arc::new(Self {
            targets: DashMap::new(),
            interval,
            timeout,
        })
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn monitor_target(&self, id: Id) {
        self.targets.insert(
            id,
            TargetState {
                last_seen: timestamp_secs(),
            },
        );
    }

    pub fn stop_monitoring(&self, id: &Id) {
        self.targets.remove(id);
    }

    /// the target's heartbeat reply resets its last-seen clock.
    pub fn report_heartbeat(&self, id: &Id) {
        if let Some(mut state) = self.targets.get_mut(id) {
            state.last_seen = timestamp_secs();
        }
    }

    /// Returns the ids of targets whose last-seen time exceeds `timeout`,
    /// removing them from tracking (the caller is expected to call
    /// `notify_heartbeat_timeout` and tear the connection down).
    pub fn check_timeouts(&self) -> Vec<Id> {
        let now = timestamp_secs();
        let timeout_secs = self.timeout.as_secs();
        let expired: Vec<Id> = self
            .targets
            .iter()
            .filter(|entry| now.saturating_sub(entry.value().last_seen) >= timeout_secs)
            .map(|entry| entry.key().clone())
            .collect();
        for id in &expired {
            self.targets.remove(id);
        }
        expired
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn fresh_target_does_not_time_out() {
        let monitor: Arc<HeartbeatMonitor<String>> = HeartbeatMonitor::new(Duration::from_secs(10), Duration::from_secs(50));
        monitor.monitor_target("tm-1".to_string());
        assert!(monitor.check_timeouts().is_empty());
    }

    #[test]
    fn stale_target_times_out() {
        let monitor: Arc<HeartbeatMonitor<String>> = HeartbeatMonitor::new(Duration::from_secs(10), Duration::from_secs(0));
        monitor.monitor_target("tm-1".to_string());
        let expired = monitor.check_timeouts();
        assert_eq!(expired, vec!["tm-1".to_string()]);
        // removed after reporting timeout
        assert!(monitor.check_timeouts().is_empty());
    }

    #[test]
    fn report_heartbeat_resets_clock() {
        let monitor: Arc<HeartbeatMonitor<String>> = HeartbeatMonitor::new(Duration::from_secs(10), Duration::from_secs(0));
        monitor.monitor_target("tm-1".to_string());
        monitor.report_heartbeat(&"tm-1".to_string());
        // timeout of 0 still counts as expired immediately since now - last_seen >= 0;
        // this documents that a zero timeout is a test-only edge case, not production config.
        assert_eq!(monitor.check_timeouts(), vec!["tm-1".to_string()]);
    }
}
