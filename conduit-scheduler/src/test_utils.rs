//! Test fixtures shared across `conduit-scheduler`'s unit tests: a
//! `VirtualTaskExecutor`/`TaskRunnerFn` pair that stands in for an actual
//! gRPC-connected executor, an in-memory `TestMetricsCollector`, and an
//! `await_condition` polling helper for assertions that need to wait on
//! async state settling.

use crate::metrics::SchedulerMetricsCollector;
use crate::scheduler::TaskDeployer;
use crate::slot_allocator::SlotRequester;
use conduit_core::error::{ConduitError, Result};
use conduit_core::ids::{AllocationId, JobVertexId};
use conduit_core::resource::ResourceProfile;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Polls `condition` until it returns `true` or `timeout` elapses.
pub async fn await_condition<F, Fut>(poll_interval: Duration, timeout: Duration, mut condition: F) -> Result<bool>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<bool>>,
{
    let start = tokio::time::Instant::now();
    loop {
        if condition().await? {
            return Ok(true);
        }
        if start.elapsed() >= timeout {
            return Ok(false);
        }
        tokio::time::sleep(poll_interval).await;
    }
}

/// A fake `SlotRequester` that always grants immediately, for scheduler
/// tests that don't exercise resource-manager failure paths.
pub struct AlwaysGrantSlotRequester {
    next_id: AtomicU64,
}

impl Default for AlwaysGrantSlotRequester {
    fn default() -> Self {
        Self { next_id: AtomicU64::new(0) }
    }
}

#[async_trait::async_trait]
impl SlotRequester for AlwaysGrantSlotRequester {
    async fn request_slot(&self, _profile: ResourceProfile) -> Result<AllocationId> {
        let n = self.next_id.fetch_add(1, Ordering::SeqCst);
        Ok(AllocationId::new(format!("alloc-{n}")))
    }
}

/// A `SlotRequester` that always fails, for testing scheduling-round error
/// propagation without standing up a real resource manager.
pub struct AlwaysRefuseSlotRequester;

#[async_trait::async_trait]
impl SlotRequester for AlwaysRefuseSlotRequester {
    async fn request_slot(&self, _profile: ResourceProfile) -> Result<AllocationId> {
        Err(ConduitError::AllocationFailed {
            allocation_id: AllocationId::new("n/a"),
            reason: "no capacity in test fixture".into(),
        })
    }
}

/// A `TaskDeployer` that doesn't talk to a real TaskExecutor; instead it
/// replays a fixed `TaskRunnerFn` against each deployed (vertex, subtask)
/// pair and records the call for assertions.
pub type TaskRunnerFn = Arc<dyn Fn(&JobVertexId, u32) -> Result<()> + Send + Sync>;

pub struct VirtualTaskExecutor {
    runner: TaskRunnerFn,
    deployments: Mutex<Vec<(AllocationId, JobVertexId, u32)>>,
}

impl VirtualTaskExecutor {
    pub fn new(runner: TaskRunnerFn) -> Self {
        Self {
            runner,
            deployments: Mutex::new(Vec::new()),
        }
    }

    pub fn always_succeeds() -> Self {
        Self::new(Arc::new(|_vertex, _subtask| Ok(())))
    }

    pub fn always_fails(reason: &'static str) -> Self {
        Self::new(Arc::new(move |_vertex, _subtask| Err(ConduitError::internal(reason))))
    }

    pub fn deployments(&self) -> Vec<(AllocationId, JobVertexId, u32)> {
        self.deployments.lock().clone()
    }
}

#[async_trait::async_trait]
impl TaskDeployer for VirtualTaskExecutor {
    async fn deploy(&self, allocation_id: &AllocationId, job_vertex_id: &JobVertexId, subtask_index: u32) -> Result<()> {
        self.deployments.lock().push((allocation_id.clone(), job_vertex_id.clone(), subtask_index));
        (self.runner)(job_vertex_id, subtask_index)
    }
}

/// In-memory counters standing in for `PrometheusMetricsCollector` in
/// tests that assert a specific metric fired.
#[derive(Default)]
pub struct TestMetricsCollector {
    pub jobs_submitted: AtomicU64,
    pub jobs_completed: AtomicU64,
    pub jobs_failed: AtomicU64,
    pub jobs_cancelled: AtomicU64,
    pub checkpoints_completed: AtomicU64,
    pub checkpoints_declined: AtomicU64,
    pub restarts: AtomicU64,
}

impl SchedulerMetricsCollector for TestMetricsCollector {
    fn record_job_submitted(&self, _job_id: &str) {
        self.jobs_submitted.fetch_add(1, Ordering::SeqCst);
    }

    fn record_job_completed(&self, _job_id: &str, _duration_ms: u64) {
        self.jobs_completed.fetch_add(1, Ordering::SeqCst);
    }

    fn record_job_failed(&self, _job_id: &str) {
        self.jobs_failed.fetch_add(1, Ordering::SeqCst);
    }

    fn record_job_cancelled(&self, _job_id: &str) {
        self.jobs_cancelled.fetch_add(1, Ordering::SeqCst);
    }

    fn record_checkpoint_completed(&self, _job_id: &str, _checkpoint_id: u64, _duration_ms: u64) {
        self.checkpoints_completed.fetch_add(1, Ordering::SeqCst);
    }

    fn record_checkpoint_declined(&self, _job_id: &str, _checkpoint_id: u64) {
        self.checkpoints_declined.fetch_add(1, Ordering::SeqCst);
    }

    fn record_restart(&self, _job_id: &str) {
        self.restarts.fetch_add(1, Ordering::SeqCst);
    }

    fn record_slot_allocation_latency_ms(&self, _latency_ms: u64) {}

    fn set_running_job_count(&self, _value: u64) {}
}

#[cfg(test)]
mod test {
    use super::*;

    #[tokio::test]
    async fn await_condition_returns_true_once_satisfied() {
        let calls = Arc::new(AtomicU64::new(0));
        let calls2 = calls.clone();
        let satisfied = await_condition(Duration::from_millis(1), Duration::from_millis(200), move || {
            let calls = calls2.clone();
            async move { Ok(calls.fetch_add(1, Ordering::SeqCst) >= 2) }
        })
        .await
        .unwrap();

        assert!(satisfied);
        assert!(calls.load(Ordering::SeqCst) >= 3);
    }

    #[tokio::test]
    async fn await_condition_times_out() {
        let satisfied = await_condition(Duration::from_millis(1), Duration::from_millis(20), || async { Ok(false) }).await.unwrap();
        assert!(!satisfied);
    }

    #[tokio::test]
    async fn virtual_task_executor_records_deployments() {
        let executor = VirtualTaskExecutor::always_succeeds();
        executor.deploy(&AllocationId::new("alloc-1"), &JobVertexId::new("v1"), 0).await.unwrap();
        assert_eq!(executor.deployments().len(), 1);
    }
}
