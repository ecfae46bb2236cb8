//! ResourceManager endpoint. Composes `SlotManager`,
//! `JobLeaderIdService`, a `HeartbeatMonitor<ResourceId>` for task
//! executors, and a `ClusterState` handle — following the composition-first
//! endpoint shape from  rather than a base-class hierarchy.

use crate::cluster_state::{ClusterState, ExecutorRecord};
use crate::heartbeat::HeartbeatMonitor;
use crate::job_leader_id::JobLeaderIdService;
use crate::slot_manager::{SlotManager, SlotMatch};
use conduit_core::error::{ConduitError, Result};
use conduit_core::ids::{AllocationId, FencingToken, InstanceId, JobId, ResourceId};
use conduit_core::resource::ResourceProfile;
use std::sync::Arc;
use std::time::Duration;

/// Result of `register_task_executor` ("associates a fresh
/// InstanceId; closes any prior registration for the same ResourceId").
pub struct RegistrationResult {
    pub instance_id: InstanceId,
}

pub struct ResourceManager {
    slot_manager: SlotManager,
    job_leader_id: JobLeaderIdService,
    heartbeats: Arc<HeartbeatMonitor<ResourceId>>,
    cluster_state: Arc<dyn ClusterState>,
    /// resource id -> currently valid registration epoch; a `send_slot_report`
    /// carrying a stale instance id is discarded ("slot-report
    /// from an unknown instance id is discarded").
    instances: dashmap::DashMap<ResourceId, InstanceId>,
}

impl ResourceManager {
    pub fn new(
        cluster_state: Arc<dyn ClusterState>,
        heartbeat_interval: Duration,
        heartbeat_timeout: Duration,
        pending_slot_request_timeout: Duration,
    ) -> Self {
        Self {
            slot_manager: SlotManager::new(pending_slot_request_timeout),
            job_leader_id: JobLeaderIdService::new(),
            heartbeats: HeartbeatMonitor::new(heartbeat_interval, heartbeat_timeout),
            cluster_state,
            instances: dashmap::DashMap::new(),
        }
    }

    /// `register_task_executor`. A TM reconnecting under a new
    /// InstanceId supersedes its old registration ("Failure
    /// semantics: duplicate registration supersedes the older one ... a TM
    /// reconnecting under a new InstanceId causes the old registration's
    /// slots to be freed").
    pub async fn register_task_executor(
        &self,
        address: String,
        resource_id: ResourceId,
        profile: ResourceProfile,
        total_slots: u32,
    ) -> Result<RegistrationResult> {
        let instance_id = InstanceId::new();
        self.instances.insert(resource_id.clone(), instance_id);
        self.slot_manager.register_task_executor(resource_id.clone(), profile, total_slots);
        self.heartbeats.monitor_target(resource_id.clone());
        self.cluster_state
            .put_executor(ExecutorRecord {
                resource_id,
                address,
                total_slots,
            })
            .await?;
        Ok(RegistrationResult { instance_id })
    }

    /// `send_slot_report`. Discards reports from a superseded
    /// instance id.
    pub fn send_slot_report(&self, resource_id: &ResourceId, instance_id: InstanceId, free_slot_indices: &[u32]) -> Result<()> {
        match self.instances.get(resource_id) {
            Some(current) if *current == instance_id => {
                self.slot_manager.apply_slot_report(resource_id, free_slot_indices)
            }
            _ => Ok(()), // stale instance id: discarded, not an error
        }
        .map_err(|e| ConduitError::internal(e))
    }

    /// `register_job_manager`: authenticates the job master via
    /// `JobLeaderIdService`.
    pub fn register_job_manager(&self, job_master_token: FencingToken, job_id: JobId) -> Result<()> {
        if self.job_leader_id.matches(&job_id, job_master_token) {
            Ok(())
        } else {
            Err(ConduitError::FencingMismatch {
                expected: "current job leader token".into(),
                actual: job_master_token.to_string(),
            })
        }
    }

    pub fn notify_job_leader_granted(&self, job_id: JobId, token: FencingToken) {
        self.job_leader_id.notify_leader_granted(job_id, token);
    }

    pub fn notify_job_leader_lost(&self, job_id: &JobId) {
        self.job_leader_id.notify_leader_lost(job_id);
    }

    /// `request_slot`.
    pub fn request_slot(&self, job_master_token: FencingToken, job_id: JobId, allocation_id: AllocationId, profile: ResourceProfile) -> Result<SlotMatch> {
        self.register_job_manager(job_master_token, job_id.clone())?;
        Ok(self.slot_manager.request_slot(job_id, allocation_id, profile))
    }

    pub fn notify_slot_available(&self, resource_id: &ResourceId, slot_index: u32) -> Result<()> {
        self.slot_manager
            .notify_slot_available(resource_id, slot_index)
            .map_err(ConduitError::internal)
    }

    /// Called on a timer tick by the endpoint's own driving loop (/// control-plane endpoints run single-threaded cooperative executors;
    /// there is no background task inside this struct itself).
    pub fn expire_timeouts(&self) -> (Vec<AllocationId>, Vec<ResourceId>) {
        (self.slot_manager.expire_pending_requests(), self.heartbeats.check_timeouts())
    }

    pub fn heartbeat_monitor(&self) -> &Arc<HeartbeatMonitor<ResourceId>> {
        &self.heartbeats
    }

    /// `deregister_application`: triggers cluster shutdown in
    /// deployment modes that own workers. Resource teardown (stopping
    /// owned workers) is a deployment-mode concern outside the core; here
    /// we only clear local bookkeeping so a fresh application can reuse
    /// this ResourceManager instance in tests.
    pub async fn deregister_application(&self, resource_ids: &[ResourceId]) -> Result<()> {
        for resource_id in resource_ids {
            self.slot_manager.deregister_task_executor(resource_id);
            self.heartbeats.stop_monitoring(resource_id);
            self.instances.remove(resource_id);
            self.cluster_state.remove_executor(resource_id).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::cluster_state::InMemoryClusterState;

    fn rm() -> ResourceManager {
        ResourceManager::new(
            InMemoryClusterState::new(),
            Duration::from_secs(10),
            Duration::from_secs(50),
            Duration::from_secs(300),
        )
    }

    #[tokio::test]
    async fn register_then_request_slot_matches() {
        let rm = rm();
        rm.register_task_executor("10.0.0.1:9000".into(), ResourceId::new("exec-1"), ResourceProfile::new(4, 8192, 1), 2)
            .await
            .unwrap();

        let token = FencingToken::new();
        rm.notify_job_leader_granted(JobId::new("job-1"), token);

        let result = rm
            .request_slot(token, JobId::new("job-1"), AllocationId::new("alloc-1"), ResourceProfile::new(1, 1024, 1))
            .unwrap();
        assert!(matches!(result, SlotMatch::Matched { .. }));
    }

    #[tokio::test]
    async fn request_slot_rejects_stale_job_master_token() {
        let rm = rm();
        rm.register_task_executor("10.0.0.1:9000".into(), ResourceId::new("exec-1"), ResourceProfile::new(4, 8192, 1), 2)
            .await
            .unwrap();
        rm.notify_job_leader_granted(JobId::new("job-1"), FencingToken::new());

        let stale_token = FencingToken::new();
        let result = rm.request_slot(stale_token, JobId::new("job-1"), AllocationId::new("alloc-1"), ResourceProfile::new(1, 1024, 1));
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn stale_slot_report_instance_id_is_discarded() {
        let rm = rm();
        rm.register_task_executor("10.0.0.1:9000".into(), ResourceId::new("exec-1"), ResourceProfile::new(4, 8192, 1), 1)
            .await
            .unwrap();
        // fabricate a stale instance id distinct from the one just assigned
        let stale = InstanceId::new();
        assert!(rm.send_slot_report(&ResourceId::new("exec-1"), stale, &[0]).is_ok());
    }
}
