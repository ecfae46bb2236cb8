//! SlotManager: tracks every registered TaskExecutor's slots and matches
//! job slot requests against them — matching one slot request against a
//! resource-profile-subsuming free slot, rather than reserving N slots
//! across the whole free pool at once.

use conduit_core::ids::{AllocationId, JobId, ResourceId, SlotId};
use conduit_core::resource::ResourceProfile;
use conduit_core::time::timestamp_secs;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::time::Duration;
use thiserror::Error;

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum SlotStatus {
    Free,
    /// Reserved against an `AllocationId` but not yet confirmed Active by
    /// the owning executor ("Free -> Allocated").
    Pending(AllocationId),
}

#[derive(Debug)]
struct ExecutorEntry {
    profile: ResourceProfile,
    slots: HashMap<u32, SlotStatus>,
}

struct PendingRequest {
    allocation_id: AllocationId,
    job_id: JobId,
    profile: ResourceProfile,
    requested_at: u64,
}

#[derive(Debug, Error)]
pub enum SlotManagerError {
    #[error("unknown resource id {0}")]
    UnknownResource(String),
    #[error("slot {0} is not free")]
    SlotNotFree(SlotId),
    #[error("allocation {0} not found among pending requests")]
    UnknownAllocation(String),
}

/// Result of a `request_slot` call ("Key algorithm").
pub enum SlotMatch {
    /// A free slot matching the profile was found and reserved.
    Matched { resource_id: ResourceId, slot_index: u32 },
    /// No match; the request is now queued with a pending-slot-request
    /// timeout.
    Queued,
}

pub struct SlotManager {
    state: RwLock<SlotManagerState>,
    pending_slot_request_timeout: Duration,
}

#[derive(Default)]
struct SlotManagerState {
    executors: HashMap<ResourceId, ExecutorEntry>,
    pending: Vec<PendingRequest>,
}

impl SlotManager {
    pub fn new(pending_slot_request_timeout: Duration) -> Self {
        Self {
            state: RwLock::new(SlotManagerState::default()),
            pending_slot_request_timeout,
        }
    }

    /// `register_task_executor`: "closes any prior registration
    /// for the same ResourceId" — slots are reset entirely, any prior
    /// allocations on that resource id are implicitly dropped by the
    /// caller via `notify_heartbeat_timeout`/explicit disconnect first.
    pub fn register_task_executor(&self, resource_id: ResourceId, profile: ResourceProfile, total_slots: u32) {
        let mut state = self.state.write();
        let mut slots = HashMap::new();
        for i in 0..total_slots {
            slots.insert(i, SlotStatus::Free);
        }
        state.executors.insert(resource_id, ExecutorEntry { profile, slots });
    }

    pub fn deregister_task_executor(&self, resource_id: &ResourceId) {
        self.state.write().executors.remove(resource_id);
    }

    /// `send_slot_report`: diff the executor's declared
    /// free/allocated slots against our view, trusting the executor as the
    /// source of truth for which slots are physically free.
    pub fn apply_slot_report(&self, resource_id: &ResourceId, free_slot_indices: &[u32]) -> Result<(), SlotManagerError> {
        let mut state = self.state.write();
        let entry = state
            .executors
            .get_mut(resource_id)
            .ok_or_else(|| SlotManagerError::UnknownResource(resource_id.to_string()))?;
        for (index, status) in entry.slots.iter_mut() {
            if free_slot_indices.contains(index) {
                *status = SlotStatus::Free;
            }
        }
        Ok(())
    }

    /// "linear scan of free slots filtered by ResourceProfile
    /// subsumption; tie-break on executor with fewest allocated slots."
    pub fn request_slot(&self, job_id: JobId, allocation_id: AllocationId, profile: ResourceProfile) -> SlotMatch {
        let mut state = self.state.write();

        let mut best: Option<(ResourceId, u32, usize)> = None;
        for (resource_id, entry) in state.executors.iter() {
            if !entry.profile.subsumes(&profile) {
                continue;
            }
            let allocated_count = entry.slots.values().filter(|s| !matches!(s, SlotStatus::Free)).count();
            let mut free_index = None;
            for (index, status) in entry.slots.iter() {
                if matches!(status, SlotStatus::Free) {
                    free_index = Some(*index);
                    break;
                }
            }
            if let Some(index) = free_index {
                if best.as_ref().map(|(_, _, count)| allocated_count < *count).unwrap_or(true) {
                    best = Some((resource_id.clone(), index, allocated_count));
                }
            }
        }

        match best {
            Some((resource_id, slot_index, _)) => {
                let entry = state.executors.get_mut(&resource_id).expect("checked above");
                entry.slots.insert(slot_index, SlotStatus::Pending(allocation_id));
                SlotMatch::Matched { resource_id, slot_index }
            }
            None => {
                state.pending.push(PendingRequest {
                    allocation_id,
                    job_id,
                    profile,
                    requested_at: timestamp_secs(),
                });
                SlotMatch::Queued
            }
        }
    }

    /// `notify_slot_available`: "released by executor; returned
    /// to free pool."
    pub fn notify_slot_available(&self, resource_id: &ResourceId, slot_index: u32) -> Result<(), SlotManagerError> {
        let mut state = self.state.write();
        let entry = state
            .executors
            .get_mut(resource_id)
            .ok_or_else(|| SlotManagerError::UnknownResource(resource_id.to_string()))?;
        entry.slots.insert(slot_index, SlotStatus::Free);
        Ok(())
    }

    /// Expires pending requests older than `pending_slot_request_timeout`
    /// ("enforce a pending-slot-request timeout ... after which
    /// the request fails with an allocation timeout"). Returns the
    /// allocation ids that timed out so the caller can notify the job.
    pub fn expire_pending_requests(&self) -> Vec<AllocationId> {
        let now = timestamp_secs();
        let timeout_secs = self.pending_slot_request_timeout.as_secs();
        let mut state = self.state.write();
        let (expired, retained): (Vec<_>, Vec<_>) = state
            .pending
            .drain(..)
            .partition(|req| now.saturating_sub(req.requested_at) >= timeout_secs);
        state.pending = retained;
        expired.into_iter().map(|r| r.allocation_id).collect()
    }

    pub fn pending_request_count(&self) -> usize {
        self.state.read().pending.len()
    }

    pub fn free_slot_count(&self, resource_id: &ResourceId) -> usize {
        self.state
            .read()
            .executors
            .get(resource_id)
            .map(|e| e.slots.values().filter(|s| matches!(s, SlotStatus::Free)).count())
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn profile(cores: u32, mem: u64) -> ResourceProfile {
        ResourceProfile::new(cores, mem, 1)
    }

    #[test]
    fn matches_free_slot_with_subsuming_profile() {
        let manager = SlotManager::new(Duration::from_secs(300));
        manager.register_task_executor(ResourceId::new("exec-1"), profile(4, 8192), 2);

        let result = manager.request_slot(JobId::new("job-1"), AllocationId::new("alloc-1"), profile(2, 4096));
        match result {
            SlotMatch::Matched { resource_id, .. } => assert_eq!(resource_id, ResourceId::new("exec-1")),
            SlotMatch::Queued => panic!("expected a match"),
        }
        assert_eq!(manager.free_slot_count(&ResourceId::new("exec-1")), 1);
    }

    #[test]
    fn queues_when_no_slot_fits() {
        let manager = SlotManager::new(Duration::from_secs(300));
        manager.register_task_executor(ResourceId::new("exec-1"), profile(1, 1024), 1);

        let result = manager.request_slot(JobId::new("job-1"), AllocationId::new("alloc-1"), profile(4, 8192));
        assert!(matches!(result, SlotMatch::Queued));
        assert_eq!(manager.pending_request_count(), 1);
    }

    #[test]
    fn prefers_executor_with_fewer_allocated_slots() {
        let manager = SlotManager::new(Duration::from_secs(300));
        manager.register_task_executor(ResourceId::new("busy"), profile(4, 8192), 2);
        manager.register_task_executor(ResourceId::new("idle"), profile(4, 8192), 2);

        // pre-allocate one slot on "busy"
        manager.request_slot(JobId::new("job-0"), AllocationId::new("alloc-0"), profile(1, 1024));

        let result = manager.request_slot(JobId::new("job-1"), AllocationId::new("alloc-1"), profile(1, 1024));
        if let SlotMatch::Matched { resource_id, .. } = result {
            assert_eq!(resource_id, ResourceId::new("idle"));
        } else {
            panic!("expected a match");
        }
    }

    #[test]
    fn notify_slot_available_returns_slot_to_free_pool() {
        let manager = SlotManager::new(Duration::from_secs(300));
        manager.register_task_executor(ResourceId::new("exec-1"), profile(4, 8192), 1);
        manager.request_slot(JobId::new("job-1"), AllocationId::new("alloc-1"), profile(1, 1024));
        assert_eq!(manager.free_slot_count(&ResourceId::new("exec-1")), 0);

        manager.notify_slot_available(&ResourceId::new("exec-1"), 0).unwrap();
        assert_eq!(manager.free_slot_count(&ResourceId::new("exec-1")), 1);
    }
}
