//! SlotPool. The job master's view of slots offered to it by the resource
//! manager: tracks which `AllocationId`s are currently free versus
//! assigned to an `ExecutionVertex`, and which requests are still waiting
//! on a resource-manager grant — the job master's private slice of the
//! cluster's slots, tracking which ones a scheduling round has claimed,
//! rather than the whole cluster's view.
use conduit_core::ids::{AllocationId, JobVertexId, SlotId};
use conduit_core::resource::ResourceProfile;
use std::collections::HashMap;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SlotPoolError {
    #[error("allocation {0} is not known to this slot pool")]
    UnknownAllocation(AllocationId),
    #[error("allocation {0} is already assigned")]
    AlreadyAssigned(AllocationId),
}

#[derive(Clone, Debug)]
pub struct PooledSlot {
    pub allocation_id: AllocationId,
    pub slot_id: SlotId,
    pub profile: ResourceProfile,
    pub assigned_to: Option<(JobVertexId, u32)>,
}

/// Slot requests are batched per job and forwarded to the resource
/// manager; the job master tracks outstanding requests so a late-arriving
/// offer can be matched against the right subtask.
pub struct SlotPool {
    slots: HashMap<AllocationId, PooledSlot>,
    /// Requests raised but not yet satisfied by an offered slot.
    pending: Vec<(JobVertexId, u32, ResourceProfile)>,
}

impl Default for SlotPool {
    fn default() -> Self {
        Self::new()
    }
}

impl SlotPool {
    pub fn new() -> Self {
        Self {
            slots: HashMap::new(),
            pending: Vec::new(),
        }
    }

    /// A slot offered by the resource manager, ready to be matched
    /// against a pending request or held free until one arrives.
    pub fn offer_slot(&mut self, allocation_id: AllocationId, slot_id: SlotId, profile: ResourceProfile) {
        self.slots.insert(
            allocation_id.clone(),
            PooledSlot {
                allocation_id,
                slot_id,
                profile,
                assigned_to: None,
            },
        );
    }

    pub fn request_slot(&mut self, job_vertex_id: JobVertexId, subtask_index: u32, profile: ResourceProfile) {
        self.pending.push((job_vertex_id, subtask_index, profile));
    }

    /// Matches every pending request against a free, sufficiently large
    /// slot (first-fit), assigning on success. Returns the assignments made
    /// this call so the caller can deploy them.
    pub fn match_pending(&mut self) -> Vec<(JobVertexId, u32, AllocationId)> {
        let mut matched = Vec::new();
        let mut still_pending = Vec::new();

        for (job_vertex_id, subtask_index, profile) in self.pending.drain(..) {
            let free = self
                .slots
                .values_mut()
                .find(|s| s.assigned_to.is_none() && s.profile.subsumes(&profile));

            match free {
                Some(slot) => {
                    slot.assigned_to = Some((job_vertex_id.clone(), subtask_index));
                    matched.push((job_vertex_id, subtask_index, slot.allocation_id.clone()));
                }
                None => still_pending.push((job_vertex_id, subtask_index, profile)),
            }
        }

        self.pending = still_pending;
        matched
    }

    /// Releases the slot back to the pool on restart or vertex
    /// completion.
    pub fn release(&mut self, allocation_id: &AllocationId) -> Result<(), SlotPoolError> {
        let slot = self.slots.get_mut(allocation_id).ok_or_else(|| SlotPoolError::UnknownAllocation(allocation_id.clone()))?;
        slot.assigned_to = None;
        Ok(())
    }

    pub fn remove(&mut self, allocation_id: &AllocationId) -> Option<PooledSlot> {
        self.slots.remove(allocation_id)
    }

    pub fn free_slot_count(&self) -> usize {
        self.slots.values().filter(|s| s.assigned_to.is_none()).count()
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    pub fn assignment_of(&self, allocation_id: &AllocationId) -> Option<(JobVertexId, u32)> {
        self.slots.get(allocation_id).and_then(|s| s.assigned_to.clone())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn profile() -> ResourceProfile {
        ResourceProfile {
            cpu_cores: 1,
            memory_mb: 512,
            task_slots: 1,
        }
    }

    #[test]
    fn offered_slot_matches_pending_request() {
        let mut pool = SlotPool::new();
        let vertex = JobVertexId::new("v1");
        pool.request_slot(vertex.clone(), 0, profile());
        assert_eq!(pool.pending_count(), 1);

        let allocation = AllocationId::new("alloc-1");
        pool.offer_slot(allocation.clone(), SlotId { resource_id: conduit_core::ids::ResourceId::new("r1"), index: 0 }, profile());

        let matched = pool.match_pending();
        assert_eq!(matched, vec![(vertex, 0, allocation)]);
        assert_eq!(pool.pending_count(), 0);
        assert_eq!(pool.free_slot_count(), 0);
    }

    #[test]
    fn request_stays_pending_without_a_matching_offer() {
        let mut pool = SlotPool::new();
        pool.request_slot(JobVertexId::new("v1"), 0, profile());
        assert!(pool.match_pending().is_empty());
        assert_eq!(pool.pending_count(), 1);
    }

    #[test]
    fn release_frees_the_slot_for_reassignment() {
        let mut pool = SlotPool::new();
        let allocation = AllocationId::new("alloc-1");
        pool.offer_slot(allocation.clone(), SlotId { resource_id: conduit_core::ids::ResourceId::new("r1"), index: 0 }, profile());
        pool.request_slot(JobVertexId::new("v1"), 0, profile());
        pool.match_pending();
        assert_eq!(pool.free_slot_count(), 0);

        pool.release(&allocation).unwrap();
        assert_eq!(pool.free_slot_count(), 1);
        assert!(pool.assignment_of(&allocation).is_none());
    }
}
