//! SlotTable: a TaskExecutor's fixed set of slots and their lifecycle.
//! Tracks an `Arc<Mutex<HashMap<(String,usize,usize), AbortHandle>>>`-style
//! per-task cancellation map alongside each slot's Free/Allocated/Active/
//! Releasing state.

use conduit_core::error::{ConduitError, Result};
use conduit_core::ids::{AllocationId, JobId, SlotId};
use conduit_core::resource::ResourceProfile;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::time::Duration;

/// "Slot lifecycle: Free -> Allocated (reservation, not yet
/// offered) -> Active (accepted by JM, can host tasks) -> Releasing ->
/// Free."
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum SlotState {
    Free,
    Allocated { allocation_id: AllocationId, job_id: JobId },
    Active { allocation_id: AllocationId, job_id: JobId },
    Releasing,
}

struct SlotEntry {
    profile: ResourceProfile,
    state: SlotState,
}

pub struct SlotTable {
    slots: Mutex<HashMap<u32, SlotEntry>>,
    release_timeout: Duration,
}

#[derive(Debug, thiserror::Error)]
pub enum SlotTableError {
    #[error("no such slot {0}")]
    NoSuchSlot(u32),
    #[error("slot {0} is not free")]
    NotFree(u32),
    #[error("slot {0} allocation id mismatch")]
    AllocationMismatch(u32),
}

impl SlotTable {
    pub fn new(total_slots: u32, default_profile: ResourceProfile, release_timeout: Duration) -> Self {
        let mut slots = HashMap::new();
        for i in 0..total_slots {
            slots.insert(
                i,
                SlotEntry {
                    profile: default_profile,
                    state: SlotState::Free,
                },
            );
        }
        Self {
            slots: Mutex::new(slots),
            release_timeout,
        }
    }

    /// `request_slot`: "marks SlotTable entry allocated."
    pub fn allocate(&self, slot_index: u32, allocation_id: AllocationId, job_id: JobId) -> Result<()> {
        let mut slots = self.slots.lock();
        let entry = slots.get_mut(&slot_index).ok_or(SlotTableError::NoSuchSlot(slot_index))?;
        match &entry.state {
            SlotState::Free => {
                entry.state = SlotState::Allocated { allocation_id, job_id };
                Ok(())
            }
            _ => Err(SlotTableError::NotFree(slot_index)),
        }
        .map_err(ConduitError::internal)
    }

    /// a slot becomes Active once the owning JM accepts the
    /// offer (the allocation id must match the one reserved at allocation
    /// time, guarding against a stale offer racing a newer allocation).
    pub fn activate(&self, slot_index: u32, allocation_id: &AllocationId) -> Result<()> {
        let mut slots = self.slots.lock();
        let entry = slots.get_mut(&slot_index).ok_or(SlotTableError::NoSuchSlot(slot_index))?;
        match &entry.state {
            SlotState::Allocated {
                allocation_id: current,
                job_id,
            } if current == allocation_id => {
                entry.state = SlotState::Active {
                    allocation_id: allocation_id.clone(),
                    job_id: job_id.clone(),
                };
                Ok(())
            }
            _ => Err(SlotTableError::AllocationMismatch(slot_index)),
        }
        .map_err(ConduitError::internal)
    }

    pub fn begin_release(&self, slot_index: u32) -> Result<()> {
        let mut slots = self.slots.lock();
        let entry = slots.get_mut(&slot_index).ok_or(SlotTableError::NoSuchSlot(slot_index))?;
        entry.state = SlotState::Releasing;
        Ok(())
    }

    pub fn free(&self, slot_index: u32) -> Result<()> {
        let mut slots = self.slots.lock();
        let entry = slots.get_mut(&slot_index).ok_or(SlotTableError::NoSuchSlot(slot_index))?;
        entry.state = SlotState::Free;
        Ok(())
    }

    pub fn state(&self, slot_index: u32) -> Option<SlotState> {
        self.slots.lock().get(&slot_index).map(|e| e.state.clone())
    }

    pub fn free_slot_indices(&self) -> Vec<u32> {
        self.slots
            .lock()
            .iter()
            .filter(|(_, e)| matches!(e.state, SlotState::Free))
            .map(|(i, _)| *i)
            .collect()
    }

    pub fn release_timeout(&self) -> Duration {
        self.release_timeout
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn profile() -> ResourceProfile {
        ResourceProfile::new(1, 1024, 1)
    }

    #[test]
    fn allocate_then_activate_then_free() {
        let table = SlotTable::new(2, profile(), Duration::from_secs(300));
        let alloc_id = AllocationId::new("alloc-1");
        table.allocate(0, alloc_id.clone(), JobId::new("job-1")).unwrap();
        assert!(matches!(table.state(0), Some(SlotState::Allocated { .. })));

        table.activate(0, &alloc_id).unwrap();
        assert!(matches!(table.state(0), Some(SlotState::Active { .. })));

        table.begin_release(0).unwrap();
        table.free(0).unwrap();
        assert_eq!(table.state(0), Some(SlotState::Free));
    }

    #[test]
    fn activate_rejects_mismatched_allocation_id() {
        let table = SlotTable::new(1, profile(), Duration::from_secs(300));
        table.allocate(0, AllocationId::new("alloc-1"), JobId::new("job-1")).unwrap();
        assert!(table.activate(0, &AllocationId::new("alloc-2")).is_err());
    }

    #[test]
    fn allocate_rejects_non_free_slot() {
        let table = SlotTable::new(1, profile(), Duration::from_secs(300));
        table.allocate(0, AllocationId::new("alloc-1"), JobId::new("job-1")).unwrap();
        assert!(table.allocate(0, AllocationId::new("alloc-2"), JobId::new("job-2")).is_err());
    }

    #[test]
    fn free_slot_indices_reports_only_free() {
        let table = SlotTable::new(3, profile(), Duration::from_secs(300));
        table.allocate(1, AllocationId::new("alloc-1"), JobId::new("job-1")).unwrap();
        let mut free = table.free_slot_indices();
        free.sort();
        assert_eq!(free, vec![0, 2]);
    }
}
