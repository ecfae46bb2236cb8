//! Resource profile domain type ("Key algorithm — slot
//! matching: linear scan of free slots filtered by ResourceProfile
//! subsumption"). Kept separate from the generated `protobuf::ResourceProfile`
//! wire type so scheduling logic isn't coupled to the proto codegen.

use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct ResourceProfile {
    pub cpu_cores: u32,
    pub memory_mb: u64,
    pub task_slots: u32,
}

impl ResourceProfile {
    pub fn new(cpu_cores: u32, memory_mb: u64, task_slots: u32) -> Self {
        Self {
            cpu_cores,
            memory_mb,
            task_slots,
        }
    }

    /// True if a slot with this profile could satisfy a request for
    /// `requested` ("ResourceProfile subsumption").
    pub fn subsumes(&self, requested: &ResourceProfile) -> bool {
        self.cpu_cores >= requested.cpu_cores
            && self.memory_mb >= requested.memory_mb
            && self.task_slots >= requested.task_slots
    }
}

impl From<crate::protobuf::ResourceProfile> for ResourceProfile {
    fn from(p: crate::protobuf::ResourceProfile) -> Self {
        Self {
            cpu_cores: p.cpu_cores,
            memory_mb: p.memory_mb,
            task_slots: p.task_slots,
        }
    }
}

impl From<ResourceProfile> for crate::protobuf::ResourceProfile {
    fn from(p: ResourceProfile) -> Self {
        Self {
            cpu_cores: p.cpu_cores,
            memory_mb: p.memory_mb,
            task_slots: p.task_slots,
        }
    }
}
