// Licensed to the Apache Software Foundation (ASF) under one
// or more contributor license agreements.  See the NOTICE file
// distributed with this work for additional information
// regarding copyright ownership.  The ASF licenses this file
// to you under the Apache License, Version 2.0 (the
// "License"); you may not use this file except in compliance
// with the License.  You may obtain a copy of the License at
//
//   http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing,
// software distributed under the License is distributed on an
// "AS IS" BASIS, WITHOUT WARRANTIES OR CONDITIONS OF ANY
// KIND, either express or implied.  See the License for the
// specific language governing permissions and limitations
// under the License.

//! Resource manager: central broker for cluster slot capacity. Matches
//! per-job slot requests to free slots advertised by registered task
//! executors, and tracks which job master currently leads each job via the
//! `JobLeaderIdService`.

pub mod cluster_state;
pub mod heartbeat;
pub mod job_leader_id;
pub mod resource_manager;
pub mod slot_manager;

#[cfg(feature = "sled-cluster")]
pub use cluster_state::SledClusterState;
pub use cluster_state::{ClusterState, InMemoryClusterState};
pub use heartbeat::{HeartbeatMonitor, HeartbeatTarget};
pub use job_leader_id::JobLeaderIdService;
pub use resource_manager::{RegistrationResult, ResourceManager};
pub use slot_manager::{SlotManager, SlotManagerError, SlotMatch, SlotStatus};
