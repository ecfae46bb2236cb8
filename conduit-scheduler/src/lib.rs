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

//! The job master / scheduler layer: compiles submitted stream graphs into
//! job graphs, drives slot allocation and task deployment, handles failures
//! and restarts, and coordinates distributed checkpoints.

pub mod checkpoint_coordinator;
pub mod config;
pub mod execution_graph;
pub mod failure_handler;
pub mod graph_compiler;
pub mod job_master;
pub mod metrics;
pub mod scheduler;
pub mod slot_allocator;
pub mod slot_pool;

#[cfg(test)]
pub mod test_utils;

pub use checkpoint_coordinator::{CheckpointCoordinator, CheckpointCoordinatorError, CompletedCheckpoint, PendingCheckpoint, TerminalReason};
pub use config::SchedulerConfig;
pub use execution_graph::{Execution, ExecutionGraph, ExecutionGraphError, ExecutionJobVertex, ExecutionState, ExecutionVertex};
pub use failure_handler::{FailoverStrategy, FailureHandler, FailureHandlerError, RestartBackoffTimeStrategy};
pub use graph_compiler::{DataExchangeMode, GraphCompiler, GraphCompilerError, JobCheckpointingSettings};
pub use job_master::{JobMaster, JobMasterError, JobMasterState};
pub use scheduler::{DefaultScheduler, SchedulerError, SchedulingStrategy, TaskDeployer};
pub use slot_allocator::{ExecutionSlotAllocator, ExecutionVertexSchedulingRequirements, SlotExecutionVertexAssignment, SlotRequester};
pub use slot_pool::{PooledSlot, SlotPool, SlotPoolError};
