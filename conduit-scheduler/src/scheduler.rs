//! DefaultScheduler. Drives the six-step scheduling round: gather
//! requirements, batch-request slots, await assignment, deploy to the
//! assigned TaskExecutor, and record the result back onto the
//! `ExecutionGraph`.

use crate::execution_graph::{ExecutionGraph, ExecutionGraphError, ExecutionState};
use crate::slot_allocator::{ExecutionSlotAllocator, ExecutionVertexSchedulingRequirements};
use crate::slot_pool::SlotPool;
use conduit_core::error::{ConduitError, Result};
use conduit_core::ids::{AllocationId, JobVertexId};
use conduit_core::resource::ResourceProfile;
use std::collections::HashMap;
use thiserror::Error;

/// "two scheduling strategies": `Eager` requests slots for every
/// vertex up front; `LazyFromSources` only schedules a vertex once at
/// least one of its upstream producers has started running, which matters
/// for batch-style blocking edges but is a no-op for all-pipelined jobs.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum SchedulingStrategy {
    Eager,
    LazyFromSources,
}

#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error(transparent)]
    ExecutionGraph(#[from] ExecutionGraphError),
    #[error("task deployment failed for {job_vertex_id}[{subtask_index}]: {source}")]
    DeploymentFailed {
        job_vertex_id: JobVertexId,
        subtask_index: u32,
        #[source]
        source: ConduitError,
    },
}

/// Seam to the actual RPC call that starts a task on a TaskExecutor
/// (`submitTask`). Kept separate from `SlotRequester` since deployment
/// targets the executor holding the slot, not the resource manager.
#[async_trait::async_trait]
pub trait TaskDeployer: Send + Sync {
    async fn deploy(&self, allocation_id: &AllocationId, job_vertex_id: &JobVertexId, subtask_index: u32) -> Result<()>;
}

pub struct DefaultScheduler {
    pub strategy: SchedulingStrategy,
    slot_allocator: ExecutionSlotAllocator,
    slot_pool: SlotPool,
    deployer: std::sync::Arc<dyn TaskDeployer>,
}

impl DefaultScheduler {
    pub fn new(strategy: SchedulingStrategy, slot_allocator: ExecutionSlotAllocator, slot_pool: SlotPool, deployer: std::sync::Arc<dyn TaskDeployer>) -> Self {
        Self {
            strategy,
            slot_allocator,
            slot_pool,
            deployer,
        }
    }

    /// steps 1-6:
    /// 1. Collect scheduling requirements for every non-terminal,
    ///    not-yet-scheduled vertex (subject to `strategy`).
    /// 2. Batch-request slots via the `ExecutionSlotAllocator`.
    /// 3. Await each assignment.
    /// 4. Transition the vertex Created -> Scheduled -> Deploying.
    /// 5. Deploy to the assigned executor via `TaskDeployer`.
    /// 6. On deploy failure, release the slot and transition to Failed so
    ///    the `FailureHandler` picks it up on the next tick.
    pub async fn allocate_slots_and_deploy(&mut self, graph: &mut ExecutionGraph, resource_profile_for: impl Fn(&JobVertexId) -> ResourceProfile) -> Result<Vec<SchedulerError>> {
        let schedulable: Vec<(JobVertexId, u32)> = graph
            .all_vertices()
            .filter(|v| v.current().state == ExecutionState::Created)
            .filter(|v| self.strategy == SchedulingStrategy::Eager || self.is_source_started(graph, &v.job_vertex_id))
            .map(|v| (v.job_vertex_id.clone(), v.subtask_index))
            .collect();

        if schedulable.is_empty() {
            return Ok(Vec::new());
        }

        let requirements: Vec<ExecutionVertexSchedulingRequirements> = schedulable
            .iter()
            .map(|(job_vertex_id, subtask_index)| ExecutionVertexSchedulingRequirements {
                job_vertex_id: job_vertex_id.clone(),
                subtask_index: *subtask_index,
                resource_profile: resource_profile_for(job_vertex_id),
                slot_sharing_group: None,
                previous_allocation: None,
            })
            .collect();

        for req in &requirements {
            graph.vertex_mut(&req.job_vertex_id, req.subtask_index)?.transition(ExecutionState::Scheduled)?;
        }

        let assignments = self.slot_allocator.allocate_slots(requirements).await;

        let mut errors = Vec::new();
        let mut by_vertex: HashMap<(JobVertexId, u32), AllocationId> = HashMap::new();
        for assignment in assignments {
            match assignment {
                Ok(a) => {
                    by_vertex.insert((a.job_vertex_id.clone(), a.subtask_index), a.allocation_id);
                }
                Err(_e) => {
                    // request itself failed (superseded or RM error); the
                    // vertex stays Scheduled and will be retried on the
                    // next scheduling tick.
                }
            }
        }

        for ((job_vertex_id, subtask_index), allocation_id) in by_vertex {
            let vertex = graph.vertex_mut(&job_vertex_id, subtask_index)?;
            vertex.assign_allocation(allocation_id.clone());
            vertex.transition(ExecutionState::Deploying)?;

            match self.deployer.deploy(&allocation_id, &job_vertex_id, subtask_index).await {
                Ok(()) => {
                    graph.vertex_mut(&job_vertex_id, subtask_index)?.transition(ExecutionState::Running)?;
                }
                Err(source) => {
                    let _ = self.slot_pool.release(&allocation_id);
                    graph.vertex_mut(&job_vertex_id, subtask_index)?.fail(source.to_string())?;
                    errors.push(SchedulerError::DeploymentFailed {
                        job_vertex_id,
                        subtask_index,
                        source,
                    });
                }
            }
        }

        Ok(errors)
    }

    /// `LazyFromSources`: a vertex becomes schedulable once the job's
    /// source vertices are running. Approximated here at the whole-graph
    /// level (no per-edge upstream lookup without JobGraph edges in scope;
    /// `job_master.rs` narrows this per-edge once it threads the JobGraph
    /// through).
    fn is_source_started(&self, graph: &ExecutionGraph, _job_vertex_id: &JobVertexId) -> bool {
        graph.order().first().is_some_and(|first| {
            graph
                .job_vertex(first)
                .map(|jv| jv.vertices.iter().all(|v| matches!(v.current().state, ExecutionState::Running | ExecutionState::Finished)))
                .unwrap_or(true)
        })
    }

    pub fn slot_pool_mut(&mut self) -> &mut SlotPool {
        &mut self.slot_pool
    }
}
