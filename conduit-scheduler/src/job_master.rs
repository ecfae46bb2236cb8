//! JobMaster. One `JobMaster` per running job, composing the
//! `ExecutionGraph`, `DefaultScheduler`, `FailureHandler` and
//! `CheckpointCoordinator` behind a `conduit_coordination::Endpoint` so every
//! RPC handler and timer callback runs serially against shared state without
//! locks.

use crate::checkpoint_coordinator::{CheckpointCoordinator, CompletedCheckpoint};
use crate::execution_graph::{ExecutionGraph, ExecutionState};
use crate::failure_handler::FailureHandler;
use crate::graph_compiler::JobCheckpointingSettings;
use crate::metrics::SchedulerMetricsCollector;
use crate::scheduler::DefaultScheduler;
use crate::slot_pool::SlotPool;
use conduit_core::ids::{AllocationId, ExecutionAttemptId, JobId, JobVertexId};
use conduit_core::resource::ResourceProfile;
use conduit_core::state_backend::StateHandle;
use conduit_coordination::{Endpoint, EndpointLifecycle, MailboxClosed};
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum JobMasterError {
    #[error("mailbox closed: job master has shut down")]
    MailboxClosed,
    #[error(transparent)]
    ExecutionGraph(#[from] crate::execution_graph::ExecutionGraphError),
    #[error(transparent)]
    Scheduler(#[from] crate::scheduler::SchedulerError),
    #[error(transparent)]
    Checkpoint(#[from] crate::checkpoint_coordinator::CheckpointCoordinatorError),
    #[error(transparent)]
    Failure(#[from] crate::failure_handler::FailureHandlerError),
    #[error(transparent)]
    Core(#[from] conduit_core::error::ConduitError),
}

impl From<MailboxClosed> for JobMasterError {
    fn from(_: MailboxClosed) -> Self {
        JobMasterError::MailboxClosed
    }
}

/// All state private to one job's mailbox loop ("shared state
/// mutations require no locks because they are queued").
pub struct JobMasterState {
    pub job_id: JobId,
    pub execution_graph: ExecutionGraph,
    pub scheduler: DefaultScheduler,
    pub failure_handler: FailureHandler,
    pub checkpoint_coordinator: CheckpointCoordinator,
    pub metrics: Arc<dyn SchedulerMetricsCollector>,
}

struct NoopLifecycle;
impl EndpointLifecycle for NoopLifecycle {}

/// One running job's coordination surface. The `Endpoint<JobMasterState>`
/// serializes every call below against the same `JobMasterState`, so none
/// of these methods need internal locking despite being reachable
/// concurrently from gRPC handlers and internal timers.
pub struct JobMaster {
    endpoint: Endpoint<JobMasterState>,
    lifecycle: NoopLifecycle,
}

impl JobMaster {
    pub fn new(
        address: impl Into<String>,
        job_id: JobId,
        execution_graph: ExecutionGraph,
        scheduler: DefaultScheduler,
        failure_handler: FailureHandler,
        checkpoint_coordinator: CheckpointCoordinator,
        metrics: Arc<dyn SchedulerMetricsCollector>,
    ) -> Self {
        metrics.record_job_submitted(job_id.as_str());
        let state = JobMasterState {
            job_id,
            execution_graph,
            scheduler,
            failure_handler,
            checkpoint_coordinator,
            metrics,
        };
        Self {
            endpoint: Endpoint::new(address, state),
            lifecycle: NoopLifecycle,
        }
    }

    pub fn address(&self) -> &str {
        &self.endpoint.context.address
    }

    pub fn fencing_token(&self) -> Option<conduit_core::ids::FencingToken> {
        self.endpoint.context.current_fencing_token()
    }

    pub fn grant_leadership(&self, token: conduit_core::ids::FencingToken) {
        self.endpoint.context.set_fencing_token(Some(token), &self.lifecycle);
    }

    pub fn revoke_leadership(&self) {
        self.endpoint.context.set_fencing_token(None, &self.lifecycle);
    }

    /// drives one scheduling round. Called on job start and
    /// again after every restart. Uses `submit_async` since slot
    /// allocation awaits the resource manager; the mailbox still
    /// processes this as one atomic step before the next queued mail.
    pub async fn schedule(&self, resource_profile: ResourceProfile) -> Result<Vec<crate::scheduler::SchedulerError>, JobMasterError> {
        let result: conduit_core::error::Result<Vec<crate::scheduler::SchedulerError>> = self
            .endpoint
            .submit_async(
                move |s: &mut JobMasterState| -> futures::future::BoxFuture<'_, conduit_core::error::Result<Vec<crate::scheduler::SchedulerError>>> {
                    Box::pin(async move { s.scheduler.allocate_slots_and_deploy(&mut s.execution_graph, move |_| resource_profile.clone()).await })
                },
            )
            .await?;
        Ok(result?)
    }

    /// `updateTaskExecutionState`: an executor reports a subtask
    /// reached a terminal state. A `Failed` report routes through the
    /// `FailureHandler`; other terminal states just record the transition.
    pub async fn report_task_state(&self, job_vertex_id: JobVertexId, subtask_index: u32, state: ExecutionState, cause: Option<String>) -> Result<Option<std::time::Duration>, JobMasterError> {
        self.endpoint
            .submit(move |s: &mut JobMasterState| -> Result<Option<std::time::Duration>, JobMasterError> {
                if state == ExecutionState::Failed {
                    let outcome = s.failure_handler.handle_failure(&mut s.execution_graph, &job_vertex_id, subtask_index, cause.unwrap_or_default());
                    if outcome.is_err() {
                        s.metrics.record_job_failed(s.job_id.as_str());
                    } else {
                        s.metrics.record_restart(s.job_id.as_str());
                    }
                    Ok(Some(outcome?))
                } else {
                    s.execution_graph.vertex_mut(&job_vertex_id, subtask_index)?.transition(state)?;
                    if state == ExecutionState::Running {
                        s.failure_handler.record_successful_run();
                    }
                    if s.execution_graph.is_globally_terminal() {
                        s.metrics.record_job_completed(s.job_id.as_str(), 0);
                    }
                    Ok(None)
                }
            })
            .await?
    }

    /// triggers a checkpoint against every vertex the compiler
    /// marked as a checkpoint participant.
    pub async fn trigger_checkpoint(&self) -> Result<conduit_core::ids::CheckpointId, JobMasterError> {
        self.endpoint
            .submit(|s: &mut JobMasterState| -> Result<conduit_core::ids::CheckpointId, JobMasterError> {
                let expected: Vec<ExecutionAttemptId> = s.execution_graph.all_vertices().map(|v| v.current().attempt_id).collect();
                Ok(s.checkpoint_coordinator.trigger_checkpoint(Instant::now(), expected)?)
            })
            .await?
    }

    pub async fn acknowledge_checkpoint(
        &self,
        checkpoint_id: conduit_core::ids::CheckpointId,
        attempt_id: ExecutionAttemptId,
        state_handle: StateHandle,
    ) -> Result<Option<CompletedCheckpoint>, JobMasterError> {
        self.endpoint
            .submit(move |s: &mut JobMasterState| -> Result<Option<CompletedCheckpoint>, JobMasterError> {
                let completed = s.checkpoint_coordinator.acknowledge(Instant::now(), checkpoint_id, attempt_id, state_handle)?;
                if let Some(completed) = &completed {
                    s.metrics.record_checkpoint_completed(s.job_id.as_str(), completed.checkpoint_id.0, 0);
                }
                Ok(completed)
            })
            .await?
    }

    pub async fn acknowledge_checkpoint_coordinator(
        &self,
        checkpoint_id: conduit_core::ids::CheckpointId,
        vertex_id: JobVertexId,
        state_handle: StateHandle,
    ) -> Result<Option<CompletedCheckpoint>, JobMasterError> {
        self.endpoint
            .submit(move |s: &mut JobMasterState| -> Result<Option<CompletedCheckpoint>, JobMasterError> {
                let completed = s.checkpoint_coordinator.acknowledge_coordinator(Instant::now(), checkpoint_id, vertex_id, state_handle)?;
                if let Some(completed) = &completed {
                    s.metrics.record_checkpoint_completed(s.job_id.as_str(), completed.checkpoint_id.0, 0);
                }
                Ok(completed)
            })
            .await?
    }

    pub async fn decline_checkpoint(&self, checkpoint_id: conduit_core::ids::CheckpointId) -> Result<(), JobMasterError> {
        self.endpoint
            .submit(move |s: &mut JobMasterState| -> Result<(), JobMasterError> {
                s.metrics.record_checkpoint_declined(s.job_id.as_str(), checkpoint_id.0);
                Ok(s.checkpoint_coordinator.decline(checkpoint_id)?)
            })
            .await?
    }

    pub async fn offer_slot(&self, allocation_id: AllocationId, slot_id: conduit_core::ids::SlotId, profile: ResourceProfile) -> Result<(), JobMasterError> {
        self.endpoint
            .submit(move |s: &mut JobMasterState| {
                s.scheduler.slot_pool_mut().offer_slot(allocation_id, slot_id, profile);
            })
            .await?;
        Ok(())
    }

    pub async fn is_globally_terminal(&self) -> Result<bool, JobMasterError> {
        Ok(self.endpoint.submit(|s: &mut JobMasterState| s.execution_graph.is_globally_terminal()).await?)
    }
}

/// Source vertices (no incoming edges) are the ones that own an operator
/// coordinator in practice — a split enumerator has no upstream subtask to
/// live inside — so `trigger_vertices` doubles as the coordinator set.
pub fn checkpoint_coordinator_from_settings(settings: &JobCheckpointingSettings) -> CheckpointCoordinator {
    CheckpointCoordinator::new(
        conduit_core::config::CheckpointDefaults {
            interval: settings.interval,
            timeout: settings.timeout,
            min_pause_between_checkpoints: settings.min_pause_between_checkpoints,
            max_concurrent_checkpoints: settings.max_concurrent_checkpoints,
            tolerable_checkpoint_failures: settings.tolerable_failure_count,
            exactly_once: settings.exactly_once,
            unaligned_enabled: settings.unaligned_enabled,
            retention: settings.retention,
        },
        settings.trigger_vertices.clone(),
        settings.ack_vertices.clone(),
        settings.commit_vertices.clone(),
        settings.trigger_vertices.clone(),
    )
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::failure_handler::{FailoverStrategy, RestartBackoffTimeStrategy};
    use crate::graph_compiler::{DataExchangeMode, GraphCompiler};
    use crate::scheduler::{SchedulingStrategy, TaskDeployer};
    use crate::slot_allocator::{ExecutionSlotAllocator, SlotRequester};
    use conduit_core::error::Result;
    use conduit_core::graph::{ChainingStrategy, Partitioner, ShuffleMode, StreamEdge, StreamGraph, StreamNode};
    use conduit_core::ids::OperatorId;
    use std::sync::Arc;

    struct FakeRequester;
    #[async_trait::async_trait]
    impl SlotRequester for FakeRequester {
        async fn request_slot(&self, _profile: ResourceProfile) -> Result<AllocationId> {
            Ok(AllocationId::new("alloc-1"))
        }
    }

    struct FakeDeployer;
    #[async_trait::async_trait]
    impl TaskDeployer for FakeDeployer {
        async fn deploy(&self, _allocation_id: &AllocationId, _job_vertex_id: &JobVertexId, _subtask_index: u32) -> Result<()> {
            Ok(())
        }
    }

    fn build_job_master() -> JobMaster {
        let mut stream_graph = StreamGraph::new();
        stream_graph.add_node(StreamNode {
            operator_id: OperatorId::new("source"),
            operator_factory: vec![],
            parallelism: 1,
            max_parallelism: 128,
            keyed: false,
            slot_sharing_group: Some("default".into()),
            chaining_strategy: ChainingStrategy::Head,
        });
        stream_graph.add_node(StreamNode {
            operator_id: OperatorId::new("sink"),
            operator_factory: vec![],
            parallelism: 1,
            max_parallelism: 128,
            keyed: false,
            slot_sharing_group: Some("default".into()),
            chaining_strategy: ChainingStrategy::Always,
        });
        stream_graph.add_edge(StreamEdge {
            source: OperatorId::new("source"),
            target: OperatorId::new("sink"),
            partitioner: Partitioner::Forward,
            shuffle_mode: ShuffleMode::Pipelined,
        });

        let compiler = GraphCompiler::new(DataExchangeMode::ForwardPipelined, true);
        let (job_graph, settings) = compiler.compile(&stream_graph, &Default::default()).unwrap();

        let job_id = JobId::new("job-1");
        let execution_graph = ExecutionGraph::new(job_id.clone(), &job_graph);
        let allocator = ExecutionSlotAllocator::new(Arc::new(FakeRequester));
        let scheduler = DefaultScheduler::new(SchedulingStrategy::Eager, allocator, SlotPool::new(), Arc::new(FakeDeployer));
        let failure_handler = FailureHandler::new(FailoverStrategy::Full, RestartBackoffTimeStrategy::new(conduit_core::backoff::ExponentialBackoff::default(), 3));
        let checkpoint_coordinator = checkpoint_coordinator_from_settings(&settings);
        let metrics: Arc<dyn SchedulerMetricsCollector> = Arc::new(crate::test_utils::TestMetricsCollector::default());

        JobMaster::new("127.0.0.1:9100", job_id, execution_graph, scheduler, failure_handler, checkpoint_coordinator, metrics)
    }

    #[tokio::test]
    async fn leadership_grant_updates_fencing_token() {
        let jm = build_job_master();
        assert!(jm.fencing_token().is_none());
        jm.grant_leadership(conduit_core::ids::FencingToken::new());
        assert!(jm.fencing_token().is_some());
    }

    #[tokio::test]
    async fn trigger_checkpoint_returns_first_id() {
        let jm = build_job_master();
        let id = jm.trigger_checkpoint().await.unwrap();
        assert_eq!(id, conduit_core::ids::CheckpointId::first());
    }
}
