//! SubtaskCheckpointCoordinator ("Local snapshot (per task)").
//! Drives one task's side of a checkpoint: synchronous pre-barrier hook,
//! barrier broadcast, optional unaligned spill, operator snapshot, and the
//! acknowledge/decline report back to the job master's `CheckpointCoordinator`
//! (`conduit-scheduler::checkpoint`).

use crate::operator_chain::OperatorChain;
use crate::result_partition::ResultPartition;
use conduit_core::error::Result;
use conduit_core::ids::{CheckpointId, ExecutionAttemptId};
use conduit_core::state_backend::StateBackend;
use conduit_runtime::events::{CheckpointOptions, CheckpointType};
use std::sync::Arc;

/// Sent to the coordinating `CheckpointCoordinator` on success: an
/// `AcknowledgeCheckpoint(cid, subtask, metrics, state-handles)` message.
pub struct CheckpointAck {
    pub checkpoint_id: CheckpointId,
    pub execution_attempt_id: ExecutionAttemptId,
}

/// Sent on any synchronous-phase failure ("On any synchronous
/// failure, broadcast CancelCheckpointMarker(cid) downstream and
/// DeclineCheckpoint(cid, cause) to the coordinator").
pub struct CheckpointDecline {
    pub checkpoint_id: CheckpointId,
    pub execution_attempt_id: ExecutionAttemptId,
    pub cause: String,
}

pub enum CheckpointResult {
    Acknowledged(CheckpointAck),
    Declined(CheckpointDecline),
}

/// Runs one task's local snapshot for a single triggered checkpoint.
pub struct SubtaskCheckpointCoordinator {
    execution_attempt_id: ExecutionAttemptId,
}

impl SubtaskCheckpointCoordinator {
    pub fn new(execution_attempt_id: ExecutionAttemptId) -> Self {
        Self { execution_attempt_id }
    }

    /// local snapshot steps 1-5, adapted per `options.checkpoint_type`:
    /// - `Aligned`: barrier alignment itself is handled by the input gate
    ///   before this is invoked (the task calls this only once aligned).
    /// - `Unaligned`: forwards the barrier *before* snapshotting in-flight
    ///   state (steps (a)(b) reordered ahead of the operator snapshot).
    /// - `AtLeastOnce`: no alignment; barrier forwarded immediately, state
    ///   captured without blocking record processing.
    pub async fn checkpoint<T: Clone + Send + 'static>(
        &self,
        checkpoint_id: CheckpointId,
        timestamp: u64,
        options: CheckpointOptions,
        chain: &mut OperatorChain<T>,
        result_partition: &ResultPartition,
        state_backend: &Arc<dyn StateBackend>,
    ) -> CheckpointResult {
        let barrier_event = conduit_runtime::events::ChannelEvent::CheckpointBarrier {
            checkpoint_id,
            timestamp,
            options: options.clone(),
        };

        if matches!(options.checkpoint_type, CheckpointType::Unaligned | CheckpointType::AtLeastOnce) {
            // forward before snapshotting:  unaligned step (a).
            result_partition.broadcast_event(barrier_event.clone()).await;
        }

        match self.run_local_snapshot(checkpoint_id, chain, state_backend).await {
            Ok(()) => {
                if matches!(options.checkpoint_type, CheckpointType::Aligned) {
                    result_partition.broadcast_event(barrier_event).await;
                }
                CheckpointResult::Acknowledged(CheckpointAck {
                    checkpoint_id,
                    execution_attempt_id: self.execution_attempt_id,
                })
            }
            Err(e) => {
                result_partition
                    .broadcast_event(conduit_runtime::events::ChannelEvent::CancelCheckpointMarker(checkpoint_id))
                    .await;
                CheckpointResult::Declined(CheckpointDecline {
                    checkpoint_id,
                    execution_attempt_id: self.execution_attempt_id,
                    cause: e.to_string(),
                })
            }
        }
    }

    async fn run_local_snapshot<T: Clone + Send + 'static>(
        &self,
        checkpoint_id: CheckpointId,
        chain: &mut OperatorChain<T>,
        state_backend: &Arc<dyn StateBackend>,
    ) -> Result<()> {
        chain.snapshot_all(checkpoint_id, state_backend).await
    }

    pub fn execution_attempt_id(&self) -> ExecutionAttemptId {
        self.execution_attempt_id
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::operator_chain::Operator;
    use conduit_core::state_backend::InMemoryStateBackend;
    use conduit_runtime::{BufferPool, NetworkBufferPool};

    struct NoopOperator;

    #[async_trait::async_trait]
    impl Operator<i32> for NoopOperator {
        async fn process_element(&mut self, element: i32, downstream: &dyn Fn(i32)) -> Result<()> {
            downstream(element);
            Ok(())
        }
        async fn snapshot_state(&mut self, _checkpoint_id: CheckpointId, _backend: &dyn StateBackend) -> Result<()> {
            Ok(())
        }
    }

    fn buffer_pool() -> BufferPool {
        NetworkBufferPool::new(1024, 8).create_buffer_pool(4).unwrap()
    }

    #[tokio::test]
    async fn successful_snapshot_acknowledges() {
        let mut chain = OperatorChain::new(vec![Box::new(NoopOperator)]);
        let partition = ResultPartition::new(1, buffer_pool(), 2);
        let backend: Arc<dyn StateBackend> = InMemoryStateBackend::new();
        let coordinator = SubtaskCheckpointCoordinator::new(ExecutionAttemptId::new());

        let result = coordinator
            .checkpoint(
                CheckpointId::first(),
                0,
                CheckpointOptions {
                    checkpoint_type: CheckpointType::Aligned,
                },
                &mut chain,
                &partition,
                &backend,
            )
            .await;

        assert!(matches!(result, CheckpointResult::Acknowledged(_)));
    }
}
