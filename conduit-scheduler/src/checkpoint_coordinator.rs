//! CheckpointCoordinator ("Global coordination (job master)").
//! Triggers checkpoints on trigger vertices, aggregates per-subtask
//! acknowledgements into a `PendingCheckpoint`, and on full ack writes a
//! `CompletedCheckpoint` and notifies commit vertices. An event-loop state
//! machine driven by inbound acks rather than polling, paired with
//! `conduit-executor::checkpoint` for the per-subtask counterpart this
//! coordinates.

use conduit_core::config::{CheckpointDefaults, CheckpointRetentionPolicy};
use conduit_core::ids::{CheckpointId, ExecutionAttemptId, JobVertexId};
use conduit_core::state_backend::StateHandle;
use std::collections::{HashMap, HashSet};
use std::time::{Duration, Instant};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CheckpointCoordinatorError {
    #[error("checkpoint {0} is not pending")]
    UnknownCheckpoint(CheckpointId),
    #[error("max concurrent checkpoints ({0}) already in flight")]
    TooManyInFlight(u32),
    #[error("checkpoint triggered before min_pause_between_checkpoints elapsed")]
    MinPauseNotElapsed,
    #[error("job has exceeded its tolerable checkpoint failure count")]
    TolerableFailuresExceeded,
}

/// A checkpoint that has been triggered but not yet fully acknowledged
/// ("the coordinator tracks, per checkpoint id, the set of
/// acks still outstanding"). Finalization gates on two independent sets:
/// per-subtask execution-attempt acks, and per-vertex operator-coordinator
/// acks (job-level state — e.g. a source's split enumerator — that isn't
/// owned by any one parallel subtask and so acks once per vertex rather
/// than once per attempt).
pub struct PendingCheckpoint {
    pub checkpoint_id: CheckpointId,
    pub triggered_at: Instant,
    outstanding: HashSet<ExecutionAttemptId>,
    acknowledged: HashMap<ExecutionAttemptId, StateHandle>,
    outstanding_coordinators: HashSet<JobVertexId>,
    acknowledged_coordinators: HashMap<JobVertexId, StateHandle>,
    declined: bool,
}

impl PendingCheckpoint {
    pub fn is_fully_acknowledged(&self) -> bool {
        self.outstanding.is_empty() && self.outstanding_coordinators.is_empty() && !self.declined
    }

    pub fn is_declined(&self) -> bool {
        self.declined
    }
}

/// A successfully completed checkpoint, retained per the job's retention
/// policy. Retain-on-failure and retain-on-cancellation are independent of
/// whether externalized checkpoints are enabled.
#[derive(Clone, Debug)]
pub struct CompletedCheckpoint {
    pub checkpoint_id: CheckpointId,
    pub completed_at: Instant,
    pub state_handles: HashMap<ExecutionAttemptId, StateHandle>,
    pub coordinator_state_handles: HashMap<JobVertexId, StateHandle>,
}

pub struct CheckpointCoordinator {
    defaults: CheckpointDefaults,
    trigger_vertices: Vec<JobVertexId>,
    ack_vertices: Vec<JobVertexId>,
    commit_vertices: Vec<JobVertexId>,
    /// Vertices that own an operator coordinator (job-level state not
    /// owned by any one parallel subtask, e.g. a source's split
    /// enumerator) and so must ack each checkpoint once per vertex.
    coordinator_vertices: Vec<JobVertexId>,
    /// All subtask attempts expected to ack each triggered checkpoint,
    /// keyed by job vertex (populated from the `ExecutionGraph` at trigger
    /// time by the caller; see `job_master.rs`).
    pending: HashMap<CheckpointId, PendingCheckpoint>,
    completed: Vec<CompletedCheckpoint>,
    next_checkpoint_id: CheckpointId,
    last_triggered_at: Option<Instant>,
    last_completed_at: Option<Instant>,
    consecutive_failures: u32,
}

impl CheckpointCoordinator {
    pub fn new(
        defaults: CheckpointDefaults,
        trigger_vertices: Vec<JobVertexId>,
        ack_vertices: Vec<JobVertexId>,
        commit_vertices: Vec<JobVertexId>,
        coordinator_vertices: Vec<JobVertexId>,
    ) -> Self {
        Self {
            defaults,
            trigger_vertices,
            ack_vertices,
            commit_vertices,
            coordinator_vertices,
            pending: HashMap::new(),
            completed: Vec::new(),
            next_checkpoint_id: CheckpointId::first(),
            last_triggered_at: None,
            last_completed_at: None,
            consecutive_failures: 0,
        }
    }

    pub fn trigger_vertices(&self) -> &[JobVertexId] {
        &self.trigger_vertices
    }

    pub fn commit_vertices(&self) -> &[JobVertexId] {
        &self.commit_vertices
    }

    pub fn coordinator_vertices(&self) -> &[JobVertexId] {
        &self.coordinator_vertices
    }

    /// "trigger_checkpoint(expected_acks)": enforces
    /// `max_concurrent_checkpoints` and `min_pause_between_checkpoints`
    /// before minting a new id and opening a `PendingCheckpoint`.
    pub fn trigger_checkpoint(
        &mut self,
        now: Instant,
        expected_acks: impl IntoIterator<Item = ExecutionAttemptId>,
    ) -> Result<CheckpointId, CheckpointCoordinatorError> {
        if self.pending.len() as u32 >= self.defaults.max_concurrent_checkpoints {
            return Err(CheckpointCoordinatorError::TooManyInFlight(self.defaults.max_concurrent_checkpoints));
        }
        if let Some(last) = self.last_triggered_at {
            if now.saturating_duration_since(last) < self.defaults.min_pause_between_checkpoints {
                return Err(CheckpointCoordinatorError::MinPauseNotElapsed);
            }
        }

        let checkpoint_id = self.next_checkpoint_id;
        self.next_checkpoint_id = self.next_checkpoint_id.next();
        self.last_triggered_at = Some(now);

        self.pending.insert(
            checkpoint_id,
            PendingCheckpoint {
                checkpoint_id,
                triggered_at: now,
                outstanding: expected_acks.into_iter().collect(),
                acknowledged: HashMap::new(),
                outstanding_coordinators: self.coordinator_vertices.iter().cloned().collect(),
                acknowledged_coordinators: HashMap::new(),
                declined: false,
            },
        );

        Ok(checkpoint_id)
    }

    /// "on AcknowledgeCheckpoint, remove the subtask from the
    /// outstanding set; once empty, finalize." Returns the completed
    /// checkpoint when this was the final outstanding ack — which requires
    /// every operator coordinator to have acked too, not just every
    /// subtask.
    pub fn acknowledge(
        &mut self,
        now: Instant,
        checkpoint_id: CheckpointId,
        attempt: ExecutionAttemptId,
        state_handle: StateHandle,
    ) -> Result<Option<CompletedCheckpoint>, CheckpointCoordinatorError> {
        let pending = self.pending.get_mut(&checkpoint_id).ok_or(CheckpointCoordinatorError::UnknownCheckpoint(checkpoint_id))?;
        pending.outstanding.remove(&attempt);
        pending.acknowledged.insert(attempt, state_handle);
        self.finalize_if_ready(now, checkpoint_id)
    }

    /// Counterpart to `acknowledge` for operator-coordinator state: a
    /// checkpoint can't complete while an owning vertex's coordinator (its
    /// split enumerator or other job-level state) still hasn't acked, even
    /// once every parallel subtask has.
    pub fn acknowledge_coordinator(
        &mut self,
        now: Instant,
        checkpoint_id: CheckpointId,
        vertex_id: JobVertexId,
        state_handle: StateHandle,
    ) -> Result<Option<CompletedCheckpoint>, CheckpointCoordinatorError> {
        let pending = self.pending.get_mut(&checkpoint_id).ok_or(CheckpointCoordinatorError::UnknownCheckpoint(checkpoint_id))?;
        pending.outstanding_coordinators.remove(&vertex_id);
        pending.acknowledged_coordinators.insert(vertex_id, state_handle);
        self.finalize_if_ready(now, checkpoint_id)
    }

    fn finalize_if_ready(&mut self, now: Instant, checkpoint_id: CheckpointId) -> Result<Option<CompletedCheckpoint>, CheckpointCoordinatorError> {
        let pending = self.pending.get(&checkpoint_id).ok_or(CheckpointCoordinatorError::UnknownCheckpoint(checkpoint_id))?;
        if !pending.is_fully_acknowledged() {
            return Ok(None);
        }

        let pending = self.pending.remove(&checkpoint_id).unwrap();
        self.consecutive_failures = 0;
        self.last_completed_at = Some(now);
        let completed = CompletedCheckpoint {
            checkpoint_id,
            completed_at: now,
            state_handles: pending.acknowledged,
            coordinator_state_handles: pending.acknowledged_coordinators,
        };
        self.retain(completed.clone());
        Ok(Some(completed))
    }

    /// "on DeclineCheckpoint, abort the whole checkpoint and
    /// increment the consecutive-failure counter; past
    /// tolerable_checkpoint_failures, the job fails."
    pub fn decline(&mut self, checkpoint_id: CheckpointId) -> Result<(), CheckpointCoordinatorError> {
        let pending = self.pending.get_mut(&checkpoint_id).ok_or(CheckpointCoordinatorError::UnknownCheckpoint(checkpoint_id))?;
        pending.declined = true;
        self.pending.remove(&checkpoint_id);
        self.consecutive_failures += 1;
        if self.consecutive_failures > self.defaults.tolerable_checkpoint_failures {
            return Err(CheckpointCoordinatorError::TolerableFailuresExceeded);
        }
        Ok(())
    }

    /// Retains a completed checkpoint in the in-memory store; eviction to
    /// just the latest N is an operational concern of the state backend's
    /// garbage collection, not modeled here.
    fn retain(&mut self, completed: CompletedCheckpoint) {
        self.completed.push(completed);
    }

    pub fn latest_completed(&self) -> Option<&CompletedCheckpoint> {
        self.completed.last()
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Whether a completed checkpoint should survive job
    /// cancellation/failure is independent of whether externalized
    /// (disk-persisted) checkpoints are enabled at all.
    pub fn should_retain_on_terminal(&self, terminal: TerminalReason) -> bool {
        match (terminal, &self.defaults.retention) {
            (_, CheckpointRetentionPolicy::NeverRetain) => false,
            (TerminalReason::Cancelled, CheckpointRetentionPolicy::RetainOnCancel) => true,
            (TerminalReason::Failed, CheckpointRetentionPolicy::RetainOnFailure) => true,
            _ => false,
        }
    }

    pub fn interval(&self) -> Duration {
        self.defaults.interval
    }

    pub fn timeout(&self) -> Duration {
        self.defaults.timeout
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum TerminalReason {
    Cancelled,
    Failed,
}
