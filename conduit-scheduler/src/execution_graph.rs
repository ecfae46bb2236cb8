//! ExecutionGraph. One `ExecutionJobVertex` per `JobVertex`, holding
//! `parallelism` `ExecutionVertex` children; each `ExecutionVertex` owns a
//! current `Execution` (one attempt) plus a history of prior attempts.
//! Shaped around "vertices of per-subtask executions" rather than stages of
//! tasks, since streaming jobs have no stage boundaries — every vertex runs
//! for the job's lifetime rather than completing before downstream starts.

use conduit_core::ids::{AllocationId, ExecutionAttemptId, JobId, JobVertexId};
use std::collections::HashMap;
use thiserror::Error;

/// "State machine per Execution: Created -> Scheduled -> Deploying
/// -> Running -> Finished / Cancelling -> Canceled / Failed."
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ExecutionState {
    Created,
    Scheduled,
    Deploying,
    Running,
    Finished,
    Cancelling,
    Canceled,
    Failed,
}

impl ExecutionState {
    pub fn is_terminal(self) -> bool {
        matches!(self, ExecutionState::Finished | ExecutionState::Canceled | ExecutionState::Failed)
    }

    /// invariant: "state transitions are monotonic except
    /// Created->Scheduled retried after restart."
    fn valid_transition(self, next: ExecutionState) -> bool {
        use ExecutionState::*;
        matches!(
            (self, next),
            (Created, Scheduled)
                | (Scheduled, Deploying)
                | (Scheduled, Created) // restart before deployment ever began
                | (Deploying, Running)
                | (Deploying, Failed)
                | (Running, Finished)
                | (Running, Cancelling)
                | (Running, Failed)
                | (Cancelling, Canceled)
                | (Scheduled, Failed)
                | (Scheduled, Cancelling)
                | (Created, Failed)
        )
    }
}

#[derive(Debug, Error)]
pub enum ExecutionGraphError {
    #[error("invalid transition {from:?} -> {to:?} for execution {attempt}")]
    InvalidTransition {
        from: ExecutionState,
        to: ExecutionState,
        attempt: String,
    },
    #[error("unknown job vertex {0}")]
    UnknownVertex(String),
    #[error("subtask index {0} out of range")]
    SubtaskOutOfRange(u32),
}

/// One attempt to run a single `ExecutionVertex` ("Execution graph").
#[derive(Clone, Debug)]
pub struct Execution {
    pub attempt_id: ExecutionAttemptId,
    pub attempt_number: u32,
    pub state: ExecutionState,
    pub allocation_id: Option<AllocationId>,
    pub failure_cause: Option<String>,
}

impl Execution {
    fn new(attempt_number: u32) -> Self {
        Self {
            attempt_id: ExecutionAttemptId::new(),
            attempt_number,
            state: ExecutionState::Created,
            allocation_id: None,
            failure_cause: None,
        }
    }
}

/// One physical subtask of a `JobVertex`. Owns exactly one non-terminal
/// `Execution` at a time ( invariant) plus the history of prior
/// attempts, consulted by the failure handler when restoring from the
/// latest completed checkpoint.
pub struct ExecutionVertex {
    pub job_vertex_id: JobVertexId,
    pub subtask_index: u32,
    current: Execution,
    history: Vec<Execution>,
    /// Bumped on every `Created -> Scheduled` re-entry so in-flight slot
    /// futures from a superseded attempt can be detected as stale
    /// (versioning-stamp each for optimistic concurrency).
    version: u64,
}

impl ExecutionVertex {
    fn new(job_vertex_id: JobVertexId, subtask_index: u32) -> Self {
        Self {
            job_vertex_id,
            subtask_index,
            current: Execution::new(0),
            history: Vec::new(),
            version: 0,
        }
    }

    pub fn current(&self) -> &Execution {
        &self.current
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn transition(&mut self, next: ExecutionState) -> Result<(), ExecutionGraphError> {
        if !self.current.state.valid_transition(next) {
            return Err(ExecutionGraphError::InvalidTransition {
                from: self.current.state,
                to: next,
                attempt: self.current.attempt_id.to_string(),
            });
        }
        self.current.state = next;
        Ok(())
    }

    pub fn fail(&mut self, cause: impl Into<String>) -> Result<(), ExecutionGraphError> {
        self.current.failure_cause = Some(cause.into());
        self.transition(ExecutionState::Failed)
    }

    pub fn assign_allocation(&mut self, allocation_id: AllocationId) {
        self.current.allocation_id = Some(allocation_id);
    }

    /// "reset their versions ... re-enter allocate_slots_and_deploy."
    /// Archives the terminal attempt and starts a fresh one at
    /// `Created`, bumping the version so stale in-flight work from the
    /// prior attempt is recognizable.
    pub fn reset_for_restart(&mut self) {
        let next_attempt = self.current.attempt_number + 1;
        let finished = std::mem::replace(&mut self.current, Execution::new(next_attempt));
        self.history.push(finished);
        self.version += 1;
    }

    pub fn history(&self) -> &[Execution] {
        &self.history
    }
}

/// One `JobVertex`'s runtime counterpart: `parallelism` `ExecutionVertex`
/// children ("For each JobVertex, one ExecutionJobVertex with P
/// ExecutionVertex children").
pub struct ExecutionJobVertex {
    pub job_vertex_id: JobVertexId,
    pub vertices: Vec<ExecutionVertex>,
}

/// The full per-job execution state, built once from a compiled `JobGraph`
/// on leadership grant ("Lifecycle").
pub struct ExecutionGraph {
    pub job_id: JobId,
    job_vertices: HashMap<JobVertexId, ExecutionJobVertex>,
    /// Preserves JobGraph vertex order for deterministic iteration (slot
    /// batching, deploy ordering).
    order: Vec<JobVertexId>,
}

impl ExecutionGraph {
    pub fn new(job_id: JobId, job_graph: &conduit_core::graph::JobGraph) -> Self {
        let order: Vec<JobVertexId> = job_graph.vertices.iter().map(|v| v.id.clone()).collect();
        let job_vertices = job_graph
            .vertices
            .iter()
            .map(|v| {
                let vertices = (0..v.parallelism).map(|i| ExecutionVertex::new(v.id.clone(), i)).collect();
                (v.id.clone(), ExecutionJobVertex { job_vertex_id: v.id.clone(), vertices })
            })
            .collect();

        Self { job_id, job_vertices, order }
    }

    pub fn job_vertex(&self, id: &JobVertexId) -> Option<&ExecutionJobVertex> {
        self.job_vertices.get(id)
    }

    pub fn job_vertex_mut(&mut self, id: &JobVertexId) -> Option<&mut ExecutionJobVertex> {
        self.job_vertices.get_mut(id)
    }

    pub fn order(&self) -> &[JobVertexId] {
        &self.order
    }

    /// All `ExecutionVertex`s across the whole graph, in JobGraph order.
    pub fn all_vertices(&self) -> impl Iterator<Item = &ExecutionVertex> {
        self.order.iter().flat_map(move |id| self.job_vertices[id].vertices.iter())
    }

    pub fn all_vertices_mut(&mut self) -> impl Iterator<Item = &mut ExecutionVertex> {
        self.job_vertices.values_mut().flat_map(|jv| jv.vertices.iter_mut())
    }

    pub fn vertex_mut(&mut self, job_vertex_id: &JobVertexId, subtask_index: u32) -> Result<&mut ExecutionVertex, ExecutionGraphError> {
        let jv = self.job_vertices.get_mut(job_vertex_id).ok_or_else(|| ExecutionGraphError::UnknownVertex(job_vertex_id.to_string()))?;
        jv.vertices.get_mut(subtask_index as usize).ok_or(ExecutionGraphError::SubtaskOutOfRange(subtask_index))
    }

    /// invariant: "at most one Execution attempt of v is in a
    /// non-terminal state at any time" — true by construction since
    /// `ExecutionVertex` holds exactly one `current` execution, but
    /// exposed here so tests can assert the graph-wide property directly.
    pub fn all_non_terminal_executions_unique(&self) -> bool {
        self.all_vertices().all(|v| !v.current().state.is_terminal() || v.history().iter().all(|e| e.state.is_terminal()))
    }

    /// "Running -> Restarting -> Running" job-status transition:
    /// true while any vertex is mid-restart (has a non-terminal Created
    /// execution following a Failed/Canceled history entry).
    pub fn is_restarting(&self) -> bool {
        self.all_vertices()
            .any(|v| v.current.state == ExecutionState::Created && !v.history.is_empty())
    }

    pub fn is_globally_terminal(&self) -> bool {
        self.all_vertices().all(|v| v.current.state.is_terminal())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use conduit_core::graph::{InputDependencyConstraint, JobGraph, JobVertex};

    fn graph_with(parallelism: u32) -> ExecutionGraph {
        let job_graph = JobGraph {
            vertices: vec![JobVertex {
                id: JobVertexId::new("v1"),
                invokable_class_name: "noop".into(),
                parallelism,
                max_parallelism: 128,
                chained_operator_configs: vec![],
                slot_sharing_group: None,
                co_location_constraint: None,
                input_dependency_constraint: InputDependencyConstraint::All,
            }],
            edges: vec![],
        };
        ExecutionGraph::new(JobId::new("job-1"), &job_graph)
    }

    #[test]
    fn builds_one_execution_vertex_per_parallel_subtask() {
        let graph = graph_with(3);
        assert_eq!(graph.job_vertex(&JobVertexId::new("v1")).unwrap().vertices.len(), 3);
    }

    #[test]
    fn valid_lifecycle_transitions_succeed() {
        let mut graph = graph_with(1);
        let v = graph.vertex_mut(&JobVertexId::new("v1"), 0).unwrap();
        v.transition(ExecutionState::Scheduled).unwrap();
        v.transition(ExecutionState::Deploying).unwrap();
        v.transition(ExecutionState::Running).unwrap();
        v.transition(ExecutionState::Finished).unwrap();
        assert_eq!(v.current().state, ExecutionState::Finished);
    }

    #[test]
    fn skipping_a_state_is_rejected() {
        let mut graph = graph_with(1);
        let v = graph.vertex_mut(&JobVertexId::new("v1"), 0).unwrap();
        assert!(v.transition(ExecutionState::Running).is_err());
    }

    #[test]
    fn restart_archives_prior_attempt_and_bumps_version() {
        let mut graph = graph_with(1);
        let v = graph.vertex_mut(&JobVertexId::new("v1"), 0).unwrap();
        v.transition(ExecutionState::Scheduled).unwrap();
        v.transition(ExecutionState::Deploying).unwrap();
        v.fail("operator threw").unwrap();

        let version_before = v.version();
        v.reset_for_restart();

        assert_eq!(v.current().state, ExecutionState::Created);
        assert_eq!(v.current().attempt_number, 1);
        assert_eq!(v.history().len(), 1);
        assert_eq!(v.history()[0].state, ExecutionState::Failed);
        assert_eq!(v.version(), version_before + 1);
    }

    #[test]
    fn globally_terminal_requires_every_vertex_terminal() {
        let mut graph = graph_with(2);
        assert!(!graph.is_globally_terminal());
        for v in graph.all_vertices_mut() {
            v.transition(ExecutionState::Scheduled).unwrap();
            v.transition(ExecutionState::Deploying).unwrap();
            v.transition(ExecutionState::Running).unwrap();
            v.transition(ExecutionState::Finished).unwrap();
        }
        assert!(graph.is_globally_terminal());
    }
}
