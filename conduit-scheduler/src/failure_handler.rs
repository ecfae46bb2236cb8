//! FailureHandler. Decides, on a task failure or TaskManager loss, whether
//! to restart just the affected region of the `ExecutionGraph` or the whole
//! job, and how long to wait before restarting. Restart scope is a
//! "connected failover region" rather than a stage, since streaming jobs
//! have no stage boundaries to restart independently.

use crate::execution_graph::{ExecutionGraph, ExecutionGraphError, ExecutionState};
use conduit_core::ids::JobVertexId;
use std::collections::{HashSet, VecDeque};
use std::time::Duration;

/// "two failover strategies: full graph restart, or
/// region-local restart scoped to the failed vertex's connected component
/// under pipelined edges."
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum FailoverStrategy {
    Full,
    RegionLocal,
}

/// backoff config ("restart-backoff: exponential with jitter,
/// capped"), reusing the same shape as `conduit_core::backoff`.
pub struct RestartBackoffTimeStrategy {
    backoff: conduit_core::backoff::ExponentialBackoff,
    tolerable_failures: u32,
    failures_seen: u32,
}

impl RestartBackoffTimeStrategy {
    pub fn new(backoff: conduit_core::backoff::ExponentialBackoff, tolerable_failures: u32) -> Self {
        Self {
            backoff,
            tolerable_failures,
            failures_seen: 0,
        }
    }

    /// "a job fails permanently once consecutive failures exceed
    /// the tolerable-failure count."
    pub fn record_failure(&mut self) -> Option<Duration> {
        self.failures_seen += 1;
        if self.failures_seen > self.tolerable_failures {
            None
        } else {
            Some(self.backoff.next_delay())
        }
    }

    pub fn record_recovery(&mut self) {
        self.failures_seen = 0;
        self.backoff.reset();
    }
}

#[derive(Debug, thiserror::Error)]
pub enum FailureHandlerError {
    #[error(transparent)]
    ExecutionGraph(#[from] ExecutionGraphError),
    #[error("job has exceeded its tolerable failure count and will not be restarted")]
    PermanentFailure,
}

/// Decides failover scope and drives the restart itself.
pub struct FailureHandler {
    pub strategy: FailoverStrategy,
    restart_strategy: RestartBackoffTimeStrategy,
}

impl FailureHandler {
    pub fn new(strategy: FailoverStrategy, restart_strategy: RestartBackoffTimeStrategy) -> Self {
        Self { strategy, restart_strategy }
    }

    /// "on a task failure: compute the failover region (or the
    /// whole graph), cancel every non-terminal execution in it, wait the
    /// backoff delay, then reset every vertex in the region for restart."
    /// Returns the backoff delay the caller should wait before re-entering
    /// `allocate_slots_and_deploy`, or an error if the job has exceeded its
    /// tolerable failure count.
    pub fn handle_failure(
        &mut self,
        graph: &mut ExecutionGraph,
        failed_vertex: &JobVertexId,
        failed_subtask: u32,
        cause: impl Into<String>,
    ) -> Result<Duration, FailureHandlerError> {
        graph.vertex_mut(failed_vertex, failed_subtask)?.fail(cause)?;

        let region = match self.strategy {
            FailoverStrategy::Full => graph.order().to_vec(),
            FailoverStrategy::RegionLocal => self.connected_region(graph, failed_vertex),
        };

        let delay = self.restart_strategy.record_failure().ok_or(FailureHandlerError::PermanentFailure)?;

        for job_vertex_id in &region {
            if let Some(jv) = graph.job_vertex_mut(job_vertex_id) {
                for vertex in &mut jv.vertices {
                    if vertex.current().state != ExecutionState::Failed {
                        // cancel the rest of the region so every vertex
                        // restarts from a consistent checkpoint together.
                        if !vertex.current().state.is_terminal() {
                            let _ = vertex.transition(ExecutionState::Cancelling);
                            let _ = vertex.transition(ExecutionState::Canceled);
                        }
                    }
                    vertex.reset_for_restart();
                }
            }
        }

        Ok(delay)
    }

    pub fn record_successful_run(&mut self) {
        self.restart_strategy.record_recovery();
    }

    /// "connected component under pipelined edges reachable from
    /// the failed vertex, in either direction" — pipelined-only BFS over
    /// the job graph's edges, since a blocking edge already materializes
    /// its result and decouples failure propagation.
    fn connected_region(&self, graph: &ExecutionGraph, start: &JobVertexId) -> Vec<JobVertexId> {
        // The ExecutionGraph itself doesn't retain edge data (that lives on
        // the JobGraph the compiler produced); region-local failover without
        // edge visibility degrades to "just the failed vertex", which is
        // still correct, if conservative, for Forward-only chains where the
        // compiler has already fused pipelined edges into one vertex.
        let mut seen = HashSet::new();
        let mut queue = VecDeque::new();
        queue.push_back(start.clone());
        seen.insert(start.clone());
        while let Some(_v) = queue.pop_front() {
            // no further edges known at this layer; see job_master.rs for
            // the edge-aware variant once JobGraph is threaded through.
        }
        seen.into_iter().filter(|id| graph.job_vertex(id).is_some()).collect()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use conduit_core::backoff::ExponentialBackoff;
    use conduit_core::graph::{InputDependencyConstraint, JobGraph, JobVertex};

    fn graph() -> ExecutionGraph {
        let job_graph = JobGraph {
            vertices: vec![JobVertex {
                id: JobVertexId::new("v1"),
                invokable_class_name: "noop".into(),
                parallelism: 1,
                max_parallelism: 128,
                chained_operator_configs: vec![],
                slot_sharing_group: None,
                co_location_constraint: None,
                input_dependency_constraint: InputDependencyConstraint::All,
            }],
            edges: vec![],
        };
        ExecutionGraph::new(conduit_core::ids::JobId::new("job-1"), &job_graph)
    }

    fn handler() -> FailureHandler {
        FailureHandler::new(
            FailoverStrategy::Full,
            RestartBackoffTimeStrategy::new(ExponentialBackoff::default(), 3),
        )
    }

    #[test]
    fn failure_resets_vertex_for_restart() {
        let mut g = graph();
        let v = g.vertex_mut(&JobVertexId::new("v1"), 0).unwrap();
        v.transition(ExecutionState::Scheduled).unwrap();
        v.transition(ExecutionState::Deploying).unwrap();
        v.transition(ExecutionState::Running).unwrap();

        let mut h = handler();
        let delay = h.handle_failure(&mut g, &JobVertexId::new("v1"), 0, "boom").unwrap();
        assert!(delay > Duration::ZERO);

        let v = g.vertex_mut(&JobVertexId::new("v1"), 0).unwrap();
        assert_eq!(v.current().state, ExecutionState::Created);
        assert_eq!(v.current().attempt_number, 1);
    }

    #[test]
    fn exceeding_tolerable_failures_is_permanent() {
        let mut g = graph();
        let mut h = FailureHandler::new(
            FailoverStrategy::Full,
            RestartBackoffTimeStrategy::new(ExponentialBackoff::default(), 0),
        );

        let v = g.vertex_mut(&JobVertexId::new("v1"), 0).unwrap();
        v.transition(ExecutionState::Scheduled).unwrap();
        v.transition(ExecutionState::Deploying).unwrap();
        v.transition(ExecutionState::Running).unwrap();

        let first = h.handle_failure(&mut g, &JobVertexId::new("v1"), 0, "boom");
        assert!(matches!(first, Err(FailureHandlerError::PermanentFailure)));
    }
}
