//! Physical graph produced by the `GraphCompiler` ("Physical graph
//! (JobGraph)"). A `JobVertex` may represent several chained `StreamNode`s
//! fused into a single invokable task.

use crate::ids::{JobVertexId, OperatorId};
use serde::{Deserialize, Serialize};

/// How a JobEdge's upstream subtasks map to downstream subtasks.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub enum DistributionPattern {
    /// Each upstream subtask connects to a bounded subset of downstream
    /// subtasks (used for `Forward`/`Rescale`).
    Pointwise,
    /// Every upstream subtask connects to every downstream subtask (used
    /// for `Rebalance`/`Hash`/`Broadcast`/`Custom`).
    AllToAll,
}

/// Whether a JobEdge's result partition may be consumed before the
/// producer finishes ("partition type").
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub enum PartitionType {
    /// Bounded buffer pool, consumer may read while producer is still
    /// writing; backpressure propagates via credits.
    PipelinedBounded,
    /// Fully materialized before any subpartition may be read.
    Blocking,
}

/// An optional constraint binding two JobVertices' corresponding subtasks
/// to run on the same TaskExecutor ("co-location constraint"),
/// used for iterative/tight-loop operators.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct CoLocationConstraint {
    pub group_id: String,
}

/// Whether an ExecutionVertex may be scheduled once any upstream producer
/// is ready, or must wait for all inputs ("input-dependency
/// constraint").
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub enum InputDependencyConstraint {
    Any,
    All,
}

/// One or more chained operators, deployed and executed as a single task.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct JobVertex {
    pub id: JobVertexId,
    pub invokable_class_name: String,
    pub parallelism: u32,
    pub max_parallelism: u32,
    /// Chained operator configs, outermost (head) first; carried as opaque
    /// bytes here since their structure is owned by the operator chain
    /// runtime, not the compiler.
    pub chained_operator_configs: Vec<ChainedOperatorConfig>,
    pub slot_sharing_group: Option<String>,
    pub co_location_constraint: Option<CoLocationConstraint>,
    pub input_dependency_constraint: InputDependencyConstraint,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ChainedOperatorConfig {
    pub operator_id: OperatorId,
    pub operator_factory: Vec<u8>,
    pub keyed: bool,
}

/// A physical connection between two JobVertices.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct JobEdge {
    pub source: JobVertexId,
    pub target: JobVertexId,
    pub distribution_pattern: DistributionPattern,
    pub partition_type: PartitionType,
}

/// The full physical graph, compiled once per job submission and handed to
/// the `JobMaster` on leadership grant to build an `ExecutionGraph`.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct JobGraph {
    pub vertices: Vec<JobVertex>,
    pub edges: Vec<JobEdge>,
}

impl JobGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn vertex(&self, id: &JobVertexId) -> Option<&JobVertex> {
        self.vertices.iter().find(|v| &v.id == id)
    }

    pub fn edges_from(&self, id: &JobVertexId) -> impl Iterator<Item = &JobEdge> {
        self.edges.iter().filter(move |e| &e.source == id)
    }

    pub fn edges_into(&self, id: &JobVertexId) -> impl Iterator<Item = &JobEdge> {
        self.edges.iter().filter(move |e| &e.target == id)
    }

    /// Vertices in topological order; panics is avoided by returning
    /// `None` if the graph is cyclic (should never happen post-compile,
    /// since `GraphCompiler` rejects cyclic `StreamGraph`s up front).
    pub fn topological_order(&self) -> Option<Vec<JobVertexId>> {
        let mut in_degree: std::collections::HashMap<&JobVertexId, usize> =
            self.vertices.iter().map(|v| (&v.id, 0)).collect();
        for edge in &self.edges {
            *in_degree.entry(&edge.target).or_insert(0) += 1;
        }

        let mut ready: std::collections::VecDeque<JobVertexId> = in_degree
            .iter()
            .filter(|(_, deg)| **deg == 0)
            .map(|(id, _)| (*id).clone())
            .collect();

        let mut order = Vec::with_capacity(self.vertices.len());
        let mut remaining = in_degree.clone();

        while let Some(id) = ready.pop_front() {
            order.push(id.clone());
            for edge in self.edges_from(&id) {
                if let Some(deg) = remaining.get_mut(&edge.target) {
                    *deg -= 1;
                    if *deg == 0 {
                        ready.push_back(edge.target.clone());
                    }
                }
            }
        }

        if order.len() == self.vertices.len() {
            Some(order)
        } else {
            None
        }
    }
}
