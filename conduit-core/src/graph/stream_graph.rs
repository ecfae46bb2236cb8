//! Logical graph submitted by a client ("Logical graph
//! (StreamGraph)"). Built client-side, serialized, and handed to the
//! `GraphCompiler` which turns it into a `JobGraph`.

use crate::ids::OperatorId;
use serde::{Deserialize, Serialize};

/// When adjacent operators in a chain may be fused into a single task
/// ("chaining fusible operators").
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub enum ChainingStrategy {
    /// May be chained to its predecessor and may start a new chain.
    Always,
    /// May start a chain but never be appended to one.
    Head,
    /// Never chained; always its own task.
    Never,
}

/// How records are routed from one StreamNode's output to the next's input
/// ("StreamEdge").
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub enum Partitioner {
    /// Each upstream subtask forwards to exactly one fixed downstream subtask.
    Forward,
    /// Evenly redistributes across a subset of downstream subtasks when
    /// parallelism changes by an integer factor.
    Rescale,
    /// Round-robins across all downstream subtasks.
    Rebalance,
    /// Routes by a hash of the record's key.
    Hash,
    /// Sends every record to every downstream subtask.
    Broadcast,
    /// User-supplied partitioning function, opaque to the compiler.
    Custom,
}

/// Whether a shuffle edge may emit data before the downstream run completes
/// ("shuffle mode").
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub enum ShuffleMode {
    /// Streamed continuously as produced.
    Pipelined,
    /// Materialized fully before the consumer may start reading.
    Batch,
    /// Left to the compiler to decide based on the edge's partition type.
    Undefined,
}

/// One logical operator in the client-submitted graph.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StreamNode {
    pub operator_id: OperatorId,
    /// Opaque, classloader-resolved factory for the operator instance
    /// ("a user classloader for deserializing operator code").
    pub operator_factory: Vec<u8>,
    pub parallelism: u32,
    pub max_parallelism: u32,
    pub keyed: bool,
    pub slot_sharing_group: Option<String>,
    pub chaining_strategy: ChainingStrategy,
}

/// One logical connection between two StreamNodes.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StreamEdge {
    pub source: OperatorId,
    pub target: OperatorId,
    pub partitioner: Partitioner,
    pub shuffle_mode: ShuffleMode,
}

/// The full logical graph a client submits. Invariant: acyclic outside of
/// iteration constructs; iteration constructs are out of scope
/// here and rejected by the compiler if encountered (see
/// `GraphCompilerError::CyclicGraph` in `conduit-scheduler`).
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct StreamGraph {
    pub nodes: Vec<StreamNode>,
    pub edges: Vec<StreamEdge>,
}

impl StreamGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_node(&mut self, node: StreamNode) {
        self.nodes.push(node);
    }

    pub fn add_edge(&mut self, edge: StreamEdge) {
        self.edges.push(edge);
    }

    pub fn node(&self, id: &OperatorId) -> Option<&StreamNode> {
        self.nodes.iter().find(|n| &n.operator_id == id)
    }

    pub fn edges_from(&self, id: &OperatorId) -> impl Iterator<Item = &StreamEdge> {
        self.edges.iter().filter(move |e| &e.source == id)
    }

    pub fn edges_into(&self, id: &OperatorId) -> impl Iterator<Item = &StreamEdge> {
        self.edges.iter().filter(move |e| &e.target == id)
    }
}
