//! GraphCompiler: compiles a client-submitted `StreamGraph` into a physical
//! `JobGraph` by fusing chainable operators into `JobVertex`s. Walks the
//! graph once in topological order, growing a chain downstream from every
//! node that can't be appended to its upstream chain, and cuts a new
//! `JobEdge` at each chaining-rule violation on a `StreamEdge`.

use conduit_core::graph::{
    ChainedOperatorConfig, ChainingStrategy, DistributionPattern, InputDependencyConstraint, JobEdge, JobGraph,
    JobVertex, PartitionType, Partitioner, ShuffleMode, StreamGraph,
};
use conduit_core::ids::{stable_vertex_id, JobVertexId, OperatorId};
use std::collections::{HashMap, HashSet};
use thiserror::Error;

/// The configured global data-exchange mode governing which `PartitionType`
/// an emitted `JobEdge` gets.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum DataExchangeMode {
    AllPipelined,
    ForwardPipelined,
    PointwisePipelined,
    AllBlocking,
}

#[derive(Debug, Error)]
pub enum GraphCompilerError {
    #[error("StreamGraph is cyclic outside of iteration constructs, which are unsupported")]
    CyclicGraph,
    #[error("unaligned checkpoints require exactly-once mode")]
    UnalignedRequiresExactlyOnce,
    #[error("edge references unknown operator {0}")]
    UnknownOperator(String),
}

/// Checkpoint configuration packaged by the compiler for the job master's
/// `CheckpointCoordinator`.
#[derive(Clone, Debug)]
pub struct JobCheckpointingSettings {
    pub interval: std::time::Duration,
    pub timeout: std::time::Duration,
    pub min_pause_between_checkpoints: std::time::Duration,
    pub max_concurrent_checkpoints: u32,
    pub retention: conduit_core::config::CheckpointRetentionPolicy,
    pub exactly_once: bool,
    pub unaligned_enabled: bool,
    pub tolerable_failure_count: u32,
    /// Vertices the coordinator sends `trigger_checkpoint` to (sources).
    pub trigger_vertices: Vec<JobVertexId>,
    /// Vertices required to acknowledge for a checkpoint to complete (all).
    pub ack_vertices: Vec<JobVertexId>,
    /// Vertices notified via `notify_checkpoint_complete` (all).
    pub commit_vertices: Vec<JobVertexId>,
}

pub struct GraphCompiler {
    pub data_exchange_mode: DataExchangeMode,
    pub chaining_enabled: bool,
}

impl Default for GraphCompiler {
    fn default() -> Self {
        Self {
            data_exchange_mode: DataExchangeMode::ForwardPipelined,
            chaining_enabled: true,
        }
    }
}

impl GraphCompiler {
    pub fn new(data_exchange_mode: DataExchangeMode, chaining_enabled: bool) -> Self {
        Self {
            data_exchange_mode,
            chaining_enabled,
        }
    }

    /// Full compile, returning both the physical graph and its checkpoint
    /// settings so the caller (JobMaster) doesn't need to re-derive
    /// trigger/ack/commit vertex sets itself.
    pub fn compile(
        &self,
        stream_graph: &StreamGraph,
        checkpoint_defaults: &conduit_core::config::CheckpointDefaults,
    ) -> Result<(JobGraph, JobCheckpointingSettings), GraphCompilerError> {
        if checkpoint_defaults.unaligned_enabled && !checkpoint_defaults.exactly_once {
            return Err(GraphCompilerError::UnalignedRequiresExactlyOnce);
        }

        let job_graph = self.compile_job_graph(stream_graph)?;

        let trigger_vertices: Vec<JobVertexId> = job_graph
            .vertices
            .iter()
            .filter(|v| job_graph.edges_into(&v.id).next().is_none())
            .map(|v| v.id.clone())
            .collect();
        let ack_vertices: Vec<JobVertexId> = job_graph.vertices.iter().map(|v| v.id.clone()).collect();
        let commit_vertices = ack_vertices.clone();

        let settings = JobCheckpointingSettings {
            interval: checkpoint_defaults.interval,
            timeout: checkpoint_defaults.timeout,
            min_pause_between_checkpoints: checkpoint_defaults.min_pause_between_checkpoints,
            max_concurrent_checkpoints: checkpoint_defaults.max_concurrent_checkpoints,
            retention: checkpoint_defaults.retention,
            exactly_once: checkpoint_defaults.exactly_once,
            unaligned_enabled: checkpoint_defaults.unaligned_enabled,
            tolerable_failure_count: checkpoint_defaults.tolerable_checkpoint_failures,
            trigger_vertices,
            ack_vertices,
            commit_vertices,
        };

        Ok((job_graph, settings))
    }

    /// Chaining rule (a)-(g). Walks each node once in topological order,
    /// growing a chain downstream from every node that cannot be appended
    /// to its upstream chain (a "head" of a maximal run).
    fn compile_job_graph(&self, stream_graph: &StreamGraph) -> Result<JobGraph, GraphCompilerError> {
        let order = topological_order(stream_graph)?;

        // Map: operator id -> id of the chain (JobVertex) it was fused into.
        let mut chain_of: HashMap<OperatorId, JobVertexId> = HashMap::new();
        // Chain id -> ordered member operator ids, head first.
        let mut chains: HashMap<JobVertexId, Vec<OperatorId>> = HashMap::new();

        for op_id in &order {
            let node = stream_graph.node(op_id).ok_or_else(|| GraphCompilerError::UnknownOperator(op_id.to_string()))?;

            // A node may be appended to its single upstream's chain iff an
            // upstream edge satisfies every clause of the chaining rule.
            let mut appended_to: Option<JobVertexId> = None;
            let upstream_edges: Vec<_> = stream_graph.edges_into(op_id).collect();
            if self.chaining_enabled && upstream_edges.len() == 1 {
                let edge = upstream_edges[0];
                let upstream = stream_graph.node(&edge.source).ok_or_else(|| GraphCompilerError::UnknownOperator(edge.source.to_string()))?;
                if self.chainable(upstream, node, edge) {
                    appended_to = chain_of.get(&edge.source).cloned();
                }
            }

            match appended_to {
                Some(chain_id) => {
                    chains.get_mut(&chain_id).expect("chain registered").push(op_id.clone());
                    chain_of.insert(op_id.clone(), chain_id);
                }
                None => {
                    let chain_id = stable_vertex_id(&[op_id.as_str()]);
                    chains.insert(chain_id.clone(), vec![op_id.clone()]);
                    chain_of.insert(op_id.clone(), chain_id);
                }
            }
        }

        let mut vertices = Vec::with_capacity(chains.len());
        for (chain_id, members) in &chains {
            let head = stream_graph.node(&members[0]).expect("member exists");
            let configs: Vec<ChainedOperatorConfig> = members
                .iter()
                .map(|id| {
                    let n = stream_graph.node(id).expect("member exists");
                    ChainedOperatorConfig {
                        operator_id: n.operator_id.clone(),
                        operator_factory: n.operator_factory.clone(),
                        keyed: n.keyed,
                    }
                })
                .collect();

            vertices.push(JobVertex {
                id: chain_id.clone(),
                invokable_class_name: format!("chain::{}", head.operator_id),
                parallelism: head.parallelism,
                max_parallelism: head.max_parallelism,
                chained_operator_configs: configs,
                slot_sharing_group: head.slot_sharing_group.clone(),
                co_location_constraint: None,
                input_dependency_constraint: InputDependencyConstraint::All,
            });
        }

        let mut edges = Vec::new();
        let mut seen_edges: HashSet<(JobVertexId, JobVertexId)> = HashSet::new();
        for edge in &stream_graph.edges {
            let source_chain = chain_of.get(&edge.source).expect("every op assigned a chain");
            let target_chain = chain_of.get(&edge.target).expect("every op assigned a chain");
            if source_chain == target_chain {
                continue; // fused within the same JobVertex, no JobEdge emitted
            }
            if !seen_edges.insert((source_chain.clone(), target_chain.clone())) {
                continue;
            }
            let distribution_pattern = match edge.partitioner {
                Partitioner::Forward | Partitioner::Rescale => DistributionPattern::Pointwise,
                _ => DistributionPattern::AllToAll,
            };
            edges.push(JobEdge {
                source: source_chain.clone(),
                target: target_chain.clone(),
                distribution_pattern,
                partition_type: self.partition_type(distribution_pattern),
            });
        }

        Ok(JobGraph { vertices, edges })
    }

    /// Chaining rule clauses (a)-(g), evaluated against the single upstream
    /// edge feeding `downstream`.
    fn chainable(
        &self,
        upstream: &conduit_core::graph::StreamNode,
        downstream: &conduit_core::graph::StreamNode,
        edge: &conduit_core::graph::StreamEdge,
    ) -> bool {
        self.chaining_enabled
            && matches!(upstream.chaining_strategy, ChainingStrategy::Always | ChainingStrategy::Head)
            && matches!(downstream.chaining_strategy, ChainingStrategy::Always)
            && upstream.slot_sharing_group == downstream.slot_sharing_group
            && matches!(edge.partitioner, Partitioner::Forward)
            && !matches!(edge.shuffle_mode, ShuffleMode::Batch)
            && upstream.parallelism == downstream.parallelism
    }

    fn partition_type(&self, distribution_pattern: DistributionPattern) -> PartitionType {
        match (self.data_exchange_mode, distribution_pattern) {
            (DataExchangeMode::AllBlocking, _) => PartitionType::Blocking,
            (DataExchangeMode::AllPipelined, _) => PartitionType::PipelinedBounded,
            (DataExchangeMode::ForwardPipelined, DistributionPattern::Pointwise) => PartitionType::PipelinedBounded,
            (DataExchangeMode::ForwardPipelined, DistributionPattern::AllToAll) => PartitionType::Blocking,
            (DataExchangeMode::PointwisePipelined, DistributionPattern::Pointwise) => PartitionType::PipelinedBounded,
            (DataExchangeMode::PointwisePipelined, DistributionPattern::AllToAll) => PartitionType::Blocking,
        }
    }
}

fn topological_order(stream_graph: &StreamGraph) -> Result<Vec<OperatorId>, GraphCompilerError> {
    let mut in_degree: HashMap<&OperatorId, usize> = stream_graph.nodes.iter().map(|n| (&n.operator_id, 0)).collect();
    for edge in &stream_graph.edges {
        *in_degree.entry(&edge.target).or_insert(0) += 1;
    }

    let mut ready: std::collections::VecDeque<OperatorId> =
        in_degree.iter().filter(|(_, d)| **d == 0).map(|(id, _)| (*id).clone()).collect();
    let mut remaining = in_degree.clone();
    let mut order = Vec::with_capacity(stream_graph.nodes.len());

    while let Some(id) = ready.pop_front() {
        order.push(id.clone());
        for edge in stream_graph.edges_from(&id) {
            if let Some(d) = remaining.get_mut(&edge.target) {
                *d -= 1;
                if *d == 0 {
                    ready.push_back(edge.target.clone());
                }
            }
        }
    }

    if order.len() == stream_graph.nodes.len() {
        Ok(order)
    } else {
        Err(GraphCompilerError::CyclicGraph)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use conduit_core::graph::{StreamEdge, StreamNode};

    fn node(id: &str, parallelism: u32, strategy: ChainingStrategy) -> StreamNode {
        StreamNode {
            operator_id: OperatorId::new(id),
            operator_factory: vec![],
            parallelism,
            max_parallelism: 128,
            keyed: false,
            slot_sharing_group: Some("default".into()),
            chaining_strategy: strategy,
        }
    }

    fn edge(source: &str, target: &str, partitioner: Partitioner) -> StreamEdge {
        StreamEdge {
            source: OperatorId::new(source),
            target: OperatorId::new(target),
            partitioner,
            shuffle_mode: ShuffleMode::Pipelined,
        }
    }

    /// A two-operator forward-partitioner job with parallelism 1 compiles
    /// to exactly one chained JobVertex.
    #[test]
    fn forward_chain_fuses_into_one_vertex() {
        let mut graph = StreamGraph::new();
        graph.add_node(node("source", 1, ChainingStrategy::Head));
        graph.add_node(node("sink", 1, ChainingStrategy::Always));
        graph.add_edge(edge("source", "sink", Partitioner::Forward));

        let compiler = GraphCompiler::default();
        let (job_graph, _settings) = compiler.compile(&graph, &Default::default()).unwrap();

        assert_eq!(job_graph.vertices.len(), 1);
        assert_eq!(job_graph.edges.len(), 0);
        assert_eq!(job_graph.vertices[0].chained_operator_configs.len(), 2);
    }

    #[test]
    fn hash_partitioner_breaks_the_chain() {
        let mut graph = StreamGraph::new();
        graph.add_node(node("source", 2, ChainingStrategy::Head));
        graph.add_node(node("sink", 2, ChainingStrategy::Always));
        graph.add_edge(edge("source", "sink", Partitioner::Hash));

        let compiler = GraphCompiler::default();
        let (job_graph, _) = compiler.compile(&graph, &Default::default()).unwrap();

        assert_eq!(job_graph.vertices.len(), 2);
        assert_eq!(job_graph.edges.len(), 1);
        assert_eq!(job_graph.edges[0].distribution_pattern, DistributionPattern::AllToAll);
    }

    #[test]
    fn mismatched_parallelism_breaks_the_chain() {
        let mut graph = StreamGraph::new();
        graph.add_node(node("source", 1, ChainingStrategy::Head));
        graph.add_node(node("sink", 2, ChainingStrategy::Always));
        graph.add_edge(edge("source", "sink", Partitioner::Forward));

        let compiler = GraphCompiler::default();
        let (job_graph, _) = compiler.compile(&graph, &Default::default()).unwrap();
        assert_eq!(job_graph.vertices.len(), 2);
    }

    #[test]
    fn never_chaining_strategy_is_always_its_own_vertex() {
        let mut graph = StreamGraph::new();
        graph.add_node(node("source", 1, ChainingStrategy::Head));
        graph.add_node(node("sink", 1, ChainingStrategy::Never));
        graph.add_edge(edge("source", "sink", Partitioner::Forward));

        let compiler = GraphCompiler::default();
        let (job_graph, _) = compiler.compile(&graph, &Default::default()).unwrap();
        assert_eq!(job_graph.vertices.len(), 2);
    }

    #[test]
    fn cyclic_graph_is_rejected() {
        let mut graph = StreamGraph::new();
        graph.add_node(node("a", 1, ChainingStrategy::Head));
        graph.add_node(node("b", 1, ChainingStrategy::Always));
        graph.add_edge(edge("a", "b", Partitioner::Forward));
        graph.add_edge(edge("b", "a", Partitioner::Forward));

        let compiler = GraphCompiler::default();
        let err = compiler.compile(&graph, &Default::default()).unwrap_err();
        assert!(matches!(err, GraphCompilerError::CyclicGraph));
    }

    #[test]
    fn unaligned_without_exactly_once_is_rejected() {
        let mut graph = StreamGraph::new();
        graph.add_node(node("source", 1, ChainingStrategy::Head));

        let mut defaults = conduit_core::config::CheckpointDefaults::default();
        defaults.exactly_once = false;
        defaults.unaligned_enabled = true;

        let compiler = GraphCompiler::default();
        let err = compiler.compile(&graph, &defaults).unwrap_err();
        assert!(matches!(err, GraphCompilerError::UnalignedRequiresExactlyOnce));
    }

    #[test]
    fn checkpoint_settings_enumerate_source_and_all_vertices() {
        let mut graph = StreamGraph::new();
        graph.add_node(node("source", 1, ChainingStrategy::Head));
        graph.add_node(node("sink", 1, ChainingStrategy::Never));
        graph.add_edge(edge("source", "sink", Partitioner::Forward));

        let compiler = GraphCompiler::default();
        let (job_graph, settings) = compiler.compile(&graph, &Default::default()).unwrap();

        assert_eq!(settings.trigger_vertices.len(), 1);
        assert_eq!(settings.ack_vertices.len(), job_graph.vertices.len());
        assert_eq!(settings.commit_vertices.len(), job_graph.vertices.len());
    }
}
