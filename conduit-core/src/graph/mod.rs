//! Graph data model: the logical `StreamGraph` a client submits,
//! and the physical `JobGraph` a `GraphCompiler` produces from it. Both live
//! in `conduit-core` because they cross the RPC boundary (submitted as
//! serialized blobs) and are consumed by both `conduit-scheduler` (compiles
//! and schedules them) and `conduit-executor` (deploys chained operators
//! from a `JobVertex`'s config).

pub mod job_graph;
pub mod stream_graph;

pub use job_graph::*;
pub use stream_graph::*;
