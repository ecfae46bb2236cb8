// Licensed to the Apache Software Foundation (ASF) under one
// or more contributor license agreements.  See the NOTICE file
// distributed with this work for additional information
// regarding copyright ownership.  The ASF licenses this file
// to you under the Apache License, Version 2.0 (the
// "License"); you may not use this file except in compliance
// with the License.  You may obtain a copy of the License at
//
//   http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing,
// software distributed under the License is distributed on an
// "AS IS" BASIS, WITHOUT WARRANTIES OR CONDITIONS OF ANY
// KIND, either express or implied.  See the License for the
// specific language governing permissions and limitations
// under the License.

//! Shared types and interfaces for the Conduit distributed stream
//! processing engine: identifiers, the logical/physical graph model, the
//! error taxonomy, generated RPC stubs, and the pluggable-backend traits
//! (state backend, blob store, classloader) the core depends on from its
//! external collaborators.

pub mod backoff;
pub mod blob;
pub mod classloader;
pub mod config;
pub mod error;
pub mod graph;
pub mod ids;
pub mod resource;
pub mod rpc;
pub mod state_backend;
pub mod time;

/// Generated tonic/prost client and server stubs for the RPC surface
///, compiled from `proto/*.proto` by `build.rs`.
pub mod protobuf {
    tonic::include_proto!("conduit.protobuf");
}

pub use error::{ConduitError, Result};
