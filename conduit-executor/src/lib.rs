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

//! Task executor runtime: the per-slot task mailbox loop, operator chain
//! execution, shuffle input/output, local checkpointing, and the service
//! that registers each running task with its job master.

pub mod checkpoint;
pub mod config;
pub mod input_gate;
pub mod job_leader_service;
pub mod mailbox;
pub mod mailbox_loop;
pub mod operator_chain;
pub mod result_partition;
pub mod slot_table;

pub use checkpoint::{CheckpointAck, CheckpointDecline, CheckpointResult, SubtaskCheckpointCoordinator};
pub use config::ExecutorConfig;
pub use input_gate::{InputChannel, InputGate, UnionInputGate};
pub use job_leader_service::{JobLeader, JobLeaderService};
pub use mailbox::{Mailbox, MailboxError, MailboxState, CONTROL_PRIORITY, DEFAULT_PRIORITY};
pub use mailbox_loop::{run_mailbox_loop, Controller, Suspension};
pub use operator_chain::{Element, Operator, OperatorChain, Watermark};
pub use result_partition::{CreditSender, ResultPartition, ResultSubpartition};
pub use slot_table::{SlotState, SlotTable, SlotTableError};
