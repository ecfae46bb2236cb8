//! TaskExecutor-specific configuration, embedding the shared
//! `conduit_core::config` structs and assembled with the same
//! `with_*`-builder pattern used elsewhere in the workspace.

use conduit_core::config::{AllocationTimeoutConfig, HeartbeatConfig, NetworkBufferConfig, RetryConfig};
use conduit_core::resource::ResourceProfile;

#[derive(Clone, Debug)]
pub struct ExecutorConfig {
    pub rpc_address: String,
    pub rpc_port: u16,
    pub total_slots: u32,
    pub default_slot_profile: ResourceProfile,
    pub heartbeat: HeartbeatConfig,
    pub retry: RetryConfig,
    pub allocation_timeouts: AllocationTimeoutConfig,
    pub network_buffers: NetworkBufferConfig,
    /// "Task cancellation ... transitions the Execution Cancelling
    /// -> Canceled within a configured hard timeout (default 30s) after
    /// which the task is forcibly terminated."
    pub cancellation_timeout: std::time::Duration,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            rpc_address: "0.0.0.0".to_string(),
            rpc_port: 0,
            total_slots: num_cpus::get() as u32,
            default_slot_profile: ResourceProfile::new(1, 1024, 1),
            heartbeat: HeartbeatConfig::default(),
            retry: RetryConfig::default(),
            allocation_timeouts: AllocationTimeoutConfig::default(),
            network_buffers: NetworkBufferConfig::default(),
            cancellation_timeout: std::time::Duration::from_secs(30),
        }
    }
}

impl ExecutorConfig {
    pub fn with_total_slots(mut self, total_slots: u32) -> Self {
        self.total_slots = total_slots;
        self
    }

    pub fn with_rpc_port(mut self, port: u16) -> Self {
        self.rpc_port = port;
        self
    }
}
