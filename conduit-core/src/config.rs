//! Shared configuration structs. Per-layer crates
//! (`conduit-scheduler::config::SchedulerConfig`,
//! `conduit-executor::config::ExecutorConfig`) embed these and add their
//! own fields on top.

use std::time::Duration;

/// Heartbeat cadence between a monitor (ResourceManager, JobMaster) and the
/// targets it watches.
#[derive(Debug, Clone, Copy)]
pub struct HeartbeatConfig {
    pub interval: Duration,
    pub timeout: Duration,
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(10),
            timeout: Duration::from_secs(50),
        }
    }
}

/// Retrying-registration timing.
#[derive(Debug, Clone, Copy)]
pub struct RetryConfig {
    pub initial_timeout: Duration,
    pub max_timeout: Duration,
    pub error_delay: Duration,
    pub refused_delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            initial_timeout: Duration::from_millis(100),
            max_timeout: Duration::from_secs(30),
            error_delay: Duration::from_secs(10),
            refused_delay: Duration::from_secs(5),
        }
    }
}

/// Slot-request and registration-window timeouts.
#[derive(Debug, Clone, Copy)]
pub struct AllocationTimeoutConfig {
    pub pending_slot_request_timeout: Duration,
    pub registration_timeout: Duration,
    pub slot_release_timeout: Duration,
}

impl Default for AllocationTimeoutConfig {
    fn default() -> Self {
        Self {
            pending_slot_request_timeout: Duration::from_secs(5 * 60),
            registration_timeout: Duration::from_secs(5 * 60),
            slot_release_timeout: Duration::from_secs(5 * 60),
        }
    }
}

/// Checkpoint coordinator defaults.
#[derive(Debug, Clone)]
pub struct CheckpointDefaults {
    pub interval: Duration,
    pub timeout: Duration,
    pub min_pause_between_checkpoints: Duration,
    pub max_concurrent_checkpoints: u32,
    pub tolerable_checkpoint_failures: u32,
    pub exactly_once: bool,
    pub unaligned_enabled: bool,
    pub retention: CheckpointRetentionPolicy,
}

impl Default for CheckpointDefaults {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(200),
            timeout: Duration::from_secs(10 * 60),
            min_pause_between_checkpoints: Duration::ZERO,
            max_concurrent_checkpoints: 1,
            tolerable_checkpoint_failures: 0,
            exactly_once: true,
            unaligned_enabled: false,
            retention: CheckpointRetentionPolicy::NeverRetain,
        }
    }
}

/// Retention policy for completed checkpoints. `RetainOnFailure` and
/// `RetainOnCancel` are evaluated independent of whether checkpoints are
/// externally visible.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum CheckpointRetentionPolicy {
    NeverRetain,
    RetainOnCancel,
    RetainOnFailure,
}

/// Network buffer pool sizing ("Environment inputs").
#[derive(Debug, Clone, Copy)]
pub struct NetworkBufferConfig {
    pub buffer_size_bytes: usize,
    pub total_buffers: usize,
    pub buffers_per_channel: usize,
    pub floating_buffers_per_gate: usize,
}

impl Default for NetworkBufferConfig {
    fn default() -> Self {
        Self {
            buffer_size_bytes: 32 * 1024,
            total_buffers: 2048,
            buffers_per_channel: 2,
            floating_buffers_per_gate: 8,
        }
    }
}

/// REST-style async-trigger polling backoff ("initial 10 ms,
/// factor 2, cap 2000 ms"). Carried as ambient infrastructure even though
/// the REST layer itself is a non-goal, since the same backoff shape is
/// reused by `RetryingRegistration` polling a pending future.
#[derive(Debug, Clone, Copy)]
pub struct PollBackoffConfig {
    pub initial: Duration,
    pub factor: u32,
    pub cap: Duration,
}

impl Default for PollBackoffConfig {
    fn default() -> Self {
        Self {
            initial: Duration::from_millis(10),
            factor: 2,
            cap: Duration::from_millis(2000),
        }
    }
}
