//! SchedulerConfig: the knobs a conduit job master actually needs —
//! scheduling strategy, checkpoint defaults, and restart-backoff tuning —
//! assembled with a `with_*`-builder style.

use crate::failure_handler::FailoverStrategy;
use crate::graph_compiler::DataExchangeMode;
use crate::scheduler::SchedulingStrategy;
use clap::ValueEnum;
use conduit_core::backoff::ExponentialBackoff;
use conduit_core::config::CheckpointDefaults;
use std::time::Duration;

/// CLI-facing mirror of `SchedulingStrategy`; kept distinct
/// since the domain type lives in `crate::scheduler` and shouldn't need to
/// derive `clap::ValueEnum` itself.
#[derive(Clone, Copy, Debug, Eq, PartialEq, ValueEnum)]
pub enum SchedulingStrategyArg {
    Eager,
    LazyFromSources,
}

impl From<SchedulingStrategyArg> for SchedulingStrategy {
    fn from(value: SchedulingStrategyArg) -> Self {
        match value {
            SchedulingStrategyArg::Eager => SchedulingStrategy::Eager,
            SchedulingStrategyArg::LazyFromSources => SchedulingStrategy::LazyFromSources,
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, ValueEnum)]
pub enum FailoverStrategyArg {
    Full,
    RegionLocal,
}

impl From<FailoverStrategyArg> for FailoverStrategy {
    fn from(value: FailoverStrategyArg) -> Self {
        match value {
            FailoverStrategyArg::Full => FailoverStrategy::Full,
            FailoverStrategyArg::RegionLocal => FailoverStrategy::RegionLocal,
        }
    }
}

/// Configuration for the conduit job master / scheduler.
#[derive(Clone, Debug)]
pub struct SchedulerConfig {
    /// eager vs lazy-from-sources slot requesting.
    pub scheduling_strategy: SchedulingStrategy,
    /// full-restart vs region-local failover.
    pub failover_strategy: FailoverStrategy,
    /// global data-exchange mode the `GraphCompiler` uses to
    /// pick each edge's `PartitionType`.
    pub data_exchange_mode: DataExchangeMode,
    pub chaining_enabled: bool,
    pub checkpoint_defaults: CheckpointDefaults,
    pub restart_backoff: ExponentialBackoff,
    pub tolerable_restart_failures: u32,
    /// "scheduler exposes a Prometheus /metrics endpoint".
    pub metrics_bind_addr: std::net::SocketAddr,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            scheduling_strategy: SchedulingStrategy::Eager,
            failover_strategy: FailoverStrategy::RegionLocal,
            data_exchange_mode: DataExchangeMode::ForwardPipelined,
            chaining_enabled: true,
            checkpoint_defaults: CheckpointDefaults::default(),
            restart_backoff: ExponentialBackoff::default(),
            tolerable_restart_failures: 3,
            metrics_bind_addr: ([0, 0, 0, 0], 9090).into(),
        }
    }
}

impl SchedulerConfig {
    pub fn with_scheduling_strategy(mut self, strategy: SchedulingStrategy) -> Self {
        self.scheduling_strategy = strategy;
        self
    }

    pub fn with_failover_strategy(mut self, strategy: FailoverStrategy) -> Self {
        self.failover_strategy = strategy;
        self
    }

    pub fn with_checkpoint_interval(mut self, interval: Duration) -> Self {
        self.checkpoint_defaults.interval = interval;
        self
    }

    pub fn with_tolerable_restart_failures(mut self, count: u32) -> Self {
        self.tolerable_restart_failures = count;
        self
    }

    pub fn with_metrics_bind_addr(mut self, addr: std::net::SocketAddr) -> Self {
        self.metrics_bind_addr = addr;
        self
    }
}
