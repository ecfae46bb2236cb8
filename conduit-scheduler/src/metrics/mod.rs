//! SchedulerMetricsCollector: observability via Prometheus. Trait seam so
//! the scheduler core never depends on the concrete `prometheus` crate
//! directly; only `prometheus.rs` (behind the `prometheus-metrics` feature)
//! and `test_utils::TestMetricsCollector` do.

#[cfg(feature = "prometheus-metrics")]
pub mod prometheus;

/// Everything the job master and resource manager report about a job's
/// lifecycle, checkpointing, and restart behavior: job status transitions,
/// checkpoint completion, restart count.
pub trait SchedulerMetricsCollector: Send + Sync {
    fn record_job_submitted(&self, job_id: &str);
    fn record_job_completed(&self, job_id: &str, duration_ms: u64);
    fn record_job_failed(&self, job_id: &str);
    fn record_job_cancelled(&self, job_id: &str);

    fn record_checkpoint_completed(&self, job_id: &str, checkpoint_id: u64, duration_ms: u64);
    fn record_checkpoint_declined(&self, job_id: &str, checkpoint_id: u64);

    fn record_restart(&self, job_id: &str);

    /// Wall-clock time between a slot request being issued and its
    /// assignment resolving.
    fn record_slot_allocation_latency_ms(&self, latency_ms: u64);

    fn set_running_job_count(&self, value: u64);
}
