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

use crate::metrics::SchedulerMetricsCollector;
use conduit_core::error::{ConduitError, Result};
use once_cell::sync::OnceCell;
use prometheus::{
    register_counter_with_registry, register_gauge_with_registry, register_histogram_with_registry, Counter, Gauge, Histogram, Registry,
};
use prometheus::{Encoder, TextEncoder};
use std::sync::Arc;
use warp::Reply;

static COLLECTOR: OnceCell<Arc<dyn SchedulerMetricsCollector>> = OnceCell::new();

pub struct PrometheusMetricsCollector {
    jobs_submitted: Counter,
    jobs_completed: Counter,
    jobs_failed: Counter,
    jobs_cancelled: Counter,
    job_duration_seconds: Histogram,
    checkpoints_completed: Counter,
    checkpoints_declined: Counter,
    checkpoint_duration_seconds: Histogram,
    restarts: Counter,
    slot_allocation_latency_seconds: Histogram,
    running_jobs: Gauge,
}

impl PrometheusMetricsCollector {
    pub fn new(registry: &Registry) -> Result<Self> {
        let jobs_submitted = register_counter_with_registry!("conduit_jobs_submitted_total", "Counter of jobs submitted", registry)
            .map_err(|e| ConduitError::internal(format!("error registering metric: {e:?}")))?;

        let jobs_completed = register_counter_with_registry!("conduit_jobs_completed_total", "Counter of jobs completed", registry)
            .map_err(|e| ConduitError::internal(format!("error registering metric: {e:?}")))?;

        let jobs_failed = register_counter_with_registry!("conduit_jobs_failed_total", "Counter of jobs permanently failed", registry)
            .map_err(|e| ConduitError::internal(format!("error registering metric: {e:?}")))?;

        let jobs_cancelled = register_counter_with_registry!("conduit_jobs_cancelled_total", "Counter of jobs cancelled", registry)
            .map_err(|e| ConduitError::internal(format!("error registering metric: {e:?}")))?;

        let job_duration_seconds = register_histogram_with_registry!(
            "conduit_job_duration_seconds",
            "Histogram of job wall-clock duration in seconds",
            vec![1.0_f64, 10.0_f64, 60.0_f64, 600.0_f64, 3600.0_f64],
            registry
        )
        .map_err(|e| ConduitError::internal(format!("error registering metric: {e:?}")))?;

        let checkpoints_completed = register_counter_with_registry!("conduit_checkpoints_completed_total", "Counter of checkpoints completed", registry)
            .map_err(|e| ConduitError::internal(format!("error registering metric: {e:?}")))?;

        let checkpoints_declined = register_counter_with_registry!("conduit_checkpoints_declined_total", "Counter of checkpoints declined", registry)
            .map_err(|e| ConduitError::internal(format!("error registering metric: {e:?}")))?;

        let checkpoint_duration_seconds = register_histogram_with_registry!(
            "conduit_checkpoint_duration_seconds",
            "Histogram of checkpoint completion time in seconds",
            vec![0.05_f64, 0.2_f64, 1.0_f64, 10.0_f64, 60.0_f64],
            registry
        )
        .map_err(|e| ConduitError::internal(format!("error registering metric: {e:?}")))?;

        let restarts = register_counter_with_registry!("conduit_restarts_total", "Counter of job restarts triggered by the failure handler", registry)
            .map_err(|e| ConduitError::internal(format!("error registering metric: {e:?}")))?;

        let slot_allocation_latency_seconds = register_histogram_with_registry!(
            "conduit_slot_allocation_latency_seconds",
            "Histogram of slot request to assignment latency in seconds",
            vec![0.001_f64, 0.01_f64, 0.1_f64, 1.0_f64, 5.0_f64],
            registry
        )
        .map_err(|e| ConduitError::internal(format!("error registering metric: {e:?}")))?;

        let running_jobs = register_gauge_with_registry!("conduit_running_jobs", "Number of jobs currently running", registry)
            .map_err(|e| ConduitError::internal(format!("error registering metric: {e:?}")))?;

        Ok(Self {
            jobs_submitted,
            jobs_completed,
            jobs_failed,
            jobs_cancelled,
            job_duration_seconds,
            checkpoints_completed,
            checkpoints_declined,
            checkpoint_duration_seconds,
            restarts,
            slot_allocation_latency_seconds,
            running_jobs,
        })
    }

    pub fn current() -> Result<Arc<dyn SchedulerMetricsCollector>> {
        COLLECTOR
            .get_or_try_init(|| {
                let collector = Self::new(::prometheus::default_registry())?;
                Ok(Arc::new(collector) as Arc<dyn SchedulerMetricsCollector>)
            })
            .cloned()
    }
}

impl SchedulerMetricsCollector for PrometheusMetricsCollector {
    fn record_job_submitted(&self, _job_id: &str) {
        self.jobs_submitted.inc();
    }

    fn record_job_completed(&self, _job_id: &str, duration_ms: u64) {
        self.jobs_completed.inc();
        self.job_duration_seconds.observe(duration_ms as f64 / 1000.0);
    }

    fn record_job_failed(&self, _job_id: &str) {
        self.jobs_failed.inc();
    }

    fn record_job_cancelled(&self, _job_id: &str) {
        self.jobs_cancelled.inc();
    }

    fn record_checkpoint_completed(&self, _job_id: &str, _checkpoint_id: u64, duration_ms: u64) {
        self.checkpoints_completed.inc();
        self.checkpoint_duration_seconds.observe(duration_ms as f64 / 1000.0);
    }

    fn record_checkpoint_declined(&self, _job_id: &str, _checkpoint_id: u64) {
        self.checkpoints_declined.inc();
    }

    fn record_restart(&self, _job_id: &str) {
        self.restarts.inc();
    }

    fn record_slot_allocation_latency_ms(&self, latency_ms: u64) {
        self.slot_allocation_latency_seconds.observe(latency_ms as f64 / 1000.0);
    }

    fn set_running_job_count(&self, value: u64) {
        self.running_jobs.set(value as f64);
    }
}

pub fn get_metrics() -> Result<impl Reply> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = vec![];
    encoder
        .encode(&metric_families, &mut buffer)
        .map_err(|e| ConduitError::internal(format!("error encoding prometheus metrics: {e:?}")))?;

    Ok(warp::reply::with_header(buffer, warp::http::header::CONTENT_TYPE, encoder.format_type()))
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn registers_without_panicking() {
        let registry = Registry::new();
        let collector = PrometheusMetricsCollector::new(&registry).unwrap();
        collector.record_job_submitted("job-1");
        collector.record_checkpoint_completed("job-1", 1, 50);
        collector.record_restart("job-1");
    }
}
