//! Metrics for observability.
//!
//! The engine reports through the [`MetricsSink`] trait, injected at
//! construction, so tests can count calls without a live exporter.
//! [`FacadeMetrics`] is the production sink: it emits through the `metrics`
//! facade, which [`install_prometheus_recorder`] wires to a Prometheus
//! text-format handle served on `/metrics`.
//!
//! # Metric Naming Convention
//!
//! Every series carries the source as `ns` and `cm` labels:
//! - `sync_success_total`: destination writes that succeeded
//! - `sync_error_total`: failed destination writes, plus failed fetch/list
//! - `sync_latency_seconds`: duration of cycles that fully succeeded
//! - `sync_error_latency_seconds`: duration of cycles that failed
//! - `sync_in_sync`: 1 after a successful cycle, 0 after a failed one
//! - `sync_controller_state`: 1 for the controller's current state
//!
//! # Usage
//!
//! ```rust,no_run
//! use kube_sync::metrics::{install_prometheus_recorder, FacadeMetrics, MetricsSink};
//! use kube_sync::record::SourceLocator;
//!
//! let handle = install_prometheus_recorder().expect("recorder");
//! let sink = FacadeMetrics::new(&SourceLocator::new("team-a", "shared-config"));
//! sink.record_write_success();
//! println!("{}", handle.render());
//! ```

use crate::error::{Result, SyncError};
use crate::record::SourceLocator;
use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use std::time::Duration;

pub const SYNC_SUCCESS_TOTAL: &str = "sync_success_total";
pub const SYNC_ERROR_TOTAL: &str = "sync_error_total";
pub const SYNC_LATENCY_SECONDS: &str = "sync_latency_seconds";
pub const SYNC_ERROR_LATENCY_SECONDS: &str = "sync_error_latency_seconds";
pub const SYNC_IN_SYNC: &str = "sync_in_sync";
pub const SYNC_CONTROLLER_STATE: &str = "sync_controller_state";

const SYNC_LATENCY_BUCKETS: &[f64] = &[1.0, 2.0, 5.0, 10.0];
const SYNC_ERROR_LATENCY_BUCKETS: &[f64] = &[0.5, 1.0, 2.0, 5.0];

const CONTROLLER_STATES: &[&str] = &["Starting", "Running", "Stopping", "Stopped"];

/// Where the engine and the controller report what they do.
///
/// Implementations must tolerate concurrent calls.
pub trait MetricsSink: Send + Sync + 'static {
    /// One destination namespace written.
    fn record_write_success(&self);

    /// One destination write failed, or the source/namespace read failed.
    fn record_write_error(&self);

    /// A whole cycle succeeded in `latency`.
    fn record_cycle_success(&self, latency: Duration);

    /// A whole cycle failed after `latency`.
    fn record_cycle_failure(&self, latency: Duration);

    /// The controller moved to `state`.
    fn set_controller_state(&self, _state: &str) {}
}

/// Production sink backed by the `metrics` facade.
///
/// Without an installed recorder every call is a no-op.
#[derive(Debug, Clone)]
pub struct FacadeMetrics {
    namespace: String,
    name: String,
}

impl FacadeMetrics {
    pub fn new(source: &SourceLocator) -> Self {
        Self {
            namespace: source.namespace.clone(),
            name: source.name.clone(),
        }
    }
}

impl MetricsSink for FacadeMetrics {
    fn record_write_success(&self) {
        counter!(SYNC_SUCCESS_TOTAL, "ns" => self.namespace.clone(), "cm" => self.name.clone())
            .increment(1);
    }

    fn record_write_error(&self) {
        counter!(SYNC_ERROR_TOTAL, "ns" => self.namespace.clone(), "cm" => self.name.clone())
            .increment(1);
    }

    fn record_cycle_success(&self, latency: Duration) {
        histogram!(SYNC_LATENCY_SECONDS, "ns" => self.namespace.clone(), "cm" => self.name.clone())
            .record(latency.as_secs_f64());
        gauge!(SYNC_IN_SYNC, "ns" => self.namespace.clone(), "cm" => self.name.clone()).set(1.0);
    }

    fn record_cycle_failure(&self, latency: Duration) {
        histogram!(SYNC_ERROR_LATENCY_SECONDS, "ns" => self.namespace.clone(), "cm" => self.name.clone())
            .record(latency.as_secs_f64());
        gauge!(SYNC_IN_SYNC, "ns" => self.namespace.clone(), "cm" => self.name.clone()).set(0.0);
    }

    fn set_controller_state(&self, state: &str) {
        // One series per state, 1 for the current one
        for known in CONTROLLER_STATES {
            let value = if *known == state { 1.0 } else { 0.0 };
            gauge!(
                SYNC_CONTROLLER_STATE,
                "ns" => self.namespace.clone(),
                "cm" => self.name.clone(),
                "state" => *known
            )
            .set(value);
        }
    }
}

/// Build a Prometheus recorder with the sync histogram buckets.
///
/// The recorder is not installed; see [`install_prometheus_recorder`].
pub fn prometheus_builder() -> Result<PrometheusBuilder> {
    PrometheusBuilder::new()
        .set_buckets_for_metric(
            Matcher::Full(SYNC_LATENCY_SECONDS.to_string()),
            SYNC_LATENCY_BUCKETS,
        )
        .and_then(|b| {
            b.set_buckets_for_metric(
                Matcher::Full(SYNC_ERROR_LATENCY_SECONDS.to_string()),
                SYNC_ERROR_LATENCY_BUCKETS,
            )
        })
        .map_err(|e| SyncError::Metrics(e.to_string()))
}

/// Install the process-wide Prometheus recorder and return its render handle.
///
/// Must be called once, before any metric is emitted.
pub fn install_prometheus_recorder() -> Result<PrometheusHandle> {
    let recorder = prometheus_builder()?.build_recorder();
    let handle = recorder.handle();
    metrics::set_global_recorder(recorder).map_err(|e| SyncError::Metrics(e.to_string()))?;
    Ok(handle)
}
