//! Recording MetricsSink for testing.

use kube_sync::MetricsSink;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Duration;

/// Counts every metrics call.
#[derive(Default)]
pub struct RecordingMetrics {
    successes: AtomicU64,
    errors: AtomicU64,
    cycle_latencies: Mutex<Vec<Duration>>,
    error_latencies: Mutex<Vec<Duration>>,
    states: Mutex<Vec<String>>,
}

impl RecordingMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn successes(&self) -> u64 {
        self.successes.load(Ordering::SeqCst)
    }

    pub fn errors(&self) -> u64 {
        self.errors.load(Ordering::SeqCst)
    }

    /// Latencies of fully successful cycles.
    pub fn cycle_latencies(&self) -> Vec<Duration> {
        self.cycle_latencies.lock().unwrap().clone()
    }

    /// Latencies of failed cycles.
    pub fn error_latencies(&self) -> Vec<Duration> {
        self.error_latencies.lock().unwrap().clone()
    }

    pub fn cycles(&self) -> usize {
        self.cycle_latencies().len() + self.error_latencies().len()
    }

    pub fn states(&self) -> Vec<String> {
        self.states.lock().unwrap().clone()
    }
}

impl MetricsSink for RecordingMetrics {
    fn record_write_success(&self) {
        self.successes.fetch_add(1, Ordering::SeqCst);
    }

    fn record_write_error(&self) {
        self.errors.fetch_add(1, Ordering::SeqCst);
    }

    fn record_cycle_success(&self, latency: Duration) {
        self.cycle_latencies.lock().unwrap().push(latency);
    }

    fn record_cycle_failure(&self, latency: Duration) {
        self.error_latencies.lock().unwrap().push(latency);
    }

    fn set_controller_state(&self, state: &str) {
        self.states.lock().unwrap().push(state.to_string());
    }
}
