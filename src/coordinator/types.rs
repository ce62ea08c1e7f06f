//! Controller state types.
//!
//! Defines the state machine for the sync controller lifecycle.
//!
//! # State Transitions
//!
//! ```text
//!              first cycle ok
//! Starting ─────────────────────→ Running
//!    │                               │
//!    │ first cycle failed            │ shutdown signal
//!    ↓                               ↓
//! Stopped ←───────────────────── Stopping
//!                listeners drained
//! ```
//!
//! # State Descriptions
//!
//! - **Starting**: Initial state after `SyncController::new()`. The eager first cycle runs here.
//! - **Running**: Periodic loop active, listeners serving.
//! - **Stopping**: Shutdown observed, no new cycles, listeners draining.
//! - **Stopped**: Terminal. Reached after a graceful stop or a failed first cycle.

use crate::engine::CycleOutcome;
use crate::error::SyncError;
use crate::record::SourceLocator;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::time::Duration;

/// State of the sync controller.
///
/// See module docs for the state transition diagram.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ControllerState {
    /// Created, first cycle not yet finished.
    Starting,

    /// Syncing on every tick.
    Running,

    /// Shutdown observed. No further cycles will start.
    Stopping,

    /// Terminal.
    Stopped,
}

impl std::fmt::Display for ControllerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ControllerState::Starting => write!(f, "Starting"),
            ControllerState::Running => write!(f, "Running"),
            ControllerState::Stopping => write!(f, "Stopping"),
            ControllerState::Stopped => write!(f, "Stopped"),
        }
    }
}

/// Summary of the last finished cycle.
#[derive(Debug, Clone, Serialize)]
pub struct CycleReport {
    pub finished_at: DateTime<Utc>,
    pub succeeded: usize,
    pub failed: usize,
    pub latency_ms: u64,
    pub error: Option<String>,
}

impl CycleReport {
    pub fn from_result(result: &Result<CycleOutcome, SyncError>, latency: Duration) -> Self {
        let (succeeded, failed) = match result {
            Ok(outcome) => (outcome.succeeded(), 0),
            Err(SyncError::PartialReplication {
                succeeded,
                failures,
            }) => (*succeeded, failures.len()),
            Err(_) => (0, 0),
        };
        Self {
            finished_at: Utc::now(),
            succeeded,
            failed,
            latency_ms: latency.as_millis() as u64,
            error: result.as_ref().err().map(ToString::to_string),
        }
    }
}

/// Snapshot published on every state change and after every cycle.
///
/// Served as JSON on `/debug/status`.
#[derive(Debug, Clone, Serialize)]
pub struct ControllerStatus {
    pub state: ControllerState,
    pub source: SourceLocator,
    pub sync_interval: String,
    pub cycles_total: u64,
    pub cycles_failed: u64,
    pub last_cycle: Option<CycleReport>,
}

impl ControllerStatus {
    pub fn new(source: SourceLocator, sync_interval: String) -> Self {
        Self {
            state: ControllerState::Starting,
            source,
            sync_interval,
            cycles_total: 0,
            cycles_failed: 0,
            last_cycle: None,
        }
    }

    /// Fold a finished cycle into the counters.
    pub fn record_cycle(&mut self, report: CycleReport) {
        self.cycles_total += 1;
        if report.error.is_some() {
            self.cycles_failed += 1;
        }
        self.last_cycle = Some(report);
    }
}
