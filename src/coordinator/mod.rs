// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Sync controller.
//!
//! Owns the process lifecycle around the [`ReplicationEngine`]:
//! 1. Validates the configuration at construction
//! 2. Runs one cycle eagerly and fails fast if it does not succeed
//! 3. Starts the metrics and diagnostics listeners
//! 4. Runs a cycle on every tick until shutdown is signaled
//! 5. Stops the listeners and returns
//!
//! # Cancellation
//!
//! Shutdown is a `watch::Receiver<bool>` checked between cycles only. A cycle
//! that has started always runs to completion.
//!
//! # Known Limitation
//!
//! Cycles run inline in the loop, so two cycles never overlap. A cycle slower
//! than the interval delays the next tick; missed ticks are skipped, not
//! queued.

mod listeners;
mod types;

pub use listeners::{
    diagnostics_router, metrics_router, spawn_listener, DiagnosticsState, CONFIG_PATH,
    METRICS_PATH, STATUS_PATH,
};
pub use types::{ControllerState, ControllerStatus, CycleReport};

use crate::config::SyncConfig;
use crate::engine::{CycleOutcome, ReplicationEngine};
use crate::error::{Result, SyncError};
use crate::metrics::{FacadeMetrics, MetricsSink};
use crate::store::RemoteStore;
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

/// Runs the replication engine on a fixed interval.
pub struct SyncController<S: RemoteStore, M: MetricsSink = FacadeMetrics> {
    config: Arc<SyncConfig>,

    /// Validated at construction
    interval: Duration,

    engine: ReplicationEngine<S, M>,

    /// Status (broadcast to watchers and the diagnostics listener)
    status_tx: watch::Sender<ControllerStatus>,

    /// Render handle for `/metrics`, when a recorder was installed
    exporter: Option<PrometheusHandle>,

    /// Stops the background listeners
    listener_shutdown_tx: watch::Sender<bool>,

    /// Background listener task handles
    listener_handles: Vec<JoinHandle<()>>,
}

impl<S: RemoteStore, M: MetricsSink> SyncController<S, M> {
    /// Create a controller. Fails on invalid configuration (e.g. a zero interval).
    ///
    /// The controller starts in `Starting` state. Call [`run()`](Self::run)
    /// to sync.
    pub fn new(config: SyncConfig, store: Arc<S>, metrics: Arc<M>) -> Result<Self> {
        if let Err(e) = config.validate() {
            error!(error = %e, "Cannot use the provided config");
            return Err(e);
        }
        let interval = config.interval()?;

        let engine = ReplicationEngine::new(config.source.clone(), store, metrics);
        let (status_tx, _) = watch::channel(ControllerStatus::new(
            config.source.clone(),
            config.sync_interval.clone(),
        ));
        let (listener_shutdown_tx, _) = watch::channel(false);

        Ok(Self {
            config: Arc::new(config),
            interval,
            engine,
            status_tx,
            exporter: None,
            listener_shutdown_tx,
            listener_handles: Vec::new(),
        })
    }

    /// Serve `handle` on the metrics listener once running.
    pub fn with_exporter(mut self, handle: PrometheusHandle) -> Self {
        self.exporter = Some(handle);
        self
    }

    pub fn engine(&self) -> &ReplicationEngine<S, M> {
        &self.engine
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Get current controller state.
    pub fn state(&self) -> ControllerState {
        self.status_tx.borrow().state
    }

    /// Current status snapshot.
    pub fn status(&self) -> ControllerStatus {
        self.status_tx.borrow().clone()
    }

    /// Get a receiver to watch status changes.
    pub fn status_receiver(&self) -> watch::Receiver<ControllerStatus> {
        self.status_tx.subscribe()
    }

    fn set_state(&self, state: ControllerState) {
        self.status_tx.send_modify(|s| s.state = state);
        self.engine.metrics().set_controller_state(&state.to_string());
        debug!(state = %state, "Controller state changed");
    }

    /// Run until `shutdown_rx` turns true.
    ///
    /// Returns the first cycle's error if it fails; every later cycle error is
    /// logged and the loop keeps going.
    pub async fn run(&mut self, mut shutdown_rx: watch::Receiver<bool>) -> Result<()> {
        if self.state() != ControllerState::Starting {
            return Err(SyncError::InvalidState {
                expected: ControllerState::Starting.to_string(),
                actual: self.state().to_string(),
            });
        }
        self.set_state(ControllerState::Starting);

        info!(
            source = %self.config.source,
            interval = %humantime::format_duration(self.interval),
            "Starting kube-sync"
        );

        // Sync once and fail fast
        if let Err(e) = self.sync_once().await {
            error!(error = %e, "First sync failed, not entering the sync loop");
            self.set_state(ControllerState::Stopped);
            return Err(e);
        }

        self.spawn_listeners();
        self.set_state(ControllerState::Running);

        let mut timer = tokio::time::interval_at(
            tokio::time::Instant::now() + self.interval,
            self.interval,
        );
        timer.set_missed_tick_behavior(MissedTickBehavior::Skip);

        // A signal raised during the first cycle stops us right away
        let stop_requested = *shutdown_rx.borrow_and_update();
        if stop_requested {
            info!("Shutdown requested during first sync, stopping");
        } else {
            info!(interval = %humantime::format_duration(self.interval), "Starting to sync periodically");
            loop {
                tokio::select! {
                    biased;

                    result = shutdown_rx.changed() => {
                        if result.is_err() || *shutdown_rx.borrow() {
                            info!("Shutdown signal received, stopping");
                            break;
                        }
                        continue;
                    }

                    _ = timer.tick() => {}
                }

                // Errors are already logged and metered by the engine
                let _ = self.sync_once().await;
            }
        }

        self.shutdown().await;
        Ok(())
    }

    async fn sync_once(&self) -> Result<CycleOutcome> {
        let start = Instant::now();
        let result = self.engine.run_cycle().await;
        let report = CycleReport::from_result(&result, start.elapsed());
        self.status_tx.send_modify(|s| s.record_cycle(report));
        result
    }

    fn spawn_listeners(&mut self) {
        if self.config.exporter.enabled {
            match &self.exporter {
                Some(handle) => {
                    info!(bind = %self.config.exporter.bind, path = METRICS_PATH, "Starting prometheus exporter");
                    let handle = spawn_listener(
                        "metrics",
                        self.config.exporter.bind.clone(),
                        metrics_router(handle.clone()),
                        self.listener_shutdown_tx.subscribe(),
                    );
                    self.listener_handles.push(handle);
                }
                None => warn!("Prometheus exporter enabled but no recorder installed, not serving /metrics"),
            }
        }

        if self.config.diagnostics.enabled {
            info!(bind = %self.config.diagnostics.bind, "Starting diagnostics listener");
            let state = DiagnosticsState {
                status_rx: self.status_tx.subscribe(),
                config: Arc::clone(&self.config),
            };
            let handle = spawn_listener(
                "diagnostics",
                self.config.diagnostics.bind.clone(),
                diagnostics_router(state),
                self.listener_shutdown_tx.subscribe(),
            );
            self.listener_handles.push(handle);
        }
    }

    /// Stop listeners and settle in `Stopped`.
    async fn shutdown(&mut self) {
        self.set_state(ControllerState::Stopping);
        let _ = self.listener_shutdown_tx.send(true);

        let handles = std::mem::take(&mut self.listener_handles);
        drain_listeners(handles, self.config.shutdown_timeout()).await;

        self.set_state(ControllerState::Stopped);
        info!("kube-sync stopped");
    }
}

/// Wait up to `drain_timeout` for each listener, aborting any that overrun.
///
/// Returns how many listeners had to be aborted.
async fn drain_listeners(handles: Vec<JoinHandle<()>>, drain_timeout: Duration) -> usize {
    let mut aborted = 0;
    for (i, mut handle) in handles.into_iter().enumerate() {
        match tokio::time::timeout(drain_timeout, &mut handle).await {
            Ok(Ok(())) => debug!(task = i + 1, "Listener stopped gracefully"),
            Ok(Err(e)) => warn!(task = i + 1, error = %e, "Listener panicked during shutdown"),
            Err(_) => {
                warn!(task = i + 1, "Listener did not stop in time, aborting");
                handle.abort();
                aborted += 1;
            }
        }
    }
    aborted
}
