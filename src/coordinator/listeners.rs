// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Background HTTP listeners.
//!
//! - **Metrics**: `GET /metrics`, Prometheus text format.
//! - **Diagnostics**: `GET /debug/status` (controller status) and
//!   `GET /debug/config` (effective configuration), both JSON.
//!
//! Each listener is a tokio task owned by the controller. A listener that
//! cannot bind logs a warning and exits; the sync loop does not depend on it.

use super::types::ControllerStatus;
use crate::config::SyncConfig;
use axum::extract::State;
use axum::http::header;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

pub const METRICS_PATH: &str = "/metrics";
pub const STATUS_PATH: &str = "/debug/status";
pub const CONFIG_PATH: &str = "/debug/config";

const PROMETHEUS_CONTENT_TYPE: &str = "text/plain; version=0.0.4; charset=utf-8";

async fn render_metrics(State(handle): State<PrometheusHandle>) -> impl IntoResponse {
    ([(header::CONTENT_TYPE, PROMETHEUS_CONTENT_TYPE)], handle.render())
}

/// Router serving the Prometheus exposition.
pub fn metrics_router(handle: PrometheusHandle) -> Router {
    Router::new()
        .route(METRICS_PATH, get(render_metrics))
        .with_state(handle)
}

/// Diagnostics endpoint state
#[derive(Clone)]
pub struct DiagnosticsState {
    pub status_rx: watch::Receiver<ControllerStatus>,
    pub config: Arc<SyncConfig>,
}

async fn status(State(state): State<DiagnosticsState>) -> Json<ControllerStatus> {
    let snapshot = state.status_rx.borrow().clone();
    Json(snapshot)
}

async fn config(State(state): State<DiagnosticsState>) -> Json<SyncConfig> {
    Json(state.config.as_ref().clone())
}

/// Router serving the diagnostics endpoints.
pub fn diagnostics_router(state: DiagnosticsState) -> Router {
    Router::new()
        .route(STATUS_PATH, get(status))
        .route(CONFIG_PATH, get(config))
        .with_state(state)
}

/// Bind `bind` and serve `router` until `shutdown_rx` turns true.
pub fn spawn_listener(
    name: &'static str,
    bind: String,
    router: Router,
    mut shutdown_rx: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let listener = match TcpListener::bind(&bind).await {
            Ok(listener) => listener,
            Err(e) => {
                warn!(listener = name, bind = %bind, error = %e, "Cannot bind listener, continuing without it");
                return;
            }
        };
        info!(listener = name, bind = %bind, "Listener started");

        let shutdown = async move {
            // Sender dropped counts as shutdown too
            let _ = shutdown_rx.wait_for(|stop| *stop).await;
        };

        if let Err(e) = axum::serve(listener, router)
            .with_graceful_shutdown(shutdown)
            .await
        {
            warn!(listener = name, error = %e, "Listener failed");
        }
        debug!(listener = name, "Listener stopped");
    })
}
