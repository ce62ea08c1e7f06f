//! # kube-sync
//!
//! Keeps one source ConfigMap replicated into every other namespace of a
//! Kubernetes cluster.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────────┐
//! │                             kube-sync                                │
//! │                                                                      │
//! │  ┌────────────────┐  tick  ┌───────────────────┐    ┌─────────────┐  │
//! │  │ SyncController │───────►│ ReplicationEngine │───►│ RemoteStore │  │
//! │  │ (interval loop)│        │ (fetch, list,     │    │ (KubeClient)│  │
//! │  └────────────────┘        │  transform, write)│    └─────────────┘  │
//! │     │         │            └───────────────────┘                     │
//! │     ▼         ▼                      │                               │
//! │  /metrics  /debug/*                  ▼                               │
//! │                               MetricsSink (metrics facade)           │
//! └──────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Every cycle is a full, stateless reconciliation: fetch the source, list
//! namespaces, update (or create) a copy in each namespace but the source's
//! own. Each copy carries a `kube-sync/source` annotation pointing back at
//! the exact source revision it was taken from.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use kube_sync::{FacadeMetrics, KubeClient, SyncConfig, SyncController};
//! use std::sync::Arc;
//! use tokio::sync::watch;
//!
//! #[tokio::main]
//! async fn main() -> kube_sync::Result<()> {
//!     let config = SyncConfig::new("team-a", "shared-config");
//!     let store = Arc::new(KubeClient::new(&config.kube)?);
//!     let metrics = Arc::new(FacadeMetrics::new(&config.source));
//!     let (_shutdown_tx, shutdown_rx) = watch::channel(false);
//!
//!     let mut controller = SyncController::new(config, store, metrics)?;
//!     // Runs until the shutdown channel turns true
//!     controller.run(shutdown_rx).await
//! }
//! ```

pub mod config;
pub mod coordinator;
pub mod engine;
pub mod error;
pub mod kube_client;
pub mod metrics;
pub mod record;
pub mod store;
pub mod transform;

// Re-exports for convenience
pub use config::{DiagnosticsConfig, ExporterConfig, KubeConfig, SyncConfig};
pub use coordinator::{ControllerState, ControllerStatus, SyncController};
pub use engine::{CycleOutcome, ReplicationEngine, WriteAction};
pub use error::{NamespaceFailure, Result, StoreError, SyncError};
pub use kube_client::KubeClient;
pub use metrics::{FacadeMetrics, MetricsSink};
pub use record::{ConfigMap, SourceLocator};
pub use store::{InMemoryStore, RemoteStore};
pub use transform::{Provenance, PROVENANCE_ANNOTATION};
