//! Configuration for kube-sync.
//!
//! Configuration is passed to [`SyncController::new()`](crate::SyncController::new).
//! The binary builds it from command-line flags; it can also be constructed
//! programmatically or deserialized from YAML/JSON.
//!
//! # Quick Start
//!
//! ```rust
//! use kube_sync::config::SyncConfig;
//!
//! let config = SyncConfig {
//!     sync_interval: "30s".into(),
//!     ..SyncConfig::new("team-a", "shared-config")
//! };
//! assert!(config.validate().is_ok());
//! ```
//!
//! # Configuration Structure
//!
//! ```text
//! SyncConfig
//! ├── source: SourceLocator          # namespace + name of the source ConfigMap
//! ├── sync_interval: String          # humantime, e.g. "1m"
//! ├── shutdown_timeout_sec: u64      # listener drain on stop
//! ├── exporter: ExporterConfig       # Prometheus /metrics listener
//! ├── diagnostics: DiagnosticsConfig # /debug listener
//! └── kube: KubeConfig               # API server connection
//! ```
//!
//! # YAML Example
//!
//! ```yaml
//! source:
//!   namespace: "team-a"
//!   name: "shared-config"
//! sync_interval: "1m"
//! exporter:
//!   enabled: true
//!   bind: "0.0.0.0:8484"
//! diagnostics:
//!   enabled: false
//! kube:
//!   request_timeout: "15s"
//! ```

use crate::error::{Result, SyncError};
use crate::record::SourceLocator;
use serde::{Deserialize, Serialize};
use std::time::Duration;

// ═══════════════════════════════════════════════════════════════════════════════
// Top-level config
// ═══════════════════════════════════════════════════════════════════════════════

/// The top-level config object passed to `SyncController::new()`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    /// The ConfigMap copied into every other namespace.
    pub source: SourceLocator,

    /// Time between two cycles (humantime string). Must be > 0.
    #[serde(default = "default_sync_interval")]
    pub sync_interval: String,

    /// How long to wait for background listeners on stop.
    #[serde(default = "default_shutdown_timeout_sec")]
    pub shutdown_timeout_sec: u64,

    #[serde(default)]
    pub exporter: ExporterConfig,

    #[serde(default)]
    pub diagnostics: DiagnosticsConfig,

    #[serde(default)]
    pub kube: KubeConfig,
}

fn default_sync_interval() -> String {
    "1m".to_string()
}

fn default_shutdown_timeout_sec() -> u64 {
    10
}

impl SyncConfig {
    /// Config with defaults for the given source.
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            source: SourceLocator::new(namespace, name),
            sync_interval: default_sync_interval(),
            shutdown_timeout_sec: default_shutdown_timeout_sec(),
            exporter: ExporterConfig::default(),
            diagnostics: DiagnosticsConfig::default(),
            kube: KubeConfig::default(),
        }
    }

    /// Minimal config for testing: no listeners, 1s interval.
    pub fn for_testing(namespace: &str, name: &str) -> Self {
        Self {
            sync_interval: "1s".to_string(),
            shutdown_timeout_sec: 1,
            exporter: ExporterConfig::disabled(),
            diagnostics: DiagnosticsConfig::disabled(),
            ..Self::new(namespace, name)
        }
    }

    /// Parse the sync interval. Zero and unparseable values are rejected.
    pub fn interval(&self) -> Result<Duration> {
        let interval = humantime::parse_duration(&self.sync_interval).map_err(|e| {
            SyncError::Config(format!("invalid sync interval {:?}: {}", self.sync_interval, e))
        })?;
        if interval.is_zero() {
            return Err(SyncError::Config(format!(
                "invalid sync interval {:?}: must be greater than zero",
                self.sync_interval
            )));
        }
        Ok(interval)
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_sec)
    }

    /// Check everything that can be checked without touching the network.
    pub fn validate(&self) -> Result<()> {
        if self.source.namespace.trim().is_empty() {
            return Err(SyncError::Config("source namespace is empty".to_string()));
        }
        if self.source.name.trim().is_empty() {
            return Err(SyncError::Config("source configmap name is empty".to_string()));
        }
        self.interval()?;
        if self.exporter.enabled {
            check_bind("prometheus exporter", &self.exporter.bind)?;
        }
        if self.diagnostics.enabled {
            check_bind("diagnostics", &self.diagnostics.bind)?;
        }
        self.kube.request_timeout()?;
        Ok(())
    }
}

/// Only an empty bind is rejected here. Hostnames are resolved by the
/// listener, where a failure is logged and does not stop the sync loop.
fn check_bind(what: &str, bind: &str) -> Result<()> {
    if bind.trim().is_empty() {
        return Err(SyncError::Config(format!("{} bind address is empty", what)));
    }
    Ok(())
}

// ═══════════════════════════════════════════════════════════════════════════════
// Listeners
// ═══════════════════════════════════════════════════════════════════════════════

/// Prometheus exporter (`GET /metrics`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExporterConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_exporter_bind")]
    pub bind: String,
}

fn default_true() -> bool {
    true
}

fn default_exporter_bind() -> String {
    "0.0.0.0:8484".to_string()
}

impl Default for ExporterConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            bind: default_exporter_bind(),
        }
    }
}

impl ExporterConfig {
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::default()
        }
    }
}

/// Diagnostics listener (`GET /debug/status`, `GET /debug/config`).
///
/// Bound to loopback by default.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiagnosticsConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_diagnostics_bind")]
    pub bind: String,
}

fn default_diagnostics_bind() -> String {
    "127.0.0.1:6060".to_string()
}

impl Default for DiagnosticsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            bind: default_diagnostics_bind(),
        }
    }
}

impl DiagnosticsConfig {
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::default()
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// KubeConfig: API server connection
// ═══════════════════════════════════════════════════════════════════════════════

/// Kubernetes API connection settings.
///
/// Every field left unset falls back to the in-cluster service account
/// (see [`KubeClient::new`](crate::kube_client::KubeClient::new)).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct KubeConfig {
    /// e.g. `https://10.0.0.1:443`
    #[serde(default)]
    pub api_server: Option<String>,

    /// Bearer token file, re-read on every request.
    #[serde(default)]
    pub token_file: Option<String>,

    /// PEM bundle used to verify the API server.
    #[serde(default)]
    pub ca_file: Option<String>,

    #[serde(default)]
    pub insecure_skip_tls_verify: bool,

    /// Per-request timeout (humantime). Defaults to 15s.
    #[serde(default)]
    pub request_timeout: Option<String>,
}

impl KubeConfig {
    pub fn request_timeout(&self) -> Result<Duration> {
        match &self.request_timeout {
            None => Ok(Duration::from_secs(15)),
            Some(raw) => {
                let timeout = humantime::parse_duration(raw).map_err(|e| {
                    SyncError::Config(format!("invalid request timeout {:?}: {}", raw, e))
                })?;
                if timeout.is_zero() {
                    return Err(SyncError::Config(
                        "request timeout must be greater than zero".to_string(),
                    ));
                }
                Ok(timeout)
            }
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════════════════════════
