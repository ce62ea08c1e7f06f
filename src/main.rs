// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! kube-sync - replicate a ConfigMap into every namespace
//!
//! Exit codes:
//! - 0: stopped by SIGINT/SIGTERM
//! - 1: bad arguments or configuration, client construction failed
//! - 2: the first sync cycle failed

use anyhow::Context;
use clap::{Parser, ValueEnum};
use kube_sync::config::{DiagnosticsConfig, ExporterConfig, KubeConfig};
use kube_sync::metrics::install_prometheus_recorder;
use kube_sync::{FacadeMetrics, KubeClient, SourceLocator, SyncConfig, SyncController};
use std::process::ExitCode;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Debug, Clone, Copy, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

/// kube-sync CLI
#[derive(Parser)]
#[command(name = "kube-sync")]
#[command(about = "Replicate a ConfigMap into every other namespace", long_about = None)]
#[command(version)]
struct Cli {
    /// Namespace of the source ConfigMap
    namespace: String,

    /// Name of the source ConfigMap
    configmap: String,

    /// Time between sync cycles (e.g. 30s, 1m, 1h30m)
    #[arg(long, env = "KUBE_SYNC_INTERVAL", default_value = "1m")]
    sync_interval: String,

    /// Increase log verbosity (-v debug, -vv trace). Ignored when RUST_LOG is set
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Log output format
    #[arg(long, value_enum, default_value = "text")]
    log_format: LogFormat,

    /// Kubernetes API server URL (defaults to the in-cluster service)
    #[arg(long, env = "KUBE_SYNC_API_SERVER")]
    api_server: Option<String>,

    /// Bearer token file (defaults to the service account token)
    #[arg(long)]
    token_file: Option<String>,

    /// CA bundle for the API server (defaults to the service account CA)
    #[arg(long)]
    ca_file: Option<String>,

    /// Skip API server certificate verification
    #[arg(long)]
    insecure_skip_tls_verify: bool,

    /// Per-request timeout against the API server
    #[arg(long, default_value = "15s")]
    request_timeout: String,

    /// Do not serve Prometheus metrics
    #[arg(long)]
    disable_prometheus_exporter: bool,

    /// Prometheus exporter bind address
    #[arg(long, default_value = "0.0.0.0:8484")]
    prometheus_exporter_bind: String,

    /// Do not serve the diagnostics endpoints
    #[arg(long)]
    disable_debug_listener: bool,

    /// Diagnostics listener bind address
    #[arg(long, default_value = "127.0.0.1:6060")]
    debug_bind: String,

    /// Seconds to wait for listeners on shutdown
    #[arg(long, default_value_t = 10)]
    shutdown_timeout: u64,
}

impl Cli {
    fn sync_config(&self) -> SyncConfig {
        SyncConfig {
            source: SourceLocator::new(&self.namespace, &self.configmap),
            sync_interval: self.sync_interval.clone(),
            shutdown_timeout_sec: self.shutdown_timeout,
            exporter: ExporterConfig {
                enabled: !self.disable_prometheus_exporter,
                bind: self.prometheus_exporter_bind.clone(),
            },
            diagnostics: DiagnosticsConfig {
                enabled: !self.disable_debug_listener,
                bind: self.debug_bind.clone(),
            },
            kube: KubeConfig {
                api_server: self.api_server.clone(),
                token_file: self.token_file.clone(),
                ca_file: self.ca_file.clone(),
                insecure_skip_tls_verify: self.insecure_skip_tls_verify,
                request_timeout: Some(self.request_timeout.clone()),
            },
        }
    }
}

fn init_tracing(verbose: u8, format: LogFormat) {
    let default_level = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    match format {
        LogFormat::Json => tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init(),
        LogFormat::Text => tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer())
            .init(),
    }
}

fn build(config: SyncConfig) -> anyhow::Result<SyncController<KubeClient>> {
    config.validate().context("invalid configuration")?;

    let store = Arc::new(KubeClient::new(&config.kube).context("cannot create Kubernetes client")?);

    let exporter = if config.exporter.enabled {
        Some(install_prometheus_recorder().context("cannot install Prometheus recorder")?)
    } else {
        None
    };

    let metrics = Arc::new(FacadeMetrics::new(&config.source));
    let controller =
        SyncController::new(config, store, metrics).context("cannot create sync controller")?;

    Ok(match exporter {
        Some(handle) => controller.with_exporter(handle),
        None => controller,
    })
}

/// Exit status for a command line clap rejected.
///
/// `--help` and `--version` are not failures. Everything else shares the
/// configuration-error status so it stays distinct from a failed first sync.
fn usage_exit_code(err: &clap::Error) -> u8 {
    if err.use_stderr() {
        1
    } else {
        0
    }
}

/// Resolve on SIGINT. Never resolves if the handler cannot be installed.
async fn wait_for_ctrl_c() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "Cannot listen for SIGINT");
        std::future::pending::<()>().await;
    }
}

/// Flip `shutdown_tx` on SIGINT or SIGTERM.
fn spawn_signal_handler(shutdown_tx: watch::Sender<bool>) {
    tokio::spawn(async move {
        #[cfg(unix)]
        {
            use tokio::signal::unix::{signal, SignalKind};
            match signal(SignalKind::terminate()) {
                Ok(mut sigterm) => {
                    tokio::select! {
                        _ = wait_for_ctrl_c() => info!("Received SIGINT"),
                        _ = sigterm.recv() => info!("Received SIGTERM"),
                    }
                }
                Err(e) => {
                    error!(error = %e, "Cannot install SIGTERM handler, only SIGINT is handled");
                    wait_for_ctrl_c().await;
                    info!("Received SIGINT");
                }
            }
        }
        #[cfg(not(unix))]
        {
            wait_for_ctrl_c().await;
            info!("Received SIGINT");
        }
        let _ = shutdown_tx.send(true);
    });
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let _ = e.print();
            return ExitCode::from(usage_exit_code(&e));
        }
    };
    init_tracing(cli.verbose, cli.log_format);

    let mut controller = match build(cli.sync_config()) {
        Ok(controller) => controller,
        Err(e) => {
            error!(error = %format!("{:#}", e), "Cannot create sync service");
            return ExitCode::from(1);
        }
    };

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    spawn_signal_handler(shutdown_tx);

    match controller.run(shutdown_rx).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "Sync service stopped with an error");
            ExitCode::from(e.exit_code())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_cli_defaults() {
        let cli = Cli::try_parse_from(["kube-sync", "team-a", "shared-config"]).unwrap();
        let config = cli.sync_config();
        assert_eq!(config.source, SourceLocator::new("team-a", "shared-config"));
        assert!(config.exporter.enabled);
        assert_eq!(config.exporter.bind, "0.0.0.0:8484");
        assert!(config.diagnostics.enabled);
        assert_eq!(config.diagnostics.bind, "127.0.0.1:6060");
        assert_eq!(config.shutdown_timeout_sec, 10);
    }

    #[test]
    fn test_cli_overrides() {
        let cli = Cli::try_parse_from([
            "kube-sync",
            "ns",
            "cm",
            "--sync-interval",
            "30s",
            "-vv",
            "--log-format",
            "json",
            "--disable-prometheus-exporter",
            "--api-server",
            "https://k8s:6443",
        ])
        .unwrap();
        assert_eq!(cli.verbose, 2);
        assert!(matches!(cli.log_format, LogFormat::Json));

        let config = cli.sync_config();
        assert_eq!(config.sync_interval, "30s");
        assert!(!config.exporter.enabled);
        assert_eq!(config.kube.api_server.as_deref(), Some("https://k8s:6443"));
    }

    #[test]
    fn test_cli_requires_source() {
        let err = Cli::try_parse_from(["kube-sync", "only-namespace"])
            .err()
            .unwrap();
        assert_eq!(usage_exit_code(&err), 1);
    }

    #[test]
    fn test_usage_exit_codes() {
        let help = Cli::try_parse_from(["kube-sync", "--help"]).err().unwrap();
        assert_eq!(usage_exit_code(&help), 0);

        let version = Cli::try_parse_from(["kube-sync", "--version"]).err().unwrap();
        assert_eq!(usage_exit_code(&version), 0);

        let unknown = Cli::try_parse_from(["kube-sync", "ns", "cm", "--bogus"])
            .err()
            .unwrap();
        assert_eq!(usage_exit_code(&unknown), 1);

        let bad_value = Cli::try_parse_from(["kube-sync", "ns", "cm", "--log-format", "xml"])
            .err()
            .unwrap();
        assert_eq!(usage_exit_code(&bad_value), 1);

        // Never the first-sync failure status
        for err in [unknown, bad_value] {
            assert_ne!(usage_exit_code(&err), 2);
        }
    }

    #[tokio::test]
    async fn test_signal_handler_waits_for_a_signal() {
        let (tx, mut rx) = watch::channel(false);
        spawn_signal_handler(tx);

        // No signal was sent, so shutdown must not be requested
        let changed = tokio::time::timeout(Duration::from_millis(200), rx.changed()).await;
        assert!(changed.is_err());
        assert!(!*rx.borrow());
    }

    #[test]
    fn test_build_rejects_bad_interval() {
        let mut config = SyncConfig::for_testing("ns", "cm");
        config.sync_interval = "soon".into();
        config.kube.api_server = Some("https://127.0.0.1:6443".into());
        assert!(build(config).is_err());
    }
}
