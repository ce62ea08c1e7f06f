// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Replication engine: one reconciliation pass.
//!
//! # Algorithm
//!
//! 1. Fetch the source ConfigMap. Failure aborts the cycle before any write.
//! 2. List namespaces. Failure aborts the cycle before any write.
//! 3. Build one replica template (identity stripped, provenance stamped).
//! 4. For each namespace, in listing order, except the source's own:
//!    update in place, and create instead if the update says `NotFound`.
//!    A failed write is recorded and the fan-out moves on.
//! 5. Any recorded failure turns the cycle into
//!    [`SyncError::PartialReplication`].
//!
//! Writes are sequential. Counters are bumped as each write finishes, so
//! metrics reflect progress even if the process dies mid-cycle.

use crate::error::{NamespaceFailure, Result, StoreError, SyncError};
use crate::metrics::{FacadeMetrics, MetricsSink};
use crate::record::{ConfigMap, SourceLocator};
use crate::store::RemoteStore;
use crate::transform::{transform, Provenance, ReplicaTemplate};
use chrono::Utc;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, info_span, warn, Instrument};

/// How a destination was written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteAction {
    Updated,
    Created,
}

/// Result of a fully successful cycle.
#[derive(Debug, Clone)]
pub struct CycleOutcome {
    /// Destinations that already had a copy and were overwritten.
    pub updated: usize,
    /// Destinations that got a new copy.
    pub created: usize,
    /// Always empty on a returned outcome; kept for symmetry with
    /// [`SyncError::PartialReplication`].
    pub failures: Vec<NamespaceFailure>,
    /// Whether the source namespace showed up in the listing.
    pub skipped_source_namespace: bool,
    /// What every replica of this cycle points back to.
    pub provenance: Provenance,
    pub latency: Duration,
}

impl CycleOutcome {
    fn new(provenance: Provenance) -> Self {
        Self {
            updated: 0,
            created: 0,
            failures: Vec::new(),
            skipped_source_namespace: false,
            provenance,
            latency: Duration::ZERO,
        }
    }

    pub fn succeeded(&self) -> usize {
        self.updated + self.created
    }

    /// Write attempts made (successes + failures).
    pub fn attempted(&self) -> usize {
        self.succeeded() + self.failures.len()
    }

    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Copies the source ConfigMap into every other namespace.
///
/// Holds no state between cycles: the provenance annotation on each replica
/// is the only trace a cycle leaves behind.
pub struct ReplicationEngine<S: RemoteStore, M: MetricsSink = FacadeMetrics> {
    source: SourceLocator,
    store: Arc<S>,
    metrics: Arc<M>,
}

impl<S: RemoteStore, M: MetricsSink> ReplicationEngine<S, M> {
    pub fn new(source: SourceLocator, store: Arc<S>, metrics: Arc<M>) -> Self {
        Self {
            source,
            store,
            metrics,
        }
    }

    pub fn source(&self) -> &SourceLocator {
        &self.source
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub fn metrics(&self) -> &Arc<M> {
        &self.metrics
    }

    /// Run one cycle and report its latency and health to the metrics sink.
    pub async fn run_cycle(&self) -> Result<CycleOutcome> {
        let span = info_span!(
            "sync_cycle",
            namespace = %self.source.namespace,
            configmap = %self.source.name
        );

        async move {
            let start = Instant::now();
            let result = self.replicate().await;
            let latency = start.elapsed();

            match result {
                Ok(mut outcome) => {
                    outcome.latency = latency;
                    self.metrics.record_cycle_success(latency);
                    info!(
                        latency_ms = latency.as_millis() as u64,
                        updated = outcome.updated,
                        created = outcome.created,
                        "Successfully synced"
                    );
                    Ok(outcome)
                }
                Err(e) => {
                    self.metrics.record_cycle_failure(latency);
                    error!(
                        latency_ms = latency.as_millis() as u64,
                        error_type = e.kind(),
                        error = %e,
                        "Incomplete sync"
                    );
                    Err(e)
                }
            }
        }
        .instrument(span)
        .await
    }

    async fn replicate(&self) -> Result<CycleOutcome> {
        info!("Starting to sync source configmap");

        let source = match self
            .store
            .get_config_map(&self.source.namespace, &self.source.name)
            .await
        {
            Ok(cm) => cm,
            Err(e) => {
                self.metrics.record_write_error();
                return Err(SyncError::SourceFetch {
                    namespace: self.source.namespace.clone(),
                    name: self.source.name.clone(),
                    source: e,
                });
            }
        };
        let fetched_at = Utc::now();

        let namespaces = match self.store.list_namespaces().await {
            Ok(namespaces) => namespaces,
            Err(e) => {
                self.metrics.record_write_error();
                return Err(SyncError::NamespaceList(e));
            }
        };

        let template = transform(&source, fetched_at)?;
        debug!(
            resource_version = %template.provenance().resource_version,
            targets = namespaces.len().saturating_sub(1),
            "Built replica template"
        );

        let source_namespace = source
            .namespace()
            .unwrap_or(&self.source.namespace)
            .to_string();

        self.fan_out(&template, &source_namespace, &namespaces).await
    }

    async fn fan_out(
        &self,
        template: &ReplicaTemplate,
        source_namespace: &str,
        namespaces: &[String],
    ) -> Result<CycleOutcome> {
        let mut outcome = CycleOutcome::new(template.provenance().clone());

        for namespace in namespaces {
            if namespace == source_namespace {
                debug!(namespace = %namespace, "Skipping namespace of the source configmap");
                outcome.skipped_source_namespace = true;
                continue;
            }

            let replica = template.for_namespace(namespace);
            match self.write_replica(namespace, &replica).await {
                Ok(action) => {
                    self.metrics.record_write_success();
                    match action {
                        WriteAction::Updated => outcome.updated += 1,
                        WriteAction::Created => outcome.created += 1,
                    }
                    debug!(namespace = %namespace, action = ?action, "Synced namespace");
                }
                Err(e) => {
                    self.metrics.record_write_error();
                    warn!(namespace = %namespace, error = %e, "Failed to sync namespace");
                    outcome.failures.push(NamespaceFailure::new(namespace.clone(), &e));
                }
            }
        }

        if outcome.failures.is_empty() {
            Ok(outcome)
        } else {
            Err(SyncError::PartialReplication {
                succeeded: outcome.succeeded(),
                failures: outcome.failures,
            })
        }
    }

    /// Update, or create when there is nothing to update.
    async fn write_replica(
        &self,
        namespace: &str,
        replica: &ConfigMap,
    ) -> std::result::Result<WriteAction, StoreError> {
        match self.store.update_config_map(namespace, replica).await {
            Ok(_) => Ok(WriteAction::Updated),
            Err(e) if e.is_not_found() => {
                info!(namespace = %namespace, configmap = %replica.name(), "Creating configmap");
                self.store
                    .create_config_map(namespace, replica)
                    .await
                    .map(|_| WriteAction::Created)
            }
            Err(e) => Err(e),
        }
    }
}
