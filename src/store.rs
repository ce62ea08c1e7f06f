// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Remote store integration trait.
//!
//! Defines what the replication engine needs from the cluster API: read the
//! source, list namespaces, and create or update a ConfigMap in a namespace.
//! [`KubeClient`](crate::kube_client::KubeClient) talks to a real API server;
//! [`InMemoryStore`] is a small in-process cluster for tests and embedding.
//!
//! # Example
//!
//! ```rust,no_run
//! use kube_sync::store::{BoxFuture, RemoteStore};
//! use kube_sync::record::ConfigMap;
//!
//! struct MyBackend { /* ... */ }
//!
//! impl RemoteStore for MyBackend {
//!     fn get_config_map(&self, namespace: &str, name: &str) -> BoxFuture<'_, ConfigMap> {
//!         let cm = ConfigMap::new(namespace, name);
//!         Box::pin(async move { Ok(cm) })
//!     }
//!
//!     fn list_namespaces(&self) -> BoxFuture<'_, Vec<String>> {
//!         Box::pin(async move { Ok(vec!["default".to_string()]) })
//!     }
//!
//!     fn create_config_map(&self, _namespace: &str, cm: &ConfigMap) -> BoxFuture<'_, ConfigMap> {
//!         let cm = cm.clone();
//!         Box::pin(async move { Ok(cm) })
//!     }
//!
//!     fn update_config_map(&self, _namespace: &str, cm: &ConfigMap) -> BoxFuture<'_, ConfigMap> {
//!         let cm = cm.clone();
//!         Box::pin(async move { Ok(cm) })
//!     }
//! }
//! ```

use crate::error::{StoreError, StoreResult};
use crate::record::ConfigMap;
use chrono::Utc;
use std::collections::{BTreeMap, HashMap};
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::RwLock;

/// Type alias for boxed async futures (reduces trait signature complexity).
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = StoreResult<T>> + Send + 'a>>;

/// The cluster API as seen by the engine.
///
/// Implementations own their connection handling. Calls are made one at a
/// time by the engine; nothing here needs to be re-entrant beyond `Sync`.
pub trait RemoteStore: Send + Sync + 'static {
    /// Fetch a ConfigMap. `NotFound` when it does not exist.
    fn get_config_map(&self, namespace: &str, name: &str) -> BoxFuture<'_, ConfigMap>;

    /// All namespace names, in the order the API lists them.
    fn list_namespaces(&self) -> BoxFuture<'_, Vec<String>>;

    /// Create `cm` in `namespace`. `AlreadyExists` on collision.
    fn create_config_map(&self, namespace: &str, cm: &ConfigMap) -> BoxFuture<'_, ConfigMap>;

    /// Replace `cm` in `namespace`. `NotFound` when there is nothing to replace.
    fn update_config_map(&self, namespace: &str, cm: &ConfigMap) -> BoxFuture<'_, ConfigMap>;
}

#[derive(Default)]
struct Cluster {
    /// Listing order.
    namespaces: Vec<String>,
    /// namespace -> name -> object
    objects: HashMap<String, BTreeMap<String, ConfigMap>>,
}

/// An in-memory cluster.
///
/// Behaves like the API server for the four calls the engine makes: writes
/// into a missing namespace fail with `NotFound`, creates assign a uid and a
/// creation timestamp, and every write bumps the resource version.
#[derive(Default)]
pub struct InMemoryStore {
    cluster: RwLock<Cluster>,
    revision: AtomicU64,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store with the given namespaces (in listing order).
    pub fn with_namespaces<I, N>(namespaces: I) -> Self
    where
        I: IntoIterator<Item = N>,
        N: Into<String>,
    {
        let mut cluster = Cluster::default();
        for ns in namespaces {
            let ns = ns.into();
            cluster.objects.entry(ns.clone()).or_default();
            cluster.namespaces.push(ns);
        }
        Self {
            cluster: RwLock::new(cluster),
            revision: AtomicU64::new(0),
        }
    }

    /// Add a namespace at the end of the listing (no-op if present).
    pub async fn add_namespace(&self, namespace: &str) {
        let mut cluster = self.cluster.write().await;
        if !cluster.namespaces.iter().any(|n| n == namespace) {
            cluster.namespaces.push(namespace.to_string());
            cluster.objects.entry(namespace.to_string()).or_default();
        }
    }

    /// Delete a namespace and everything in it.
    pub async fn remove_namespace(&self, namespace: &str) {
        let mut cluster = self.cluster.write().await;
        cluster.namespaces.retain(|n| n != namespace);
        cluster.objects.remove(namespace);
    }

    /// Seed an object, creating its namespace if needed.
    ///
    /// A uid and resource version already set on `cm` are kept.
    pub async fn insert(&self, mut cm: ConfigMap) -> ConfigMap {
        let namespace = cm.namespace().unwrap_or("default").to_string();
        self.add_namespace(&namespace).await;
        let uid = cm.metadata.uid.take();
        let resource_version = cm.metadata.resource_version.take();
        let mut stored = self.stamp_created(cm, &namespace);
        if uid.is_some() {
            stored.metadata.uid = uid;
        }
        if resource_version.is_some() {
            stored.metadata.resource_version = resource_version;
        }
        let mut cluster = self.cluster.write().await;
        cluster
            .objects
            .entry(namespace)
            .or_default()
            .insert(stored.name().to_string(), stored.clone());
        stored
    }

    /// Remove a single object. Returns whether it existed.
    pub async fn remove(&self, namespace: &str, name: &str) -> bool {
        let mut cluster = self.cluster.write().await;
        cluster
            .objects
            .get_mut(namespace)
            .and_then(|objs| objs.remove(name))
            .is_some()
    }

    /// Read an object without going through the trait.
    pub async fn config_map(&self, namespace: &str, name: &str) -> Option<ConfigMap> {
        let cluster = self.cluster.read().await;
        cluster.objects.get(namespace).and_then(|objs| objs.get(name)).cloned()
    }

    /// Number of ConfigMaps called `name` across all namespaces.
    pub async fn count_named(&self, name: &str) -> usize {
        let cluster = self.cluster.read().await;
        cluster.objects.values().filter(|objs| objs.contains_key(name)).count()
    }

    fn next_revision(&self) -> String {
        (self.revision.fetch_add(1, Ordering::SeqCst) + 1).to_string()
    }

    fn stamp_created(&self, mut cm: ConfigMap, namespace: &str) -> ConfigMap {
        let revision = self.next_revision();
        cm.metadata.namespace = Some(namespace.to_string());
        cm.metadata.uid = Some(format!("{}-{}-{}", namespace, cm.metadata.name, revision));
        cm.metadata.resource_version = Some(revision);
        cm.metadata.creation_timestamp = Some(Utc::now());
        cm
    }
}

fn missing(namespace: &str, name: &str) -> StoreError {
    StoreError::NotFound(format!("configmaps \"{}\" not found in namespace {}", name, namespace))
}

impl RemoteStore for InMemoryStore {
    fn get_config_map(&self, namespace: &str, name: &str) -> BoxFuture<'_, ConfigMap> {
        let namespace = namespace.to_string();
        let name = name.to_string();
        Box::pin(async move {
            self.config_map(&namespace, &name)
                .await
                .ok_or_else(|| missing(&namespace, &name))
        })
    }

    fn list_namespaces(&self) -> BoxFuture<'_, Vec<String>> {
        Box::pin(async move { Ok(self.cluster.read().await.namespaces.clone()) })
    }

    fn create_config_map(&self, namespace: &str, cm: &ConfigMap) -> BoxFuture<'_, ConfigMap> {
        let namespace = namespace.to_string();
        let cm = cm.clone();
        Box::pin(async move {
            let mut cluster = self.cluster.write().await;
            let objs = cluster
                .objects
                .get_mut(&namespace)
                .ok_or_else(|| StoreError::NotFound(format!("namespaces \"{}\" not found", namespace)))?;
            if objs.contains_key(cm.name()) {
                return Err(StoreError::AlreadyExists(format!(
                    "configmaps \"{}\" already exists in namespace {}",
                    cm.name(),
                    namespace
                )));
            }
            let stored = self.stamp_created(cm, &namespace);
            objs.insert(stored.name().to_string(), stored.clone());
            Ok(stored)
        })
    }

    fn update_config_map(&self, namespace: &str, cm: &ConfigMap) -> BoxFuture<'_, ConfigMap> {
        let namespace = namespace.to_string();
        let cm = cm.clone();
        Box::pin(async move {
            let revision = self.next_revision();
            let mut cluster = self.cluster.write().await;
            let existing = cluster
                .objects
                .get_mut(&namespace)
                .and_then(|objs| objs.get_mut(cm.name()))
                .ok_or_else(|| missing(&namespace, cm.name()))?;

            // Server-owned fields stay with the stored object.
            let mut updated = cm;
            updated.metadata.namespace = Some(namespace.clone());
            updated.metadata.uid = existing.metadata.uid.clone();
            updated.metadata.creation_timestamp = existing.metadata.creation_timestamp;
            updated.metadata.resource_version = Some(revision);
            *existing = updated.clone();
            Ok(updated)
        })
    }
}
