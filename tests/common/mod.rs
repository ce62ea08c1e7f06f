//! Shared test utilities for the engine and controller tests.
//!
//! This module provides:
//! - A recording `RemoteStore` with per-call failure injection
//! - A recording `MetricsSink`
//! - Fixture helpers for a small cluster

#![allow(dead_code)]

pub mod mock_store;
pub mod recording_metrics;

pub use mock_store::*;
pub use recording_metrics::*;

use kube_sync::{ConfigMap, SourceLocator};

pub const SOURCE_NS: &str = "team-a";
pub const SOURCE_NAME: &str = "shared-config";

pub fn source_locator() -> SourceLocator {
    SourceLocator::new(SOURCE_NS, SOURCE_NAME)
}

/// The source object every fixture cluster starts with.
pub fn source_config_map() -> ConfigMap {
    let mut cm = ConfigMap::new(SOURCE_NS, SOURCE_NAME).with_data("k", "v");
    cm.metadata.uid = Some("abc".to_string());
    cm.metadata.resource_version = Some("123".to_string());
    cm
}

/// A cluster with `namespaces` and the source object seeded.
pub async fn cluster(namespaces: &[&str]) -> MockStore {
    let store = MockStore::with_namespaces(namespaces);
    store.seed(source_config_map()).await;
    store
}
