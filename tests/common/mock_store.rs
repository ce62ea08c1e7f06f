//! Mock RemoteStore for testing.
//!
//! Wraps an `InMemoryStore`, records every call in order, and can be told to
//! fail get/list or writes into specific namespaces.

use kube_sync::store::{BoxFuture, InMemoryStore, RemoteStore};
use kube_sync::{ConfigMap, StoreError};
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

/// A recorded store call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreCall {
    Get { namespace: String, name: String },
    List,
    Create { namespace: String, name: String },
    Update { namespace: String, name: String },
}

impl StoreCall {
    pub fn is_write(&self) -> bool {
        matches!(self, StoreCall::Create { .. } | StoreCall::Update { .. })
    }

    pub fn namespace(&self) -> Option<&str> {
        match self {
            StoreCall::Get { namespace, .. }
            | StoreCall::Create { namespace, .. }
            | StoreCall::Update { namespace, .. } => Some(namespace),
            StoreCall::List => None,
        }
    }
}

#[derive(Default)]
struct Faults {
    get: Option<StoreError>,
    list: Option<StoreError>,
    /// namespace -> error returned by update
    update: HashMap<String, StoreError>,
    /// namespace -> error returned by create
    create: HashMap<String, StoreError>,
    /// Added to every namespace listing
    list_delay: Option<Duration>,
}

/// Recording store with failure injection.
///
/// # Example
/// ```rust,ignore
/// let store = MockStore::with_namespaces(&["a", "b"]);
/// store.fail_update("b", StoreError::Transport("refused".into()));
/// // run a cycle...
/// assert_eq!(store.writes().len(), 1);
/// ```
pub struct MockStore {
    inner: InMemoryStore,
    calls: Mutex<Vec<StoreCall>>,
    faults: Mutex<Faults>,
}

impl MockStore {
    pub fn with_namespaces(namespaces: &[&str]) -> Self {
        Self {
            inner: InMemoryStore::with_namespaces(namespaces.iter().copied()),
            calls: Mutex::new(Vec::new()),
            faults: Mutex::new(Faults::default()),
        }
    }

    pub fn inner(&self) -> &InMemoryStore {
        &self.inner
    }

    /// Seed an object without recording a call.
    pub async fn seed(&self, cm: ConfigMap) -> ConfigMap {
        self.inner.insert(cm).await
    }

    // =========================================================================
    // Failure Injection
    // =========================================================================

    pub fn fail_get(&self, err: StoreError) {
        self.faults.lock().unwrap().get = Some(err);
    }

    pub fn fail_list(&self, err: StoreError) {
        self.faults.lock().unwrap().list = Some(err);
    }

    pub fn fail_update(&self, namespace: &str, err: StoreError) {
        self.faults
            .lock()
            .unwrap()
            .update
            .insert(namespace.to_string(), err);
    }

    pub fn fail_create(&self, namespace: &str, err: StoreError) {
        self.faults
            .lock()
            .unwrap()
            .create
            .insert(namespace.to_string(), err);
    }

    /// Make every namespace listing take `delay` (on the tokio clock).
    pub fn delay_list(&self, delay: Duration) {
        self.faults.lock().unwrap().list_delay = Some(delay);
    }

    /// Drop every injected failure.
    pub fn heal(&self) {
        *self.faults.lock().unwrap() = Faults::default();
    }

    // =========================================================================
    // Query Methods
    // =========================================================================

    pub fn calls(&self) -> Vec<StoreCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn writes(&self) -> Vec<StoreCall> {
        self.calls().into_iter().filter(StoreCall::is_write).collect()
    }

    pub fn creates(&self) -> Vec<StoreCall> {
        self.calls()
            .into_iter()
            .filter(|c| matches!(c, StoreCall::Create { .. }))
            .collect()
    }

    /// Namespaces that received at least one write attempt.
    pub fn written_namespaces(&self) -> Vec<String> {
        let mut namespaces: Vec<String> = self
            .writes()
            .iter()
            .filter_map(|c| c.namespace().map(str::to_string))
            .collect();
        namespaces.dedup();
        namespaces
    }

    pub fn reset_calls(&self) {
        self.calls.lock().unwrap().clear();
    }

    fn record(&self, call: StoreCall) {
        self.calls.lock().unwrap().push(call);
    }
}

impl RemoteStore for MockStore {
    fn get_config_map(&self, namespace: &str, name: &str) -> BoxFuture<'_, ConfigMap> {
        self.record(StoreCall::Get {
            namespace: namespace.to_string(),
            name: name.to_string(),
        });
        let fault = self.faults.lock().unwrap().get.clone();
        let (namespace, name) = (namespace.to_string(), name.to_string());
        Box::pin(async move {
            if let Some(err) = fault {
                return Err(err);
            }
            self.inner.get_config_map(&namespace, &name).await
        })
    }

    fn list_namespaces(&self) -> BoxFuture<'_, Vec<String>> {
        self.record(StoreCall::List);
        let (fault, delay) = {
            let faults = self.faults.lock().unwrap();
            (faults.list.clone(), faults.list_delay)
        };
        Box::pin(async move {
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }
            if let Some(err) = fault {
                return Err(err);
            }
            self.inner.list_namespaces().await
        })
    }

    fn create_config_map(&self, namespace: &str, cm: &ConfigMap) -> BoxFuture<'_, ConfigMap> {
        self.record(StoreCall::Create {
            namespace: namespace.to_string(),
            name: cm.name().to_string(),
        });
        let fault = self.faults.lock().unwrap().create.get(namespace).cloned();
        let (namespace, cm) = (namespace.to_string(), cm.clone());
        Box::pin(async move {
            if let Some(err) = fault {
                return Err(err);
            }
            self.inner.create_config_map(&namespace, &cm).await
        })
    }

    fn update_config_map(&self, namespace: &str, cm: &ConfigMap) -> BoxFuture<'_, ConfigMap> {
        self.record(StoreCall::Update {
            namespace: namespace.to_string(),
            name: cm.name().to_string(),
        });
        let fault = self.faults.lock().unwrap().update.get(namespace).cloned();
        let (namespace, cm) = (namespace.to_string(), cm.clone());
        Box::pin(async move {
            if let Some(err) = fault {
                return Err(err);
            }
            self.inner.update_config_map(&namespace, &cm).await
        })
    }
}
