// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Error types for kube-sync.
//!
//! Two layers of errors exist:
//!
//! - [`StoreError`] is what a [`RemoteStore`](crate::store::RemoteStore)
//!   returns for a single API call (get, list, create, update).
//! - [`SyncError`] is what the engine and the controller return. It wraps
//!   store errors with the context of the step that failed.
//!
//! # Error Categories
//!
//! | Error Type | Scope | Description |
//! |------------|-------|-------------|
//! | `Config` | Process | Invalid configuration, raised before any sync |
//! | `Metrics` | Process | Metrics recorder could not be installed |
//! | `SourceFetch` | Cycle | Source ConfigMap could not be read, no writes made |
//! | `NamespaceList` | Cycle | Namespaces could not be listed, no writes made |
//! | `PartialReplication` | Cycle | One or more namespace writes failed |
//! | `Serialization` | Cycle | Provenance annotation could not be encoded |
//! | `InvalidState` | Process | Controller state machine violation |
//!
//! # Exit Codes
//!
//! [`SyncError::exit_code()`] tells the binary which status to exit with:
//! `1` for errors raised while building the process (will never succeed
//! without operator action), `2` for a failed first sync.

use thiserror::Error;

/// Result type alias for kube-sync operations.
pub type Result<T> = std::result::Result<T, SyncError>;

/// Result type for remote store calls.
pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Errors returned by a remote store call.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// The object (or its namespace) does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// A create collided with an existing object.
    #[error("already exists: {0}")]
    AlreadyExists(String),

    /// The API answered with a non-success status.
    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    /// The request never got an answer (connect, TLS, timeout).
    #[error("transport error: {0}")]
    Transport(String),

    /// The API answered but the body could not be decoded.
    #[error("decode error: {0}")]
    Decode(String),
}

impl StoreError {
    /// True when the object is missing. Drives the update-then-create fallback.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    /// Check if a later attempt could plausibly succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Transport(_) => true,
            Self::Api { status, .. } => *status == 429 || *status >= 500,
            Self::NotFound(_) => false,
            Self::AlreadyExists(_) => false,
            Self::Decode(_) => false,
        }
    }
}

/// A single destination namespace that could not be written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamespaceFailure {
    pub namespace: String,
    pub message: String,
}

impl NamespaceFailure {
    pub fn new(namespace: impl Into<String>, cause: &StoreError) -> Self {
        Self {
            namespace: namespace.into(),
            message: cause.to_string(),
        }
    }
}

impl std::fmt::Display for NamespaceFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "namespace {}: {}", self.namespace, self.message)
    }
}

/// Errors raised by the replication engine and the sync controller.
#[derive(Error, Debug)]
pub enum SyncError {
    /// Invalid or missing configuration.
    ///
    /// Raised during construction, before any sync attempt.
    #[error("Configuration error: {0}")]
    Config(String),

    /// The metrics recorder could not be installed.
    #[error("Metrics error: {0}")]
    Metrics(String),

    /// The source ConfigMap could not be fetched. The cycle made no writes.
    #[error("Cannot get configmap {namespace}/{name}: {source}")]
    SourceFetch {
        namespace: String,
        name: String,
        #[source]
        source: StoreError,
    },

    /// Namespaces could not be listed. The cycle made no writes.
    #[error("Cannot list namespaces: {0}")]
    NamespaceList(#[source] StoreError),

    /// Some destination writes failed. The rest of the fan-out completed.
    ///
    /// Display is every failure message joined with `"; "`.
    #[error("{}", join_failures(.failures))]
    PartialReplication {
        succeeded: usize,
        failures: Vec<NamespaceFailure>,
    },

    /// The provenance annotation could not be encoded.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Controller state machine violation.
    #[error("Invalid state: expected {expected}, got {actual}")]
    InvalidState { expected: String, actual: String },
}

fn join_failures(failures: &[NamespaceFailure]) -> String {
    failures
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

impl SyncError {
    /// True for errors that end a single cycle but not the process.
    pub fn is_cycle_error(&self) -> bool {
        matches!(
            self,
            Self::SourceFetch { .. }
                | Self::NamespaceList(_)
                | Self::PartialReplication { .. }
                | Self::Serialization(_)
        )
    }

    /// Process exit status for this error when it reaches `main`.
    pub fn exit_code(&self) -> u8 {
        if self.is_cycle_error() {
            2
        } else {
            1
        }
    }

    /// Short label for the `error_type` of logs and status reports.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Config(_) => "config",
            Self::Metrics(_) => "metrics",
            Self::SourceFetch { .. } => "source_fetch",
            Self::NamespaceList(_) => "namespace_list",
            Self::PartialReplication { .. } => "partial_replication",
            Self::Serialization(_) => "serialization",
            Self::InvalidState { .. } => "invalid_state",
        }
    }
}
