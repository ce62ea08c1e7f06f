// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Kubernetes API client.
//!
//! A small REST client covering the four calls of [`RemoteStore`]:
//!
//! | Call | Request |
//! |------|---------|
//! | get | `GET /api/v1/namespaces/{ns}/configmaps/{name}` |
//! | list namespaces | `GET /api/v1/namespaces` |
//! | create | `POST /api/v1/namespaces/{ns}/configmaps` |
//! | update | `PUT /api/v1/namespaces/{ns}/configmaps/{name}` |
//!
//! # Connection
//!
//! Unset [`KubeConfig`] fields fall back to the in-cluster service account:
//! the API server from `KUBERNETES_SERVICE_HOST`/`KUBERNETES_SERVICE_PORT`,
//! the token and CA bundle from `/var/run/secrets/kubernetes.io/serviceaccount`.
//! The token file is re-read on every request so rotated tokens are picked up.
//!
//! # Status Mapping
//!
//! - 404 → [`StoreError::NotFound`]
//! - 409 on create → [`StoreError::AlreadyExists`]
//! - any other non-2xx → [`StoreError::Api`], message from the `Status` body
//! - no response → [`StoreError::Transport`]

use crate::config::KubeConfig;
use crate::error::{Result, StoreError, StoreResult, SyncError};
use crate::record::{ConfigMap, NamespaceList};
use crate::store::{BoxFuture, RemoteStore};
use reqwest::{Certificate, Method, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::{debug, trace};

const SERVICE_ACCOUNT_DIR: &str = "/var/run/secrets/kubernetes.io/serviceaccount";

/// Body of a Kubernetes `Status` error response.
#[derive(Debug, Deserialize)]
struct ApiStatus {
    #[serde(default)]
    message: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Verb {
    Get,
    List,
    Create,
    Update,
}

impl Verb {
    fn as_str(self) -> &'static str {
        match self {
            Verb::Get => "get",
            Verb::List => "list",
            Verb::Create => "create",
            Verb::Update => "update",
        }
    }
}

/// [`RemoteStore`] over the Kubernetes REST API.
pub struct KubeClient {
    http: reqwest::Client,
    base_url: String,
    token_file: Option<PathBuf>,
}

impl KubeClient {
    /// Build a client from `config`, filling gaps from the in-cluster
    /// environment.
    pub fn new(config: &KubeConfig) -> Result<Self> {
        let base_url = match &config.api_server {
            Some(server) => server.trim_end_matches('/').to_string(),
            None => in_cluster_api_server().ok_or_else(|| {
                SyncError::Config(
                    "no API server configured and KUBERNETES_SERVICE_HOST is not set".to_string(),
                )
            })?,
        };

        let token_file = config
            .token_file
            .as_ref()
            .map(PathBuf::from)
            .or_else(|| service_account_file("token"));
        let ca_file = config
            .ca_file
            .as_ref()
            .map(PathBuf::from)
            .or_else(|| service_account_file("ca.crt"));

        let mut builder = reqwest::Client::builder()
            .timeout(config.request_timeout()?)
            .user_agent(concat!("kube-sync/", env!("CARGO_PKG_VERSION")));

        if let Some(path) = &ca_file {
            let pem = std::fs::read(path).map_err(|e| {
                SyncError::Config(format!("cannot read CA bundle {}: {}", path.display(), e))
            })?;
            let cert = Certificate::from_pem(&pem).map_err(|e| {
                SyncError::Config(format!("invalid CA bundle {}: {}", path.display(), e))
            })?;
            builder = builder.add_root_certificate(cert);
        }
        if config.insecure_skip_tls_verify {
            builder = builder.danger_accept_invalid_certs(true);
        }

        let http = builder
            .build()
            .map_err(|e| SyncError::Config(format!("cannot build HTTP client: {}", e)))?;

        debug!(
            api_server = %base_url,
            token_file = ?token_file,
            ca_file = ?ca_file,
            "Kubernetes client configured"
        );

        Ok(Self {
            http,
            base_url,
            token_file,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn config_map_url(&self, namespace: &str, name: Option<&str>) -> String {
        match name {
            Some(name) => format!(
                "{}/api/v1/namespaces/{}/configmaps/{}",
                self.base_url, namespace, name
            ),
            None => format!("{}/api/v1/namespaces/{}/configmaps", self.base_url, namespace),
        }
    }

    async fn request(&self, method: Method, url: &str) -> StoreResult<RequestBuilder> {
        let mut request = self.http.request(method, url);
        if let Some(path) = &self.token_file {
            let token = tokio::fs::read_to_string(path).await.map_err(|e| {
                StoreError::Transport(format!("cannot read token {}: {}", path.display(), e))
            })?;
            request = request.bearer_auth(token.trim());
        }
        Ok(request)
    }

    async fn send<T: DeserializeOwned>(
        &self,
        verb: Verb,
        target: &str,
        request: RequestBuilder,
    ) -> StoreResult<T> {
        trace!(verb = verb.as_str(), target = %target, "Kubernetes API request");
        let response = request
            .send()
            .await
            .map_err(|e| StoreError::Transport(format!("{} {}: {}", verb.as_str(), target, e)))?;

        let status = response.status();
        if status.is_success() {
            return response
                .json::<T>()
                .await
                .map_err(|e| StoreError::Decode(format!("{} {}: {}", verb.as_str(), target, e)));
        }

        let body = response.text().await.unwrap_or_default();
        Err(status_error(verb, target, status, &body))
    }
}

fn status_error(verb: Verb, target: &str, status: StatusCode, body: &str) -> StoreError {
    let message = serde_json::from_str::<ApiStatus>(body)
        .ok()
        .and_then(|s| s.message)
        .filter(|m| !m.is_empty())
        .unwrap_or_else(|| {
            if body.trim().is_empty() {
                format!("{} {}: {}", verb.as_str(), target, status)
            } else {
                format!("{} {}: {}", verb.as_str(), target, body.trim())
            }
        });

    match status {
        StatusCode::NOT_FOUND => StoreError::NotFound(message),
        StatusCode::CONFLICT if verb == Verb::Create => StoreError::AlreadyExists(message),
        _ => StoreError::Api {
            status: status.as_u16(),
            message,
        },
    }
}

fn in_cluster_api_server() -> Option<String> {
    let host = std::env::var("KUBERNETES_SERVICE_HOST").ok()?;
    let port = std::env::var("KUBERNETES_SERVICE_PORT").unwrap_or_else(|_| "443".to_string());
    Some(api_server_url(&host, &port))
}

fn api_server_url(host: &str, port: &str) -> String {
    if host.contains(':') {
        // IPv6 literal
        format!("https://[{}]:{}", host, port)
    } else {
        format!("https://{}:{}", host, port)
    }
}

fn service_account_file(name: &str) -> Option<PathBuf> {
    let path = Path::new(SERVICE_ACCOUNT_DIR).join(name);
    path.exists().then_some(path)
}

impl RemoteStore for KubeClient {
    fn get_config_map(&self, namespace: &str, name: &str) -> BoxFuture<'_, ConfigMap> {
        let url = self.config_map_url(namespace, Some(name));
        let target = format!("configmap {}/{}", namespace, name);
        Box::pin(async move {
            let request = self.request(Method::GET, &url).await?;
            self.send(Verb::Get, &target, request).await
        })
    }

    fn list_namespaces(&self) -> BoxFuture<'_, Vec<String>> {
        let url = format!("{}/api/v1/namespaces", self.base_url);
        Box::pin(async move {
            let request = self.request(Method::GET, &url).await?;
            let list: NamespaceList = self.send(Verb::List, "namespaces", request).await?;
            Ok(list.names())
        })
    }

    fn create_config_map(&self, namespace: &str, cm: &ConfigMap) -> BoxFuture<'_, ConfigMap> {
        let url = self.config_map_url(namespace, None);
        let target = format!("configmap {}/{}", namespace, cm.name());
        let body = with_type_meta(cm);
        Box::pin(async move {
            let request = self.request(Method::POST, &url).await?.json(&body);
            self.send(Verb::Create, &target, request).await
        })
    }

    fn update_config_map(&self, namespace: &str, cm: &ConfigMap) -> BoxFuture<'_, ConfigMap> {
        let url = self.config_map_url(namespace, Some(cm.name()));
        let target = format!("configmap {}/{}", namespace, cm.name());
        let body = with_type_meta(cm);
        Box::pin(async move {
            let request = self.request(Method::PUT, &url).await?.json(&body);
            self.send(Verb::Update, &target, request).await
        })
    }
}

/// The API server rejects writes without `apiVersion`/`kind`.
fn with_type_meta(cm: &ConfigMap) -> ConfigMap {
    let mut body = cm.clone();
    body.api_version.get_or_insert_with(|| "v1".to_string());
    body.kind.get_or_insert_with(|| "ConfigMap".to_string());
    body
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> KubeClient {
        KubeClient::new(&KubeConfig {
            api_server: Some("https://127.0.0.1:6443/".to_string()),
            token_file: None,
            ca_file: None,
            insecure_skip_tls_verify: true,
            request_timeout: Some("2s".to_string()),
        })
        .unwrap()
    }

    #[test]
    fn test_urls() {
        let client = client();
        assert_eq!(client.base_url(), "https://127.0.0.1:6443");
        assert_eq!(
            client.config_map_url("team-a", Some("shared-config")),
            "https://127.0.0.1:6443/api/v1/namespaces/team-a/configmaps/shared-config"
        );
        assert_eq!(
            client.config_map_url("team-b", None),
            "https://127.0.0.1:6443/api/v1/namespaces/team-b/configmaps"
        );
    }

    #[test]
    fn test_api_server_url_ipv6() {
        assert_eq!(api_server_url("10.0.0.1", "443"), "https://10.0.0.1:443");
        assert_eq!(api_server_url("fd00::1", "6443"), "https://[fd00::1]:6443");
    }

    #[test]
    fn test_status_error_mapping() {
        let body = r#"{"kind":"Status","status":"Failure","message":"configmaps \"x\" not found","code":404}"#;
        let err = status_error(Verb::Update, "configmap a/x", StatusCode::NOT_FOUND, body);
        assert_eq!(err, StoreError::NotFound("configmaps \"x\" not found".to_string()));

        let err = status_error(Verb::Create, "configmap a/x", StatusCode::CONFLICT, "{}");
        assert!(matches!(err, StoreError::AlreadyExists(_)));

        // Conflict on update is an ordinary API error
        let err = status_error(Verb::Update, "configmap a/x", StatusCode::CONFLICT, "");
        assert!(matches!(err, StoreError::Api { status: 409, .. }));

        let err = status_error(Verb::List, "namespaces", StatusCode::FORBIDDEN, "denied");
        assert_eq!(
            err,
            StoreError::Api {
                status: 403,
                message: "list namespaces: denied".to_string()
            }
        );
    }

    #[test]
    fn test_with_type_meta() {
        let mut cm = ConfigMap::new("a", "b");
        cm.api_version = None;
        cm.kind = None;
        let body = with_type_meta(&cm);
        assert_eq!(body.api_version.as_deref(), Some("v1"));
        assert_eq!(body.kind.as_deref(), Some("ConfigMap"));
    }

    #[test]
    fn test_missing_ca_file_is_config_error() {
        let err = KubeClient::new(&KubeConfig {
            api_server: Some("https://127.0.0.1:6443".to_string()),
            ca_file: Some("/nonexistent/ca.crt".to_string()),
            ..Default::default()
        })
        .err()
        .unwrap();
        assert!(matches!(err, SyncError::Config(_)));
    }

    #[tokio::test]
    async fn test_unreachable_server_is_transport_error() {
        let client = KubeClient::new(&KubeConfig {
            api_server: Some("http://127.0.0.1:1".to_string()),
            request_timeout: Some("1s".to_string()),
            ..Default::default()
        })
        .unwrap();
        let err = client.list_namespaces().await.unwrap_err();
        assert!(matches!(err, StoreError::Transport(_)));
        assert!(err.is_retryable());
    }
}
