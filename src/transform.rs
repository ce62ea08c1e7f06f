// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Source → replica transformation.
//!
//! A replica is the source ConfigMap with everything the API server assigns
//! per object stripped, so it can be created fresh in any namespace, plus a
//! provenance annotation pointing back at the source revision it came from.
//!
//! The annotation value is captured once per cycle (at fetch time) and shared
//! by every destination written during that cycle.

use crate::error::Result;
use crate::record::ConfigMap;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Annotation key carried by every replica.
pub const PROVENANCE_ANNOTATION: &str = "kube-sync/source";

/// Value of the [`PROVENANCE_ANNOTATION`], as JSON.
///
/// Field names are part of the external contract and must not change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Provenance {
    pub namespace: String,
    pub name: String,
    pub uid: String,
    #[serde(rename = "resourceVersion")]
    pub resource_version: String,
    /// Unix seconds.
    #[serde(rename = "last-update")]
    pub last_update: i64,
}

impl Provenance {
    /// Snapshot the identity of `source` at `fetched_at`.
    pub fn capture(source: &ConfigMap, fetched_at: DateTime<Utc>) -> Self {
        let meta = &source.metadata;
        Self {
            namespace: meta.namespace.clone().unwrap_or_default(),
            name: meta.name.clone(),
            uid: meta.uid.clone().unwrap_or_default(),
            resource_version: meta.resource_version.clone().unwrap_or_default(),
            last_update: fetched_at.timestamp(),
        }
    }

    /// Encode as the annotation value.
    pub fn to_annotation(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Read the provenance off a replica, if it carries one.
    pub fn from_record(record: &ConfigMap) -> Result<Option<Self>> {
        match record.annotation(PROVENANCE_ANNOTATION) {
            Some(value) => Ok(Some(serde_json::from_str(value)?)),
            None => Ok(None),
        }
    }
}

/// Namespace-agnostic replica built once per cycle.
#[derive(Debug, Clone)]
pub struct ReplicaTemplate {
    record: ConfigMap,
    provenance: Provenance,
}

impl ReplicaTemplate {
    /// The provenance stamped on every replica of this cycle.
    pub fn provenance(&self) -> &Provenance {
        &self.provenance
    }

    /// The template itself (namespace unset).
    pub fn record(&self) -> &ConfigMap {
        &self.record
    }

    /// Copy of the template targeted at `namespace`.
    pub fn for_namespace(&self, namespace: &str) -> ConfigMap {
        retarget(&self.record, namespace)
    }
}

/// Build the replica template for one cycle.
///
/// The source is not modified. The only failure is the JSON encoding of the
/// annotation, which cannot fail for this shape.
pub fn transform(source: &ConfigMap, fetched_at: DateTime<Utc>) -> Result<ReplicaTemplate> {
    let provenance = Provenance::capture(source, fetched_at);

    let mut record = source.clone();
    let meta = &mut record.metadata;
    meta.resource_version = None;
    meta.namespace = None;
    meta.uid = None;
    meta.generate_name = None;
    meta.self_link = None;
    meta.creation_timestamp = None;
    meta.annotations
        .get_or_insert_with(BTreeMap::new)
        .insert(PROVENANCE_ANNOTATION.to_string(), provenance.to_annotation()?);

    Ok(ReplicaTemplate { record, provenance })
}

/// Clone `template` with its namespace set to `namespace`.
pub fn retarget(template: &ConfigMap, namespace: &str) -> ConfigMap {
    let mut replica = template.clone();
    replica.metadata.namespace = Some(namespace.to_string());
    replica
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn source() -> ConfigMap {
        let mut cm = ConfigMap::new("src", "app-config").with_data("k", "v");
        cm.metadata.uid = Some("abc".to_string());
        cm.metadata.resource_version = Some("123".to_string());
        cm.metadata.generate_name = Some("app-".to_string());
        cm.metadata.self_link = Some("/api/v1/namespaces/src/configmaps/app-config".to_string());
        cm.metadata.creation_timestamp = Some(Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap());
        cm
    }

    #[test]
    fn test_transform_strips_identity() {
        let before = Utc::now().timestamp();
        let template = transform(&source(), Utc::now()).unwrap();
        let after = Utc::now().timestamp();

        let replica = template.for_namespace("dst");
        assert_eq!(replica.namespace(), Some("dst"));
        assert!(replica.metadata.resource_version.is_none());
        assert!(replica.metadata.uid.is_none());
        assert!(replica.metadata.generate_name.is_none());
        assert!(replica.metadata.self_link.is_none());
        assert!(replica.metadata.creation_timestamp.is_none());
        assert_eq!(replica.name(), "app-config");
        assert_eq!(replica.data.get("k").map(String::as_str), Some("v"));

        let provenance = Provenance::from_record(&replica).unwrap().unwrap();
        assert_eq!(provenance.namespace, "src");
        assert_eq!(provenance.name, "app-config");
        assert_eq!(provenance.uid, "abc");
        assert_eq!(provenance.resource_version, "123");
        assert!(provenance.last_update >= before && provenance.last_update <= after);
    }

    #[test]
    fn test_transform_leaves_source_untouched() {
        let src = source();
        let snapshot = src.clone();
        let _ = transform(&src, Utc::now()).unwrap();
        assert_eq!(src, snapshot);
    }

    #[test]
    fn test_annotation_field_names() {
        let at = Utc.timestamp_opt(1_700_000_000, 0).unwrap();
        let template = transform(&source(), at).unwrap();
        let value = template.record().annotation(PROVENANCE_ANNOTATION).unwrap();
        let json: serde_json::Value = serde_json::from_str(value).unwrap();

        assert_eq!(json["namespace"], "src");
        assert_eq!(json["name"], "app-config");
        assert_eq!(json["uid"], "abc");
        assert_eq!(json["resourceVersion"], "123");
        assert_eq!(json["last-update"], 1_700_000_000i64);
        assert_eq!(json.as_object().unwrap().len(), 5);
    }

    #[test]
    fn test_existing_annotations_are_kept_and_provenance_overwritten() {
        let mut src = source();
        src.metadata.annotations = Some(BTreeMap::from([
            ("team".to_string(), "platform".to_string()),
            (PROVENANCE_ANNOTATION.to_string(), "stale".to_string()),
        ]));
        let template = transform(&src, Utc::now()).unwrap();
        let replica = template.for_namespace("dst");

        assert_eq!(replica.annotation("team"), Some("platform"));
        assert_ne!(replica.annotation(PROVENANCE_ANNOTATION), Some("stale"));
        assert!(Provenance::from_record(&replica).unwrap().is_some());
    }

    #[test]
    fn test_provenance_shared_across_destinations() {
        let template = transform(&source(), Utc::now()).unwrap();
        let a = template.for_namespace("a");
        let b = template.for_namespace("b");
        assert_eq!(
            a.annotation(PROVENANCE_ANNOTATION),
            b.annotation(PROVENANCE_ANNOTATION)
        );
        assert!(template.record().namespace().is_none());
    }

    #[test]
    fn test_from_record_without_annotation() {
        let cm = ConfigMap::new("ns", "plain");
        assert!(Provenance::from_record(&cm).unwrap().is_none());
    }

    #[test]
    fn test_from_record_with_garbage_annotation() {
        let mut cm = ConfigMap::new("ns", "bad");
        cm.metadata.annotations = Some(BTreeMap::from([(
            PROVENANCE_ANNOTATION.to_string(),
            "not json".to_string(),
        )]));
        assert!(Provenance::from_record(&cm).is_err());
    }
}
