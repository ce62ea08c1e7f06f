//! Fuzz target for ConfigMap decoding and the replica transform.
//!
//! Any ConfigMap the API server could hand back must transform without
//! panicking, lose its server-assigned identity, and carry a provenance
//! annotation that decodes back to the source identity.

#![no_main]

use chrono::Utc;
use kube_sync::transform::transform;
use kube_sync::{ConfigMap, Provenance};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Ok(source) = serde_json::from_slice::<ConfigMap>(data) else {
        return;
    };

    let template = transform(&source, Utc::now()).expect("transform never fails");
    let replica = template.for_namespace("fuzz-dst");

    assert_eq!(replica.namespace(), Some("fuzz-dst"));
    assert!(replica.metadata.uid.is_none());
    assert!(replica.metadata.resource_version.is_none());
    assert!(replica.metadata.creation_timestamp.is_none());
    assert_eq!(replica.data, source.data);

    let provenance = Provenance::from_record(&replica)
        .expect("provenance decodes")
        .expect("provenance present");
    assert_eq!(provenance.name, source.metadata.name);
    assert_eq!(provenance.uid, source.metadata.uid.clone().unwrap_or_default());

    // The replica must encode again for the write
    let _ = serde_json::to_vec(&replica).expect("replica encodes");
});
