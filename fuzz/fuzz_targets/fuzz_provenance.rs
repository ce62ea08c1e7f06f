//! Fuzz target for reading the provenance annotation off a replica.
//!
//! Annotations are user-editable, so arbitrary values must never panic.

#![no_main]

use kube_sync::{ConfigMap, Provenance, PROVENANCE_ANNOTATION};
use libfuzzer_sys::fuzz_target;
use std::collections::BTreeMap;

fuzz_target!(|value: &str| {
    let mut cm = ConfigMap::new("ns", "cm");
    let mut annotations = BTreeMap::new();
    annotations.insert(PROVENANCE_ANNOTATION.to_string(), value.to_string());
    cm.metadata.annotations = Some(annotations);

    if let Ok(Some(provenance)) = Provenance::from_record(&cm) {
        // Anything that decodes must encode back to the same value
        let encoded = provenance.to_annotation().expect("encodes");
        let decoded: Provenance = serde_json::from_str(&encoded).expect("decodes");
        assert_eq!(decoded, provenance);
    }
});
