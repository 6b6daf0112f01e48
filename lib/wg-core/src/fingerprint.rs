//! Content fingerprints stamped on managed objects

use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::{Artifact, Result};

/// Annotation carrying the fingerprint of the last applied desired state
pub const LAST_APPLIED_ANNOTATION: &str = "vpn.ahova.com/last-applied";
/// Pod template annotation carrying the fingerprint of the rendered config
pub const CONFIG_HASH_ANNOTATION: &str = "vpn.ahova.com/config-hash";

/// Hex encoded SHA-256 of `data`
pub fn digest(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

/// The object without metadata and status: the part the operator owns
pub fn body(mut value: Value) -> Value {
    if let Some(obj) = value.as_object_mut() {
        obj.remove("metadata");
        obj.remove("status");
    }
    value
}

/// Fingerprint of everything the operator declares on an artifact: its body
/// plus labels and annotations, excluding the fingerprint annotation itself
pub fn last_applied(artifact: &Artifact) -> Result<String> {
    let meta = artifact.meta();
    let mut annotations = meta.annotations.clone().unwrap_or_default();
    annotations.remove(LAST_APPLIED_ANNOTATION);

    let mut value = body(artifact.to_value()?);
    if let Some(obj) = value.as_object_mut() {
        obj.insert(
            "metadata".to_string(),
            serde_json::json!({
                "labels": meta.labels.clone().unwrap_or_default(),
                "annotations": annotations,
            }),
        );
    }

    Ok(digest(&serde_json::to_vec(&value)?))
}

/// Stamp the last applied fingerprint onto an artifact
pub fn stamp(artifact: &mut Artifact) -> Result<()> {
    let fingerprint = last_applied(artifact)?;
    artifact
        .meta_mut()
        .annotations
        .get_or_insert_with(Default::default)
        .insert(LAST_APPLIED_ANNOTATION.to_string(), fingerprint);
    Ok(())
}
