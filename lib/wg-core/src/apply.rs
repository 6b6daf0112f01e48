//! Idempotent create-or-update of desired artifacts
//!
//! An observed object is up to date when it carries the fingerprint of the
//! desired object and every field the operator declares has the declared
//! value. Metadata bookkeeping (owners, resource version, uid) and fields
//! defaulted by the API server are ignored, so a converged artifact is
//! never rewritten. An object controlled by a different owner is never
//! replaced.

use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::fingerprint::{self, LAST_APPLIED_ANNOTATION};
use crate::quantity::same_quantity;
use crate::{Artifact, CoreError, ObjectStore, Result};

/// Create `desired` if absent, update it if it drifted. Returns whether a
/// write happened. Store failures, including stale version conflicts, are
/// returned as is; the caller retries the whole pass from a fresh read
pub async fn apply(store: &dyn ObjectStore, desired: &Artifact) -> Result<bool> {
    let current = store
        .get_artifact(desired.kind(), desired.namespace(), desired.name())
        .await?;

    let Some(current) = current else {
        store.create_artifact(desired).await?;
        info!("Created {}", desired.id());
        return Ok(true);
    };

    if let Some(owner) = foreign_controller(&current, desired) {
        warn!(
            "{} is controlled by {} {}, not replacing it",
            desired.id(),
            owner.kind,
            owner.name
        );
        return Err(CoreError::ForeignOwner(desired.id()));
    }

    if is_up_to_date(&current, desired)? {
        debug!("{} is up to date", desired.id());
        return Ok(false);
    }

    let mut update = desired.clone();
    update.meta_mut().resource_version = current.meta().resource_version.clone();
    store.update_artifact(&update).await?;
    info!("Updated {}", desired.id());
    Ok(true)
}

fn controller_of(artifact: &Artifact) -> Option<&OwnerReference> {
    artifact
        .meta()
        .owner_references
        .as_ref()?
        .iter()
        .find(|owner| owner.controller == Some(true))
}

/// Controller of `current` when it differs from the one `desired` declares.
/// Unowned objects are adopted
fn foreign_controller<'a>(current: &'a Artifact, desired: &Artifact) -> Option<&'a OwnerReference> {
    let current = controller_of(current)?;
    let desired = controller_of(desired)?;
    (current.uid != desired.uid).then_some(current)
}

/// Whether `current` already matches `desired`
pub fn is_up_to_date(current: &Artifact, desired: &Artifact) -> Result<bool> {
    let wanted = match desired.annotation(LAST_APPLIED_ANNOTATION) {
        Some(stamped) => stamped.to_string(),
        None => fingerprint::last_applied(desired)?,
    };
    if current.annotation(LAST_APPLIED_ANNOTATION) != Some(wanted.as_str()) {
        return Ok(false);
    }

    Ok(contains(
        &fingerprint::body(current.to_value()?),
        &fingerprint::body(desired.to_value()?),
    ))
}

/// Resource maps whose values the API server rewrites in canonical form
const QUANTITY_MAPS: [&str; 2] = ["limits", "requests"];

/// Every value set in `desired` is present and equal in `current`. Arrays
/// must match element-wise; extra keys in `current` are ignored
fn contains(current: &Value, desired: &Value) -> bool {
    match (current, desired) {
        (_, Value::Null) => true,
        (Value::Object(current), Value::Object(desired)) => {
            desired.iter().all(|(key, wanted)| match current.get(key) {
                Some(value) if QUANTITY_MAPS.contains(&key.as_str()) => {
                    contains_quantities(value, wanted)
                }
                Some(value) => contains(value, wanted),
                None => is_empty(wanted),
            })
        }
        (Value::Array(current), Value::Array(desired)) => {
            current.len() == desired.len()
                && current
                    .iter()
                    .zip(desired)
                    .all(|(value, wanted)| contains(value, wanted))
        }
        (current, desired) => current == desired,
    }
}

fn contains_quantities(current: &Value, desired: &Value) -> bool {
    let (Value::Object(current), Value::Object(desired)) = (current, desired) else {
        return contains(current, desired);
    };
    desired.iter().all(|(name, wanted)| match (current.get(name), wanted) {
        (Some(Value::String(value)), Value::String(wanted)) => same_quantity(value, wanted),
        (Some(value), wanted) => contains(value, wanted),
        (None, wanted) => is_empty(wanted),
    })
}

fn is_empty(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Object(map) => map.is_empty(),
        Value::Array(items) => items.is_empty(),
        _ => false,
    }
}
