//! Construction of desired child artifacts
//!
//! Factories are pure: they take the owning resource and already resolved
//! inputs (keys, endpoint, ready peers) and produce artifacts stamped with
//! an owner reference and a last applied fingerprint. No I/O happens here.

pub mod gateway;
pub mod peer;

use std::collections::BTreeMap;

use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;

use crate::{fingerprint, Artifact, Result};

pub use gateway::{gateway_secret_name, GatewayFactory};
pub use peer::{peer_secret_name, PeerFactory};

/// Secret field holding the rendered configuration
pub const CONFIG_FIELD: &str = "config";

const MANAGED_BY: &str = "wireguard-operator";

/// Labels identifying the artifacts of one owner. Used as selectors, so
/// they must never depend on user input beyond the owner name
pub fn selector_labels(component: &str, instance: &str) -> BTreeMap<String, String> {
    BTreeMap::from([
        ("app.kubernetes.io/name".to_string(), component.to_string()),
        ("app.kubernetes.io/instance".to_string(), instance.to_string()),
    ])
}

/// Selector labels plus the managed-by marker and user supplied extras.
/// Extras never override the operator's own labels
pub fn labels(
    component: &str,
    instance: &str,
    extra: &BTreeMap<String, String>,
) -> BTreeMap<String, String> {
    let mut labels = extra.clone();
    labels.extend(selector_labels(component, instance));
    labels.insert(
        "app.kubernetes.io/managed-by".to_string(),
        MANAGED_BY.to_string(),
    );
    labels
}

/// Link an artifact to its owner and stamp its fingerprint
fn decorate(mut artifact: Artifact, owner: Option<OwnerReference>) -> Result<Artifact> {
    artifact.meta_mut().owner_references = owner.map(|owner| vec![owner]);
    fingerprint::stamp(&mut artifact)?;
    Ok(artifact)
}
