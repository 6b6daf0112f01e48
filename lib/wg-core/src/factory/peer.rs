//! Desired artifacts of a WireguardPeer

use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::Secret;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use k8s_openapi::ByteString;
use kube::{Resource, ResourceExt};
use wg_api::{Wireguard, WireguardPeer};

use super::{decorate, labels, CONFIG_FIELD};
use crate::keys::{PRIVATE_KEY_FIELD, PUBLIC_KEY_FIELD};
use crate::render;
use crate::{Artifact, CoreError, KeyPair, Result};

const COMPONENT: &str = "wireguard-peer";

/// Name of the secret holding a peer's keys and configuration
pub fn peer_secret_name(peer: &str) -> String {
    format!("{}-peer", peer)
}

/// Builds the desired secret of one peer from its spec and the resolved
/// status of its gateway
pub struct PeerFactory<'a> {
    peer: &'a WireguardPeer,
    gateway: &'a Wireguard,
}

impl<'a> PeerFactory<'a> {
    pub fn new(peer: &'a WireguardPeer, gateway: &'a Wireguard) -> Self {
        Self { peer, gateway }
    }

    pub fn secret_name(&self) -> String {
        peer_secret_name(&self.peer.name_any())
    }

    /// Secret of the peer. With a public key in the spec the secret carries
    /// only that key; otherwise it carries the generated keys and the
    /// rendered client configuration
    pub fn secret(&self, keys: Option<&KeyPair>) -> Result<Artifact> {
        let data = match (self.peer.spec.public_key.as_deref(), keys) {
            (Some(public_key), _) => BTreeMap::from([(
                PUBLIC_KEY_FIELD.to_string(),
                ByteString(public_key.as_bytes().to_vec()),
            )]),
            (None, Some(keys)) => BTreeMap::from([
                (
                    CONFIG_FIELD.to_string(),
                    ByteString(self.config(keys)?.into_bytes()),
                ),
                (
                    PUBLIC_KEY_FIELD.to_string(),
                    ByteString(keys.public_key.as_bytes().to_vec()),
                ),
                (
                    PRIVATE_KEY_FIELD.to_string(),
                    ByteString(keys.private_key.as_bytes().to_vec()),
                ),
            ]),
            (None, None) => {
                return Err(CoreError::Internal(format!(
                    "peer {} has neither a spec public key nor a keypair",
                    self.peer.name_any()
                )))
            }
        };

        let secret = Secret {
            metadata: ObjectMeta {
                name: Some(self.secret_name()),
                namespace: self.peer.namespace(),
                labels: Some(labels(
                    COMPONENT,
                    &self.peer.name_any(),
                    &self.gateway.spec.labels,
                )),
                ..Default::default()
            },
            type_: Some("Opaque".to_string()),
            data: Some(data),
            ..Default::default()
        };

        decorate(Artifact::Secret(secret), self.peer.controller_owner_ref(&()))
    }

    /// Rendered client configuration. Requires the gateway status to be populated
    pub fn config(&self, keys: &KeyPair) -> Result<String> {
        let status = self.gateway.status.clone().unwrap_or_default();
        let (Some(gateway_key), Some(endpoint)) = (status.public_key, status.endpoint) else {
            return Err(CoreError::Internal(format!(
                "gateway {} status is not populated",
                self.gateway.name_any()
            )));
        };

        let spec = &self.gateway.spec;
        Ok(render::render_peer_config(
            &self.peer.spec.address,
            &keys.private_key,
            &spec.peer_dns(),
            &gateway_key,
            &endpoint,
            &spec.allowed_ips,
        ))
    }
}
