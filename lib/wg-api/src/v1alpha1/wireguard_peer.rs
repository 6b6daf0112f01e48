use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// WireguardPeer is a spoke of the VPN attached to exactly one Wireguard
#[derive(CustomResource, Clone, Debug, PartialEq, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "vpn.ahova.com",
    version = "v1alpha1",
    kind = "WireguardPeer",
    plural = "wireguardpeers",
    namespaced,
    derive = "Default",
    derive = "PartialEq",
    status = "WireguardPeerStatus",
    printcolumn = r#"{"name":"Wireguard","type":"string","jsonPath":".spec.wireguardRef"}"#,
    printcolumn = r#"{"name":"Address","type":"string","jsonPath":".spec.address"}"#,
)]
#[serde(rename_all = "camelCase")]
pub struct WireguardPeerSpec {
    /// Name of the Wireguard resource in the same namespace
    pub wireguard_ref: String,

    /// Address of the peer inside the VPN network
    #[serde(default = "default_address")]
    pub address: String,

    /// Public key of a peer whose keys are managed outside the operator.
    /// When set, no private key or configuration is produced for the peer
    #[serde(skip_serializing_if = "Option::is_none")]
    #[schemars(length(min = 44, max = 44))]
    pub public_key: Option<String>,
}

impl Default for WireguardPeerSpec {
    fn default() -> Self {
        Self {
            wireguard_ref: String::new(),
            address: default_address(),
            public_key: None,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct WireguardPeerStatus {
    /// Public key of the peer, either generated or echoed from the spec
    #[serde(skip_serializing_if = "Option::is_none")]
    pub public_key: Option<String>,
}

impl WireguardPeer {
    /// Public key of the peer as published in its status. A peer is rendered
    /// into its gateway only once this is known
    pub fn ready_public_key(&self) -> Option<&str> {
        self.status.as_ref()?.public_key.as_deref()
    }
}

fn default_address() -> String {
    "192.168.254.2/24".to_string()
}
