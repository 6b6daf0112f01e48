/// API version v1alpha1 for the WireGuard operator CRDs

pub mod wireguard;
pub mod wireguard_peer;

pub use wireguard::{Condition, DnsSpec, Wireguard, WireguardSpec, WireguardStatus};
pub use wireguard_peer::{WireguardPeer, WireguardPeerSpec, WireguardPeerStatus};

/// API group for WireGuard operator resources
pub const API_GROUP: &str = "vpn.ahova.com";
/// API version for WireGuard operator resources
pub const API_VERSION: &str = "v1alpha1";
