//! WireGuard operator API types and CRDs for Kubernetes integration
//!
//! This library defines the custom resources reconciled by the operator:
//! - Wireguard: the gateway (hub) of a VPN network
//! - WireguardPeer: a spoke attached to exactly one Wireguard gateway

pub mod v1alpha1;

pub use v1alpha1::{Wireguard, WireguardPeer};
