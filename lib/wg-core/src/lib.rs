//! Convergence engine for the WireGuard operator
//!
//! This library provides:
//! - Key management for gateways and peers
//! - Endpoint resolution for the gateway service
//! - Rendering of gateway and peer configurations
//! - Desired state construction and idempotent apply of child artifacts
//! - The gateway and peer reconcilers driving all of the above

pub mod apply;
pub mod artifact;
pub mod endpoint;
pub mod error;
pub mod factory;
pub mod fingerprint;
pub mod keys;
pub mod quantity;
pub mod reconcile;
pub mod render;
pub mod store;

#[cfg(test)]
pub(crate) mod testing;

pub use apply::apply;
pub use artifact::{Artifact, ArtifactKind};
pub use endpoint::{resolve_endpoint, Resolution};
pub use error::{CoreError, Result};
pub use keys::{KeyGenerator, KeyManager, KeyPair, X25519Generator};
pub use reconcile::{Context, GatewayReconciler, Outcome, PeerReconciler, WaitReason};
pub use store::ObjectStore;

/// Default UDP port of the gateway
pub const WIREGUARD_PORT: u16 = 51820;
