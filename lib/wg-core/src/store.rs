//! Object store seam between the reconcilers and the cluster
//!
//! Every write carries the resource version it was based on. Writes based on
//! a stale version fail with [`CoreError::Conflict`](crate::CoreError::Conflict)
//! and are retried by re-running the whole reconciliation.

use async_trait::async_trait;
use wg_api::{Wireguard, WireguardPeer};

#[cfg(test)]
use mockall::automock;

use crate::{Artifact, ArtifactKind, Result};

/// Typed get/list/create/update access to the resources the operator touches
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Fetch a gateway, `None` when it does not exist
    async fn get_gateway(&self, namespace: &str, name: &str) -> Result<Option<Wireguard>>;

    /// Fetch a peer, `None` when it does not exist
    async fn get_peer(&self, namespace: &str, name: &str) -> Result<Option<WireguardPeer>>;

    /// List all peers of a namespace
    async fn list_peers(&self, namespace: &str) -> Result<Vec<WireguardPeer>>;

    /// Fetch a child artifact, `None` when it does not exist
    async fn get_artifact(
        &self,
        kind: ArtifactKind,
        namespace: &str,
        name: &str,
    ) -> Result<Option<Artifact>>;

    /// Create a child artifact
    async fn create_artifact(&self, artifact: &Artifact) -> Result<()>;

    /// Replace a child artifact. The artifact carries the resource version
    /// it was computed against
    async fn update_artifact(&self, artifact: &Artifact) -> Result<()>;

    /// Write the status subresource of a gateway
    async fn update_gateway_status(&self, gateway: &Wireguard) -> Result<()>;

    /// Write the status subresource of a peer
    async fn update_peer_status(&self, peer: &WireguardPeer) -> Result<()>;
}
