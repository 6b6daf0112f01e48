//! In-memory object store and fixtures for tests
//!
//! `MemoryStore` behaves like the API server where the reconcilers can
//! observe it: uids and resource versions are assigned on write, stale
//! writes are rejected and services receive a cluster IP on creation.

use std::collections::BTreeMap;
use std::sync::Mutex;

use async_trait::async_trait;
use k8s_openapi::api::core::v1::{LoadBalancerIngress, LoadBalancerStatus, ServiceStatus};
use kube::ResourceExt;
use wg_api::v1alpha1::{WireguardPeerSpec, WireguardPeerStatus, WireguardSpec, WireguardStatus};
use wg_api::{Wireguard, WireguardPeer};

use crate::{Artifact, ArtifactKind, CoreError, ObjectStore, Result};

pub const CLUSTER_IP: &str = "10.96.0.10";

type Key = (String, String);

#[derive(Default)]
struct Inner {
    gateways: BTreeMap<Key, Wireguard>,
    peers: BTreeMap<Key, WireguardPeer>,
    artifacts: BTreeMap<(ArtifactKind, String, String), Artifact>,
    version: u64,
    writes: usize,
}

impl Inner {
    fn next_version(&mut self) -> String {
        self.version += 1;
        self.version.to_string()
    }
}

#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

fn key(namespace: &str, name: &str) -> Key {
    (namespace.to_string(), name.to_string())
}

fn artifact_key(artifact: &Artifact) -> (ArtifactKind, String, String) {
    (
        artifact.kind(),
        artifact.namespace().to_string(),
        artifact.name().to_string(),
    )
}

fn check_version(id: String, current: Option<&String>, given: Option<&String>) -> Result<()> {
    match given {
        Some(given) if Some(given) != current => Err(CoreError::Conflict(id)),
        _ => Ok(()),
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of writes performed through the `ObjectStore` interface
    pub fn writes(&self) -> usize {
        self.inner.lock().unwrap().writes
    }

    pub fn insert_gateway(&self, mut gateway: Wireguard) {
        let mut inner = self.inner.lock().unwrap();
        let k = key(&gateway.namespace().unwrap_or_default(), &gateway.name_any());
        gateway.metadata.resource_version = Some(inner.next_version());
        gateway
            .metadata
            .uid
            .get_or_insert_with(|| format!("uid-gateway-{}", k.1));
        inner.gateways.insert(k, gateway);
    }

    pub fn insert_peer(&self, mut peer: WireguardPeer) {
        let mut inner = self.inner.lock().unwrap();
        let k = key(&peer.namespace().unwrap_or_default(), &peer.name_any());
        peer.metadata.resource_version = Some(inner.next_version());
        peer.metadata
            .uid
            .get_or_insert_with(|| format!("uid-peer-{}", k.1));
        inner.peers.insert(k, peer);
    }

    pub fn insert_artifact(&self, mut artifact: Artifact) {
        let mut inner = self.inner.lock().unwrap();
        artifact.meta_mut().resource_version = Some(inner.next_version());
        let k = artifact_key(&artifact);
        inner.artifacts.insert(k, artifact);
    }

    pub fn remove_peer(&self, namespace: &str, name: &str) {
        self.inner.lock().unwrap().peers.remove(&key(namespace, name));
    }

    pub fn gateway(&self, namespace: &str, name: &str) -> Option<Wireguard> {
        self.inner.lock().unwrap().gateways.get(&key(namespace, name)).cloned()
    }

    pub fn peer(&self, namespace: &str, name: &str) -> Option<WireguardPeer> {
        self.inner.lock().unwrap().peers.get(&key(namespace, name)).cloned()
    }

    pub fn artifact(&self, kind: ArtifactKind, namespace: &str, name: &str) -> Option<Artifact> {
        self.inner
            .lock()
            .unwrap()
            .artifacts
            .get(&(kind, namespace.to_string(), name.to_string()))
            .cloned()
    }

    /// Change a stored artifact the way another writer would
    pub fn mutate_artifact(
        &self,
        kind: ArtifactKind,
        namespace: &str,
        name: &str,
        f: impl FnOnce(&mut Artifact),
    ) {
        let mut inner = self.inner.lock().unwrap();
        let version = inner.next_version();
        if let Some(artifact) = inner
            .artifacts
            .get_mut(&(kind, namespace.to_string(), name.to_string()))
        {
            f(artifact);
            artifact.meta_mut().resource_version = Some(version);
        }
    }

    /// Publish a load balancer ingress on a stored service
    pub fn set_ingress(&self, namespace: &str, name: &str, ingress: LoadBalancerIngress) {
        self.mutate_artifact(ArtifactKind::Service, namespace, name, |artifact| {
            if let Artifact::Service(svc) = artifact {
                svc.status = Some(ServiceStatus {
                    load_balancer: Some(LoadBalancerStatus {
                        ingress: Some(vec![ingress]),
                    }),
                    ..Default::default()
                });
            }
        });
    }
}

#[async_trait]
impl ObjectStore for MemoryStore {
    async fn get_gateway(&self, namespace: &str, name: &str) -> Result<Option<Wireguard>> {
        Ok(self.gateway(namespace, name))
    }

    async fn get_peer(&self, namespace: &str, name: &str) -> Result<Option<WireguardPeer>> {
        Ok(self.peer(namespace, name))
    }

    async fn list_peers(&self, namespace: &str) -> Result<Vec<WireguardPeer>> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .peers
            .iter()
            .filter(|((ns, _), _)| ns == namespace)
            .map(|(_, peer)| peer.clone())
            .collect())
    }

    async fn get_artifact(
        &self,
        kind: ArtifactKind,
        namespace: &str,
        name: &str,
    ) -> Result<Option<Artifact>> {
        Ok(self.artifact(kind, namespace, name))
    }

    async fn create_artifact(&self, artifact: &Artifact) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        let k = artifact_key(artifact);
        if inner.artifacts.contains_key(&k) {
            return Err(CoreError::Conflict(artifact.id()));
        }

        let mut created = artifact.clone();
        created.meta_mut().resource_version = Some(inner.next_version());
        created.meta_mut().uid = Some(format!("uid-{}", artifact.id()));
        if let Artifact::Service(svc) = &mut created {
            if let Some(spec) = svc.spec.as_mut() {
                spec.cluster_ip.get_or_insert_with(|| CLUSTER_IP.to_string());
            }
        }

        inner.artifacts.insert(k, created);
        inner.writes += 1;
        Ok(())
    }

    async fn update_artifact(&self, artifact: &Artifact) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        let k = artifact_key(artifact);
        let Some(current) = inner.artifacts.get(&k).cloned() else {
            return Err(CoreError::Internal(format!("{} not found", artifact.id())));
        };
        check_version(
            artifact.id(),
            current.meta().resource_version.as_ref(),
            artifact.meta().resource_version.as_ref(),
        )?;

        let mut updated = artifact.clone();
        updated.meta_mut().resource_version = Some(inner.next_version());
        updated.meta_mut().uid = current.meta().uid.clone();
        if let (Artifact::Service(new), Artifact::Service(old)) = (&mut updated, &current) {
            // cluster IP is immutable once allocated
            let allocated = old.spec.as_ref().and_then(|spec| spec.cluster_ip.clone());
            if let Some(spec) = new.spec.as_mut() {
                spec.cluster_ip = spec.cluster_ip.take().or(allocated);
            }
            new.status = old.status.clone();
        }

        inner.artifacts.insert(k, updated);
        inner.writes += 1;
        Ok(())
    }

    async fn update_gateway_status(&self, gateway: &Wireguard) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        let k = key(&gateway.namespace().unwrap_or_default(), &gateway.name_any());
        let version = inner.next_version();
        let Some(current) = inner.gateways.get_mut(&k) else {
            return Err(CoreError::Internal(format!("wireguard {:?} not found", k)));
        };
        check_version(
            format!("wireguard/{}/{}", k.0, k.1),
            current.metadata.resource_version.as_ref(),
            gateway.metadata.resource_version.as_ref(),
        )?;

        current.status = gateway.status.clone();
        current.metadata.resource_version = Some(version);
        inner.writes += 1;
        Ok(())
    }

    async fn update_peer_status(&self, peer: &WireguardPeer) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        let k = key(&peer.namespace().unwrap_or_default(), &peer.name_any());
        let version = inner.next_version();
        let Some(current) = inner.peers.get_mut(&k) else {
            return Err(CoreError::Internal(format!("wireguardpeer {:?} not found", k)));
        };
        check_version(
            format!("wireguardpeer/{}/{}", k.0, k.1),
            current.metadata.resource_version.as_ref(),
            peer.metadata.resource_version.as_ref(),
        )?;

        current.status = peer.status.clone();
        current.metadata.resource_version = Some(version);
        inner.writes += 1;
        Ok(())
    }
}

pub fn gateway(name: &str) -> Wireguard {
    let mut gateway = Wireguard::new(name, WireguardSpec::default());
    gateway.metadata.namespace = Some("default".to_string());
    gateway.metadata.uid = Some(format!("uid-gateway-{}", name));
    gateway
}

pub fn populated_gateway(name: &str, public_key: &str, endpoint: &str) -> Wireguard {
    let mut gateway = gateway(name);
    gateway.status = Some(WireguardStatus {
        public_key: Some(public_key.to_string()),
        endpoint: Some(endpoint.to_string()),
        conditions: Vec::new(),
    });
    gateway
}

pub fn peer(name: &str, gateway: &str, address: &str) -> WireguardPeer {
    let mut peer = WireguardPeer::new(
        name,
        WireguardPeerSpec {
            wireguard_ref: gateway.to_string(),
            address: address.to_string(),
            public_key: None,
        },
    );
    peer.metadata.namespace = Some("default".to_string());
    peer.metadata.uid = Some(format!("uid-peer-{}", name));
    peer
}

pub fn ready_peer(name: &str, gateway: &str, address: &str, public_key: &str) -> WireguardPeer {
    let mut peer = peer(name, gateway, address);
    peer.status = Some(WireguardPeerStatus {
        public_key: Some(public_key.to_string()),
    });
    peer
}
