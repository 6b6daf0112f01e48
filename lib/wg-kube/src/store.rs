//! `ObjectStore` over the Kubernetes API

use std::fmt::Debug;

use async_trait::async_trait;
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::{ConfigMap, Secret, Service};
use k8s_openapi::NamespaceResourceScope;
use kube::api::{ListParams, Patch, PatchParams, PostParams};
use kube::{Api, Client, Resource, ResourceExt};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::json;
use tracing::debug;
use wg_api::{Wireguard, WireguardPeer};
use wg_core::{Artifact, ArtifactKind, CoreError, ObjectStore, Result};

/// KubeStore reads and writes operator resources through the API server.
/// Updates are full replaces guarded by the resource version they carry
#[derive(Clone)]
pub struct KubeStore {
    client: Client,
}

impl KubeStore {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Create a store from the in-cluster or kubeconfig environment
    pub async fn try_default() -> Result<Self> {
        let client = Client::try_default().await?;
        Ok(Self::new(client))
    }

    /// Get the underlying Kubernetes client
    pub fn client(&self) -> &Client {
        &self.client
    }

    fn api<K>(&self, namespace: &str) -> Api<K>
    where
        K: Resource<Scope = NamespaceResourceScope>,
        K::DynamicType: Default,
    {
        Api::namespaced(self.client.clone(), namespace)
    }

    async fn get<K>(&self, namespace: &str, name: &str) -> Result<Option<K>>
    where
        K: Resource<Scope = NamespaceResourceScope> + Clone + Debug + DeserializeOwned,
        K::DynamicType: Default,
    {
        Ok(self.api::<K>(namespace).get_opt(name).await?)
    }

    async fn create<K>(&self, id: String, object: &K) -> Result<()>
    where
        K: Resource<Scope = NamespaceResourceScope> + Clone + Debug + DeserializeOwned + Serialize,
        K::DynamicType: Default,
    {
        let namespace = object.namespace().unwrap_or_default();
        self.api::<K>(&namespace)
            .create(&PostParams::default(), object)
            .await
            .map_err(|err| write_error(id, err))?;
        Ok(())
    }

    async fn replace<K>(&self, id: String, object: &K) -> Result<()>
    where
        K: Resource<Scope = NamespaceResourceScope> + Clone + Debug + DeserializeOwned + Serialize,
        K::DynamicType: Default,
    {
        let namespace = object.namespace().unwrap_or_default();
        self.api::<K>(&namespace)
            .replace(&object.name_any(), &PostParams::default(), object)
            .await
            .map_err(|err| write_error(id, err))?;
        Ok(())
    }

    /// Merge the status of `object`, guarded by its resource version
    async fn patch_status<K>(&self, id: String, object: &K, status: serde_json::Value) -> Result<()>
    where
        K: Resource<Scope = NamespaceResourceScope> + Clone + Debug + DeserializeOwned,
        K::DynamicType: Default,
    {
        let patch = json!({
            "metadata": { "resourceVersion": object.resource_version() },
            "status": status,
        });
        let namespace = object.namespace().unwrap_or_default();
        self.api::<K>(&namespace)
            .patch_status(&object.name_any(), &PatchParams::default(), &Patch::Merge(&patch))
            .await
            .map_err(|err| write_error(id.clone(), err))?;
        debug!("Patched status of {}", id);
        Ok(())
    }
}

fn id_of<K: Resource>(object: &K) -> String
where
    K::DynamicType: Default,
{
    format!(
        "{}/{}/{}",
        K::kind(&K::DynamicType::default()).to_lowercase(),
        object.namespace().unwrap_or_default(),
        object.name_any()
    )
}

/// Stale resource versions and name clashes surface as conflicts
fn write_error(id: String, err: kube::Error) -> CoreError {
    match err {
        kube::Error::Api(response) if response.code == 409 => CoreError::Conflict(id),
        err => CoreError::KubernetesError(err),
    }
}

#[async_trait]
impl ObjectStore for KubeStore {
    async fn get_gateway(&self, namespace: &str, name: &str) -> Result<Option<Wireguard>> {
        self.get(namespace, name).await
    }

    async fn get_peer(&self, namespace: &str, name: &str) -> Result<Option<WireguardPeer>> {
        self.get(namespace, name).await
    }

    async fn list_peers(&self, namespace: &str) -> Result<Vec<WireguardPeer>> {
        let list = self
            .api::<WireguardPeer>(namespace)
            .list(&ListParams::default())
            .await?;
        Ok(list.items)
    }

    async fn get_artifact(
        &self,
        kind: ArtifactKind,
        namespace: &str,
        name: &str,
    ) -> Result<Option<Artifact>> {
        Ok(match kind {
            ArtifactKind::Service => self.get(namespace, name).await?.map(Artifact::Service),
            ArtifactKind::ConfigMap => self.get(namespace, name).await?.map(Artifact::ConfigMap),
            ArtifactKind::Secret => self.get(namespace, name).await?.map(Artifact::Secret),
            ArtifactKind::Deployment => self.get(namespace, name).await?.map(Artifact::Deployment),
        })
    }

    async fn create_artifact(&self, artifact: &Artifact) -> Result<()> {
        let id = artifact.id();
        match artifact {
            Artifact::Service(obj) => self.create::<Service>(id, obj).await,
            Artifact::ConfigMap(obj) => self.create::<ConfigMap>(id, obj).await,
            Artifact::Secret(obj) => self.create::<Secret>(id, obj).await,
            Artifact::Deployment(obj) => self.create::<Deployment>(id, obj).await,
        }
    }

    async fn update_artifact(&self, artifact: &Artifact) -> Result<()> {
        let id = artifact.id();
        match artifact {
            Artifact::Service(obj) => self.replace::<Service>(id, obj).await,
            Artifact::ConfigMap(obj) => self.replace::<ConfigMap>(id, obj).await,
            Artifact::Secret(obj) => self.replace::<Secret>(id, obj).await,
            Artifact::Deployment(obj) => self.replace::<Deployment>(id, obj).await,
        }
    }

    async fn update_gateway_status(&self, gateway: &Wireguard) -> Result<()> {
        let status = serde_json::to_value(&gateway.status)?;
        self.patch_status(id_of(gateway), gateway, status).await
    }

    async fn update_peer_status(&self, peer: &WireguardPeer) -> Result<()> {
        let status = serde_json::to_value(&peer.status)?;
        self.patch_status(id_of(peer), peer, status).await
    }
}
