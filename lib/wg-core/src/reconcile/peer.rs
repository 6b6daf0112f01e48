use tracing::{debug, info, instrument};
use wg_api::v1alpha1::WireguardPeerStatus;

use super::{Context, Outcome, WaitReason};
use crate::factory::PeerFactory;
use crate::{apply, KeyManager, Result};

/// Drives a WireguardPeer towards its secret and status
pub struct PeerReconciler {
    ctx: Context,
}

impl PeerReconciler {
    pub fn new(ctx: Context) -> Self {
        Self { ctx }
    }

    /// Run one pass for the peer `namespace/name`
    #[instrument(skip(self), fields(controller = "wireguardpeer"))]
    pub async fn reconcile(&self, namespace: &str, name: &str) -> Result<Outcome> {
        let store = self.ctx.store.as_ref();

        let Some(peer) = store.get_peer(namespace, name).await? else {
            debug!("WireguardPeer not found, nothing to do");
            return Ok(Outcome::Converged);
        };
        if peer.metadata.deletion_timestamp.is_some() {
            return Ok(Outcome::Converged);
        }

        let Some(gateway) = store.get_gateway(namespace, &peer.spec.wireguard_ref).await? else {
            info!("Wireguard {} does not exist", peer.spec.wireguard_ref);
            return Ok(Outcome::Waiting(WaitReason::GatewayNotFound));
        };
        if !gateway.status.as_ref().is_some_and(|status| status.is_populated()) {
            info!("Wireguard {} has no key or endpoint yet", peer.spec.wireguard_ref);
            return Ok(Outcome::Waiting(WaitReason::GatewayNotReady));
        }

        let factory = PeerFactory::new(&peer, &gateway);
        let keys = match peer.spec.public_key {
            Some(_) => None,
            None => Some(
                KeyManager::new(store, self.ctx.keys.as_ref())
                    .resolve(namespace, &factory.secret_name())
                    .await?,
            ),
        };

        let secret = factory.secret(keys.as_ref())?;
        if apply(store, &secret).await? {
            return Ok(Outcome::Applied(secret.kind()));
        }

        let status = WireguardPeerStatus {
            public_key: peer
                .spec
                .public_key
                .clone()
                .or_else(|| keys.map(|keys| keys.public_key)),
        };
        if peer.status.as_ref() == Some(&status) {
            return Ok(Outcome::Converged);
        }

        let mut updated = peer.clone();
        updated.status = Some(status);
        store.update_peer_status(&updated).await?;
        info!("Published public key");
        Ok(Outcome::StatusUpdated)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::factory::CONFIG_FIELD;
    use crate::keys::{PRIVATE_KEY_FIELD, PUBLIC_KEY_FIELD};
    use crate::store::MockObjectStore;
    use crate::testing::{gateway, peer, populated_gateway, MemoryStore};
    use crate::{ArtifactKind, CoreError, X25519Generator};

    const GATEWAY_KEY: &str = "hSDwCYkwp1R0i33ctD73Wg2/Og0mOBr066SpjqqbTmo=";

    fn reconciler(store: &Arc<MemoryStore>) -> PeerReconciler {
        PeerReconciler::new(Context::new(store.clone(), Arc::new(X25519Generator)))
    }

    async fn converge(reconciler: &PeerReconciler, name: &str) -> Outcome {
        for _ in 0..8 {
            match reconciler.reconcile("default", name).await.unwrap() {
                Outcome::Applied(_) | Outcome::StatusUpdated => continue,
                outcome => return outcome,
            }
        }
        panic!("wireguardpeer {} did not settle", name);
    }

    fn secret_data(store: &MemoryStore, name: &str) -> std::collections::BTreeMap<String, String> {
        let artifact = store
            .artifact(ArtifactKind::Secret, "default", name)
            .unwrap();
        artifact
            .as_secret()
            .unwrap()
            .data
            .clone()
            .unwrap()
            .into_iter()
            .map(|(key, value)| (key, String::from_utf8(value.0).unwrap()))
            .collect()
    }

    #[tokio::test]
    async fn test_missing_peer_is_converged() {
        let store = Arc::new(MemoryStore::new());
        let outcome = reconciler(&store).reconcile("default", "laptop").await.unwrap();
        assert_eq!(outcome, Outcome::Converged);
    }

    #[tokio::test]
    async fn test_waits_for_gateway() {
        let store = Arc::new(MemoryStore::new());
        store.insert_peer(peer("laptop", "wg", "192.168.254.2/24"));
        let reconciler = reconciler(&store);

        assert_eq!(
            reconciler.reconcile("default", "laptop").await.unwrap(),
            Outcome::Waiting(WaitReason::GatewayNotFound)
        );

        store.insert_gateway(gateway("wg"));
        assert_eq!(
            reconciler.reconcile("default", "laptop").await.unwrap(),
            Outcome::Waiting(WaitReason::GatewayNotReady)
        );
        assert_eq!(store.writes(), 0);
    }

    #[tokio::test]
    async fn test_generated_keys_are_published_and_stable() {
        let store = Arc::new(MemoryStore::new());
        store.insert_gateway(populated_gateway("wg", GATEWAY_KEY, "203.0.113.5:51820"));
        store.insert_peer(peer("laptop", "wg", "192.168.254.2/24"));
        let reconciler = reconciler(&store);

        assert_eq!(converge(&reconciler, "laptop").await, Outcome::Converged);

        let data = secret_data(&store, "laptop-peer");
        assert_eq!(data[PUBLIC_KEY_FIELD].len(), 44);
        assert_eq!(data[PRIVATE_KEY_FIELD].len(), 44);
        assert!(data[CONFIG_FIELD].contains(&format!("PublicKey = {}", GATEWAY_KEY)));
        assert!(data[CONFIG_FIELD].contains("Endpoint = 203.0.113.5:51820"));

        let status = store.peer("default", "laptop").unwrap().status.unwrap();
        assert_eq!(status.public_key.as_ref(), Some(&data[PUBLIC_KEY_FIELD]));

        let writes = store.writes();
        assert_eq!(
            reconciler.reconcile("default", "laptop").await.unwrap(),
            Outcome::Converged
        );
        assert_eq!(store.writes(), writes);
        assert_eq!(secret_data(&store, "laptop-peer"), data);
    }

    #[tokio::test]
    async fn test_gateway_endpoint_change_rewrites_config_only() {
        let store = Arc::new(MemoryStore::new());
        store.insert_gateway(populated_gateway("wg", GATEWAY_KEY, "203.0.113.5:51820"));
        store.insert_peer(peer("laptop", "wg", "192.168.254.2/24"));
        let reconciler = reconciler(&store);
        converge(&reconciler, "laptop").await;
        let before = secret_data(&store, "laptop-peer");

        store.insert_gateway(populated_gateway("wg", GATEWAY_KEY, "198.51.100.7:51820"));
        assert_eq!(
            reconciler.reconcile("default", "laptop").await.unwrap(),
            Outcome::Applied(ArtifactKind::Secret)
        );

        let after = secret_data(&store, "laptop-peer");
        assert!(after[CONFIG_FIELD].contains("Endpoint = 198.51.100.7:51820"));
        assert_eq!(after[PRIVATE_KEY_FIELD], before[PRIVATE_KEY_FIELD]);
        assert_eq!(after[PUBLIC_KEY_FIELD], before[PUBLIC_KEY_FIELD]);
    }

    #[tokio::test]
    async fn test_spec_public_key_is_echoed() {
        let store = Arc::new(MemoryStore::new());
        store.insert_gateway(populated_gateway("wg", GATEWAY_KEY, "203.0.113.5:51820"));
        let mut phone = peer("phone", "wg", "192.168.254.3/24");
        let external = "WsFemZZdyC+ajbvOtKA7dltaNCaPOusKmkJffjMOMmg=".to_string();
        phone.spec.public_key = Some(external.clone());
        store.insert_peer(phone);

        assert_eq!(converge(&reconciler(&store), "phone").await, Outcome::Converged);

        let data = secret_data(&store, "phone-peer");
        assert_eq!(data.len(), 1);
        assert_eq!(data[PUBLIC_KEY_FIELD], external);

        let status = store.peer("default", "phone").unwrap().status.unwrap();
        assert_eq!(status.public_key, Some(external));
    }

    #[tokio::test]
    async fn test_spec_public_key_replaces_generated_keys() {
        let store = Arc::new(MemoryStore::new());
        store.insert_gateway(populated_gateway("wg", GATEWAY_KEY, "203.0.113.5:51820"));
        store.insert_peer(peer("laptop", "wg", "192.168.254.2/24"));
        let reconciler = reconciler(&store);
        converge(&reconciler, "laptop").await;
        assert_eq!(secret_data(&store, "laptop-peer").len(), 3);

        let external = "WsFemZZdyC+ajbvOtKA7dltaNCaPOusKmkJffjMOMmg=".to_string();
        let mut laptop = store.peer("default", "laptop").unwrap();
        laptop.spec.public_key = Some(external.clone());
        store.insert_peer(laptop);

        assert_eq!(converge(&reconciler, "laptop").await, Outcome::Converged);

        let data = secret_data(&store, "laptop-peer");
        assert_eq!(data.len(), 1);
        assert_eq!(data[PUBLIC_KEY_FIELD], external);
        assert!(!data.contains_key(CONFIG_FIELD));
        assert!(!data.contains_key(PRIVATE_KEY_FIELD));

        let status = store.peer("default", "laptop").unwrap().status.unwrap();
        assert_eq!(status.public_key, Some(external));
    }

    #[tokio::test]
    async fn test_key_generation_failure_is_propagated() {
        struct Exhausted;

        impl crate::KeyGenerator for Exhausted {
            fn generate(&self) -> Result<crate::KeyPair> {
                Err(CoreError::KeyGeneration("entropy exhausted".into()))
            }
        }

        let mut store = MockObjectStore::new();
        store
            .expect_get_peer()
            .returning(|_, _| Ok(Some(peer("laptop", "wg", "192.168.254.2/24"))));
        store
            .expect_get_gateway()
            .returning(|_, _| Ok(Some(populated_gateway("wg", GATEWAY_KEY, "203.0.113.5:51820"))));
        store.expect_get_artifact().returning(|_, _, _| Ok(None));
        store.expect_create_artifact().never();

        let reconciler = PeerReconciler::new(Context::new(Arc::new(store), Arc::new(Exhausted)));
        let err = reconciler.reconcile("default", "laptop").await.unwrap_err();

        assert!(matches!(err, CoreError::KeyGeneration(_)));
    }
}
