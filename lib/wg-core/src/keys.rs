//! Key management for gateways and peers
//!
//! A keypair is generated once per owning resource and persisted in its
//! secret by the apply step of the same pass. Later passes read it back
//! verbatim; an existing pair is never regenerated.

use std::fmt;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use k8s_openapi::api::core::v1::Secret;
use rand::rngs::OsRng;
use rand::RngCore;
use tracing::debug;
use x25519_dalek::{PublicKey, StaticSecret};

use crate::{ArtifactKind, CoreError, ObjectStore, Result};

/// Secret field holding the private key
pub const PRIVATE_KEY_FIELD: &str = "private-key";
/// Secret field holding the public key
pub const PUBLIC_KEY_FIELD: &str = "public-key";

/// Base64 encoded Curve25519 keypair, as used by WireGuard
#[derive(Clone, PartialEq, Eq)]
pub struct KeyPair {
    pub private_key: String,
    pub public_key: String,
}

impl KeyPair {
    /// Derive a keypair from raw private key bytes, clamping them the way
    /// `wg genkey` does
    pub fn from_private_bytes(mut bytes: [u8; 32]) -> Self {
        bytes[0] &= 248;
        bytes[31] &= 127;
        bytes[31] |= 64;

        let secret = StaticSecret::from(bytes);
        let public = PublicKey::from(&secret);
        Self {
            private_key: STANDARD.encode(secret.to_bytes()),
            public_key: STANDARD.encode(public.as_bytes()),
        }
    }

    /// Read a keypair back from a secret, `None` unless both halves are present
    pub fn from_secret(secret: &Secret) -> Option<Self> {
        let data = secret.data.as_ref()?;
        let field = |key: &str| {
            data.get(key)
                .and_then(|bytes| String::from_utf8(bytes.0.clone()).ok())
                .filter(|value| !value.is_empty())
        };

        Some(Self {
            private_key: field(PRIVATE_KEY_FIELD)?,
            public_key: field(PUBLIC_KEY_FIELD)?,
        })
    }
}

impl fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyPair")
            .field("private_key", &"<redacted>")
            .field("public_key", &self.public_key)
            .finish()
    }
}

/// Source of fresh keypairs
pub trait KeyGenerator: Send + Sync {
    fn generate(&self) -> Result<KeyPair>;
}

/// Generates keypairs from the operating system's entropy source
#[derive(Clone, Copy, Debug, Default)]
pub struct X25519Generator;

impl KeyGenerator for X25519Generator {
    fn generate(&self) -> Result<KeyPair> {
        let mut bytes = [0u8; 32];
        OsRng
            .try_fill_bytes(&mut bytes)
            .map_err(|e| CoreError::KeyGeneration(e.to_string()))?;
        Ok(KeyPair::from_private_bytes(bytes))
    }
}

/// Resolves the keypair of a resource from its persisted secret
pub struct KeyManager<'a> {
    store: &'a dyn ObjectStore,
    generator: &'a dyn KeyGenerator,
}

impl<'a> KeyManager<'a> {
    pub fn new(store: &'a dyn ObjectStore, generator: &'a dyn KeyGenerator) -> Self {
        Self { store, generator }
    }

    /// Return the stored keypair of the secret `namespace/name`, or a freshly
    /// generated one when the secret or its keys do not exist yet
    pub async fn resolve(&self, namespace: &str, name: &str) -> Result<KeyPair> {
        let stored = self
            .store
            .get_artifact(ArtifactKind::Secret, namespace, name)
            .await?;

        if let Some(pair) = stored
            .as_ref()
            .and_then(|artifact| artifact.as_secret())
            .and_then(KeyPair::from_secret)
        {
            return Ok(pair);
        }

        debug!("No keypair stored in secret {}/{}, generating one", namespace, name);
        self.generator.generate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MemoryStore;
    use crate::Artifact;
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
    use k8s_openapi::ByteString;
    use std::collections::BTreeMap;

    struct FailingGenerator;

    impl KeyGenerator for FailingGenerator {
        fn generate(&self) -> Result<KeyPair> {
            Err(CoreError::KeyGeneration("entropy exhausted".into()))
        }
    }

    fn secret(data: &[(&str, &str)]) -> Artifact {
        Artifact::Secret(Secret {
            metadata: ObjectMeta {
                name: Some("wg".to_string()),
                namespace: Some("default".to_string()),
                ..Default::default()
            },
            data: Some(
                data.iter()
                    .map(|(k, v)| (k.to_string(), ByteString(v.as_bytes().to_vec())))
                    .collect::<BTreeMap<_, _>>(),
            ),
            ..Default::default()
        })
    }

    #[test]
    fn test_rfc7748_public_key() {
        let private =
            hex::decode("77076d0a7318a57d3c16c17251b26645df4c2f87ebc0992ab177fba51db92c2a")
                .unwrap();
        let pair = KeyPair::from_private_bytes(private.try_into().unwrap());

        assert_eq!(pair.public_key, "hSDwCYkwp1R0i33ctD73Wg2/Og0mOBr066SpjqqbTmo=");
        assert_eq!(pair.private_key, "cAdtCnMYpX08FsFyUbJmRd9ML4frwJkqsXf7pR25LGo=");
    }

    #[test]
    fn test_generated_keys_are_fixed_length_and_distinct() {
        let first = X25519Generator.generate().unwrap();
        let second = X25519Generator.generate().unwrap();

        assert_eq!(first.private_key.len(), 44);
        assert_eq!(first.public_key.len(), 44);
        assert_ne!(first, second);
    }

    #[test]
    fn test_debug_redacts_private_key() {
        let pair = X25519Generator.generate().unwrap();
        let debug = format!("{:?}", pair);
        assert!(!debug.contains(&pair.private_key));
        assert!(debug.contains(&pair.public_key));
    }

    #[tokio::test]
    async fn test_resolve_reuses_stored_pair() {
        let store = MemoryStore::new();
        store.insert_artifact(secret(&[(PRIVATE_KEY_FIELD, "priv"), (PUBLIC_KEY_FIELD, "pub")]));

        let manager = KeyManager::new(&store, &FailingGenerator);
        let pair = manager.resolve("default", "wg").await.unwrap();

        assert_eq!(pair.private_key, "priv");
        assert_eq!(pair.public_key, "pub");
        assert_eq!(store.writes(), 0);
    }

    #[tokio::test]
    async fn test_resolve_generates_when_absent() {
        let store = MemoryStore::new();
        let manager = KeyManager::new(&store, &X25519Generator);
        let pair = manager.resolve("default", "wg").await.unwrap();

        assert_eq!(pair.public_key.len(), 44);
        assert_eq!(store.writes(), 0);
    }

    #[tokio::test]
    async fn test_resolve_generates_when_only_public_key_stored() {
        let store = MemoryStore::new();
        store.insert_artifact(secret(&[(PUBLIC_KEY_FIELD, "pub")]));

        let manager = KeyManager::new(&store, &X25519Generator);
        let pair = manager.resolve("default", "wg").await.unwrap();

        assert_ne!(pair.public_key, "pub");
    }

    #[tokio::test]
    async fn test_generation_failure_is_surfaced() {
        let store = MemoryStore::new();
        let manager = KeyManager::new(&store, &FailingGenerator);

        let err = manager.resolve("default", "wg").await.unwrap_err();
        assert!(matches!(err, CoreError::KeyGeneration(_)));
    }
}
