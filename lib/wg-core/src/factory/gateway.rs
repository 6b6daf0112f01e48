//! Desired artifacts of a Wireguard gateway

use std::collections::BTreeMap;

use k8s_openapi::api::apps::v1::{Deployment, DeploymentSpec};
use k8s_openapi::api::core::v1::{
    Capabilities, ConfigMap, ConfigMapVolumeSource, Container, ContainerPort, ExecAction,
    KeyToPath, PodDNSConfig, PodSecurityContext, PodSpec, PodTemplateSpec, Probe, Secret,
    SecretVolumeSource, SecurityContext, Service, ServicePort, ServiceSpec, Sysctl, Volume,
    VolumeMount,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, ObjectMeta};
use k8s_openapi::ByteString;
use kube::{Resource, ResourceExt};
use wg_api::v1alpha1::wireguard::SERVICE_TYPE_LOAD_BALANCER;
use wg_api::{Wireguard, WireguardPeer};

use super::{decorate, labels, selector_labels, CONFIG_FIELD};
use crate::fingerprint::CONFIG_HASH_ANNOTATION;
use crate::keys::{PRIVATE_KEY_FIELD, PUBLIC_KEY_FIELD};
use crate::render::{self, ReadyPeer, ENTRYPOINT_SH};
use crate::{Artifact, KeyPair, Result, WIREGUARD_PORT};

pub const WIREGUARD_IMAGE: &str = "linuxserver/wireguard:1.0.20210914";
pub const RESOLVER_IMAGE: &str = "docker.io/klutchell/unbound:v1.17.1";

const COMPONENT: &str = "wireguard";
const ENTRYPOINT_KEY: &str = "entrypoint.sh";
const RESOLVER_CONFIG_KEY: &str = "unbound.conf";

/// Name of the secret holding a gateway's keys and configuration. The
/// suffix keeps it apart from peer secrets in the same namespace
pub fn gateway_secret_name(gateway: &str) -> String {
    format!("{}-wireguard", gateway)
}

/// Builds the desired artifacts of one gateway from its spec and the peers
/// referencing it
pub struct GatewayFactory<'a> {
    gateway: &'a Wireguard,
    peers: &'a [WireguardPeer],
}

impl<'a> GatewayFactory<'a> {
    pub fn new(gateway: &'a Wireguard, peers: &'a [WireguardPeer]) -> Self {
        Self { gateway, peers }
    }

    fn name(&self) -> String {
        self.gateway.name_any()
    }

    pub fn secret_name(&self) -> String {
        gateway_secret_name(&self.name())
    }

    fn labels(&self) -> BTreeMap<String, String> {
        labels(COMPONENT, &self.name(), &self.gateway.spec.labels)
    }

    fn selector(&self) -> BTreeMap<String, String> {
        selector_labels(COMPONENT, &self.name())
    }

    fn metadata(&self) -> ObjectMeta {
        ObjectMeta {
            name: Some(self.name()),
            namespace: self.gateway.namespace(),
            labels: Some(self.labels()),
            ..Default::default()
        }
    }

    fn decorate(&self, artifact: Artifact) -> Result<Artifact> {
        decorate(artifact, self.gateway.controller_owner_ref(&()))
    }

    /// Peers of this gateway whose public key is known, sorted by name so
    /// the rendered config does not depend on listing order
    pub fn ready_peers(&self) -> Vec<ReadyPeer> {
        let name = self.name();
        let mut ready: Vec<ReadyPeer> = self
            .peers
            .iter()
            .filter(|peer| peer.spec.wireguard_ref == name)
            .filter_map(|peer| {
                Some(ReadyPeer {
                    name: peer.name_any(),
                    address: peer.spec.address.clone(),
                    public_key: peer.ready_public_key()?.to_string(),
                })
            })
            .collect();
        ready.sort_by(|a, b| a.name.cmp(&b.name));
        ready
    }

    /// Rendered server configuration for the given keypair
    pub fn config(&self, keys: &KeyPair) -> String {
        let spec = &self.gateway.spec;
        render::render_gateway_config(
            &spec.network,
            &keys.private_key,
            WIREGUARD_PORT,
            &spec.drop_connections_to,
            &self.ready_peers(),
        )
    }

    /// Network endpoint exposing the gateway
    pub fn service(&self) -> Result<Artifact> {
        let spec = &self.gateway.spec;
        let load_balanced = spec.service_type == SERVICE_TYPE_LOAD_BALANCER;

        let mut metadata = self.metadata();
        if !spec.service_annotations.is_empty() {
            metadata.annotations = Some(spec.service_annotations.clone());
        }

        let service = Service {
            metadata,
            spec: Some(ServiceSpec {
                type_: Some(spec.service_type.clone()),
                selector: Some(self.selector()),
                ports: Some(vec![ServicePort {
                    name: Some(COMPONENT.to_string()),
                    protocol: Some("UDP".to_string()),
                    port: i32::from(WIREGUARD_PORT),
                    ..Default::default()
                }]),
                external_traffic_policy: load_balanced.then(|| "Local".to_string()),
                ..Default::default()
            }),
            ..Default::default()
        };

        self.decorate(Artifact::Service(service))
    }

    /// Static files: the bootstrap script and, when the local resolver is
    /// deployed, its configuration
    pub fn config_map(&self) -> Result<Artifact> {
        let spec = &self.gateway.spec;
        let mut data = BTreeMap::from([(ENTRYPOINT_KEY.to_string(), ENTRYPOINT_SH.to_string())]);
        if spec.dns.deploy_server {
            data.insert(
                RESOLVER_CONFIG_KEY.to_string(),
                render::render_resolver_config(&spec.network),
            );
        }

        let config_map = ConfigMap {
            metadata: self.metadata(),
            data: Some(data),
            ..Default::default()
        };

        self.decorate(Artifact::ConfigMap(config_map))
    }

    /// Keyed secret holding the rendered config and both keys
    pub fn secret(&self, keys: &KeyPair, config: &str) -> Result<Artifact> {
        let data = BTreeMap::from([
            (CONFIG_FIELD.to_string(), ByteString(config.as_bytes().to_vec())),
            (
                PUBLIC_KEY_FIELD.to_string(),
                ByteString(keys.public_key.as_bytes().to_vec()),
            ),
            (
                PRIVATE_KEY_FIELD.to_string(),
                ByteString(keys.private_key.as_bytes().to_vec()),
            ),
        ]);

        let secret = Secret {
            metadata: ObjectMeta {
                name: Some(self.secret_name()),
                ..self.metadata()
            },
            type_: Some("Opaque".to_string()),
            data: Some(data),
            ..Default::default()
        };

        self.decorate(Artifact::Secret(secret))
    }

    /// Workload running the gateway. `config_hash` is stamped on the pod
    /// template so a config change rolls the pods
    pub fn deployment(&self, config_hash: &str) -> Result<Artifact> {
        let spec = &self.gateway.spec;
        let deploy_resolver = spec.dns.deploy_server;

        let mut containers = vec![self.wireguard_container()];
        if deploy_resolver {
            containers.push(self.resolver_container());
        }
        containers.extend(spec.sidecars.iter().cloned());

        let (dns_policy, dns_config) = if deploy_resolver {
            (
                "None",
                Some(PodDNSConfig {
                    nameservers: Some(vec!["127.0.0.1".to_string()]),
                    ..Default::default()
                }),
            )
        } else {
            ("ClusterFirst", None)
        };

        let pod_spec = PodSpec {
            affinity: spec.affinity.clone(),
            containers,
            dns_policy: Some(dns_policy.to_string()),
            dns_config,
            security_context: Some(PodSecurityContext {
                sysctls: Some(
                    [
                        ("net.ipv4.ip_forward", "1"),
                        ("net.ipv4.conf.all.src_valid_mark", "1"),
                        ("net.ipv4.conf.all.rp_filter", "0"),
                        ("net.ipv4.conf.all.route_localnet", "1"),
                    ]
                    .into_iter()
                    .map(|(name, value)| Sysctl {
                        name: name.to_string(),
                        value: value.to_string(),
                    })
                    .collect(),
                ),
                ..Default::default()
            }),
            volumes: Some(self.volumes()),
            ..Default::default()
        };

        let deployment = Deployment {
            metadata: self.metadata(),
            spec: Some(DeploymentSpec {
                replicas: Some(spec.replicas),
                selector: LabelSelector {
                    match_labels: Some(self.selector()),
                    ..Default::default()
                },
                template: PodTemplateSpec {
                    metadata: Some(ObjectMeta {
                        labels: Some(self.labels()),
                        annotations: Some(BTreeMap::from([(
                            CONFIG_HASH_ANNOTATION.to_string(),
                            config_hash.to_string(),
                        )])),
                        ..Default::default()
                    }),
                    spec: Some(pod_spec),
                },
                ..Default::default()
            }),
            ..Default::default()
        };

        self.decorate(Artifact::Deployment(deployment))
    }

    fn wireguard_container(&self) -> Container {
        Container {
            name: COMPONENT.to_string(),
            image: Some(WIREGUARD_IMAGE.to_string()),
            image_pull_policy: Some("IfNotPresent".to_string()),
            command: Some(vec![format!("/opt/bin/{}", ENTRYPOINT_KEY)]),
            volume_mounts: Some(vec![
                VolumeMount {
                    name: "config".to_string(),
                    mount_path: "/etc/wireguard".to_string(),
                    read_only: Some(true),
                    ..Default::default()
                },
                VolumeMount {
                    name: "entrypoint".to_string(),
                    mount_path: "/opt/bin".to_string(),
                    ..Default::default()
                },
            ]),
            security_context: Some(SecurityContext {
                privileged: Some(true),
                capabilities: Some(Capabilities {
                    add: Some(vec!["NET_ADMIN".to_string(), "SYS_MODULE".to_string()]),
                    ..Default::default()
                }),
                ..Default::default()
            }),
            ports: Some(vec![ContainerPort {
                container_port: i32::from(WIREGUARD_PORT),
                name: Some(COMPONENT.to_string()),
                protocol: Some("UDP".to_string()),
                ..Default::default()
            }]),
            liveness_probe: Some(Probe {
                exec: Some(ExecAction {
                    command: Some(
                        ["/bin/sh", "-c", "ip link show wg0 up"]
                            .map(String::from)
                            .to_vec(),
                    ),
                }),
                failure_threshold: Some(2),
                success_threshold: Some(1),
                initial_delay_seconds: Some(5),
                timeout_seconds: Some(1),
                period_seconds: Some(10),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    fn resolver_container(&self) -> Container {
        Container {
            name: "unbound".to_string(),
            image: Some(RESOLVER_IMAGE.to_string()),
            image_pull_policy: Some("IfNotPresent".to_string()),
            command: Some(vec!["unbound".to_string()]),
            args: Some(
                ["-d", "-c", "/etc/unbound/unbound.conf"]
                    .map(String::from)
                    .to_vec(),
            ),
            volume_mounts: Some(vec![VolumeMount {
                name: "unbound-config".to_string(),
                mount_path: "/etc/unbound".to_string(),
                read_only: Some(true),
                ..Default::default()
            }]),
            ..Default::default()
        }
    }

    fn volumes(&self) -> Vec<Volume> {
        let name = self.name();
        let mut volumes = vec![
            Volume {
                name: "config".to_string(),
                secret: Some(SecretVolumeSource {
                    secret_name: Some(self.secret_name()),
                    items: Some(vec![KeyToPath {
                        key: CONFIG_FIELD.to_string(),
                        path: "wg0.conf".to_string(),
                        mode: None,
                    }]),
                    ..Default::default()
                }),
                ..Default::default()
            },
            Volume {
                name: "entrypoint".to_string(),
                config_map: Some(ConfigMapVolumeSource {
                    name: name.clone().into(),
                    items: Some(vec![KeyToPath {
                        key: ENTRYPOINT_KEY.to_string(),
                        path: ENTRYPOINT_KEY.to_string(),
                        mode: Some(0o755),
                    }]),
                    ..Default::default()
                }),
                ..Default::default()
            },
        ];

        if self.gateway.spec.dns.deploy_server {
            volumes.push(Volume {
                name: "unbound-config".to_string(),
                config_map: Some(ConfigMapVolumeSource {
                    name: name.into(),
                    items: Some(vec![KeyToPath {
                        key: RESOLVER_CONFIG_KEY.to_string(),
                        path: RESOLVER_CONFIG_KEY.to_string(),
                        mode: None,
                    }]),
                    ..Default::default()
                }),
                ..Default::default()
            });
        }

        volumes
    }
}
