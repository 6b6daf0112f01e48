use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::{Affinity, Container};
use kube::CustomResource;
use schemars::gen::SchemaGenerator;
use schemars::schema::{ArrayValidation, InstanceType, Schema, SchemaObject};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Service type resolved through the cluster-internal address of the service
pub const SERVICE_TYPE_CLUSTER_IP: &str = "ClusterIP";
/// Service type resolved through the first load balancer ingress entry
pub const SERVICE_TYPE_LOAD_BALANCER: &str = "LoadBalancer";

/// Wireguard is the hub of a VPN network: it owns the network-facing
/// service, the rendered server configuration and the workload running it
#[derive(CustomResource, Clone, Debug, PartialEq, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "vpn.ahova.com",
    version = "v1alpha1",
    kind = "Wireguard",
    plural = "wireguards",
    namespaced,
    derive = "Default",
    derive = "PartialEq",
    status = "WireguardStatus",
    printcolumn = r#"{"name":"Endpoint","type":"string","jsonPath":".status.endpoint"}"#,
    printcolumn = r#"{"name":"PublicKey","type":"string","jsonPath":".status.publicKey"}"#,
)]
#[serde(rename_all = "camelCase")]
pub struct WireguardSpec {
    /// Number of gateway instances
    #[serde(default = "default_replicas")]
    #[schemars(range(min = 1, max = 10))]
    pub replicas: i32,

    /// Type of the service exposing the gateway: ClusterIP or LoadBalancer
    #[serde(default = "default_service_type")]
    pub service_type: String,

    /// Routes handed to peers, rendered verbatim into their AllowedIPs
    #[serde(default = "default_allowed_ips", rename = "allowedIPs")]
    pub allowed_ips: String,

    /// Interface address of the gateway, which also names the VPN network
    #[serde(default = "default_network")]
    pub network: String,

    /// DNS policy for the gateway and its peers
    #[serde(default)]
    pub dns: DnsSpec,

    /// Address peers use to reach the gateway, host[:port]. When unset the
    /// address of the service is used
    #[serde(skip_serializing_if = "Option::is_none")]
    pub endpoint_address: Option<String>,

    /// Destinations peers are never allowed to reach through the gateway
    #[serde(default = "default_drop_connections_to")]
    pub drop_connections_to: Vec<String>,

    /// Extra containers to run next to the gateway
    #[serde(default)]
    #[schemars(schema_with = "container_list_schema")]
    pub sidecars: Vec<Container>,

    /// Scheduling affinity of the gateway workload
    #[serde(skip_serializing_if = "Option::is_none")]
    #[schemars(schema_with = "opaque_object_schema")]
    pub affinity: Option<Affinity>,

    /// Annotations for the service resource
    #[serde(default)]
    pub service_annotations: BTreeMap<String, String>,

    /// Extra labels for every resource created for this gateway
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
}

impl Default for WireguardSpec {
    fn default() -> Self {
        Self {
            replicas: default_replicas(),
            service_type: default_service_type(),
            allowed_ips: default_allowed_ips(),
            network: default_network(),
            dns: DnsSpec::default(),
            endpoint_address: None,
            drop_connections_to: default_drop_connections_to(),
            sidecars: Vec::new(),
            affinity: None,
            service_annotations: BTreeMap::new(),
            labels: BTreeMap::new(),
        }
    }
}

impl WireguardSpec {
    /// Interface IP of the gateway: the network with its prefix length removed
    pub fn interface_ip(&self) -> &str {
        self.network
            .split_once('/')
            .map_or(self.network.as_str(), |(ip, _)| ip)
    }

    /// Resolver address written into peer configurations
    pub fn peer_dns(&self) -> String {
        match (&self.dns.address, self.dns.deploy_server) {
            (Some(address), _) => address.clone(),
            (None, true) => self.interface_ip().to_string(),
            (None, false) => default_external_dns(),
        }
    }
}

/// DNS configuration of the gateway
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct DnsSpec {
    /// Run a caching resolver next to the gateway and point peers at it
    #[serde(default = "default_deploy_server")]
    pub deploy_server: bool,

    /// Resolver address handed to peers, overriding the local resolver
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
}

impl Default for DnsSpec {
    fn default() -> Self {
        Self {
            deploy_server: default_deploy_server(),
            address: None,
        }
    }
}

/// Status of a Wireguard gateway. Keys and endpoint are set once known
/// and never cleared by the operator
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct WireguardStatus {
    /// Public key of the gateway
    #[serde(skip_serializing_if = "Option::is_none")]
    pub public_key: Option<String>,

    /// Externally reachable endpoint of the gateway, host:port
    #[serde(skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,

    /// Conditions describing the status
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<Condition>,
}

impl WireguardStatus {
    /// Both the public key and the endpoint are known, so peers can be rendered
    pub fn is_populated(&self) -> bool {
        self.public_key.is_some() && self.endpoint.is_some()
    }
}

/// Condition for Wireguard status
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Condition {
    /// Type of condition
    #[serde(rename = "type")]
    pub condition_type: String,

    /// Status: "True", "False", "Unknown"
    pub status: String,

    /// Reason for the condition
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,

    /// Human-readable message
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl Condition {
    pub fn ready(status: bool, reason: &str, message: impl Into<String>) -> Self {
        Self {
            condition_type: "Ready".to_string(),
            status: if status { "True" } else { "False" }.to_string(),
            reason: Some(reason.to_string()),
            message: Some(message.into()),
        }
    }
}

// Default values
fn default_replicas() -> i32 {
    1
}

fn default_service_type() -> String {
    SERVICE_TYPE_CLUSTER_IP.to_string()
}

fn default_allowed_ips() -> String {
    "0.0.0.0/0, ::/0".to_string()
}

fn default_network() -> String {
    "192.168.254.1/24".to_string()
}

fn default_deploy_server() -> bool {
    true
}

fn default_external_dns() -> String {
    "1.1.1.1".to_string()
}

fn default_drop_connections_to() -> Vec<String> {
    ["192.168.0.0/16", "172.16.0.0/12", "10.0.0.0/8", "169.254.169.254/32"]
        .into_iter()
        .map(String::from)
        .collect()
}

// Core types are kept opaque in the CRD schema; the API server validates
// them again when the workload is created
fn opaque_object_schema(_: &mut SchemaGenerator) -> Schema {
    Schema::Object(SchemaObject {
        instance_type: Some(InstanceType::Object.into()),
        extensions: [(
            "x-kubernetes-preserve-unknown-fields".to_string(),
            serde_json::Value::Bool(true),
        )]
        .into_iter()
        .collect(),
        ..Default::default()
    })
}

fn container_list_schema(gen: &mut SchemaGenerator) -> Schema {
    Schema::Object(SchemaObject {
        instance_type: Some(InstanceType::Array.into()),
        array: Some(Box::new(ArrayValidation {
            items: Some(opaque_object_schema(gen).into()),
            ..Default::default()
        })),
        ..Default::default()
    })
}
