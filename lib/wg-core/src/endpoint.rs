//! Resolution of the externally reachable address of a gateway

use k8s_openapi::api::core::v1::Service;
use wg_api::v1alpha1::wireguard::{SERVICE_TYPE_CLUSTER_IP, SERVICE_TYPE_LOAD_BALANCER};
use wg_api::v1alpha1::WireguardSpec;

use crate::{CoreError, Result, WIREGUARD_PORT};

/// Result of an endpoint resolution
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Resolution {
    /// host:port peers should connect to
    Ready(String),
    /// The service has no usable address yet; try again later
    NotReady,
}

/// Compute the endpoint of a gateway from its spec and its observed service.
///
/// Priority: explicit override, then the cluster IP for `ClusterIP`
/// services, then the first ingress entry for `LoadBalancer` services.
/// Any other service type is rejected.
pub fn resolve_endpoint(spec: &WireguardSpec, service: Option<&Service>) -> Result<Resolution> {
    if let Some(address) = spec.endpoint_address.as_deref() {
        let endpoint = if has_port(address) {
            address.to_string()
        } else {
            join_host_port(address, WIREGUARD_PORT)
        };
        return Ok(Resolution::Ready(endpoint));
    }

    let host = match spec.service_type.as_str() {
        SERVICE_TYPE_CLUSTER_IP => service.and_then(cluster_ip),
        SERVICE_TYPE_LOAD_BALANCER => service.and_then(load_balancer_address),
        other => return Err(CoreError::UnsupportedServiceType(other.to_string())),
    };

    Ok(match host {
        Some(host) => Resolution::Ready(join_host_port(host, WIREGUARD_PORT)),
        None => Resolution::NotReady,
    })
}

fn cluster_ip(svc: &Service) -> Option<&str> {
    svc.spec
        .as_ref()?
        .cluster_ip
        .as_deref()
        .filter(|ip| !ip.is_empty() && *ip != "None")
}

fn load_balancer_address(svc: &Service) -> Option<&str> {
    let ingress = svc
        .status
        .as_ref()?
        .load_balancer
        .as_ref()?
        .ingress
        .as_ref()?
        .first()?;

    ingress
        .ip
        .as_deref()
        .filter(|ip| !ip.is_empty())
        .or_else(|| ingress.hostname.as_deref().filter(|host| !host.is_empty()))
}

/// Whether an address already carries a port segment
fn has_port(address: &str) -> bool {
    if let Some(rest) = address.strip_prefix('[') {
        return rest
            .split_once("]:")
            .is_some_and(|(_, port)| port.parse::<u16>().is_ok());
    }

    match address.rsplit_once(':') {
        // more than one colon without brackets is a bare IPv6 address
        Some((host, port)) => !host.contains(':') && port.parse::<u16>().is_ok(),
        None => false,
    }
}

fn join_host_port(host: &str, port: u16) -> String {
    if host.contains(':') && !host.starts_with('[') {
        format!("[{}]:{}", host, port)
    } else {
        format!("{}:{}", host, port)
    }
}
