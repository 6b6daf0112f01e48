//! Rendering of gateway and peer configuration files
//!
//! All functions here are pure: identical inputs give byte-identical output.

/// Keepalive interval peers use towards the gateway, in seconds
pub const PERSISTENT_KEEPALIVE: u32 = 25;

/// Bootstrap script of the gateway container
pub const ENTRYPOINT_SH: &str = r#"#!/bin/sh
set -e

finish () {
	echo "$(date): Shutting down Wireguard"
	wg-quick down wg0
	exit 0
}

trap finish TERM INT QUIT
echo "$(date): Starting up Wireguard"
wg-quick up wg0

echo "Wireguard started, sleeping..."
sleep infinity
"#;

/// A peer whose public key is known, ready to be rendered into its gateway
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReadyPeer {
    pub name: String,
    pub address: String,
    pub public_key: String,
}

/// Render the server side configuration of a gateway. Peer stanzas follow
/// the order of `peers`.
pub fn render_gateway_config(
    address: &str,
    private_key: &str,
    listen_port: u16,
    drop_connections_to: &[String],
    peers: &[ReadyPeer],
) -> String {
    let mut lines = vec![
        "[Interface]".to_string(),
        format!("Address = {}", address),
        format!("PrivateKey = {}", private_key),
        format!("ListenPort = {}", listen_port),
    ];

    for destination in drop_connections_to {
        lines.push(format!(
            "PostUp = iptables --insert FORWARD --source {} --destination {} --jump DROP",
            address, destination
        ));
    }

    lines.extend(
        [
            "PostUp = iptables --append FORWARD --in-interface %i --jump ACCEPT",
            "PostUp = iptables --append FORWARD --out-interface %i --jump ACCEPT",
            "PostUp = iptables -t nat -A POSTROUTING -o eth0 -j MASQUERADE",
            "SaveConfig = false",
        ]
        .map(String::from),
    );

    for peer in peers {
        lines.push(String::new());
        lines.push("[Peer]".to_string());
        lines.push(format!("# friendly_name = {}", peer.name));
        lines.push(format!("PublicKey = {}", peer.public_key));
        lines.push(format!("AllowedIPs = {}", peer.address));
    }

    let mut config = lines.join("\n");
    config.push('\n');
    config
}

/// Render the client side configuration of a peer
pub fn render_peer_config(
    address: &str,
    private_key: &str,
    dns: &str,
    gateway_public_key: &str,
    gateway_endpoint: &str,
    allowed_ips: &str,
) -> String {
    format!(
        "[Interface]\n\
         Address = {address}\n\
         PrivateKey = {private_key}\n\
         DNS = {dns}\n\
         \n\
         [Peer]\n\
         PublicKey = {gateway_public_key}\n\
         Endpoint = {gateway_endpoint}\n\
         AllowedIPs = {allowed_ips}\n\
         PersistentKeepalive = {PERSISTENT_KEEPALIVE}\n"
    )
}

/// Render the configuration of the caching resolver running next to the
/// gateway, answering only for loopback and the VPN network
pub fn render_resolver_config(network: &str) -> String {
    format!(
        "remote-control:\n\
         \tcontrol-enable: yes\n\
         \tcontrol-interface: 127.0.0.1\n\
         \tcontrol-use-cert: no\n\
         server:\n\
         \tnum-threads: 1\n\
         \tverbosity: 1\n\
         \tinterface: 0.0.0.0\n\
         \tmax-udp-size: 3072\n\
         \taccess-control: 0.0.0.0/0 refuse\n\
         \taccess-control: 127.0.0.1 allow\n\
         \taccess-control: {network} allow\n\
         \tprivate-address: {network}\n\
         \thide-identity: yes\n\
         \thide-version: yes\n\
         \tharden-glue: yes\n\
         \tharden-dnssec-stripped: yes\n\
         \tharden-referral-path: yes\n\
         \tunwanted-reply-threshold: 10000000\n\
         \tval-log-level: 1\n\
         \tcache-min-ttl: 1800\n\
         \tcache-max-ttl: 14400\n\
         \tprefetch: yes\n\
         \tprefetch-key: yes\n"
    )
}
