use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use kube::CustomResourceExt;
use tokio::sync::oneshot;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;
use wg_api::{Wireguard, WireguardPeer};
use wg_core::{Context, X25519Generator};
use wg_kube::KubeStore;

mod config;
mod gateway_controller;
mod metrics;
mod peer_controller;
mod probe;

use config::{Cli, Command, LogFormat, RunArgs};
use gateway_controller::GatewayController;
use metrics::Metrics;
use peer_controller::PeerController;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command.unwrap_or(Command::Run(cli.run)) {
        Command::Run(args) => run(args).await,
        Command::Crd => print_crds(),
    }
}

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = tracing_subscriber::fmt().with_env_filter(filter);
    match format {
        LogFormat::Text => subscriber.init(),
        LogFormat::Json => subscriber.json().init(),
    }
}

async fn run(args: RunArgs) -> Result<()> {
    init_tracing(args.log_format);

    info!("Starting wg-operator...");

    let store = KubeStore::try_default().await?;
    let client = store.client().clone();
    let ctx = Context::new(Arc::new(store), Arc::new(X25519Generator));

    let metrics = Metrics::new()?;
    let ready = Arc::new(AtomicBool::new(false));

    let probes = tokio::spawn({
        let metrics = metrics.clone();
        let ready = ready.clone();
        let addr = args.probe_addr;
        async move {
            if let Err(e) = probe::serve(addr, metrics, ready).await {
                error!("Probe server error: {}", e);
            }
        }
    });

    let gateways = GatewayController::new(client.clone(), ctx.clone(), &args, metrics.clone());
    let peers = PeerController::new(client, ctx, &args, metrics);

    match &args.namespace {
        Some(namespace) => info!("Watching namespace {}", namespace),
        None => info!("Watching all namespaces"),
    }

    let (gateways_synced, gateways_signal) = oneshot::channel();
    let (peers_synced, peers_signal) = oneshot::channel();
    tokio::spawn(probe::ready_when_synced(
        vec![gateways_signal, peers_signal],
        ready,
    ));

    // Both controllers stop on SIGTERM or ctrl-c
    futures::join!(gateways.run(gateways_synced), peers.run(peers_synced));

    probes.abort();
    info!("Shutdown signal received, exiting...");

    Ok(())
}

fn print_crds() -> Result<()> {
    for crd in [Wireguard::crd(), WireguardPeer::crd()] {
        print!("---\n{}", serde_yaml::to_string(&crd)?);
    }
    Ok(())
}
