//! WireguardPeer controller

use std::sync::Arc;
use std::time::Instant;

use futures::StreamExt;
use k8s_openapi::api::core::v1::Secret;
use kube::{Client, ResourceExt};
use kube_runtime::controller::{Action, Controller};
use kube_runtime::reflector::ObjectRef;
use kube_runtime::watcher;
use tokio::sync::oneshot;
use tracing::{debug, info, warn};
use wg_api::{Wireguard, WireguardPeer};
use wg_core::{Context, CoreError, PeerReconciler};

use crate::config::{Requeue, RunArgs};
use crate::metrics::Metrics;

const CONTROLLER: &str = "wireguardpeer";

struct State {
    reconciler: PeerReconciler,
    metrics: Metrics,
    requeue: Requeue,
}

pub struct PeerController {
    client: Client,
    args: RunArgs,
    state: Arc<State>,
}

impl PeerController {
    pub fn new(client: Client, ctx: Context, args: &RunArgs, metrics: Metrics) -> Self {
        let state = State {
            reconciler: PeerReconciler::new(ctx),
            metrics,
            requeue: args.requeue(),
        };
        Self {
            client,
            args: args.clone(),
            state: Arc::new(state),
        }
    }

    /// Run until a shutdown signal is received. `synced` fires once the
    /// WireguardPeer cache holds its initial listing
    pub async fn run(self, synced: oneshot::Sender<()>) {
        info!("Starting WireguardPeer reconciliation");

        let args = &self.args;
        let client = self.client.clone();

        let controller = Controller::new(
            args.api::<WireguardPeer>(client.clone()),
            watcher::Config::default(),
        );
        let peers = controller.store();
        let cache = peers.clone();

        // A gateway status change triggers every peer referencing it
        let reconciliation = controller
            .owns(args.api::<Secret>(client.clone()), watcher::Config::default())
            .watches(
                args.api::<Wireguard>(client),
                watcher::Config::default(),
                move |gateway: Wireguard| {
                    let namespace = gateway.namespace();
                    let name = gateway.name_any();
                    peers
                        .state()
                        .into_iter()
                        .filter(|peer| peer.namespace() == namespace && peer.spec.wireguard_ref == name)
                        .map(|peer| ObjectRef::from_obj(peer.as_ref()))
                        .collect::<Vec<_>>()
                },
            )
            .shutdown_on_signal()
            .run(reconcile, error_policy, self.state.clone())
            .for_each(|result| async move {
                match result {
                    Ok((obj, _)) => debug!("Reconciled {}", obj),
                    Err(e) => warn!("Error in WireguardPeer reconciliation stream: {}", e),
                }
            });

        let sync = async move {
            if cache.wait_until_ready().await.is_ok() {
                debug!("WireguardPeer cache synced");
                let _ = synced.send(());
            }
        };

        futures::join!(reconciliation, sync);

        info!("WireguardPeer controller stopped");
    }
}

async fn reconcile(peer: Arc<WireguardPeer>, state: Arc<State>) -> Result<Action, CoreError> {
    let namespace = peer.namespace().unwrap_or_default();
    let name = peer.name_any();

    let start = Instant::now();
    let outcome = state.reconciler.reconcile(&namespace, &name).await?;
    state.metrics.observe(CONTROLLER, &outcome, start.elapsed());

    info!("WireguardPeer {}/{}: {}", namespace, name, outcome);
    Ok(state.requeue.action(&outcome))
}

fn error_policy(peer: Arc<WireguardPeer>, err: &CoreError, state: Arc<State>) -> Action {
    warn!(
        "Error reconciling WireguardPeer {}/{}: {}",
        peer.namespace().unwrap_or_default(),
        peer.name_any(),
        err
    );
    state.metrics.error(CONTROLLER);
    state.requeue.on_error()
}
