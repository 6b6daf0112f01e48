//! Wireguard controller

use std::sync::Arc;
use std::time::Instant;

use futures::StreamExt;
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::{ConfigMap, Secret, Service};
use kube::{Client, ResourceExt};
use kube_runtime::controller::{Action, Controller};
use kube_runtime::reflector::ObjectRef;
use kube_runtime::watcher;
use tokio::sync::oneshot;
use tracing::{debug, info, warn};
use wg_api::{Wireguard, WireguardPeer};
use wg_core::{Context, CoreError, GatewayReconciler};

use crate::config::{Requeue, RunArgs};
use crate::metrics::Metrics;

const CONTROLLER: &str = "wireguard";

struct State {
    reconciler: GatewayReconciler,
    metrics: Metrics,
    requeue: Requeue,
}

pub struct GatewayController {
    client: Client,
    args: RunArgs,
    state: Arc<State>,
}

impl GatewayController {
    pub fn new(client: Client, ctx: Context, args: &RunArgs, metrics: Metrics) -> Self {
        let state = State {
            reconciler: GatewayReconciler::new(ctx),
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
    /// Wireguard cache holds its initial listing
    pub async fn run(self, synced: oneshot::Sender<()>) {
        info!("Starting Wireguard reconciliation");

        let args = &self.args;
        let client = self.client.clone();

        let controller =
            Controller::new(args.api::<Wireguard>(client.clone()), watcher::Config::default());
        let cache = controller.store();

        // Peers trigger the gateway they reference
        let reconciliation = controller
            .owns(args.api::<Service>(client.clone()), watcher::Config::default())
            .owns(args.api::<ConfigMap>(client.clone()), watcher::Config::default())
            .owns(args.api::<Secret>(client.clone()), watcher::Config::default())
            .owns(args.api::<Deployment>(client.clone()), watcher::Config::default())
            .watches(
                args.api::<WireguardPeer>(client),
                watcher::Config::default(),
                |peer: WireguardPeer| {
                    let namespace = peer.namespace()?;
                    Some(ObjectRef::<Wireguard>::new(&peer.spec.wireguard_ref).within(&namespace))
                },
            )
            .shutdown_on_signal()
            .run(reconcile, error_policy, self.state.clone())
            .for_each(|result| async move {
                match result {
                    Ok((obj, _)) => debug!("Reconciled {}", obj),
                    Err(e) => warn!("Error in Wireguard reconciliation stream: {}", e),
                }
            });

        let sync = async move {
            if cache.wait_until_ready().await.is_ok() {
                debug!("Wireguard cache synced");
                let _ = synced.send(());
            }
        };

        futures::join!(reconciliation, sync);

        info!("Wireguard controller stopped");
    }
}

async fn reconcile(gateway: Arc<Wireguard>, state: Arc<State>) -> Result<Action, CoreError> {
    let namespace = gateway.namespace().unwrap_or_default();
    let name = gateway.name_any();

    let start = Instant::now();
    let outcome = state.reconciler.reconcile(&namespace, &name).await?;
    state.metrics.observe(CONTROLLER, &outcome, start.elapsed());

    info!("Wireguard {}/{}: {}", namespace, name, outcome);
    Ok(state.requeue.action(&outcome))
}

fn error_policy(gateway: Arc<Wireguard>, err: &CoreError, state: Arc<State>) -> Action {
    warn!(
        "Error reconciling Wireguard {}/{}: {}",
        gateway.namespace().unwrap_or_default(),
        gateway.name_any(),
        err
    );
    state.metrics.error(CONTROLLER);
    state.requeue.on_error()
}
