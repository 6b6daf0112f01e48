use kube::ResourceExt;
use tracing::{debug, info, instrument, warn};
use wg_api::v1alpha1::{Condition, WireguardStatus};
use wg_api::Wireguard;

use super::{Context, Outcome, WaitReason};
use crate::factory::GatewayFactory;
use crate::{
    apply, fingerprint, resolve_endpoint, Artifact, ArtifactKind, CoreError, KeyManager,
    Resolution, Result,
};

const READY_REASON: &str = "Converged";

/// Drives a Wireguard gateway towards its desired artifacts and status
pub struct GatewayReconciler {
    ctx: Context,
}

impl GatewayReconciler {
    pub fn new(ctx: Context) -> Self {
        Self { ctx }
    }

    /// Run one pass for the gateway `namespace/name`
    #[instrument(skip(self), fields(controller = "wireguard"))]
    pub async fn reconcile(&self, namespace: &str, name: &str) -> Result<Outcome> {
        let store = self.ctx.store.as_ref();

        let Some(gateway) = store.get_gateway(namespace, name).await? else {
            debug!("Wireguard not found, nothing to do");
            return Ok(Outcome::Converged);
        };
        if gateway.metadata.deletion_timestamp.is_some() {
            debug!("Wireguard is being deleted, children are garbage collected");
            return Ok(Outcome::Converged);
        }

        let peers: Vec<_> = store
            .list_peers(namespace)
            .await?
            .into_iter()
            .filter(|peer| peer.spec.wireguard_ref == name)
            .collect();

        let factory = GatewayFactory::new(&gateway, &peers);
        let keys = KeyManager::new(store, self.ctx.keys.as_ref())
            .resolve(namespace, &factory.secret_name())
            .await?;

        let config = factory.config(&keys);
        let desired = [
            factory.service()?,
            factory.config_map()?,
            factory.secret(&keys, &config)?,
            factory.deployment(&fingerprint::digest(config.as_bytes()))?,
        ];

        for artifact in &desired {
            if apply(store, artifact).await? {
                return Ok(Outcome::Applied(artifact.kind()));
            }
        }

        let service = store
            .get_artifact(ArtifactKind::Service, namespace, name)
            .await?;
        let resolution =
            match resolve_endpoint(&gateway.spec, service.as_ref().and_then(Artifact::as_service)) {
                Ok(resolution) => resolution,
                Err(err) if err.is_terminal() => return self.stall(&gateway, err).await,
                Err(err) => return Err(err),
            };

        let Resolution::Ready(endpoint) = resolution else {
            info!("Waiting for the {} service to get an address", gateway.spec.service_type);
            return Ok(Outcome::Waiting(WaitReason::EndpointPending));
        };

        let mut status = gateway.status.clone().unwrap_or_default();
        status.public_key = Some(keys.public_key.clone());
        status.endpoint = Some(endpoint.clone());
        set_condition(
            &mut status,
            Condition::ready(true, READY_REASON, format!("Serving at {}", endpoint)),
        );

        if self.write_status(&gateway, status).await? {
            info!("Published endpoint {}", endpoint);
            Ok(Outcome::StatusUpdated)
        } else {
            Ok(Outcome::Converged)
        }
    }

    /// Surface a configuration the gateway can never converge with. Known
    /// keys and endpoint are kept
    async fn stall(&self, gateway: &Wireguard, err: CoreError) -> Result<Outcome> {
        warn!("Wireguard {} cannot converge: {}", gateway.name_any(), err);

        let reason = match &err {
            CoreError::UnsupportedServiceType(_) => "UnsupportedServiceType",
            _ => "InvalidConfiguration",
        };
        let mut status = gateway.status.clone().unwrap_or_default();
        set_condition(&mut status, Condition::ready(false, reason, err.to_string()));
        self.write_status(gateway, status).await?;

        Ok(Outcome::Stalled(err.to_string()))
    }

    /// Write `status` unless the gateway already reports it
    async fn write_status(&self, gateway: &Wireguard, status: WireguardStatus) -> Result<bool> {
        if gateway.status.as_ref() == Some(&status) {
            return Ok(false);
        }

        let mut updated = gateway.clone();
        updated.status = Some(status);
        self.ctx.store.update_gateway_status(&updated).await?;
        Ok(true)
    }
}

/// Replace the condition of the same type, or add it
fn set_condition(status: &mut WireguardStatus, condition: Condition) {
    match status
        .conditions
        .iter_mut()
        .find(|existing| existing.condition_type == condition.condition_type)
    {
        Some(existing) => *existing = condition,
        None => status.conditions.push(condition),
    }
}
