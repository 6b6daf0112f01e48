//! Level-triggered reconcilers for gateways and peers
//!
//! Each pass recomputes the desired artifacts from the current spec and the
//! observed cluster, applies them in a fixed order and stops at the first
//! one that needed a write. The caller requeues according to the returned
//! [`Outcome`]; no state is carried between passes.

mod gateway;
mod peer;

use std::fmt;
use std::sync::Arc;

use crate::{ArtifactKind, KeyGenerator, ObjectStore};

pub use gateway::GatewayReconciler;
pub use peer::PeerReconciler;

/// Shared dependencies of the reconcilers
#[derive(Clone)]
pub struct Context {
    pub store: Arc<dyn ObjectStore>,
    pub keys: Arc<dyn KeyGenerator>,
}

impl Context {
    pub fn new(store: Arc<dyn ObjectStore>, keys: Arc<dyn KeyGenerator>) -> Self {
        Self { store, keys }
    }
}

/// A dependency the reconciled resource is waiting for. Not an error
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WaitReason {
    /// The peer references a gateway that does not exist
    GatewayNotFound,
    /// The gateway has no public key or endpoint yet
    GatewayNotReady,
    /// The gateway service has no reachable address yet
    EndpointPending,
}

impl fmt::Display for WaitReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            WaitReason::GatewayNotFound => "gateway not found",
            WaitReason::GatewayNotReady => "gateway status not populated",
            WaitReason::EndpointPending => "gateway endpoint pending",
        })
    }
}

/// Result of one reconciliation pass
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Outcome {
    /// One artifact was created or updated; the remaining steps run next pass
    Applied(ArtifactKind),
    /// Artifacts are converged and the status was written
    StatusUpdated,
    /// A dependency is not ready yet
    Waiting(WaitReason),
    /// The resource cannot converge until its spec changes
    Stalled(String),
    /// Nothing to do
    Converged,
}

impl Outcome {
    /// Short label used in logs and metrics
    pub fn label(&self) -> &'static str {
        match self {
            Outcome::Applied(_) => "applied",
            Outcome::StatusUpdated => "status_updated",
            Outcome::Waiting(_) => "waiting",
            Outcome::Stalled(_) => "stalled",
            Outcome::Converged => "converged",
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outcome::Applied(kind) => write!(f, "applied {}", kind),
            Outcome::Waiting(reason) => write!(f, "waiting: {}", reason),
            Outcome::Stalled(message) => write!(f, "stalled: {}", message),
            other => f.write_str(other.label()),
        }
    }
}
