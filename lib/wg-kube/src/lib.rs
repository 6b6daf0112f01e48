//! Kubernetes backed object store for the WireGuard operator
pub mod store;

pub use store::KubeStore;
