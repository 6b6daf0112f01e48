use thiserror::Error;

pub type Result<T> = std::result::Result<T, CoreError>;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Kubernetes error: {0}")]
    KubernetesError(#[from] kube::Error),

    #[error("Conflict writing {0}: object was modified concurrently")]
    Conflict(String),

    #[error("{0} is controlled by another resource")]
    ForeignOwner(String),

    #[error("Unsupported service type: {0}")]
    UnsupportedServiceType(String),

    #[error("Key generation failed: {0}")]
    KeyGeneration(String),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl CoreError {
    /// Errors that no amount of retrying will fix without a spec change
    pub fn is_terminal(&self) -> bool {
        matches!(self, CoreError::UnsupportedServiceType(_))
    }
}
