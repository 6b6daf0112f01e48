//! The closed set of child artifacts the operator manages

use std::fmt;

use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::{ConfigMap, Secret, Service};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;

use crate::Result;

/// Kind of a managed child artifact, in the order reconcilers apply them
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ArtifactKind {
    Service,
    ConfigMap,
    Secret,
    Deployment,
}

impl ArtifactKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ArtifactKind::Service => "service",
            ArtifactKind::ConfigMap => "configmap",
            ArtifactKind::Secret => "secret",
            ArtifactKind::Deployment => "deployment",
        }
    }
}

impl fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A desired or observed child object
#[derive(Clone, Debug, PartialEq)]
pub enum Artifact {
    Service(Service),
    ConfigMap(ConfigMap),
    Secret(Secret),
    Deployment(Deployment),
}

impl Artifact {
    pub fn kind(&self) -> ArtifactKind {
        match self {
            Artifact::Service(_) => ArtifactKind::Service,
            Artifact::ConfigMap(_) => ArtifactKind::ConfigMap,
            Artifact::Secret(_) => ArtifactKind::Secret,
            Artifact::Deployment(_) => ArtifactKind::Deployment,
        }
    }

    pub fn meta(&self) -> &ObjectMeta {
        match self {
            Artifact::Service(obj) => &obj.metadata,
            Artifact::ConfigMap(obj) => &obj.metadata,
            Artifact::Secret(obj) => &obj.metadata,
            Artifact::Deployment(obj) => &obj.metadata,
        }
    }

    pub fn meta_mut(&mut self) -> &mut ObjectMeta {
        match self {
            Artifact::Service(obj) => &mut obj.metadata,
            Artifact::ConfigMap(obj) => &mut obj.metadata,
            Artifact::Secret(obj) => &mut obj.metadata,
            Artifact::Deployment(obj) => &mut obj.metadata,
        }
    }

    pub fn name(&self) -> &str {
        self.meta().name.as_deref().unwrap_or_default()
    }

    pub fn namespace(&self) -> &str {
        self.meta().namespace.as_deref().unwrap_or_default()
    }

    /// Identifier used in logs and errors: kind/namespace/name
    pub fn id(&self) -> String {
        format!("{}/{}/{}", self.kind(), self.namespace(), self.name())
    }

    pub fn annotation(&self, key: &str) -> Option<&str> {
        self.meta().annotations.as_ref()?.get(key).map(String::as_str)
    }

    /// Full JSON representation of the wrapped object
    pub fn to_value(&self) -> Result<serde_json::Value> {
        let value = match self {
            Artifact::Service(obj) => serde_json::to_value(obj)?,
            Artifact::ConfigMap(obj) => serde_json::to_value(obj)?,
            Artifact::Secret(obj) => serde_json::to_value(obj)?,
            Artifact::Deployment(obj) => serde_json::to_value(obj)?,
        };
        Ok(value)
    }

    pub fn as_service(&self) -> Option<&Service> {
        match self {
            Artifact::Service(svc) => Some(svc),
            _ => None,
        }
    }

    pub fn as_config_map(&self) -> Option<&ConfigMap> {
        match self {
            Artifact::ConfigMap(cm) => Some(cm),
            _ => None,
        }
    }

    pub fn as_secret(&self) -> Option<&Secret> {
        match self {
            Artifact::Secret(secret) => Some(secret),
            _ => None,
        }
    }

    pub fn as_deployment(&self) -> Option<&Deployment> {
        match self {
            Artifact::Deployment(deploy) => Some(deploy),
            _ => None,
        }
    }
}
