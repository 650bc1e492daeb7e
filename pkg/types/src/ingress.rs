use serde::{Deserialize, Serialize};
use std::fmt;

use crate::meta::{ObjectMeta, Resource};

/// Port of the referenced service, by number or by name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PortSelector {
    Number(u16),
    Name(String),
}

impl fmt::Display for PortSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PortSelector::Number(port) => write!(f, "{}", port),
            PortSelector::Name(name) => write!(f, "{}", name),
        }
    }
}

impl From<u16> for PortSelector {
    fn from(port: u16) -> Self {
        PortSelector::Number(port)
    }
}

impl From<&str> for PortSelector {
    fn from(name: &str) -> Self {
        PortSelector::Name(name.to_string())
    }
}

/// Backend service target for an Ingress path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngressBackend {
    #[serde(alias = "serviceName")]
    pub service_name: String,
    #[serde(alias = "servicePort")]
    pub service_port: PortSelector,
}

/// A single path rule within an Ingress HTTP rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngressPath {
    /// Empty means "any path on this host".
    #[serde(default)]
    pub path: String,
    pub backend: IngressBackend,
}

/// HTTP rules for a host.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngressHttp {
    #[serde(default)]
    pub paths: Vec<IngressPath>,
}

/// A single host-based Ingress rule.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngressRule {
    #[serde(default)]
    pub host: String,
    #[serde(default)]
    pub http: Option<IngressHttp>,
}

/// Ingress specification.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngressSpec {
    #[serde(default)]
    pub rules: Vec<IngressRule>,
}

/// Ingress resource for external traffic routing.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ingress {
    #[serde(default)]
    pub metadata: ObjectMeta,
    #[serde(default)]
    pub spec: IngressSpec,
}

impl Resource for Ingress {
    fn meta(&self) -> &ObjectMeta {
        &self.metadata
    }
}
