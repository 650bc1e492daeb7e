//! Routing configuration produced by the provider and consumed by the proxy.
//!
//! A [`Configuration`] is a whole snapshot: the consumer replaces its live
//! routing table with it wholesale. Every map is ordered so that equal
//! snapshots serialize to identical bytes.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Root snapshot of backends and frontends.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Configuration {
    #[serde(default)]
    pub backends: BTreeMap<String, Backend>,
    #[serde(default)]
    pub frontends: BTreeMap<String, Frontend>,
}

/// Circuit-breaker policy slot. Never filled by the kubernetes provider.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CircuitBreaker {
    pub expression: String,
}

/// Load-balancer policy slot. Never filled by the kubernetes provider.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoadBalancer {
    pub method: String,
}

/// A routable pool of weighted servers.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Backend {
    #[serde(default)]
    pub servers: BTreeMap<String, Server>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub circuit_breaker: Option<CircuitBreaker>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub load_balancer: Option<LoadBalancer>,
}

impl Backend {
    /// Upsert a server. On a duplicate id the incoming server overwrites the
    /// existing one; the same service and port always yield the same URL.
    pub fn merge_server(&mut self, id: String, server: Server) {
        self.servers.insert(id, server);
    }
}

/// One upstream endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Server {
    /// `scheme://host:port`
    pub url: String,
    pub weight: u32,
}

/// A routable entry point. Its routes are ANDed together.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Frontend {
    pub backend: String,
    pub pass_host_header: bool,
    #[serde(default)]
    pub routes: BTreeMap<String, Route>,
}

/// A single matching predicate of the form `<RuleKind>:<value>`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Route {
    pub rule: String,
}

impl Route {
    pub fn new(kind: &str, value: &str) -> Self {
        Self {
            rule: format!("{}:{}", kind, value),
        }
    }
}
