use pkg_constants::network::{DEFAULT_SERVER_WEIGHT, HTTPS_PORT, SCHEME_HTTP, SCHEME_HTTPS};
use pkg_types::configuration::Server;
use pkg_types::ingress::{IngressBackend, PortSelector};
use pkg_types::meta::Resource;
use pkg_types::service::{Service, ServicePort};
use std::collections::HashMap;
use thiserror::Error;

/// Why a path's backend reference produced no server.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResolveError {
    #[error("service {namespace}/{name} not found")]
    ServiceNotFound { namespace: String, name: String },

    #[error("service {namespace}/{name} has no port matching '{selector}'")]
    PortNotFound {
        namespace: String,
        name: String,
        selector: PortSelector,
    },

    #[error("service {namespace}/{name} has no cluster address")]
    NoClusterAddress { namespace: String, name: String },
}

/// Services keyed by `(namespace, name)`.
///
/// Lookups never cross namespaces: a service is only found from an ingress
/// living in the same namespace.
pub struct ServiceIndex<'a> {
    services: HashMap<(&'a str, &'a str), &'a Service>,
}

impl<'a> ServiceIndex<'a> {
    /// Index the given services. If two services share a namespace and name,
    /// the one with the lowest UID wins.
    pub fn new(services: &'a [Service]) -> Self {
        let mut index: HashMap<(&'a str, &'a str), &'a Service> =
            HashMap::with_capacity(services.len());
        for service in services {
            let key = (service.namespace(), service.name());
            match index.get(&key) {
                Some(existing) if existing.metadata.uid <= service.metadata.uid => {}
                _ => {
                    index.insert(key, service);
                }
            }
        }
        Self { services: index }
    }

    pub fn get(&self, namespace: &str, name: &str) -> Option<&'a Service> {
        self.services.get(&(namespace, name)).copied()
    }
}

/// A server ready to be merged into a backend, keyed by the service UID.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedServer {
    pub id: String,
    pub server: Server,
}

/// Resolve an ingress path's backend reference to a server.
///
/// The service must live in `namespace` (the ingress's namespace) and declare
/// a port matching the selector by name or by number.
pub fn resolve_server(
    index: &ServiceIndex<'_>,
    namespace: &str,
    backend: &IngressBackend,
) -> Result<ResolvedServer, ResolveError> {
    let service = index
        .get(namespace, &backend.service_name)
        .ok_or_else(|| ResolveError::ServiceNotFound {
            namespace: namespace.to_string(),
            name: backend.service_name.clone(),
        })?;

    let port = find_port(&service.spec.ports, &backend.service_port).ok_or_else(|| {
        ResolveError::PortNotFound {
            namespace: namespace.to_string(),
            name: backend.service_name.clone(),
            selector: backend.service_port.clone(),
        }
    })?;

    let address = service
        .spec
        .cluster_ip
        .as_deref()
        .map(str::trim)
        .filter(|ip| !ip.is_empty() && !ip.eq_ignore_ascii_case("none"))
        .ok_or_else(|| ResolveError::NoClusterAddress {
            namespace: namespace.to_string(),
            name: backend.service_name.clone(),
        })?;

    Ok(ResolvedServer {
        id: service.metadata.uid.clone(),
        server: Server {
            url: server_url(address, port.port),
            weight: DEFAULT_SERVER_WEIGHT,
        },
    })
}

fn find_port<'a>(ports: &'a [ServicePort], selector: &PortSelector) -> Option<&'a ServicePort> {
    ports.iter().find(|p| match selector {
        PortSelector::Name(name) => !name.is_empty() && p.name == *name,
        PortSelector::Number(number) => p.port == *number,
    })
}

/// `https` on port 443, `http` otherwise. IPv6 addresses are bracketed.
pub fn server_url(address: &str, port: u16) -> String {
    let scheme = if port == HTTPS_PORT {
        SCHEME_HTTPS
    } else {
        SCHEME_HTTP
    };
    if address.contains(':') {
        format!("{}://[{}]:{}", scheme, address, port)
    } else {
        format!("{}://{}:{}", scheme, address, port)
    }
}
