use pkg_constants::annotations::{RULE_TYPE, RULE_TYPE_HOST};
use pkg_types::configuration::{Configuration, Route};
use pkg_types::ingress::{Ingress, IngressPath};
use pkg_types::meta::Resource;
use pkg_types::service::Service;
use tracing::{debug, warn};

use crate::resolver::{ServiceIndex, resolve_server};
use crate::rule_type::RuleType;

/// Backend and frontend identifier for a rule's host and path.
///
/// `host` alone when the path is empty, otherwise `host/path` with a single
/// leading slash of the path removed. `None` when both are empty.
pub fn route_id(host: &str, path: &str) -> Option<String> {
    if path.is_empty() {
        if host.is_empty() {
            return None;
        }
        return Some(host.to_string());
    }
    let path = path.strip_prefix('/').unwrap_or(path);
    Some(format!("{}/{}", host, path))
}

/// Folds ingress and service resources into one [`Configuration`].
///
/// Building is pure: the same resources always give an equal configuration,
/// whatever order they are listed in.
#[derive(Debug, Clone, Default)]
pub struct ConfigurationBuilder {
    disable_pass_host_headers: bool,
}

impl ConfigurationBuilder {
    pub fn new(disable_pass_host_headers: bool) -> Self {
        Self {
            disable_pass_host_headers,
        }
    }

    /// Build a snapshot from the visible ingresses and services.
    ///
    /// Paths whose service or port cannot be resolved in the ingress's own
    /// namespace are skipped; everything else is still translated.
    pub fn build(&self, ingresses: &[Ingress], services: &[Service]) -> Configuration {
        let index = ServiceIndex::new(services);
        let mut config = Configuration::default();

        let mut ordered: Vec<&Ingress> = ingresses.iter().collect();
        ordered.sort_by(|a, b| {
            (a.namespace(), a.name(), &a.metadata.uid).cmp(&(
                b.namespace(),
                b.name(),
                &b.metadata.uid,
            ))
        });

        for ingress in ordered {
            let rule_type = RuleType::from_annotation(ingress.metadata.annotation(RULE_TYPE));
            for rule in &ingress.spec.rules {
                let Some(http) = &rule.http else {
                    continue;
                };
                for path in &http.paths {
                    self.add_path(&mut config, &index, ingress, &rule.host, path, rule_type);
                }
            }
        }

        config
    }

    fn add_path(
        &self,
        config: &mut Configuration,
        index: &ServiceIndex<'_>,
        ingress: &Ingress,
        host: &str,
        path: &IngressPath,
        rule_type: RuleType,
    ) {
        let Some(id) = route_id(host, &path.path) else {
            warn!(
                "Skipping rule of ingress {}/{}: neither host nor path is set",
                ingress.namespace(),
                ingress.name()
            );
            return;
        };

        let resolved = match resolve_server(index, ingress.namespace(), &path.backend) {
            Ok(resolved) => resolved,
            Err(e) => {
                warn!(
                    "Skipping path {}{} of ingress {}/{}: {}",
                    host,
                    path.path,
                    ingress.namespace(),
                    ingress.name(),
                    e
                );
                return;
            }
        };

        debug!(
            "Adding {} -> {} ({}) for ingress {}/{}",
            id,
            resolved.server.url,
            resolved.id,
            ingress.namespace(),
            ingress.name()
        );

        config
            .backends
            .entry(id.clone())
            .or_default()
            .merge_server(resolved.id, resolved.server);

        let frontend = config.frontends.entry(id.clone()).or_default();
        frontend.backend = id;
        frontend.pass_host_header = !self.disable_pass_host_headers;
        if !host.is_empty() {
            frontend
                .routes
                .entry(host.to_string())
                .or_insert_with(|| Route::new(RULE_TYPE_HOST, host));
        }
        if !path.path.is_empty() {
            frontend
                .routes
                .insert(path.path.clone(), Route::new(rule_type.as_str(), &path.path));
        }
    }
}
