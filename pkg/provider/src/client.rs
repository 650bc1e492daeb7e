//! Boundary to the orchestrator API.
//!
//! The transport behind [`ResourceClient`] (HTTP, authentication, retries)
//! lives outside this crate. The provider only lists resources, subscribes to
//! change notifications and stops those subscriptions.

use async_trait::async_trait;
use pkg_types::ingress::Ingress;
use pkg_types::meta::Resource;
use pkg_types::service::Service;
use std::collections::BTreeSet;
use std::fmt;
use tokio::sync::{mpsc, watch};

/// Resource kinds the provider lists and watches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    Ingress,
    Service,
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResourceKind::Ingress => write!(f, "ingresses"),
            ResourceKind::Service => write!(f, "services"),
        }
    }
}

/// Type of change in a watch stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventType {
    Put,
    Delete,
}

/// A change notification. Carries the identity of the changed resource only;
/// the provider always re-lists before rebuilding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchEvent {
    pub seq: u64,
    pub kind: ResourceKind,
    pub event_type: EventType,
    pub namespace: String,
    pub name: String,
}

/// Namespace allow-list deciding which resources are visible.
///
/// An empty list admits every namespace.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NamespaceFilter {
    namespaces: BTreeSet<String>,
}

impl NamespaceFilter {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn new(namespaces: impl IntoIterator<Item = String>) -> Self {
        Self {
            namespaces: namespaces.into_iter().collect(),
        }
    }

    pub fn admits_namespace(&self, namespace: &str) -> bool {
        self.namespaces.is_empty() || self.namespaces.contains(namespace)
    }

    pub fn admits<R: Resource + ?Sized>(&self, resource: &R) -> bool {
        self.admits_namespace(resource.namespace())
    }

    pub fn namespaces(&self) -> impl Iterator<Item = &str> {
        self.namespaces.iter().map(String::as_str)
    }
}

/// Owner side of a stop signal. Stopping is permanent, and dropping the
/// handle counts as stopping.
#[derive(Debug)]
pub struct StopHandle {
    tx: watch::Sender<bool>,
}

impl StopHandle {
    pub fn stop(&self) {
        self.tx.send_replace(true);
    }
}

/// Observer side of a stop signal, cloned into every watch.
#[derive(Debug, Clone)]
pub struct StopSignal {
    rx: watch::Receiver<bool>,
}

impl StopSignal {
    pub fn is_stopped(&self) -> bool {
        *self.rx.borrow() || self.rx.has_changed().is_err()
    }

    /// Resolves once the handle stops or is dropped.
    pub async fn stopped(&mut self) {
        let _ = self.rx.wait_for(|stopped| *stopped).await;
    }
}

pub fn stop_signal() -> (StopHandle, StopSignal) {
    let (tx, rx) = watch::channel(false);
    (StopHandle { tx }, StopSignal { rx })
}

/// Receiving side of one watch: change events and transport errors.
/// Both channels close when the watch ends.
#[derive(Debug)]
pub struct Watch {
    pub events: mpsc::Receiver<WatchEvent>,
    pub errors: mpsc::Receiver<anyhow::Error>,
}

/// Producing side of a [`Watch`], held by client implementations.
#[derive(Debug, Clone)]
pub struct WatchSender {
    pub events: mpsc::Sender<WatchEvent>,
    pub errors: mpsc::Sender<anyhow::Error>,
}

pub fn watch_channel(capacity: usize) -> (WatchSender, Watch) {
    let (events_tx, events_rx) = mpsc::channel(capacity);
    let (errors_tx, errors_rx) = mpsc::channel(capacity);
    (
        WatchSender {
            events: events_tx,
            errors: errors_tx,
        },
        Watch {
            events: events_rx,
            errors: errors_rx,
        },
    )
}

/// Listing and change notification for ingresses and services.
#[async_trait]
pub trait ResourceClient: Send + Sync {
    /// Current ingresses admitted by `filter`.
    async fn list_ingresses(&self, filter: &NamespaceFilter) -> anyhow::Result<Vec<Ingress>>;

    /// Current services admitted by `filter`.
    async fn list_services(&self, filter: &NamespaceFilter) -> anyhow::Result<Vec<Service>>;

    /// Watch ingress changes admitted by `filter` until `stop` fires.
    async fn watch_ingresses(
        &self,
        filter: &NamespaceFilter,
        stop: StopSignal,
    ) -> anyhow::Result<Watch>;

    /// Watch every resource change until `stop` fires.
    async fn watch_all(&self, stop: StopSignal) -> anyhow::Result<Watch>;
}
