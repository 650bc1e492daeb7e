use anyhow::anyhow;
use async_trait::async_trait;
use pkg_constants::provider::{EVENT_LOG_CAPACITY, WATCH_EVENT_BUFFER};
use pkg_types::ingress::Ingress;
use pkg_types::meta::Resource;
use pkg_types::service::Service;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, warn};

use crate::client::{
    EventType, NamespaceFilter, ResourceClient, ResourceKind, StopSignal, Watch, WatchEvent,
    watch_channel,
};

type Key = (String, String);

/// In-process [`ResourceClient`] holding ingresses and services in memory.
///
/// Every mutation gets a monotonic sequence number and is broadcast to the
/// active watches.
#[derive(Clone)]
pub struct MemoryClient {
    inner: Arc<RwLock<MemoryClientInner>>,
    sender: broadcast::Sender<WatchEvent>,
}

#[derive(Default)]
struct MemoryClientInner {
    seq: u64,
    ingresses: BTreeMap<Key, Ingress>,
    services: BTreeMap<Key, Service>,
}

impl MemoryClientInner {
    fn record(
        &mut self,
        sender: &broadcast::Sender<WatchEvent>,
        kind: ResourceKind,
        event_type: EventType,
        (namespace, name): Key,
    ) -> u64 {
        self.seq += 1;
        let event = WatchEvent {
            seq: self.seq,
            kind,
            event_type,
            namespace,
            name,
        };
        debug!(
            "{:?} {} {}/{} (seq {})",
            event.event_type, event.kind, event.namespace, event.name, event.seq
        );
        // No active watches is fine.
        let _ = sender.send(event);
        self.seq
    }
}

fn key_of<R: Resource>(resource: &R) -> Key {
    (resource.namespace().to_string(), resource.name().to_string())
}

impl MemoryClient {
    pub fn new() -> Self {
        Self::with_capacity(EVENT_LOG_CAPACITY)
    }

    /// `capacity` bounds how far a watch may fall behind before it is
    /// reported as lagging.
    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            inner: Arc::new(RwLock::new(MemoryClientInner::default())),
            sender,
        }
    }

    /// Create or replace an ingress. Returns the event's sequence number.
    pub async fn apply_ingress(&self, ingress: Ingress) -> u64 {
        let key = key_of(&ingress);
        let mut inner = self.inner.write().await;
        inner.ingresses.insert(key.clone(), ingress);
        inner.record(&self.sender, ResourceKind::Ingress, EventType::Put, key)
    }

    pub async fn delete_ingress(&self, namespace: &str, name: &str) -> Option<Ingress> {
        let key = (namespace.to_string(), name.to_string());
        let mut inner = self.inner.write().await;
        let removed = inner.ingresses.remove(&key)?;
        inner.record(&self.sender, ResourceKind::Ingress, EventType::Delete, key);
        Some(removed)
    }

    /// Create or replace a service. Returns the event's sequence number.
    pub async fn apply_service(&self, service: Service) -> u64 {
        let key = key_of(&service);
        let mut inner = self.inner.write().await;
        inner.services.insert(key.clone(), service);
        inner.record(&self.sender, ResourceKind::Service, EventType::Put, key)
    }

    pub async fn delete_service(&self, namespace: &str, name: &str) -> Option<Service> {
        let key = (namespace.to_string(), name.to_string());
        let mut inner = self.inner.write().await;
        let removed = inner.services.remove(&key)?;
        inner.record(&self.sender, ResourceKind::Service, EventType::Delete, key);
        Some(removed)
    }

    /// Get the current sequence number.
    pub async fn current_seq(&self) -> u64 {
        self.inner.read().await.seq
    }

    /// Forward broadcast events accepted by `admit` into a new watch until
    /// `stop` fires or the watch's receiver goes away.
    fn forward<F>(&self, mut stop: StopSignal, admit: F) -> Watch
    where
        F: Fn(&WatchEvent) -> bool + Send + 'static,
    {
        let mut rx = self.sender.subscribe();
        let (tx, watch) = watch_channel(WATCH_EVENT_BUFFER);
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    biased;
                    _ = stop.stopped() => break,
                    result = rx.recv() => match result {
                        Ok(event) => {
                            if admit(&event) && tx.events.send(event).await.is_err() {
                                break;
                            }
                        }
                        Err(RecvError::Lagged(missed)) => {
                            warn!("Watch lagged behind by {} events", missed);
                            let err = anyhow!("watch lagged behind by {} events", missed);
                            if tx.errors.send(err).await.is_err() {
                                break;
                            }
                        }
                        Err(RecvError::Closed) => break,
                    },
                }
            }
            debug!("Watch closed");
        });
        watch
    }
}

impl Default for MemoryClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ResourceClient for MemoryClient {
    async fn list_ingresses(&self, filter: &NamespaceFilter) -> anyhow::Result<Vec<Ingress>> {
        let inner = self.inner.read().await;
        Ok(inner
            .ingresses
            .values()
            .filter(|i| filter.admits(*i))
            .cloned()
            .collect())
    }

    async fn list_services(&self, filter: &NamespaceFilter) -> anyhow::Result<Vec<Service>> {
        let inner = self.inner.read().await;
        Ok(inner
            .services
            .values()
            .filter(|s| filter.admits(*s))
            .cloned()
            .collect())
    }

    async fn watch_ingresses(
        &self,
        filter: &NamespaceFilter,
        stop: StopSignal,
    ) -> anyhow::Result<Watch> {
        let filter = filter.clone();
        Ok(self.forward(stop, move |event| {
            event.kind == ResourceKind::Ingress && filter.admits_namespace(&event.namespace)
        }))
    }

    async fn watch_all(&self, stop: StopSignal) -> anyhow::Result<Watch> {
        Ok(self.forward(stop, |_| true))
    }
}
