use pkg_constants::provider::PROVIDER_NAME;
use pkg_types::config::ProviderConfigFile;
use pkg_types::configuration::Configuration;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio_stream::StreamExt;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, error, info, warn};

use crate::builder::ConfigurationBuilder;
use crate::client::{NamespaceFilter, ResourceClient, ResourceKind, StopSignal, stop_signal};
use crate::error::ProviderError;

/// Lifecycle of a [`Provider`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderState {
    Idle,
    Watching,
    Stopped,
}

/// Runtime settings of a [`Provider`].
#[derive(Debug, Clone, Default)]
pub struct ProviderSettings {
    pub filter: NamespaceFilter,
    pub disable_pass_host_headers: bool,
}

impl ProviderSettings {
    pub fn from_config(config: &ProviderConfigFile) -> anyhow::Result<Self> {
        config.validate()?;
        Ok(Self {
            filter: NamespaceFilter::new(config.namespaces.iter().cloned()),
            disable_pass_host_headers: config.disable_pass_host_headers,
        })
    }
}

/// Watches ingresses and services and publishes a fresh [`Configuration`]
/// for every change observed.
pub struct Provider<C> {
    client: Arc<C>,
    filter: NamespaceFilter,
    builder: ConfigurationBuilder,
    state: watch::Sender<ProviderState>,
}

impl<C: ResourceClient> Provider<C> {
    pub fn new(client: Arc<C>, settings: ProviderSettings) -> Self {
        let (state, _) = watch::channel(ProviderState::Idle);
        Self {
            client,
            filter: settings.filter,
            builder: ConfigurationBuilder::new(settings.disable_pass_host_headers),
            state,
        }
    }

    pub fn state(&self) -> ProviderState {
        *self.state.borrow()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<ProviderState> {
        self.state.subscribe()
    }

    /// One pass: list everything visible and build a snapshot from it.
    pub async fn load_configuration(&self) -> Result<Configuration, ProviderError> {
        let ingresses = self
            .client
            .list_ingresses(&self.filter)
            .await
            .map_err(|source| ProviderError::List {
                kind: ResourceKind::Ingress,
                source,
            })?;
        let services = self
            .client
            .list_services(&self.filter)
            .await
            .map_err(|source| ProviderError::List {
                kind: ResourceKind::Service,
                source,
            })?;
        Ok(self.builder.build(&ingresses, &services))
    }

    /// Run the reconciliation loop until `stop` fires.
    ///
    /// Every ingress or service event triggers a full rebuild which is sent
    /// on `configurations`, waiting for the consumer if it is behind. Watch
    /// errors and failed passes go to `errors`; the loop keeps going. It
    /// returns an error only when the watches cannot be established or all
    /// of them end, leaving a restart to the caller.
    pub async fn run(
        self,
        configurations: mpsc::Sender<Configuration>,
        errors: mpsc::UnboundedSender<ProviderError>,
        mut stop: StopSignal,
    ) -> Result<(), ProviderError> {
        info!("Starting {} provider", PROVIDER_NAME);
        if stop.is_stopped() {
            self.state.send_replace(ProviderState::Stopped);
            return Ok(());
        }

        // Closes the client-side watches once the loop exits.
        let (watch_stop, watch_signal) = stop_signal();
        let result = self
            .watch_loop(&configurations, &errors, &mut stop, watch_signal)
            .await;

        watch_stop.stop();
        self.state.send_replace(ProviderState::Stopped);
        match &result {
            Ok(()) => info!("{} provider stopped", PROVIDER_NAME),
            Err(e) => error!("{} provider stopped: {}", PROVIDER_NAME, e),
        }
        result
    }

    async fn watch_loop(
        &self,
        configurations: &mpsc::Sender<Configuration>,
        errors: &mpsc::UnboundedSender<ProviderError>,
        stop: &mut StopSignal,
        watch_signal: StopSignal,
    ) -> Result<(), ProviderError> {
        let ingress_watch = self
            .client
            .watch_ingresses(&self.filter, watch_signal.clone())
            .await
            .map_err(|source| ProviderError::WatchEstablish {
                stream: "ingress",
                source,
            })?;
        let all_watch = self
            .client
            .watch_all(watch_signal)
            .await
            .map_err(|source| ProviderError::WatchEstablish {
                stream: "resource",
                source,
            })?;

        let mut events =
            ReceiverStream::new(ingress_watch.events).merge(ReceiverStream::new(all_watch.events));
        let mut watch_errors = ReceiverStream::new(ingress_watch.errors)
            .map(|source| ("ingress", source))
            .merge(ReceiverStream::new(all_watch.errors).map(|source| ("resource", source)));

        self.state.send_replace(ProviderState::Watching);
        info!("{} provider watching for changes", PROVIDER_NAME);

        loop {
            let event = tokio::select! {
                biased;
                _ = stop.stopped() => return Ok(()),
                Some((stream, source)) = watch_errors.next() => {
                    let err = ProviderError::Watch { stream, source };
                    error!("{}", err);
                    let _ = errors.send(err);
                    continue;
                }
                event = events.next() => match event {
                    Some(event) => event,
                    None => return Err(ProviderError::WatchClosed),
                },
            };
            debug!(
                "Received {:?} for {} {}/{} (seq {})",
                event.event_type, event.kind, event.namespace, event.name, event.seq
            );

            let config = tokio::select! {
                biased;
                _ = stop.stopped() => return Ok(()),
                result = self.load_configuration() => match result {
                    Ok(config) => config,
                    Err(err) => {
                        warn!("Skipping reconciliation pass: {}", err);
                        let _ = errors.send(err);
                        continue;
                    }
                },
            };

            info!(
                "Publishing configuration: {} backends, {} frontends",
                config.backends.len(),
                config.frontends.len()
            );
            tokio::select! {
                biased;
                _ = stop.stopped() => return Ok(()),
                sent = configurations.send(config) => {
                    if sent.is_err() {
                        warn!("Configuration receiver dropped, stopping provider");
                        return Ok(());
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::{EventType, Watch, WatchEvent, WatchSender, watch_channel};
    use crate::memory::MemoryClient;
    use async_trait::async_trait;
    use pkg_types::ingress::{
        Ingress, IngressBackend, IngressHttp, IngressPath, IngressRule, IngressSpec,
    };
    use pkg_types::meta::ObjectMeta;
    use pkg_types::service::{Service, ServicePort, ServiceSpec};
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;
    use tokio::time::timeout;

    const WAIT: Duration = Duration::from_secs(2);

    fn make_ingress(namespace: &str, host: &str, path: &str, service: &str) -> Ingress {
        Ingress {
            metadata: ObjectMeta {
                name: format!("{}-ingress", host),
                namespace: namespace.to_string(),
                uid: format!("{}-{}", namespace, host),
                ..Default::default()
            },
            spec: IngressSpec {
                rules: vec![IngressRule {
                    host: host.to_string(),
                    http: Some(IngressHttp {
                        paths: vec![IngressPath {
                            path: path.to_string(),
                            backend: IngressBackend {
                                service_name: service.to_string(),
                                service_port: "http".into(),
                            },
                        }],
                    }),
                }],
            },
        }
    }

    fn make_service(namespace: &str, name: &str, uid: &str, ip: &str) -> Service {
        Service {
            metadata: ObjectMeta {
                name: name.to_string(),
                namespace: namespace.to_string(),
                uid: uid.to_string(),
                ..Default::default()
            },
            spec: ServiceSpec {
                cluster_ip: Some(ip.to_string()),
                ports: vec![ServicePort {
                    name: "http".to_string(),
                    port: 80,
                }],
            },
        }
    }

    fn event(seq: u64) -> WatchEvent {
        WatchEvent {
            seq,
            kind: ResourceKind::Service,
            event_type: EventType::Put,
            namespace: "awesome".to_string(),
            name: "service1".to_string(),
        }
    }

    /// Client whose watches are driven by the test and whose listing can be
    /// made to fail.
    struct ScriptedClient {
        ingresses: Vec<Ingress>,
        services: Vec<Service>,
        fail_lists: AtomicBool,
        fail_watch: bool,
        ingress_watch: Mutex<Option<Watch>>,
        all_watch: Mutex<Option<Watch>>,
    }

    impl ScriptedClient {
        fn new() -> (Self, WatchSender, WatchSender) {
            let (ingress_tx, ingress_watch) = watch_channel(8);
            let (all_tx, all_watch) = watch_channel(8);
            let client = Self {
                ingresses: vec![make_ingress("awesome", "foo", "/bar", "service1")],
                services: vec![make_service("awesome", "service1", "1", "10.0.0.1")],
                fail_lists: AtomicBool::new(false),
                fail_watch: false,
                ingress_watch: Mutex::new(Some(ingress_watch)),
                all_watch: Mutex::new(Some(all_watch)),
            };
            (client, ingress_tx, all_tx)
        }
    }

    #[async_trait]
    impl ResourceClient for ScriptedClient {
        async fn list_ingresses(&self, filter: &NamespaceFilter) -> anyhow::Result<Vec<Ingress>> {
            Ok(self
                .ingresses
                .iter()
                .filter(|i| filter.admits(*i))
                .cloned()
                .collect())
        }

        async fn list_services(&self, filter: &NamespaceFilter) -> anyhow::Result<Vec<Service>> {
            if self.fail_lists.load(Ordering::SeqCst) {
                anyhow::bail!("api server unavailable");
            }
            Ok(self
                .services
                .iter()
                .filter(|s| filter.admits(*s))
                .cloned()
                .collect())
        }

        async fn watch_ingresses(
            &self,
            _filter: &NamespaceFilter,
            _stop: StopSignal,
        ) -> anyhow::Result<Watch> {
            self.ingress_watch
                .lock()
                .unwrap()
                .take()
                .ok_or_else(|| anyhow::anyhow!("ingress watch already taken"))
        }

        async fn watch_all(&self, _stop: StopSignal) -> anyhow::Result<Watch> {
            if self.fail_watch {
                anyhow::bail!("watch refused");
            }
            self.all_watch
                .lock()
                .unwrap()
                .take()
                .ok_or_else(|| anyhow::anyhow!("watch already taken"))
        }
    }

    #[tokio::test]
    async fn test_publishes_snapshot_for_every_event() {
        let client = Arc::new(MemoryClient::new());
        let provider = Provider::new(client.clone(), ProviderSettings::default());
        let mut state = provider.subscribe_state();
        assert_eq!(provider.state(), ProviderState::Idle);

        let (config_tx, mut config_rx) = mpsc::channel(8);
        let (err_tx, _err_rx) = mpsc::unbounded_channel();
        let (stop, signal) = stop_signal();
        let handle = tokio::spawn(provider.run(config_tx, err_tx, signal));

        timeout(WAIT, state.wait_for(|s| *s == ProviderState::Watching))
            .await
            .unwrap()
            .unwrap();

        client
            .apply_service(make_service("", "service1", "1", "10.0.0.1"))
            .await;
        client
            .apply_ingress(make_ingress("", "foo", "/bar", "service1"))
            .await;

        // One pass for the service event, two for the ingress event seen by
        // both watches.
        let mut published = Vec::new();
        for _ in 0..3 {
            published.push(timeout(WAIT, config_rx.recv()).await.unwrap().unwrap());
        }
        let last = &published[2];
        assert_eq!(
            last.backends["foo/bar"].servers["1"].url,
            "http://10.0.0.1:80"
        );
        assert_eq!(last.frontends["foo/bar"].routes.len(), 2);

        stop.stop();
        assert!(timeout(WAIT, handle).await.unwrap().unwrap().is_ok());
        assert_eq!(*state.borrow(), ProviderState::Stopped);
        assert!(config_rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_deletes_drop_backends_from_next_snapshot() {
        let client = Arc::new(MemoryClient::new());
        client
            .apply_service(make_service("awesome", "service1", "1", "10.0.0.1"))
            .await;
        client
            .apply_service(make_service("awesome", "service2", "2", "10.0.0.2"))
            .await;
        client
            .apply_ingress(make_ingress("awesome", "foo", "/bar", "service1"))
            .await;
        client
            .apply_ingress(make_ingress("awesome", "baz", "/qux", "service2"))
            .await;

        let provider = Provider::new(client.clone(), ProviderSettings::default());
        let mut state = provider.subscribe_state();
        let (config_tx, mut config_rx) = mpsc::channel(8);
        let (err_tx, _err_rx) = mpsc::unbounded_channel();
        let (stop, signal) = stop_signal();
        let handle = tokio::spawn(provider.run(config_tx, err_tx, signal));
        timeout(WAIT, state.wait_for(|s| *s == ProviderState::Watching))
            .await
            .unwrap()
            .unwrap();

        // Service events reach only the whole-resource watch: one pass each.
        client.delete_service("awesome", "service1").await;
        let config = timeout(WAIT, config_rx.recv()).await.unwrap().unwrap();
        assert_eq!(config.backends.keys().collect::<Vec<_>>(), vec!["baz/qux"]);

        // Ingress events reach both watches: two passes.
        assert!(client.delete_ingress("awesome", "baz-ingress").await.is_some());
        for _ in 0..2 {
            let config = timeout(WAIT, config_rx.recv()).await.unwrap().unwrap();
            assert!(config.backends.is_empty());
            assert!(config.frontends.is_empty());
        }

        stop.stop();
        assert!(timeout(WAIT, handle).await.unwrap().unwrap().is_ok());
    }

    #[tokio::test]
    async fn test_namespace_allow_list_is_applied() {
        let client = Arc::new(MemoryClient::new());
        client
            .apply_service(make_service("awesome", "service1", "1", "10.0.0.1"))
            .await;
        client
            .apply_service(make_service("not-awesome", "service1", "2", "10.0.0.2"))
            .await;
        client
            .apply_ingress(make_ingress("awesome", "foo", "/bar", "service1"))
            .await;
        client
            .apply_ingress(make_ingress("not-awesome", "baz", "/baz", "service1"))
            .await;

        let settings = ProviderSettings::from_config(&ProviderConfigFile {
            namespaces: vec!["awesome".to_string()],
            disable_pass_host_headers: true,
            snapshot_buffer: None,
        })
        .unwrap();
        let provider = Provider::new(client, settings);

        let config = provider.load_configuration().await.unwrap();
        assert_eq!(config.backends.keys().collect::<Vec<_>>(), vec!["foo/bar"]);
        assert_eq!(config.backends["foo/bar"].servers["1"].url, "http://10.0.0.1:80");
        assert!(!config.frontends["foo/bar"].pass_host_header);
    }

    #[tokio::test]
    async fn test_list_failure_skips_pass_and_reports() {
        let (client, _ingress_tx, all_tx) = ScriptedClient::new();
        let client = Arc::new(client);
        let provider = Provider::new(client.clone(), ProviderSettings::default());

        let (config_tx, mut config_rx) = mpsc::channel(8);
        let (err_tx, mut err_rx) = mpsc::unbounded_channel();
        let (stop, signal) = stop_signal();
        let handle = tokio::spawn(provider.run(config_tx, err_tx, signal));

        client.fail_lists.store(true, Ordering::SeqCst);
        all_tx.events.send(event(1)).await.unwrap();
        let err = timeout(WAIT, err_rx.recv()).await.unwrap().unwrap();
        assert!(matches!(
            err,
            ProviderError::List {
                kind: ResourceKind::Service,
                ..
            }
        ));
        assert!(config_rx.try_recv().is_err());

        client.fail_lists.store(false, Ordering::SeqCst);
        all_tx.events.send(event(2)).await.unwrap();
        let config = timeout(WAIT, config_rx.recv()).await.unwrap().unwrap();
        assert!(config.backends.contains_key("foo/bar"));

        stop.stop();
        assert!(timeout(WAIT, handle).await.unwrap().unwrap().is_ok());
    }

    #[tokio::test]
    async fn test_watch_errors_are_reported_without_stopping() {
        let (client, ingress_tx, _all_tx) = ScriptedClient::new();
        let provider = Provider::new(Arc::new(client), ProviderSettings::default());
        let state = provider.subscribe_state();

        let (config_tx, mut config_rx) = mpsc::channel(8);
        let (err_tx, mut err_rx) = mpsc::unbounded_channel();
        let (stop, signal) = stop_signal();
        let handle = tokio::spawn(provider.run(config_tx, err_tx, signal));

        ingress_tx
            .errors
            .send(anyhow::anyhow!("connection reset"))
            .await
            .unwrap();
        let err = timeout(WAIT, err_rx.recv()).await.unwrap().unwrap();
        assert!(matches!(err, ProviderError::Watch { stream: "ingress", .. }));
        assert_eq!(*state.borrow(), ProviderState::Watching);

        ingress_tx.events.send(event(1)).await.unwrap();
        assert!(timeout(WAIT, config_rx.recv()).await.unwrap().is_some());

        stop.stop();
        assert!(timeout(WAIT, handle).await.unwrap().unwrap().is_ok());
    }

    #[tokio::test]
    async fn test_stop_while_consumer_is_full_publishes_nothing_more() {
        let (client, ingress_tx, _all_tx) = ScriptedClient::new();
        let provider = Provider::new(Arc::new(client), ProviderSettings::default());

        let (config_tx, mut config_rx) = mpsc::channel(1);
        let (err_tx, _err_rx) = mpsc::unbounded_channel();
        let (stop, signal) = stop_signal();
        let handle = tokio::spawn(provider.run(config_tx, err_tx, signal));

        ingress_tx.events.send(event(1)).await.unwrap();
        ingress_tx.events.send(event(2)).await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        stop.stop();
        assert!(timeout(WAIT, handle).await.unwrap().unwrap().is_ok());
        assert!(config_rx.recv().await.is_some());
        assert!(config_rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_closed_watches_end_the_loop() {
        let (client, ingress_tx, all_tx) = ScriptedClient::new();
        let provider = Provider::new(Arc::new(client), ProviderSettings::default());
        let state = provider.subscribe_state();

        let (config_tx, _config_rx) = mpsc::channel(8);
        let (err_tx, _err_rx) = mpsc::unbounded_channel();
        let (_stop, signal) = stop_signal();
        let handle = tokio::spawn(provider.run(config_tx, err_tx, signal));

        drop(ingress_tx);
        drop(all_tx);
        let result = timeout(WAIT, handle).await.unwrap().unwrap();
        assert!(matches!(result, Err(ProviderError::WatchClosed)));
        assert_eq!(*state.borrow(), ProviderState::Stopped);
    }

    #[tokio::test]
    async fn test_watch_establish_failure_is_returned() {
        let (mut client, _ingress_tx, _all_tx) = ScriptedClient::new();
        client.fail_watch = true;
        let provider = Provider::new(Arc::new(client), ProviderSettings::default());
        let state = provider.subscribe_state();

        let (config_tx, _config_rx) = mpsc::channel(8);
        let (err_tx, _err_rx) = mpsc::unbounded_channel();
        let (_stop, signal) = stop_signal();

        let result = provider.run(config_tx, err_tx, signal).await;
        assert!(matches!(
            result,
            Err(ProviderError::WatchEstablish {
                stream: "resource",
                ..
            })
        ));
        assert_eq!(*state.borrow(), ProviderState::Stopped);
    }

    #[tokio::test]
    async fn test_already_stopped_signal_never_watches() {
        let client = Arc::new(MemoryClient::new());
        let provider = Provider::new(client, ProviderSettings::default());
        let state = provider.subscribe_state();

        let (config_tx, mut config_rx) = mpsc::channel(8);
        let (err_tx, _err_rx) = mpsc::unbounded_channel();
        let (stop, signal) = stop_signal();
        stop.stop();

        assert!(provider.run(config_tx, err_tx, signal).await.is_ok());
        assert_eq!(*state.borrow(), ProviderState::Stopped);
        assert!(config_rx.recv().await.is_none());
    }

    #[test]
    fn test_settings_reject_invalid_namespaces() {
        let config = ProviderConfigFile {
            namespaces: vec!["Not Valid".to_string()],
            ..Default::default()
        };
        assert!(ProviderSettings::from_config(&config).is_err());
    }
}
