use clap::Parser;
use pkg_constants::provider::DEFAULT_SNAPSHOT_BUFFER;
use pkg_provider::client::stop_signal;
use pkg_provider::{MemoryClient, Provider, ProviderSettings, ProviderState};
use pkg_types::config::{ProviderConfigFile, load_config_file};
use pkg_types::ingress::Ingress;
use pkg_types::service::Service;
use serde::Deserialize;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(
    name = "kubeway-dev",
    about = "Run the ingress provider against in-memory resources and print every snapshot"
)]
struct Cli {
    /// Path to YAML provider config file
    #[arg(long, short, default_value = "/etc/kubeway/provider.yaml")]
    config: String,

    /// YAML file with `ingresses:` and `services:` lists to apply
    #[arg(long, short)]
    resources: Option<String>,

    /// Namespace to watch (repeatable, overrides the config file)
    #[arg(long = "namespace", short = 'n')]
    namespaces: Vec<String>,

    /// Do not preserve the Host header when proxying
    #[arg(long)]
    disable_pass_host_headers: bool,
}

/// Resources applied to the in-memory client at startup.
#[derive(Debug, Default, Deserialize)]
struct ResourceManifest {
    #[serde(default)]
    ingresses: Vec<Ingress>,
    #[serde(default)]
    services: Vec<Service>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();
    let cli = Cli::parse();

    // Load config file (returns defaults if file not found)
    let mut file_cfg: ProviderConfigFile = load_config_file(&cli.config)?;
    info!("Config file: {}", cli.config);

    // Merge: CLI args > config file > defaults
    if !cli.namespaces.is_empty() {
        file_cfg.namespaces = cli.namespaces.clone();
    }
    if cli.disable_pass_host_headers {
        file_cfg.disable_pass_host_headers = true;
    }
    let settings = ProviderSettings::from_config(&file_cfg)?;
    let buffer = file_cfg.snapshot_buffer.unwrap_or(DEFAULT_SNAPSHOT_BUFFER);

    if file_cfg.namespaces.is_empty() {
        info!("  Namespaces:        all");
    } else {
        info!("  Namespaces:        {}", file_cfg.namespaces.join(", "));
    }
    info!(
        "  Pass host headers: {}",
        !file_cfg.disable_pass_host_headers
    );

    let client = Arc::new(MemoryClient::new());
    let provider = Provider::new(client.clone(), settings);
    let mut state = provider.subscribe_state();

    let (config_tx, mut config_rx) = mpsc::channel(buffer);
    let (err_tx, mut err_rx) = mpsc::unbounded_channel();
    let (stop, signal) = stop_signal();
    let mut provider_handle = tokio::spawn(provider.run(config_tx, err_tx, signal));

    state.wait_for(|s| *s != ProviderState::Idle).await?;

    if let Some(path) = &cli.resources {
        let manifest: ResourceManifest = serde_yaml::from_str(&std::fs::read_to_string(path)?)?;
        info!(
            "Applying {} services and {} ingresses from {}",
            manifest.services.len(),
            manifest.ingresses.len(),
            path
        );
        for service in manifest.services {
            client.apply_service(service).await;
        }
        for ingress in manifest.ingresses {
            client.apply_ingress(ingress).await;
        }
    }

    let result = loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Received Ctrl-C, stopping provider");
                stop.stop();
                break provider_handle.await?;
            }
            joined = &mut provider_handle => break joined?,
            Some(config) = config_rx.recv() => {
                println!("{}", serde_json::to_string_pretty(&config)?);
            }
            Some(err) = err_rx.recv() => warn!("Provider error: {}", err),
        }
    };
    result?;

    Ok(())
}
