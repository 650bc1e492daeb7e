//! Kubernetes ingress provider: translates ingress and service resources into
//! whole routing [`Configuration`](pkg_types::configuration::Configuration)
//! snapshots and keeps publishing them as the cluster changes.
//!
//! ```text
//! ResourceClient ──list/watch──▶ Provider ──build──▶ ConfigurationBuilder
//!                                    │
//!                                    └──snapshots──▶ mpsc::Sender<Configuration>
//! ```

pub mod builder;
pub mod client;
pub mod error;
pub mod memory;
pub mod provider;
pub mod resolver;
pub mod rule_type;

pub use builder::ConfigurationBuilder;
pub use client::{NamespaceFilter, ResourceClient, StopHandle, StopSignal};
pub use error::ProviderError;
pub use memory::MemoryClient;
pub use provider::{Provider, ProviderSettings, ProviderState};
