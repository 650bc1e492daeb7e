use thiserror::Error;

use crate::client::ResourceKind;

/// Errors surfaced on the provider's error-reporting channel.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// Listing failed during a pass; no snapshot was published for it.
    #[error("failed to list {kind}: {source}")]
    List {
        kind: ResourceKind,
        #[source]
        source: anyhow::Error,
    },

    /// The watch transport reported an error; the loop keeps running.
    #[error("{stream} watch error: {source}")]
    Watch {
        stream: &'static str,
        #[source]
        source: anyhow::Error,
    },

    #[error("failed to establish {stream} watch: {source}")]
    WatchEstablish {
        stream: &'static str,
        #[source]
        source: anyhow::Error,
    },

    #[error("all watch streams closed")]
    WatchClosed,
}
