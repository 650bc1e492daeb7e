//! Reconciliation loop constants.

/// Name the provider identifies itself with in logs.
pub const PROVIDER_NAME: &str = "kubernetes";

/// Default capacity of the channel carrying published configurations.
pub const DEFAULT_SNAPSHOT_BUFFER: usize = 16;

/// Capacity of the per-watch event channel.
pub const WATCH_EVENT_BUFFER: usize = 64;

/// Capacity of the broadcast log backing the in-memory resource client.
pub const EVENT_LOG_CAPACITY: usize = 1024;
