//! Network-related constants.

/// Service port number that selects the `https` scheme for a server URL.
pub const HTTPS_PORT: u16 = 443;

pub const SCHEME_HTTP: &str = "http";
pub const SCHEME_HTTPS: &str = "https";

/// Weight given to every server produced from a service.
pub const DEFAULT_SERVER_WEIGHT: u32 = 1;
