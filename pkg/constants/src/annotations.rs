//! Ingress annotation keys and their recognized values.

/// Per-ingress annotation selecting the path-matching rule kind.
/// Applies to every path of the annotated ingress.
pub const RULE_TYPE: &str = "traefik.frontend.rule.type";

pub const RULE_TYPE_PATH: &str = "Path";
pub const RULE_TYPE_PATH_STRIP: &str = "PathStrip";
pub const RULE_TYPE_PATH_PREFIX: &str = "PathPrefix";
pub const RULE_TYPE_PATH_PREFIX_STRIP: &str = "PathPrefixStrip";

/// Rule kind used for host matching.
pub const RULE_TYPE_HOST: &str = "Host";
