use anyhow::{Result, bail};

/// Longest namespace name the orchestrator accepts (DNS-1123 label).
const MAX_NAMESPACE_LEN: usize = 63;

/// Check that `namespace` is a DNS-1123 label: lowercase alphanumerics and
/// `-`, starting and ending with an alphanumeric.
pub fn validate_namespace(namespace: &str) -> Result<()> {
    let Some(first) = namespace.chars().next() else {
        bail!("namespace must not be empty");
    };
    if namespace.len() > MAX_NAMESPACE_LEN {
        bail!(
            "namespace '{}' is longer than {} characters",
            namespace,
            MAX_NAMESPACE_LEN
        );
    }
    let alnum = |c: char| c.is_ascii_lowercase() || c.is_ascii_digit();
    if let Some(bad) = namespace.chars().find(|&c| !alnum(c) && c != '-') {
        bail!("namespace '{}' contains invalid character '{}'", namespace, bad);
    }
    if !alnum(first) || !namespace.ends_with(alnum) {
        bail!(
            "namespace '{}' must start and end with a letter or digit",
            namespace
        );
    }
    Ok(())
}
