use anyhow::{Result, bail};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::validate::validate_namespace;

/// Provider configuration file (YAML).
///
/// Example `provider.yaml`:
/// ```yaml
/// namespaces: [awesome, somewhat-awesome]
/// disable-pass-host-headers: false
/// snapshot-buffer: 16
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProviderConfigFile {
    /// Namespaces whose resources are visible. Empty means all namespaces.
    #[serde(default)]
    pub namespaces: Vec<String>,
    #[serde(default, alias = "disable-pass-host-headers")]
    pub disable_pass_host_headers: bool,
    #[serde(default, alias = "snapshot-buffer")]
    pub snapshot_buffer: Option<usize>,
}

impl ProviderConfigFile {
    pub fn validate(&self) -> Result<()> {
        let mut seen = HashSet::new();
        for namespace in &self.namespaces {
            validate_namespace(namespace)?;
            if !seen.insert(namespace.as_str()) {
                bail!("namespace '{}' listed more than once", namespace);
            }
        }
        if self.snapshot_buffer == Some(0) {
            bail!("snapshot-buffer must be at least 1");
        }
        Ok(())
    }
}

/// Load a YAML config file, returning the default if the file doesn't exist.
pub fn load_config_file<T: serde::de::DeserializeOwned + Default>(path: &str) -> Result<T> {
    let content = match std::fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Ok(T::default());
        }
        Err(e) => return Err(e.into()),
    };
    let config: T = serde_yaml::from_str(&content)?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_yields_default() {
        let config: ProviderConfigFile =
            load_config_file("/nonexistent/kubeway/provider.yaml").unwrap();
        assert!(config.namespaces.is_empty());
        assert!(!config.disable_pass_host_headers);
        assert_eq!(config.snapshot_buffer, None);
    }

    #[test]
    fn parses_kebab_case_keys() {
        let yaml = "namespaces: [awesome]\ndisable-pass-host-headers: true\nsnapshot-buffer: 4\n";
        let config: ProviderConfigFile = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.namespaces, vec!["awesome".to_string()]);
        assert!(config.disable_pass_host_headers);
        assert_eq!(config.snapshot_buffer, Some(4));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn rejects_bad_namespaces_and_buffer() {
        let bad_name = ProviderConfigFile {
            namespaces: vec!["Not_Valid".to_string()],
            ..Default::default()
        };
        assert!(bad_name.validate().is_err());

        let duplicate = ProviderConfigFile {
            namespaces: vec!["awesome".to_string(), "awesome".to_string()],
            ..Default::default()
        };
        assert!(duplicate.validate().is_err());

        let zero_buffer = ProviderConfigFile {
            snapshot_buffer: Some(0),
            ..Default::default()
        };
        assert!(zero_buffer.validate().is_err());
    }
}
