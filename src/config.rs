//! Configuration Management
//!
//! Handles persistent defaults for aery.

use crate::arm::CredentialKind;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Default seconds between status polls
pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 1;

/// User configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Config {
    /// Default subscription ID
    #[serde(default)]
    pub subscription_id: Option<String>,
    /// Default resource group for single-file applies
    #[serde(default)]
    pub resource_group: Option<String>,
    /// Control-plane endpoint for sovereign clouds
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(default)]
    pub poll_interval_secs: Option<u64>,
    /// Resources applied at once
    #[serde(default)]
    pub max_parallel: Option<usize>,
    #[serde(default)]
    pub credential: Option<CredentialKind>,
}

impl Config {
    /// Get the config file path
    pub fn config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("aery").join("config.json"))
    }

    /// Load configuration from disk
    pub fn load() -> Self {
        let Some(path) = Self::config_path() else {
            return Self::default();
        };
        Self::load_from(&path)
    }

    /// Load configuration from `path`; a missing or unreadable file yields defaults
    pub fn load_from(path: &Path) -> Self {
        if !path.exists() {
            return Self::default();
        }

        match std::fs::read_to_string(path) {
            Ok(content) => serde_json::from_str(&content).unwrap_or_else(|e| {
                tracing::warn!("Ignoring malformed config {}: {}", path.display(), e);
                Self::default()
            }),
            Err(_) => Self::default(),
        }
    }

    /// Save configuration to disk
    pub fn save(&self) -> Result<()> {
        let Some(path) = Self::config_path() else {
            return Ok(());
        };
        self.save_to(&path)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }

        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)
            .with_context(|| format!("Failed to write {}", path.display()))?;

        Ok(())
    }

    /// Record the scope of a run as the new defaults; `None` keeps what is stored.
    /// The public-cloud endpoint is stored as no endpoint at all.
    pub fn remember(
        &mut self,
        subscription_id: Option<&str>,
        resource_group: Option<&str>,
        endpoint: &str,
    ) {
        if let Some(subscription_id) = subscription_id {
            self.subscription_id = Some(subscription_id.to_string());
        }
        if let Some(resource_group) = resource_group {
            self.resource_group = Some(resource_group.to_string());
        }
        self.endpoint =
            (endpoint != crate::arm::client::DEFAULT_ENDPOINT).then(|| endpoint.to_string());
    }

    /// Get effective subscription (CLI > config > environment > az default)
    pub fn effective_subscription(&self, cli: Option<&str>) -> Option<String> {
        cli.map(str::to_string)
            .or_else(|| self.subscription_id.clone())
            .or_else(crate::arm::auth::get_default_subscription)
    }

    /// Get effective resource group (CLI > config)
    pub fn effective_resource_group(&self, cli: Option<&str>) -> Option<String> {
        cli.map(str::to_string)
            .or_else(|| self.resource_group.clone())
    }

    /// Get effective endpoint (CLI > config > public cloud)
    pub fn effective_endpoint(&self, cli: Option<&str>) -> String {
        cli.map(str::to_string)
            .or_else(|| self.endpoint.clone())
            .unwrap_or_else(|| crate::arm::client::DEFAULT_ENDPOINT.to_string())
    }

    pub fn effective_poll_interval(&self, cli: Option<u64>) -> u64 {
        cli.or(self.poll_interval_secs)
            .unwrap_or(DEFAULT_POLL_INTERVAL_SECS)
    }

    pub fn effective_max_parallel(&self, cli: Option<usize>) -> usize {
        cli.or(self.max_parallel).unwrap_or(1).max(1)
    }

    pub fn effective_credential(&self, cli: Option<CredentialKind>) -> CredentialKind {
        cli.or(self.credential).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_missing_file_yields_defaults() {
        let dir = TempDir::new().unwrap();
        assert_eq!(Config::load_from(&dir.path().join("none.json")), Config::default());
    }

    #[test]
    fn test_round_trip_through_disk() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("config.json");
        let config = Config {
            subscription_id: Some("sub".to_string()),
            max_parallel: Some(4),
            credential: Some(CredentialKind::Az),
            ..Default::default()
        };
        config.save_to(&path).unwrap();
        assert_eq!(Config::load_from(&path), config);
        let raw = std::fs::read_to_string(&path).unwrap();
        assert!(raw.contains("\"credential\": \"az\""));
    }

    #[test]
    fn test_remembered_defaults_survive_a_reload() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.json");
        let mut config = Config {
            resource_group: Some("old-rg".to_string()),
            max_parallel: Some(3),
            ..Default::default()
        };

        config.remember(Some("sub-2"), None, "https://management.usgovcloudapi.net");
        config.save_to(&path).unwrap();
        let loaded = Config::load_from(&path);
        assert_eq!(loaded.subscription_id.as_deref(), Some("sub-2"));
        assert_eq!(loaded.resource_group.as_deref(), Some("old-rg"));
        assert_eq!(
            loaded.effective_endpoint(None),
            "https://management.usgovcloudapi.net"
        );
        assert_eq!(loaded.max_parallel, Some(3));

        let mut public = loaded;
        public.remember(None, Some("rg-demo"), crate::arm::client::DEFAULT_ENDPOINT);
        assert_eq!(public.endpoint, None);
        assert_eq!(public.resource_group.as_deref(), Some("rg-demo"));
    }

    #[test]
    fn test_malformed_file_yields_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, "{not json").unwrap();
        assert_eq!(Config::load_from(&path), Config::default());
    }

    #[test]
    fn test_cli_overrides_config() {
        let config = Config {
            resource_group: Some("from-config".to_string()),
            endpoint: Some("https://config.example".to_string()),
            poll_interval_secs: Some(5),
            max_parallel: Some(0),
            ..Default::default()
        };
        assert_eq!(
            config.effective_resource_group(Some("from-cli")).as_deref(),
            Some("from-cli")
        );
        assert_eq!(
            config.effective_resource_group(None).as_deref(),
            Some("from-config")
        );
        assert_eq!(config.effective_endpoint(None), "https://config.example");
        assert_eq!(config.effective_poll_interval(None), 5);
        assert_eq!(config.effective_poll_interval(Some(2)), 2);
        assert_eq!(config.effective_max_parallel(None), 1);
        assert_eq!(config.effective_credential(None), CredentialKind::Azd);
    }
}
