//! Configuration loading and management for the sell host.
//!
//! The configuration is stored in TOML format and defines:
//! - Host settings (marketplace URL, server port, credentials file, compose file)
//! - Earnings store settings (SQLite path)
//! - The service manifest: names, ordering, display names and wallet seeds

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::services::Service;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Invalid config: {0}")]
    ValidationError(String),
}

/// Host settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HostConfig {
    /// Name of this host, used as the compose project name.
    #[serde(default = "default_host_name")]
    pub name: String,

    /// Base URL of the marketplace REST API.
    #[serde(default = "default_marketplace_url")]
    pub marketplace_url: String,

    /// Port the router exposes services on.
    #[serde(default = "default_server_port")]
    pub server_port: u16,

    /// Fixed marketplace network address. When unset the address is read from
    /// the mesh network client at publish time.
    #[serde(default)]
    pub market_address: Option<String>,

    /// Path to the credentials file holding the marketplace username.
    #[serde(default = "default_credentials_path")]
    pub credentials_path: PathBuf,

    /// Compose file describing the service containers.
    #[serde(default = "default_compose_file")]
    pub compose_file: PathBuf,

    /// Seed phrase of the host (payments server) wallet. Falls back to the
    /// `payments` service's seed when unset.
    #[serde(default)]
    pub wallet_mnemonic: Option<String>,
}

fn default_host_name() -> String {
    "sell".to_string()
}

fn default_marketplace_url() -> String {
    "https://api.21.co".to_string()
}

const fn default_server_port() -> u16 {
    8080
}

fn default_compose_file() -> PathBuf {
    PathBuf::from("./docker-compose.yml")
}

/// Default credentials location under the user's config directory.
#[must_use]
pub fn default_credentials_path() -> PathBuf {
    directories::ProjectDirs::from("io", "sell", "sell")
        .map(|dirs| dirs.config_dir().join("credentials.json"))
        .unwrap_or_else(|| PathBuf::from("./credentials.json"))
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            name: default_host_name(),
            marketplace_url: default_marketplace_url(),
            server_port: default_server_port(),
            market_address: None,
            credentials_path: default_credentials_path(),
            compose_file: default_compose_file(),
            wallet_mnemonic: None,
        }
    }
}

/// Earnings store configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EarningsConfig {
    /// Path to the SQLite ledger shared with the running services.
    #[serde(default = "default_sqlite_path")]
    pub sqlite_path: PathBuf,
}

fn default_sqlite_path() -> PathBuf {
    PathBuf::from("./earnings.db")
}

impl Default for EarningsConfig {
    fn default() -> Self {
        Self {
            sqlite_path: default_sqlite_path(),
        }
    }
}

/// A service in the host manifest.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// Unique lowercase name of the service.
    pub name: String,

    /// Start ordering index. Lower starts first.
    #[serde(default = "default_order")]
    pub order: u32,

    /// Human display name. Defaults to the title-cased name.
    #[serde(default)]
    pub display_name: Option<String>,

    /// Seed phrase of the service's own wallet, if it has one.
    #[serde(default)]
    pub wallet_mnemonic: Option<String>,

    /// Whether the service is part of `--all` selections.
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

const fn default_order() -> u32 {
    100
}

const fn default_enabled() -> bool {
    true
}

/// Complete sell configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SellConfig {
    /// Host settings.
    #[serde(default)]
    pub host: HostConfig,

    /// Earnings store settings.
    #[serde(default)]
    pub earnings: EarningsConfig,

    /// Service manifest.
    #[serde(default)]
    pub services: Vec<ServiceConfig>,
}

impl SellConfig {
    /// Load configuration from a file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::parse(&content)
    }

    /// Load configuration from a TOML string.
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        let config: SellConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate service names: non-empty, lowercase, unique.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut names = HashSet::new();
        for service in &self.services {
            if service.name.trim().is_empty() {
                return Err(ConfigError::ValidationError(
                    "Service name cannot be empty".to_string(),
                ));
            }
            if service.name != service.name.to_lowercase() {
                return Err(ConfigError::ValidationError(format!(
                    "Service name must be lowercase: {}",
                    service.name
                )));
            }
            if !names.insert(service.name.as_str()) {
                return Err(ConfigError::ValidationError(format!(
                    "Duplicate name: {}",
                    service.name
                )));
            }
        }
        Ok(())
    }

    /// Look up a service by name (case-insensitive).
    pub fn service(&self, name: &str) -> Option<&ServiceConfig> {
        let name = name.to_lowercase();
        self.services.iter().find(|s| s.name == name)
    }

    /// Names of enabled services, in manifest order.
    pub fn enabled_service_names(&self) -> Vec<String> {
        self.services
            .iter()
            .filter(|s| s.enabled)
            .map(|s| s.name.clone())
            .collect()
    }

    /// Resolve a command-line selection into lowercase service names.
    ///
    /// `all`, or an empty selection, picks every enabled service. Names missing
    /// from the manifest are passed through so they surface as failed outcomes.
    pub fn select(&self, names: &[String], all: bool) -> Vec<String> {
        if all || names.is_empty() {
            return self.enabled_service_names();
        }
        names.iter().map(|name| name.to_lowercase()).collect()
    }

    /// Build orchestrator-owned service records from the manifest.
    pub fn to_services(&self) -> Vec<Service> {
        self.services.iter().map(Service::from_config).collect()
    }

    /// Seed phrase of the host wallet.
    pub fn host_wallet_mnemonic(&self) -> Option<&str> {
        self.host.wallet_mnemonic.as_deref().or_else(|| {
            self.service("payments")
                .and_then(|s| s.wallet_mnemonic.as_deref())
        })
    }
}
