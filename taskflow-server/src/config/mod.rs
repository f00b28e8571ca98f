//! Configuration module for taskflow-server.
//!
//! Handles loading configuration from the TOML file and the environment, and
//! turns it into the validated settings the core processors consume.

pub mod file;

use crate::config::file::FileConfig;
use std::path::{Path, PathBuf};
use std::time::Duration;
use taskflow_core::config::{NotificationSettings, RelaySettings, SettingsError};
use taskflow_core::events::{BusName, DomainBusMap, OperationalDomain};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("failed to parse config file: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("validation error: {0}")]
    ValidationError(String),

    #[error("DATABASE_URL environment variable not set")]
    MissingDatabaseUrl,
}

impl From<SettingsError> for ConfigError {
    fn from(e: SettingsError) -> Self {
        ConfigError::ValidationError(e.to_string())
    }
}

#[derive(Debug, Clone)]
pub struct LoadedConfig {
    pub max_connections: u32,
    pub relay: RelaySettings,
    pub relay_enabled: bool,
    pub notifications: NotificationSettings,
    pub domains: DomainBusMap,
}

pub struct ConfigLoader {
    config_path: PathBuf,
}

impl ConfigLoader {
    pub fn new(config_path: impl AsRef<Path>) -> Self {
        Self {
            config_path: config_path.as_ref().to_path_buf(),
        }
    }

    pub fn load(&self) -> Result<LoadedConfig, ConfigError> {
        let content = std::fs::read_to_string(&self.config_path)?;
        parse(&content)
    }

    /// Reload the configuration (used during SIGHUP).
    pub fn reload(&self) -> Result<LoadedConfig, ConfigError> {
        self.load()
    }
}

/// Parse and validate the contents of a configuration file.
pub fn parse(content: &str) -> Result<LoadedConfig, ConfigError> {
    let file_config: FileConfig = toml::from_str(content)?;
    build_loaded_config(file_config)
}

fn build_loaded_config(file_config: FileConfig) -> Result<LoadedConfig, ConfigError> {
    if file_config.database.max_connections == 0 {
        return Err(ConfigError::ValidationError(
            "database.max_connections must be greater than zero".to_string(),
        ));
    }

    let relay = RelaySettings::new(
        Duration::from_secs(file_config.relay.interval_secs),
        file_config.relay.batch_size,
    )?;
    let notifications = NotificationSettings::new(file_config.notifications.dedup_capacity)?;

    let domains = file_config
        .domains
        .into_iter()
        .map(|(domain, bus)| {
            let bus = bus.parse::<BusName>().map_err(|e| {
                ConfigError::ValidationError(format!("domain `{domain}`: {e}"))
            })?;
            Ok((domain, bus))
        })
        .collect::<Result<DomainBusMap, ConfigError>>()?;

    // Rows for an unmapped domain could never be delivered.
    for domain in OperationalDomain::ALL {
        if domains.resolve(domain.as_str()).is_err() {
            return Err(ConfigError::ValidationError(format!(
                "domains: no bus configured for `{domain}`"
            )));
        }
    }

    Ok(LoadedConfig {
        max_connections: file_config.database.max_connections,
        relay,
        relay_enabled: file_config.relay.enabled,
        notifications,
        domains,
    })
}

/// Get the database URL from the environment.
pub fn get_database_url() -> Result<String, ConfigError> {
    std::env::var("DATABASE_URL").map_err(|_| ConfigError::MissingDatabaseUrl)
}
