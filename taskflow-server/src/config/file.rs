//! TOML file configuration structures.
//!
//! These structs directly map to the `taskflow.toml` file format. Every
//! section is optional and falls back to its defaults.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use taskflow_core::config::{DEFAULT_DEDUP_CAPACITY, DEFAULT_RELAY_BATCH_SIZE};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub relay: RelayConfig,
    #[serde(default)]
    pub notifications: NotificationsConfig,
    /// Operational domain -> bus name, e.g. `users = "userEventBus"`.
    #[serde(default = "default_domains")]
    pub domains: BTreeMap<String, String>,
}

impl Default for FileConfig {
    fn default() -> Self {
        Self {
            database: DatabaseConfig::default(),
            relay: RelayConfig::default(),
            notifications: NotificationsConfig::default(),
            domains: default_domains(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            max_connections: default_max_connections(),
        }
    }
}

fn default_max_connections() -> u32 {
    10
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelayConfig {
    /// Seconds between two relay cycles.
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,
    /// Maximum rows dispatched per cycle.
    #[serde(default = "default_batch_size")]
    pub batch_size: u32,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_interval_secs(),
            batch_size: default_batch_size(),
            enabled: default_enabled(),
        }
    }
}

fn default_interval_secs() -> u64 {
    5
}

fn default_batch_size() -> u32 {
    DEFAULT_RELAY_BATCH_SIZE
}

fn default_enabled() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationsConfig {
    #[serde(default = "default_dedup_capacity")]
    pub dedup_capacity: usize,
}

impl Default for NotificationsConfig {
    fn default() -> Self {
        Self {
            dedup_capacity: default_dedup_capacity(),
        }
    }
}

fn default_dedup_capacity() -> usize {
    DEFAULT_DEDUP_CAPACITY
}

fn default_domains() -> BTreeMap<String, String> {
    BTreeMap::from([
        ("users".to_string(), "userEventBus".to_string()),
        ("tasks".to_string(), "taskEventBus".to_string()),
    ])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_uses_defaults() {
        let config: FileConfig = toml::from_str("").unwrap();
        assert_eq!(config.database.max_connections, 10);
        assert_eq!(config.relay.interval_secs, 5);
        assert_eq!(config.relay.batch_size, 100);
        assert!(config.relay.enabled);
        assert_eq!(config.domains.get("users").map(String::as_str), Some("userEventBus"));
    }

    #[test]
    fn full_config_parsing() {
        let toml_str = r#"
[database]
max_connections = 4

[relay]
interval_secs = 2
batch_size = 25
enabled = false

[notifications]
dedup_capacity = 64

[domains]
users = "userEventBus"
"#;
        let config: FileConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.database.max_connections, 4);
        assert_eq!(config.relay.interval_secs, 2);
        assert_eq!(config.relay.batch_size, 25);
        assert!(!config.relay.enabled);
        assert_eq!(config.notifications.dedup_capacity, 64);
        // An explicit [domains] table replaces the defaults.
        assert_eq!(config.domains.len(), 1);
    }

    #[test]
    fn unknown_sections_are_rejected() {
        assert!(toml::from_str::<FileConfig>("[server]\nlisten = \"0.0.0.0:80\"").is_err());
    }
}
