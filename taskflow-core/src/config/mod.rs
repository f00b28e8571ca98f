//! Validated runtime settings shared by the core processors.
//!
//! Loading and parsing the configuration file is the server crate's job; the
//! types here are what the processors consume.

mod config_store;

pub use config_store::{ConfigStore, ConfigWatcher};

use std::time::Duration;
use thiserror::Error;

pub const DEFAULT_RELAY_INTERVAL: Duration = Duration::from_secs(5);
pub const DEFAULT_RELAY_BATCH_SIZE: u32 = 100;
pub const DEFAULT_DEDUP_CAPACITY: usize = 1024;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SettingsError {
    #[error("relay interval must be greater than zero")]
    ZeroInterval,
    #[error("relay batch size must be greater than zero")]
    ZeroBatchSize,
    #[error("notification dedup capacity must be greater than zero")]
    ZeroDedupCapacity,
}

/// Cadence and batch size of the message relay. Hot-reloadable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RelaySettings {
    pub interval: Duration,
    pub batch_size: u32,
}

impl RelaySettings {
    pub fn new(interval: Duration, batch_size: u32) -> Result<Self, SettingsError> {
        if interval.is_zero() {
            return Err(SettingsError::ZeroInterval);
        }
        if batch_size == 0 {
            return Err(SettingsError::ZeroBatchSize);
        }
        Ok(Self {
            interval,
            batch_size,
        })
    }
}

impl Default for RelaySettings {
    fn default() -> Self {
        Self {
            interval: DEFAULT_RELAY_INTERVAL,
            batch_size: DEFAULT_RELAY_BATCH_SIZE,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NotificationSettings {
    /// How many recent job keys the worker remembers for de-duplication.
    pub dedup_capacity: usize,
}

impl NotificationSettings {
    pub fn new(dedup_capacity: usize) -> Result<Self, SettingsError> {
        if dedup_capacity == 0 {
            return Err(SettingsError::ZeroDedupCapacity);
        }
        Ok(Self { dedup_capacity })
    }
}

impl Default for NotificationSettings {
    fn default() -> Self {
        Self {
            dedup_capacity: DEFAULT_DEDUP_CAPACITY,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn relay_settings_reject_zero_values() {
        assert_eq!(
            RelaySettings::new(Duration::ZERO, 10),
            Err(SettingsError::ZeroInterval)
        );
        assert_eq!(
            RelaySettings::new(Duration::from_secs(1), 0),
            Err(SettingsError::ZeroBatchSize)
        );
        assert!(RelaySettings::new(Duration::from_millis(250), 1).is_ok());
    }
}
