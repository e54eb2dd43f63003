//! Application configuration types
//!
//! The TOML surface is snake_case; [`SyncAppConfig`] is turned into the core
//! [`SyncConfig`] once loaded.

use labelsync_core::{ConflictResolution, SyncConfig, SyncStrategy};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub data_dir: Option<String>,
    #[serde(default)]
    pub sync: SyncAppConfig,
    #[serde(default)]
    pub device: DeviceConfig,
}

impl AppConfig {
    /// Directory holding the device store and the service store
    pub fn data_dir(&self) -> PathBuf {
        self.data_dir
            .clone()
            .map(PathBuf::from)
            .unwrap_or_else(default_data_dir)
    }

    /// On-device key-value store location
    pub fn device_dir(&self) -> PathBuf {
        self.data_dir().join("device")
    }

    /// Session service store location
    pub fn service_dir(&self) -> PathBuf {
        self.data_dir().join("service")
    }
}

/// `~/.labelsync`, or `.labelsync` when there is no home directory
pub fn default_data_dir() -> PathBuf {
    dirs::home_dir()
        .map(|p| p.join(".labelsync"))
        .unwrap_or_else(|| PathBuf::from(".labelsync"))
}

/// HTTP listener of the session service
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8000,
        }
    }
}

/// Sync engine configuration (exposed to TOML)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncAppConfig {
    #[serde(default)]
    pub strategy: SyncStrategy,
    #[serde(default)]
    pub conflict_resolution: ConflictResolution,
    #[serde(default = "default_true")]
    pub auto_sync: bool,
    #[serde(default = "default_sync_interval_secs")]
    pub sync_interval_secs: u64,
    #[serde(default = "default_retry_attempts")]
    pub retry_attempts: u32,
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
    #[serde(default = "default_remote_url")]
    pub remote_url: String,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

impl Default for SyncAppConfig {
    fn default() -> Self {
        Self {
            strategy: SyncStrategy::default(),
            conflict_resolution: ConflictResolution::default(),
            auto_sync: true,
            sync_interval_secs: default_sync_interval_secs(),
            retry_attempts: default_retry_attempts(),
            retry_delay_ms: default_retry_delay_ms(),
            remote_url: default_remote_url(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

impl SyncAppConfig {
    /// Core engine settings
    pub fn to_sync_config(&self) -> SyncConfig {
        SyncConfig {
            strategy: self.strategy,
            conflict_resolution: self.conflict_resolution,
            auto_sync: self.auto_sync,
            sync_interval_secs: self.sync_interval_secs,
            retry_attempts: self.retry_attempts,
            retry_delay_ms: self.retry_delay_ms,
            remote_url: self.remote_url.clone(),
            request_timeout_secs: self.request_timeout_secs,
        }
    }
}

/// On-device store settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceConfig {
    #[serde(default = "default_key_prefix")]
    pub key_prefix: String,
    /// Capacity of the device store; unlimited when absent
    #[serde(default)]
    pub quota_bytes: Option<usize>,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            key_prefix: default_key_prefix(),
            quota_bytes: None,
        }
    }
}

fn default_true() -> bool {
    true
}
fn default_sync_interval_secs() -> u64 {
    30
}
fn default_retry_attempts() -> u32 {
    3
}
fn default_retry_delay_ms() -> u64 {
    1000
}
fn default_remote_url() -> String {
    "http://localhost:8000/api".to_string()
}
fn default_request_timeout_secs() -> u64 {
    10
}
fn default_key_prefix() -> String {
    labelsync_core::local::DEFAULT_KEY_PREFIX.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_core() {
        let app = SyncAppConfig::default().to_sync_config();
        assert_eq!(app, SyncConfig::default());
    }

    #[test]
    fn test_data_dir_override() {
        let config = AppConfig {
            data_dir: Some("/tmp/labelsync-test".to_string()),
            ..AppConfig::default()
        };
        assert_eq!(config.device_dir(), PathBuf::from("/tmp/labelsync-test/device"));
        assert_eq!(config.service_dir(), PathBuf::from("/tmp/labelsync-test/service"));
    }
}
