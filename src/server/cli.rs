//! CLI orchestrator builder
//!
//! Creates the sync orchestrator for CLI commands without starting the
//! session service.

use super::config::AppConfig;
use anyhow::{Context, Result};
use labelsync_core::{
    AdapterRegistry, FileKvStore, LocalAdapter, RemoteAdapter, StorageAdapter, SyncOrchestrator,
};
use std::sync::Arc;
use tracing::debug;

/// On-device adapter over the file store in the data directory
fn build_device_adapter(config: &AppConfig) -> Result<LocalAdapter> {
    let dir = config.device_dir();
    let mut store = FileKvStore::open(&dir)
        .with_context(|| format!("Failed to open device store at {}", dir.display()))?;
    if let Some(quota) = config.device.quota_bytes {
        store = store.with_capacity_bytes(quota);
    }

    Ok(LocalAdapter::new(Arc::new(store))
        .with_prefix(config.device.key_prefix.clone())
        .with_name("device"))
}

/// Build an orchestrator over the device store and the remote service.
///
/// Does NOT start the reconciliation worker; callers that need it call
/// `start()` and later `shutdown()`.
pub fn build_orchestrator_for_cli(config: &AppConfig) -> Result<SyncOrchestrator> {
    let sync_config = config.sync.to_sync_config();

    let device: Arc<dyn StorageAdapter> = Arc::new(build_device_adapter(config)?);
    let remote: Arc<dyn StorageAdapter> = Arc::new(
        RemoteAdapter::from_config(&sync_config)
            .context("Failed to create remote adapter")?
            .with_name("service"),
    );

    let registry = AdapterRegistry::new().with(device).with(remote);
    debug!(adapters = ?registry, "Adapter registry built");

    SyncOrchestrator::new(registry, sync_config).context("Failed to create sync orchestrator")
}

#[cfg(test)]
mod tests {
    use super::*;
    use labelsync_core::{AdapterKind, SyncStrategy};

    fn config_in(dir: &std::path::Path) -> AppConfig {
        let mut config = AppConfig {
            data_dir: Some(dir.display().to_string()),
            ..AppConfig::default()
        };
        config.sync.auto_sync = false;
        config
    }

    #[test]
    fn test_builds_both_adapters() {
        let dir = tempfile::tempdir().unwrap();
        let sync = build_orchestrator_for_cli(&config_in(dir.path())).unwrap();

        let kinds: Vec<AdapterKind> = sync.active_adapters().iter().map(|a| a.kind()).collect();
        assert_eq!(kinds, vec![AdapterKind::Local, AdapterKind::Remote]);
        assert!(dir.path().join("device").is_dir());
    }

    #[test]
    fn test_strategy_from_config() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = config_in(dir.path());
        config.sync.strategy = SyncStrategy::LocalOnly;

        let sync = build_orchestrator_for_cli(&config).unwrap();
        assert_eq!(sync.active_adapters().len(), 1);
        assert_eq!(sync.active_adapters()[0].name(), "device");
    }

    #[test]
    fn test_invalid_remote_url() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = config_in(dir.path());
        config.sync.remote_url = "not a url".to_string();
        assert!(build_orchestrator_for_cli(&config).is_err());
    }
}
