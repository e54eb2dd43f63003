//! Integration tests for labelsync
//!
//! These tests drive `labelsync-core` through its public API only:
//! - File-backed device store surviving orchestrator restarts
//! - Local-first saves and queued deletes while the session service is unreachable
//! - Configuration surface and event serialization

use std::sync::Arc;
use std::time::Duration;

use labelsync_core::{
    AdapterKind, AdapterRegistry, ConflictResolution, Error, FileKvStore, LocalAdapter,
    RemoteAdapter, SaveKind, StorageAdapter, StorageOrigin, SyncConfig, SyncEvent,
    SyncOrchestrator, SyncStatus, SyncStrategy,
};
use serde_json::json;

/// A service URL nothing listens on
fn unreachable_url() -> String {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);
    format!("http://127.0.0.1:{}/api", port)
}

fn device(dir: &std::path::Path) -> Arc<dyn StorageAdapter> {
    Arc::new(LocalAdapter::new(Arc::new(FileKvStore::open(dir).unwrap())).with_name("device"))
}

fn offline_config() -> SyncConfig {
    SyncConfig::new()
        .with_auto_sync(false)
        .with_retry(2, Duration::from_millis(5))
        .with_remote_url(unreachable_url())
}

fn offline_orchestrator(dir: &std::path::Path, config: SyncConfig) -> SyncOrchestrator {
    let remote = RemoteAdapter::from_config(&config).unwrap();
    let registry = AdapterRegistry::new()
        .with(device(dir))
        .with(Arc::new(remote));
    SyncOrchestrator::new(registry, config).unwrap()
}

// ============================================================================
// Device store
// ============================================================================

#[tokio::test]
async fn test_sessions_survive_restart() {
    let dir = tempfile::tempdir().unwrap();
    let config = SyncConfig::new()
        .with_strategy(SyncStrategy::LocalOnly)
        .with_auto_sync(false);

    let first = SyncOrchestrator::new(
        AdapterRegistry::new().with(device(dir.path())),
        config.clone(),
    )
    .unwrap();
    let payload = json!({"fileName": "march.csv", "rows": [1, 2, 3], "labels": ["food"]});
    assert!(first.save_state("s1", payload.clone(), "labels", SaveKind::Labels).await.success);
    first.shutdown().await;

    let second =
        SyncOrchestrator::new(AdapterRegistry::new().with(device(dir.path())), config).unwrap();
    let loaded = second.load_state("s1").await.unwrap();
    assert_eq!(loaded.data_state, payload);
    assert_eq!(loaded.active_tab, "labels");
    assert_eq!(second.active_session_id().await.as_deref(), Some("s1"));

    let sessions = second.list_sessions().await;
    assert_eq!(sessions.len(), 1);
    assert_eq!(sessions[0].item_count, 3);
    assert_eq!(sessions[0].label_count, 1);
    assert_eq!(sessions[0].display_name.as_deref(), Some("march.csv"));
}

#[tokio::test]
async fn test_list_is_newest_first() {
    let dir = tempfile::tempdir().unwrap();
    let sync = SyncOrchestrator::new(
        AdapterRegistry::new().with(device(dir.path())),
        SyncConfig::new()
            .with_strategy(SyncStrategy::LocalOnly)
            .with_auto_sync(false),
    )
    .unwrap();

    for id in ["a", "b", "c"] {
        sync.save_state(id, json!({}), "data", SaveKind::Data).await;
        tokio::time::sleep(Duration::from_millis(5)).await;
    }

    let sessions = sync.list_sessions().await;
    let ids: Vec<&str> = sessions.iter().map(|s| s.session_id.as_str()).collect();
    assert_eq!(ids, vec!["c", "b", "a"]);
    assert!(sessions
        .windows(2)
        .all(|pair| pair[0].last_modified >= pair[1].last_modified));
}

// ============================================================================
// Service unreachable
// ============================================================================

#[tokio::test]
async fn test_local_first_keeps_working_offline() {
    let dir = tempfile::tempdir().unwrap();
    let sync = offline_orchestrator(dir.path(), offline_config());
    let mut events = sync.subscribe();

    let result = sync
        .save_state("s1", json!({"rows": 5, "labels": 2}), "data", SaveKind::Data)
        .await;
    assert!(result.success);
    let metadata = result.metadata.unwrap();
    assert_eq!(metadata.storage_origin, StorageOrigin::Local);
    assert_eq!(metadata.sync_status, SyncStatus::Pending);

    assert_eq!(
        sync.load_state("s1").await.unwrap().data_state,
        json!({"rows": 5, "labels": 2})
    );
    assert!(matches!(events.recv().await.unwrap(), SyncEvent::Saved { .. }));
    assert!(matches!(events.recv().await.unwrap(), SyncEvent::Queued { .. }));

    assert_eq!(sync.drain_pending().await, 0);
    let entry = sync.pending_entry("s1").await.unwrap();
    assert!(entry.attempts >= 2);
    assert!(entry.last_error.is_some());
    sync.reset().await;
}

#[tokio::test]
async fn test_health_reports_unreachable_service() {
    let dir = tempfile::tempdir().unwrap();
    let sync = offline_orchestrator(dir.path(), offline_config());

    let health = sync.health().await;
    let device = health.iter().find(|h| h.kind == "local").unwrap();
    let service = health.iter().find(|h| h.kind == "remote").unwrap();
    assert!(device.healthy);
    assert!(!service.healthy);
}

#[tokio::test]
async fn test_migration_reports_unreachable_service() {
    let dir = tempfile::tempdir().unwrap();
    let sync = offline_orchestrator(
        dir.path(),
        offline_config().with_strategy(SyncStrategy::LocalOnly),
    );
    sync.save_state("a", json!({}), "data", SaveKind::Data).await;
    sync.save_state("b", json!({}), "data", SaveKind::Data).await;

    let report = sync.migrate().await.unwrap();
    assert!(report.migrated.is_empty());
    assert_eq!(report.failed.len(), 2);
    assert_eq!(report.summary(), "Migrated 0 of 2 sessions (0 already synced), 2 failed");
}

#[tokio::test]
async fn test_remote_only_fails_without_service() {
    let dir = tempfile::tempdir().unwrap();
    let sync = offline_orchestrator(
        dir.path(),
        offline_config().with_strategy(SyncStrategy::RemoteOnly),
    );

    let result = sync.save_state("s1", json!({}), "data", SaveKind::Data).await;
    assert!(!result.success);
    assert!(sync.load_state("s1").await.is_none());
    assert!(sync.list_sessions().await.is_empty());
    assert_eq!(sync.pending_count().await, 0);
}

#[tokio::test]
async fn test_delete_with_service_down_stays_queued() {
    let dir = tempfile::tempdir().unwrap();
    let sync = offline_orchestrator(dir.path(), offline_config());

    sync.save_state("s1", json!({}), "data", SaveKind::Data).await;
    let result = sync.delete_session("s1").await;
    assert!(!result.success);
    assert!(result.error.unwrap().contains("queued for retry"));

    assert!(!sync.has_session("s1").await);
    assert!(sync.load_state("s1").await.is_none());
    assert!(sync.list_sessions().await.is_empty());
    assert_eq!(sync.sync_status("s1").await, SyncStatus::Pending);
    assert!(sync.pending_entry("s1").await.unwrap().is_delete());

    // Retrying cannot bring the session back
    let report = sync.sync_now().await;
    assert_eq!(report.pushed, 0);
    assert!(sync.load_state("s1").await.is_none());
    assert_eq!(sync.pending_count().await, 1);
    sync.reset().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_device_store_handles_concurrent_saves() {
    let dir = tempfile::tempdir().unwrap();
    let sync = offline_orchestrator(
        dir.path(),
        offline_config().with_strategy(SyncStrategy::LocalOnly),
    );

    let tasks: Vec<_> = (0..16)
        .map(|n| {
            let sync = sync.clone();
            tokio::spawn(async move {
                sync.save_state(format!("s{}", n), json!({"rows": n}), "data", SaveKind::Data)
                    .await
            })
        })
        .collect();
    for task in tasks {
        assert!(task.await.unwrap().success);
    }
    drop(sync);

    let restarted = offline_orchestrator(
        dir.path(),
        offline_config().with_strategy(SyncStrategy::LocalOnly),
    );
    assert_eq!(restarted.list_sessions().await.len(), 16);
}

// ============================================================================
// Configuration and events
// ============================================================================

#[test]
fn test_sync_config_json_surface() {
    let config: SyncConfig = serde_json::from_value(json!({
        "strategy": "remote-first",
        "conflictResolution": "local-wins",
        "syncIntervalSecs": 5
    }))
    .unwrap();
    assert_eq!(config.strategy, SyncStrategy::RemoteFirst);
    assert_eq!(config.conflict_resolution, ConflictResolution::LocalWins);
    assert_eq!(config.sync_interval(), Duration::from_secs(5));
    assert_eq!(config.retry_attempts, 3);

    assert!(serde_json::from_value::<SyncConfig>(json!({"strategy": "eventually"})).is_err());
}

#[test]
fn test_merge_policy_fails_loudly() {
    let dir = tempfile::tempdir().unwrap();
    let config = offline_config().with_conflict_resolution(ConflictResolution::Merge);
    let registry = AdapterRegistry::new().with(device(dir.path()));

    assert!(matches!(
        SyncOrchestrator::new(registry, config),
        Err(Error::Unimplemented(_))
    ));
}

#[test]
fn test_registry_orders_by_priority() {
    let dir = tempfile::tempdir().unwrap();
    let remote = RemoteAdapter::new(&unreachable_url(), Duration::from_secs(1)).unwrap();
    let registry = AdapterRegistry::new()
        .with(device(dir.path()))
        .with(Arc::new(remote));

    let kinds: Vec<AdapterKind> = registry.adapters().iter().map(|a| a.kind()).collect();
    assert_eq!(kinds, vec![AdapterKind::Remote, AdapterKind::Local]);
}

#[test]
fn test_event_wire_shape() {
    let event = SyncEvent::PushFailed {
        session_id: "s1".to_string(),
        attempts: 3,
        error: "network error: connection refused".to_string(),
    };
    let value = serde_json::to_value(&event).unwrap();
    assert_eq!(value["type"], "push_failed");
    assert_eq!(value["session_id"], "s1");
    assert_eq!(value["attempts"], 3);
}
