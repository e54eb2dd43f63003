//! Sync CLI commands
//!
//! `labelsync status`         - adapter health and pending pushes
//! `labelsync sync [--watch]` - push pending sessions and reconcile both stores
//! `labelsync migrate`        - copy on-device sessions to the service

use crate::server::{build_orchestrator_for_cli, load_config, wait_for_shutdown_signal};
use anyhow::{bail, Context, Result};
use labelsync_core::{AdapterHealth, SyncEvent, SyncOrchestrator, SyncReport};
use tokio::sync::broadcast::error::RecvError;
use tracing::warn;

fn orchestrator() -> Result<SyncOrchestrator> {
    let config = load_config().context("Failed to load configuration")?;
    build_orchestrator_for_cli(&config)
}

fn health_line(health: &AdapterHealth) -> String {
    let mark = if health.healthy { "✅" } else { "❌" };
    format!(
        "{} {:<10} {:<7} priority {}",
        mark, health.name, health.kind, health.priority
    )
}

fn report_line(report: &SyncReport) -> String {
    format!(
        "Examined {} sessions: {} updated, {} up to date, {} failed",
        report.examined,
        report.pushed,
        report.up_to_date,
        report.failed.len()
    )
}

/// Show adapter health and pending pushes.
pub async fn status() -> Result<()> {
    let sync = orchestrator()?;
    let config = sync.config();
    println!("Strategy: {}", config.strategy);
    println!("Conflicts: {}", config.conflict_resolution);
    println!("Remote: {}\n", config.remote_url);

    for health in sync.health().await {
        println!("{}", health_line(&health));
    }

    let sessions = sync.list_sessions().await;
    println!("\n{} sessions", sessions.len());
    sync.shutdown().await;
    Ok(())
}

/// Push pending sessions and reconcile both stores.
pub async fn sync(watch: bool) -> Result<()> {
    let sync = orchestrator()?;

    let report = sync.sync_now().await;
    println!("{}", report_line(&report));
    for (id, reason) in &report.failed {
        println!("  ❌ {}: {}", id, reason);
    }

    if watch {
        watch_events(&sync).await;
    }

    sync.shutdown().await;
    if report.failed.is_empty() {
        Ok(())
    } else {
        bail!("{} sessions could not be synced", report.failed.len())
    }
}

/// Run the background worker and print events until Ctrl+C
async fn watch_events(sync: &SyncOrchestrator) {
    let mut events = sync.subscribe();
    if !sync.start() {
        warn!("auto_sync is disabled; only events from this process are shown");
    }
    println!("Watching for sync events (Ctrl+C to stop)...");

    let printer = async {
        loop {
            match events.recv().await {
                Ok(event) => println!("{}", describe(&event)),
                Err(RecvError::Lagged(skipped)) => warn!(skipped = skipped, "Event stream lagged"),
                Err(RecvError::Closed) => break,
            }
        }
    };

    tokio::select! {
        _ = printer => {}
        _ = wait_for_shutdown_signal() => {}
    }
}

fn describe(event: &SyncEvent) -> String {
    match event {
        SyncEvent::Pushed { session_id, .. } => format!("⬆️  pushed {}", session_id),
        SyncEvent::PushFailed {
            session_id,
            attempts,
            error,
        } => format!("⚠️  push of {} failed after {} attempts: {}", session_id, attempts, error),
        SyncEvent::ConflictResolved {
            session_id, winner, ..
        } => format!("🔀 conflict on {} resolved in favour of {}", session_id, winner),
        SyncEvent::DeleteQueued { session_id, error } => {
            format!("⏳ delete of {} queued for retry: {}", session_id, error)
        }
        other => serde_json::to_string(other).unwrap_or_else(|_| format!("{:?}", other)),
    }
}

/// Copy on-device sessions to the service.
pub async fn migrate() -> Result<()> {
    let sync = orchestrator()?;
    let report = sync.migrate().await;
    sync.shutdown().await;
    let report = report.context("Migration could not run")?;

    println!("{}", report.summary());
    for (id, reason) in &report.failed {
        println!("  ❌ {}: {}", id, reason);
    }
    if report.is_complete() {
        Ok(())
    } else {
        bail!("{} sessions were not migrated", report.failed.len())
    }
}
