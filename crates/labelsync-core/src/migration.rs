//! One-way copy of on-device sessions to a remote store
//!
//! Sessions the remote already holds are left alone. Copies keep their
//! timestamps, so a migrated session compares equal to its local origin.

use crate::adapter::StorageAdapter;
use crate::error::Result;
use serde::Serialize;
use tracing::{info, warn};

/// Outcome of a migration sweep
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MigrationReport {
    /// Sessions copied to the remote
    pub migrated: Vec<String>,
    /// Sessions the remote already had
    pub already_synced: Vec<String>,
    /// Sessions that could not be copied, with the reason
    pub failed: Vec<(String, String)>,
}

impl MigrationReport {
    /// Sessions examined
    #[must_use]
    pub fn total(&self) -> usize {
        self.migrated.len() + self.already_synced.len() + self.failed.len()
    }

    /// Whether every session made it
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }

    /// One-line notification for the user
    #[must_use]
    pub fn summary(&self) -> String {
        if self.total() == 0 {
            return "No local sessions to migrate".to_string();
        }
        let mut summary = format!(
            "Migrated {} of {} sessions ({} already synced)",
            self.migrated.len(),
            self.total(),
            self.already_synced.len()
        );
        if !self.failed.is_empty() {
            summary.push_str(&format!(", {} failed", self.failed.len()));
        }
        summary
    }
}

/// Copy every session `local` holds to `remote`
///
/// The remote is probed first; when it is unreachable nothing is attempted
/// and every local session is reported failed. A session whose existence
/// check errors is also reported failed.
///
/// # Errors
///
/// Returns the local adapter's error when its sessions cannot be listed.
pub async fn migrate_local_to_remote(
    local: &dyn StorageAdapter,
    remote: &dyn StorageAdapter,
) -> Result<MigrationReport> {
    let mut report = MigrationReport::default();

    let sessions = local.list_sessions().await.map_err(|e| {
        warn!(adapter = %local.name(), error = %e, "Cannot list local sessions for migration");
        e
    })?;

    if !remote.health_check().await {
        warn!(adapter = %remote.name(), count = sessions.len(), "Remote unreachable, migration skipped");
        report.failed = sessions
            .into_iter()
            .map(|s| (s.session_id, "remote store unreachable".to_string()))
            .collect();
        return Ok(report);
    }

    for session in sessions {
        let id = session.session_id;
        match remote.has_session(&id).await {
            Ok(true) => report.already_synced.push(id),
            Ok(false) => match copy_session(local, remote, &id).await {
                Ok(()) => report.migrated.push(id),
                Err(reason) => {
                    warn!(session_id = %id, reason = %reason, "Session migration failed");
                    report.failed.push((id, reason));
                }
            },
            Err(e) => {
                warn!(session_id = %id, error = %e, "Remote existence check failed");
                report.failed.push((id, e.to_string()));
            }
        }
    }

    info!(
        migrated = report.migrated.len(),
        already_synced = report.already_synced.len(),
        failed = report.failed.len(),
        "Migration finished"
    );
    Ok(report)
}

async fn copy_session(
    local: &dyn StorageAdapter,
    remote: &dyn StorageAdapter,
    session_id: &str,
) -> std::result::Result<(), String> {
    let record = match local.load_state(session_id).await {
        Ok(Some(record)) => record,
        Ok(None) => return Err("session disappeared from local store".to_string()),
        Err(e) => return Err(e.to_string()),
    };

    let result = remote.save_record(&record).await;
    if result.success {
        Ok(())
    } else {
        Err(result.error.unwrap_or_else(|| "remote rejected the session".to_string()))
    }
}
