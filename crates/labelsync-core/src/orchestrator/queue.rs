//! Pending remote work
//!
//! At most one entry per session: either a record waiting to be pushed or a
//! delete the adapters have not all applied yet. A newer save replaces the
//! entry and its failure count, and so does a delete. Push entries leave the
//! queue only when a push of the same or a newer version succeeds; delete
//! entries only when every adapter applied the delete.

use crate::model::{PersistedState, SyncStatus};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use tokio::sync::RwLock;

/// What a queued entry still has to do
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum PendingOp {
    /// Replicate this exact record to the remotes
    Push {
        /// Record to replicate
        record: PersistedState,
    },
    /// Remove the session from every adapter
    Delete {
        /// When the delete was requested
        deleted_at: DateTime<Utc>,
    },
}

/// A write accepted by some adapters but not all of them yet
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingSync {
    /// Session the entry belongs to
    pub session_id: String,
    /// Outstanding work
    pub op: PendingOp,
    /// When the entry was queued
    pub queued_at: DateTime<Utc>,
    /// Failed write attempts so far
    pub attempts: u32,
    /// Last failure reason
    pub last_error: Option<String>,
}

impl PendingSync {
    fn new(session_id: String, op: PendingOp) -> Self {
        Self {
            session_id,
            op,
            queued_at: Utc::now(),
            attempts: 0,
            last_error: None,
        }
    }

    /// Session the entry belongs to
    #[must_use]
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Record waiting for a push
    #[must_use]
    pub fn record(&self) -> Option<&PersistedState> {
        match &self.op {
            PendingOp::Push { record } => Some(record),
            PendingOp::Delete { .. } => None,
        }
    }

    /// Whether the entry is an unfinished delete
    #[must_use]
    pub fn is_delete(&self) -> bool {
        matches!(self.op, PendingOp::Delete { .. })
    }

    /// Stamp identifying this entry: the record version or the delete time
    #[must_use]
    pub fn version(&self) -> DateTime<Utc> {
        match &self.op {
            PendingOp::Push { record } => record.updated_at,
            PendingOp::Delete { deleted_at } => *deleted_at,
        }
    }
}

/// Session-keyed queue of pending pushes and deletes
#[derive(Debug, Default)]
pub struct PendingQueue {
    entries: RwLock<HashMap<String, PendingSync>>,
}

impl PendingQueue {
    /// Create an empty queue
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue `record`, replacing any entry for the same session
    pub async fn enqueue(&self, record: PersistedState) {
        let session_id = record.session_id.clone();
        let entry = PendingSync::new(session_id.clone(), PendingOp::Push { record });
        self.entries.write().await.insert(session_id, entry);
    }

    /// Queue a delete, replacing any entry for the same session
    ///
    /// Returns the delete stamp.
    pub async fn enqueue_delete(&self, session_id: &str) -> DateTime<Utc> {
        let deleted_at = Utc::now();
        let entry = PendingSync::new(session_id.to_string(), PendingOp::Delete { deleted_at });
        self.entries
            .write()
            .await
            .insert(session_id.to_string(), entry);
        deleted_at
    }

    /// Entry for a session
    pub async fn get(&self, session_id: &str) -> Option<PendingSync> {
        self.entries.read().await.get(session_id).cloned()
    }

    /// Whether a delete of the session is still outstanding
    pub async fn is_deleted(&self, session_id: &str) -> bool {
        self.entries
            .read()
            .await
            .get(session_id)
            .is_some_and(PendingSync::is_delete)
    }

    /// Drop the push entry if the queued version is not newer than `updated_at`
    ///
    /// Returns whether an entry was removed. Delete entries are untouched.
    pub async fn settle(&self, session_id: &str, updated_at: DateTime<Utc>) -> bool {
        let mut entries = self.entries.write().await;
        match entries.get(session_id).and_then(PendingSync::record) {
            Some(record) if record.updated_at <= updated_at => {
                entries.remove(session_id);
                true
            }
            _ => false,
        }
    }

    /// Drop the delete entry stamped `deleted_at`
    ///
    /// Returns whether an entry was removed.
    pub async fn settle_delete(&self, session_id: &str, deleted_at: DateTime<Utc>) -> bool {
        let mut entries = self.entries.write().await;
        match entries.get(session_id) {
            Some(entry) if entry.is_delete() && entry.version() == deleted_at => {
                entries.remove(session_id);
                true
            }
            _ => false,
        }
    }

    /// Drop an outstanding delete, returning its stamp
    pub async fn cancel_delete(&self, session_id: &str) -> Option<DateTime<Utc>> {
        let mut entries = self.entries.write().await;
        let deleted_at = entries
            .get(session_id)
            .filter(|entry| entry.is_delete())
            .map(PendingSync::version)?;
        entries.remove(session_id);
        Some(deleted_at)
    }

    /// Count failed attempts against the entry stamped `version`
    ///
    /// Returns the new attempt total, or `None` when the entry was replaced
    /// or removed in the meantime.
    pub async fn record_failure(
        &self,
        session_id: &str,
        version: DateTime<Utc>,
        attempts: u32,
        error: impl Into<String>,
    ) -> Option<u32> {
        let mut entries = self.entries.write().await;
        let entry = entries
            .get_mut(session_id)
            .filter(|entry| entry.version() == version)?;
        entry.attempts = entry.attempts.saturating_add(attempts);
        entry.last_error = Some(error.into());
        Some(entry.attempts)
    }

    /// Drop the entry for a session
    pub async fn remove(&self, session_id: &str) -> Option<PendingSync> {
        self.entries.write().await.remove(session_id)
    }

    /// Copy of every entry, oldest first
    pub async fn snapshot(&self) -> Vec<PendingSync> {
        let mut entries: Vec<PendingSync> = self.entries.read().await.values().cloned().collect();
        entries.sort_by(|a, b| {
            a.queued_at
                .cmp(&b.queued_at)
                .then_with(|| a.session_id().cmp(b.session_id()))
        });
        entries
    }

    /// Replication state of a session
    ///
    /// `error` once `max_attempts` failed attempts have accumulated (the
    /// entry is still retried), `pending` while queued, `synced` otherwise.
    pub async fn status(&self, session_id: &str, max_attempts: u32) -> SyncStatus {
        match self.entries.read().await.get(session_id) {
            Some(entry) if entry.attempts >= max_attempts && entry.last_error.is_some() => {
                SyncStatus::Error
            }
            Some(_) => SyncStatus::Pending,
            None => SyncStatus::Synced,
        }
    }

    /// Number of queued sessions
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    /// Whether nothing is queued
    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    /// Drop every entry
    pub async fn clear(&self) {
        self.entries.write().await.clear();
    }
}
