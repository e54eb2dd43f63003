//! Sync events
//!
//! Published on a `tokio::broadcast` channel by the orchestrator. This is
//! where background push failures surface; slow subscribers lag instead of
//! blocking the engine.

use crate::config::ConflictResolution;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::broadcast;

/// Something the sync engine did
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SyncEvent {
    /// A caller save was accepted by at least one adapter
    Saved {
        /// Session identifier
        session_id: String,
        /// Adapter that accepted it first
        adapter: String,
        /// Version stamp
        updated_at: DateTime<Utc>,
    },
    /// A session is waiting for a remote push
    Queued {
        /// Session identifier
        session_id: String,
        /// Version waiting
        updated_at: DateTime<Utc>,
    },
    /// A background push reached every remote
    Pushed {
        /// Session identifier
        session_id: String,
        /// Version pushed
        updated_at: DateTime<Utc>,
    },
    /// A background push used up its attempts; the entry stays queued
    PushFailed {
        /// Session identifier
        session_id: String,
        /// Failed pushes so far
        attempts: u32,
        /// Last failure reason
        error: String,
    },
    /// Adapters hold different versions of a session
    ConflictDetected {
        /// Session identifier
        session_id: String,
        /// Number of diverging copies
        copies: usize,
    },
    /// A conflict was settled by policy
    ConflictResolved {
        /// Session identifier
        session_id: String,
        /// Policy applied
        policy: ConflictResolution,
        /// Adapter whose copy won
        winner: String,
        /// Winning version
        updated_at: DateTime<Utc>,
    },
    /// A session was deleted from every adapter
    Deleted {
        /// Session identifier
        session_id: String,
    },
    /// Some adapter missed a delete; it stays queued and is retried
    DeleteQueued {
        /// Session identifier
        session_id: String,
        /// Adapters that failed, with reasons
        error: String,
    },
    /// Every session was removed
    Cleared,
    /// A local-to-remote migration sweep finished
    MigrationCompleted {
        /// Sessions copied
        migrated: usize,
        /// Sessions the remote already had
        already_synced: usize,
        /// Sessions that could not be copied
        failed: usize,
    },
}

impl SyncEvent {
    /// Session the event concerns, if any
    #[must_use]
    pub fn session_id(&self) -> Option<&str> {
        match self {
            Self::Saved { session_id, .. }
            | Self::Queued { session_id, .. }
            | Self::Pushed { session_id, .. }
            | Self::PushFailed { session_id, .. }
            | Self::ConflictDetected { session_id, .. }
            | Self::ConflictResolved { session_id, .. }
            | Self::Deleted { session_id }
            | Self::DeleteQueued { session_id, .. } => Some(session_id),
            Self::Cleared | Self::MigrationCompleted { .. } => None,
        }
    }
}

/// Broadcast channel for [`SyncEvent`]s
#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<SyncEvent>,
}

impl EventBus {
    /// Create a bus buffering `capacity` events per subscriber
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Receive all future events
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<SyncEvent> {
        self.sender.subscribe()
    }

    /// Publish to current subscribers; returns how many received it
    pub fn publish(&self, event: SyncEvent) -> usize {
        self.sender.send(event).unwrap_or(0)
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_publish_subscribe() {
        let bus = EventBus::new(8);
        let mut rx = bus.subscribe();

        let delivered = bus.publish(SyncEvent::Deleted {
            session_id: "s1".to_string(),
        });
        assert_eq!(delivered, 1);

        let event = rx.recv().await.unwrap();
        assert_eq!(event.session_id(), Some("s1"));
    }

    #[test]
    fn test_receiver_wakes_on_publish() {
        let bus = EventBus::new(4);
        let mut rx = bus.subscribe();
        let mut recv = tokio_test::task::spawn(rx.recv());

        tokio_test::assert_pending!(recv.poll());
        bus.publish(SyncEvent::Cleared);
        assert!(recv.is_woken());
        let event = tokio_test::assert_ready_ok!(recv.poll());
        assert_eq!(event, SyncEvent::Cleared);
    }

    #[test]
    fn test_publish_without_subscribers() {
        let bus = EventBus::default();
        assert_eq!(bus.publish(SyncEvent::Cleared), 0);
    }

    #[test]
    fn test_serialization_is_tagged() {
        let event = SyncEvent::PushFailed {
            session_id: "s1".to_string(),
            attempts: 3,
            error: "connection refused".to_string(),
        };
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["type"], "push_failed");
        assert_eq!(value["session_id"], "s1");
        assert_eq!(value["attempts"], 3);

        let resolved = SyncEvent::ConflictResolved {
            session_id: "s1".to_string(),
            policy: ConflictResolution::LatestWins,
            winner: "remote".to_string(),
            updated_at: Utc::now(),
        };
        let value = serde_json::to_value(&resolved).unwrap();
        assert_eq!(value["type"], "conflict_resolved");
        assert_eq!(value["policy"], "latest-wins");
    }
}
