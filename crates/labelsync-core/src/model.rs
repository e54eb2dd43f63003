//! Session data model
//!
//! The payload is opaque to this crate: it is produced by the labeling
//! business logic and only ever stored, compared by version, and copied
//! between adapters. Everything here serializes in `camelCase`, which is
//! also the remote service's wire format.

use crate::error::Error;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Opaque, whole-session snapshot produced by the caller
pub type SessionPayload = Value;

/// Schema version written into every record's metadata
pub const SCHEMA_VERSION: &str = "1.0.0";

/// Where a session copy lives
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageOrigin {
    /// On-device store
    Local,
    /// Remote service
    Remote,
    /// Held by more than one adapter
    Hybrid,
}

impl fmt::Display for StorageOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Local => write!(f, "local"),
            Self::Remote => write!(f, "remote"),
            Self::Hybrid => write!(f, "hybrid"),
        }
    }
}

/// Replication state of one session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncStatus {
    /// Every active adapter holds the latest copy
    #[default]
    Synced,
    /// Accepted locally, waiting for a remote push
    Pending,
    /// Adapters disagree (transient, resolved by policy on load)
    Conflict,
    /// Remote push exhausted its attempts; retried on the next sweep
    Error,
}

impl fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Synced => write!(f, "synced"),
            Self::Pending => write!(f, "pending"),
            Self::Conflict => write!(f, "conflict"),
            Self::Error => write!(f, "error"),
        }
    }
}

/// Which part of the session a save was triggered by
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SaveKind {
    /// Transaction data
    #[default]
    Data,
    /// Label set
    Labels,
    /// Rule set
    Rules,
}

impl fmt::Display for SaveKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Data => write!(f, "data"),
            Self::Labels => write!(f, "labels"),
            Self::Rules => write!(f, "rules"),
        }
    }
}

/// Adapter-reported summary of a session, used for listing and status
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionMetadata {
    /// Session identifier
    pub session_id: String,
    /// Human-readable name (usually the source file name)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    /// Time of the last successful write
    pub last_modified: DateTime<Utc>,
    /// Number of rows/items in the payload
    #[serde(default)]
    pub item_count: u64,
    /// Number of labels
    #[serde(default)]
    pub label_count: u64,
    /// Number of rules
    #[serde(default)]
    pub rule_count: u64,
    /// Which store reported this summary
    pub storage_origin: StorageOrigin,
    /// Replication state
    #[serde(default)]
    pub sync_status: SyncStatus,
    /// Last time a remote confirmed this copy
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_synced_at: Option<DateTime<Utc>>,
    /// Record schema version
    #[serde(default = "default_schema_version")]
    pub schema_version: String,
}

fn default_schema_version() -> String {
    SCHEMA_VERSION.to_string()
}

impl SessionMetadata {
    /// Derive metadata from a payload.
    ///
    /// Counts are read from well-known top-level fields: `rows`, `items` or
    /// `transactions` for items, `labels`, and `rules`. A field counts as its
    /// array length, object size, or its value when it is a non-negative
    /// integer.
    #[must_use]
    pub fn describe(
        session_id: &str,
        payload: &SessionPayload,
        last_modified: DateTime<Utc>,
        origin: StorageOrigin,
    ) -> Self {
        let display_name = ["fileName", "displayName"]
            .iter()
            .find_map(|key| payload.get(*key).and_then(Value::as_str))
            .map(str::to_string);

        Self {
            session_id: session_id.to_string(),
            display_name,
            last_modified,
            item_count: count_field(payload, &["rows", "items", "transactions"]),
            label_count: count_field(payload, &["labels"]),
            rule_count: count_field(payload, &["rules"]),
            storage_origin: origin,
            sync_status: SyncStatus::Synced,
            last_synced_at: None,
            schema_version: default_schema_version(),
        }
    }
}

fn count_field(payload: &SessionPayload, keys: &[&str]) -> u64 {
    keys.iter()
        .find_map(|key| payload.get(*key))
        .map(|value| match value {
            Value::Array(items) => items.len() as u64,
            Value::Object(map) => map.len() as u64,
            Value::Number(n) => n.as_u64().unwrap_or(0),
            _ => 0,
        })
        .unwrap_or(0)
}

/// A caller save, stamped once so every adapter records the same version
#[derive(Debug, Clone, PartialEq)]
pub struct SaveRequest {
    /// Session identifier
    pub session_id: String,
    /// Whole-session snapshot
    pub payload: SessionPayload,
    /// Tab the user was on, used when resuming
    pub active_tab: String,
    /// What triggered the save
    pub kind: SaveKind,
    /// Version stamp, becomes `updatedAt`
    pub stamped_at: DateTime<Utc>,
}

impl SaveRequest {
    /// Create a request stamped with the current time
    #[must_use]
    pub fn new(
        session_id: impl Into<String>,
        payload: SessionPayload,
        active_tab: impl Into<String>,
        kind: SaveKind,
    ) -> Self {
        Self {
            session_id: session_id.into(),
            payload,
            active_tab: active_tab.into(),
            kind,
            stamped_at: Utc::now(),
        }
    }

    /// Override the version stamp
    #[must_use]
    pub fn stamped(mut self, at: DateTime<Utc>) -> Self {
        self.stamped_at = at;
        self
    }
}

/// The unit each adapter stores
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistedState {
    /// Session identifier
    pub session_id: String,
    /// Opaque payload
    pub data_state: SessionPayload,
    /// Tab hint for resuming
    pub active_tab: String,
    /// Derived summary
    pub metadata: SessionMetadata,
    /// Fixed at first write
    pub created_at: DateTime<Utc>,
    /// Advances on every write
    pub updated_at: DateTime<Utc>,
}

impl PersistedState {
    /// Build the record an adapter writes for `request`.
    ///
    /// `previous_created_at` is kept unless it lies after the new stamp, so
    /// `updated_at >= created_at` always holds.
    #[must_use]
    pub fn from_request(
        request: &SaveRequest,
        previous_created_at: Option<DateTime<Utc>>,
        origin: StorageOrigin,
    ) -> Self {
        let created_at = previous_created_at
            .filter(|created| *created <= request.stamped_at)
            .unwrap_or(request.stamped_at);

        Self {
            session_id: request.session_id.clone(),
            metadata: SessionMetadata::describe(
                &request.session_id,
                &request.payload,
                request.stamped_at,
                origin,
            ),
            data_state: request.payload.clone(),
            active_tab: request.active_tab.clone(),
            created_at,
            updated_at: request.stamped_at,
        }
    }

    /// Re-label a replicated copy for the adapter storing it
    #[must_use]
    pub fn relabel(mut self, origin: StorageOrigin) -> Self {
        self.metadata.storage_origin = origin;
        self.metadata.last_modified = self.updated_at;
        if self.created_at > self.updated_at {
            self.created_at = self.updated_at;
        }
        self
    }

    /// Whether `other` is the same version of the same session
    #[must_use]
    pub fn same_version(&self, other: &PersistedState) -> bool {
        self.session_id == other.session_id && self.updated_at == other.updated_at
    }
}

/// Outcome of one write-type operation. Failures are data, not errors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncResult {
    /// Whether the operation took effect
    pub success: bool,
    /// Session the operation targeted (`"all"` for clear-all)
    pub session_id: String,
    /// When the outcome was produced
    pub timestamp: DateTime<Utc>,
    /// Failure reason
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Metadata of the stored copy, when the adapter reports it
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<SessionMetadata>,
    /// Failure that retrying cannot fix
    #[serde(skip)]
    pub permanent: bool,
}

impl SyncResult {
    /// Successful outcome
    #[must_use]
    pub fn ok(session_id: impl Into<String>) -> Self {
        Self {
            success: true,
            session_id: session_id.into(),
            timestamp: Utc::now(),
            error: None,
            metadata: None,
            permanent: false,
        }
    }

    /// Failed outcome
    #[must_use]
    pub fn failed(session_id: impl Into<String>, error: impl fmt::Display) -> Self {
        Self {
            success: false,
            session_id: session_id.into(),
            timestamp: Utc::now(),
            error: Some(error.to_string()),
            metadata: None,
            permanent: false,
        }
    }

    /// Failed outcome classified by [`Error::is_transient`]
    #[must_use]
    pub fn from_error(session_id: impl Into<String>, error: &Error) -> Self {
        Self {
            permanent: !error.is_transient(),
            ..Self::failed(session_id, error)
        }
    }

    /// Attach metadata
    #[must_use]
    pub fn with_metadata(mut self, metadata: SessionMetadata) -> Self {
        self.metadata = Some(metadata);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use serde_json::json;

    #[test]
    fn test_describe_counts() {
        let payload = json!({
            "fileName": "march.csv",
            "rows": [1, 2, 3],
            "labels": {"food": {}, "rent": {}},
            "rules": 4
        });
        let meta = SessionMetadata::describe("s1", &payload, Utc::now(), StorageOrigin::Local);

        assert_eq!(meta.display_name.as_deref(), Some("march.csv"));
        assert_eq!(meta.item_count, 3);
        assert_eq!(meta.label_count, 2);
        assert_eq!(meta.rule_count, 4);
        assert_eq!(meta.sync_status, SyncStatus::Synced);
        assert_eq!(meta.schema_version, SCHEMA_VERSION);
    }

    #[test]
    fn test_describe_scalar_counts() {
        let payload = json!({"rows": 5, "labels": 2});
        let meta = SessionMetadata::describe("s1", &payload, Utc::now(), StorageOrigin::Remote);
        assert_eq!(meta.item_count, 5);
        assert_eq!(meta.label_count, 2);
        assert_eq!(meta.rule_count, 0);
        assert!(meta.display_name.is_none());
    }

    #[test]
    fn test_created_at_preserved() {
        let first = Utc::now() - Duration::minutes(5);
        let request = SaveRequest::new("s1", json!({}), "data", SaveKind::Data);
        let record = PersistedState::from_request(&request, Some(first), StorageOrigin::Local);

        assert_eq!(record.created_at, first);
        assert_eq!(record.updated_at, request.stamped_at);
        assert_eq!(record.metadata.last_modified, request.stamped_at);
    }

    #[test]
    fn test_created_at_never_after_updated_at() {
        let future = Utc::now() + Duration::hours(1);
        let request = SaveRequest::new("s1", json!({}), "data", SaveKind::Data);
        let record = PersistedState::from_request(&request, Some(future), StorageOrigin::Local);
        assert!(record.updated_at >= record.created_at);
    }

    #[test]
    fn test_wire_format_is_camel_case() {
        let request = SaveRequest::new("s1", json!({"rows": 1}), "labels", SaveKind::Labels);
        let record = PersistedState::from_request(&request, None, StorageOrigin::Local);
        let value = serde_json::to_value(&record).unwrap();

        assert!(value.get("sessionId").is_some());
        assert!(value.get("dataState").is_some());
        assert!(value.get("activeTab").is_some());
        assert_eq!(value["metadata"]["storageOrigin"], "local");
        assert_eq!(value["metadata"]["syncStatus"], "synced");
    }

    #[test]
    fn test_sync_result_constructors() {
        let ok = SyncResult::ok("s1");
        assert!(ok.success);
        assert!(ok.error.is_none());

        let failed = SyncResult::failed("s1", "remote down");
        assert!(!failed.success);
        assert_eq!(failed.error.as_deref(), Some("remote down"));
    }

    #[test]
    fn test_relabel() {
        let request = SaveRequest::new("s1", json!({}), "data", SaveKind::Data);
        let record = PersistedState::from_request(&request, None, StorageOrigin::Local)
            .relabel(StorageOrigin::Remote);
        assert_eq!(record.metadata.storage_origin, StorageOrigin::Remote);
    }
}
