//! Storage adapter contract
//!
//! Every backend implements [`StorageAdapter`]. Write-type operations return a
//! [`SyncResult`] instead of an error; read-type operations return `Ok(None)`
//! or `Ok(false)` for missing sessions and reserve `Err` for I/O failures.

use crate::error::Result;
use crate::model::{PersistedState, SaveRequest, SessionMetadata, StorageOrigin, SyncResult};
use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;

/// Backend family of an adapter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AdapterKind {
    /// Synchronous on-device store, always available
    Local,
    /// Network service, possibly unreachable
    Remote,
}

impl AdapterKind {
    /// Storage origin reported for copies held by this kind of adapter
    #[must_use]
    pub fn origin(self) -> StorageOrigin {
        match self {
            Self::Local => StorageOrigin::Local,
            Self::Remote => StorageOrigin::Remote,
        }
    }
}

impl fmt::Display for AdapterKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Local => write!(f, "local"),
            Self::Remote => write!(f, "remote"),
        }
    }
}

/// Uniform operation set every storage backend provides
#[async_trait]
pub trait StorageAdapter: Send + Sync {
    /// Adapter name for logs and health reports
    fn name(&self) -> &str;

    /// Backend family
    fn kind(&self) -> AdapterKind;

    /// Preference for ordering and conflict resolution (higher wins)
    fn priority(&self) -> u8;

    /// Upsert a session from a caller save. Sets the active session pointer
    /// on success and leaves any prior record intact on failure.
    async fn save_state(&self, request: &SaveRequest) -> SyncResult;

    /// Store an exact copy of a record, timestamps included
    async fn save_record(&self, record: &PersistedState) -> SyncResult;

    /// Load a session, `Ok(None)` when it does not exist
    async fn load_state(&self, session_id: &str) -> Result<Option<PersistedState>>;

    /// Delete a session; deleting a missing session succeeds
    async fn delete_session(&self, session_id: &str) -> SyncResult;

    /// Summaries of all sessions, newest first
    async fn list_sessions(&self) -> Result<Vec<SessionMetadata>>;

    /// Whether a session exists
    async fn has_session(&self, session_id: &str) -> Result<bool>;

    /// The session currently being worked on
    async fn active_session_id(&self) -> Result<Option<String>>;

    /// Point at a session
    async fn set_active_session_id(&self, session_id: &str) -> Result<()>;

    /// Forget the active session
    async fn clear_active_session_id(&self) -> Result<()>;

    /// Remove every session and the active pointer
    async fn clear_all(&self) -> SyncResult;

    /// Cheap reachability probe; never errors, bounded in time
    async fn health_check(&self) -> bool;
}

/// Sort metadata newest first
pub fn sort_newest_first(sessions: &mut [SessionMetadata]) {
    sessions.sort_by(|a, b| {
        b.last_modified
            .cmp(&a.last_modified)
            .then_with(|| a.session_id.cmp(&b.session_id))
    });
}

/// Typed, ordered set of adapters (highest priority first)
#[derive(Clone, Default)]
pub struct AdapterRegistry {
    adapters: Vec<Arc<dyn StorageAdapter>>,
}

impl AdapterRegistry {
    /// Create an empty registry
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an adapter, keeping priority order (stable for equal priorities)
    #[must_use]
    pub fn with(mut self, adapter: Arc<dyn StorageAdapter>) -> Self {
        self.register(adapter);
        self
    }

    /// Add an adapter in place
    pub fn register(&mut self, adapter: Arc<dyn StorageAdapter>) {
        let position = self
            .adapters
            .iter()
            .position(|existing| existing.priority() < adapter.priority())
            .unwrap_or(self.adapters.len());
        self.adapters.insert(position, adapter);
    }

    /// All adapters, highest priority first
    #[must_use]
    pub fn adapters(&self) -> &[Arc<dyn StorageAdapter>] {
        &self.adapters
    }

    /// Adapters of one kind, highest priority first
    pub fn of_kind(&self, kind: AdapterKind) -> impl Iterator<Item = &Arc<dyn StorageAdapter>> {
        self.adapters.iter().filter(move |a| a.kind() == kind)
    }

    /// Number of registered adapters
    #[must_use]
    pub fn len(&self) -> usize {
        self.adapters.len()
    }

    /// Whether no adapter is registered
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.adapters.is_empty()
    }
}

impl fmt::Debug for AdapterRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(
                self.adapters
                    .iter()
                    .map(|a| format!("{}({}, p={})", a.name(), a.kind(), a.priority())),
            )
            .finish()
    }
}
