//! On-device storage adapter
//!
//! Backed by a synchronous [`KeyValueStore`]. Layout under a key prefix
//! (`labelsync` by default):
//!
//! - `<prefix>:session:<id>` - one tagged record per session
//! - `<prefix>:sessions` - ordered index of known session ids
//! - `<prefix>:active-session` - active session pointer
//!
//! The store cannot list keys, so the index is authoritative for listing.
//! An index entry without a record, a record without an index entry, or an
//! undecodable record is corruption and is healed by treating the session as
//! absent.
//!
//! Index updates are read-modify-write sequences across several store calls,
//! so every operation runs under the adapter's store guard.

mod kv;


pub use kv::{FileKvStore, KeyValueStore, MemoryKvStore};

#[cfg(test)]
pub use kv::MockKeyValueStore;

use crate::adapter::{sort_newest_first, AdapterKind, StorageAdapter};
use crate::codec::{self, ValueKind};
use crate::error::{Error, Result};
use crate::model::{PersistedState, SaveRequest, SessionMetadata, StorageOrigin, SyncResult};
use async_trait::async_trait;
use chrono::Utc;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, info, warn};

/// Default key prefix
pub const DEFAULT_KEY_PREFIX: &str = "labelsync";

/// Priority of the on-device adapter (lowest: fallback of last resort)
pub const LOCAL_PRIORITY: u8 = 1;

/// Storage adapter over a synchronous key-value store
pub struct LocalAdapter {
    store: Arc<dyn KeyValueStore>,
    prefix: String,
    origin: StorageOrigin,
    name: String,
    guard: Mutex<()>,
}

impl LocalAdapter {
    /// Create an adapter over `store`
    #[must_use]
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self {
            store,
            prefix: DEFAULT_KEY_PREFIX.to_string(),
            origin: StorageOrigin::Local,
            name: "local".to_string(),
            guard: Mutex::new(()),
        }
    }

    /// Create an adapter over a fresh in-memory store
    #[must_use]
    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryKvStore::new()))
    }

    /// Namespace keys under `prefix`
    #[must_use]
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    /// Origin written into record metadata (the remote service stores
    /// through this adapter with [`StorageOrigin::Remote`])
    #[must_use]
    pub fn with_origin(mut self, origin: StorageOrigin) -> Self {
        self.origin = origin;
        self
    }

    /// Adapter name used in logs
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Serialize store access for one operation
    fn lock(&self) -> MutexGuard<'_, ()> {
        self.guard.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn record_key(&self, session_id: &str) -> String {
        format!("{}:session:{}", self.prefix, session_id)
    }

    fn index_key(&self) -> String {
        format!("{}:sessions", self.prefix)
    }

    fn active_key(&self) -> String {
        format!("{}:active-session", self.prefix)
    }

    fn probe_key(&self) -> String {
        format!("{}:health-probe", self.prefix)
    }

    fn read_index(&self) -> Result<Vec<String>> {
        let Some(raw) = self.store.get(&self.index_key())? else {
            return Ok(Vec::new());
        };

        match codec::decode_index(&raw) {
            Ok(ids) => Ok(ids),
            Err(e) => {
                warn!(error = %e, "Session index unreadable, resetting");
                self.write_index(&[])?;
                Ok(Vec::new())
            }
        }
    }

    fn write_index(&self, ids: &[String]) -> Result<()> {
        self.store.set(&self.index_key(), &codec::encode_index(ids)?)
    }

    /// Drop a session id from the index, best effort
    fn forget(&self, session_id: &str) {
        let result = self.read_index().and_then(|mut ids| {
            let before = ids.len();
            ids.retain(|id| id != session_id);
            if ids.len() == before {
                return Ok(());
            }
            self.write_index(&ids)
        });
        if let Err(e) = result {
            warn!(session_id = %session_id, error = %e, "Failed to drop index entry");
        }
    }

    /// Read and decode a record; an undecodable record is removed
    fn read_record(&self, session_id: &str) -> Result<Option<PersistedState>> {
        let key = self.record_key(session_id);
        let Some(raw) = self.store.get(&key)? else {
            return Ok(None);
        };

        match codec::decode_record(&raw) {
            Ok(record) if record.session_id == session_id => Ok(Some(record)),
            Ok(record) => {
                self.heal_record(
                    session_id,
                    &format!("record holds session {}", record.session_id),
                );
                Ok(None)
            }
            Err(e) => {
                self.heal_record(session_id, &e.to_string());
                Ok(None)
            }
        }
    }

    fn heal_record(&self, session_id: &str, reason: &str) {
        warn!(session_id = %session_id, reason = %reason, "Corrupted session record, treating as absent");
        if let Err(e) = self.store.remove(&self.record_key(session_id)) {
            warn!(session_id = %session_id, error = %e, "Failed to remove corrupted record");
        }
        self.forget(session_id);
    }

    /// Look a session up, reconciling index and record
    fn resolve(&self, session_id: &str) -> Result<Option<PersistedState>> {
        let indexed = self.read_index()?.iter().any(|id| id == session_id);
        let record = self.read_record(session_id)?;

        match (indexed, record) {
            (true, Some(record)) => Ok(Some(record)),
            (true, None) => {
                warn!(session_id = %session_id, "Index entry without record, dropping entry");
                self.forget(session_id);
                Ok(None)
            }
            (false, Some(_)) => {
                warn!(session_id = %session_id, "Record missing from index, treating as absent");
                self.store.remove(&self.record_key(session_id))?;
                Ok(None)
            }
            (false, None) => Ok(None),
        }
    }

    /// Write a record and its index entry; the record is rolled back if the
    /// index cannot be updated
    fn write(&self, record: &PersistedState, activate: bool) -> Result<SessionMetadata> {
        let key = self.record_key(&record.session_id);
        let encoded = codec::encode_record(record)?;
        let previous = self.store.get(&key)?;

        self.store.set(&key, &encoded)?;

        let index_update = self.read_index().and_then(|mut ids| {
            if ids.iter().any(|id| id == &record.session_id) {
                return Ok(());
            }
            ids.push(record.session_id.clone());
            self.write_index(&ids)
        });

        if let Err(e) = index_update {
            let rollback = match previous {
                Some(raw) => self.store.set(&key, &raw),
                None => self.store.remove(&key),
            };
            if let Err(rollback_err) = rollback {
                warn!(
                    session_id = %record.session_id,
                    error = %rollback_err,
                    "Rollback after failed index update failed"
                );
            }
            return Err(e);
        }

        if activate {
            if let Err(e) = self.write_active(&record.session_id) {
                warn!(session_id = %record.session_id, error = %e, "Failed to update active session pointer");
            }
        }

        Ok(record.metadata.clone())
    }

    fn write_active(&self, session_id: &str) -> Result<()> {
        self.store
            .set(&self.active_key(), &codec::encode_pointer(session_id)?)
    }

    fn read_active(&self) -> Result<Option<String>> {
        let Some(raw) = self.store.get(&self.active_key())? else {
            return Ok(None);
        };
        match codec::decode_pointer(&raw) {
            Ok(id) => Ok(Some(id)),
            Err(e) => {
                warn!(error = %e, "Active session pointer unreadable, clearing");
                self.store.remove(&self.active_key())?;
                Ok(None)
            }
        }
    }

    fn save_request(&self, request: &SaveRequest) -> Result<SessionMetadata> {
        let previous = self.resolve(&request.session_id)?;
        let record = PersistedState::from_request(
            request,
            previous.map(|p| p.created_at),
            self.origin,
        );
        self.write(&self.confirm(record), true)
    }

    /// A copy stored server-side counts as confirmed by the remote
    fn confirm(&self, mut record: PersistedState) -> PersistedState {
        if self.origin == StorageOrigin::Remote {
            record.metadata.last_synced_at = Some(Utc::now());
        }
        record
    }

    fn remove_session(&self, session_id: &str) -> Result<()> {
        self.store.remove(&self.record_key(session_id))?;

        let mut ids = self.read_index()?;
        let before = ids.len();
        ids.retain(|id| id != session_id);
        if ids.len() != before {
            self.write_index(&ids)?;
        }

        if self.read_active()?.as_deref() == Some(session_id) {
            self.store.remove(&self.active_key())?;
        }
        Ok(())
    }

    fn collect_sessions(&self) -> Result<Vec<SessionMetadata>> {
        let ids = self.read_index()?;
        let mut sessions = Vec::with_capacity(ids.len());
        let mut healthy_ids = Vec::with_capacity(ids.len());

        for id in &ids {
            match self.read_record(id)? {
                Some(record) => {
                    sessions.push(record.metadata);
                    healthy_ids.push(id.clone());
                }
                None => {
                    warn!(session_id = %id, "Index entry without record, dropping entry");
                }
            }
        }

        if healthy_ids.len() != ids.len() {
            self.write_index(&healthy_ids)?;
        }

        sort_newest_first(&mut sessions);
        Ok(sessions)
    }

    fn wipe(&self) -> Result<usize> {
        let ids = self.read_index()?;
        for id in &ids {
            self.store.remove(&self.record_key(id))?;
        }
        self.store.remove(&self.index_key())?;
        self.store.remove(&self.active_key())?;
        Ok(ids.len())
    }

    fn probe(&self) -> Result<bool> {
        let key = self.probe_key();
        let token = uuid::Uuid::new_v4().to_string();
        let encoded = codec::encode(ValueKind::Probe, &token)?;

        self.store.set(&key, &encoded)?;
        let read_back = self.store.get(&key)?;
        self.store.remove(&key)?;

        let Some(raw) = read_back else {
            return Err(Error::Storage("probe value vanished".to_string()));
        };
        let decoded: String = codec::decode(ValueKind::Probe, &raw)?;
        Ok(decoded == token)
    }
}

#[async_trait]
impl StorageAdapter for LocalAdapter {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> AdapterKind {
        AdapterKind::Local
    }

    fn priority(&self) -> u8 {
        LOCAL_PRIORITY
    }

    async fn save_state(&self, request: &SaveRequest) -> SyncResult {
        let result = {
            let _guard = self.lock();
            self.save_request(request)
        };
        match result {
            Ok(metadata) => {
                debug!(adapter = %self.name, session_id = %request.session_id, kind = %request.kind, "Session saved");
                SyncResult::ok(&request.session_id).with_metadata(metadata)
            }
            Err(e) => {
                warn!(adapter = %self.name, session_id = %request.session_id, error = %e, "Session save failed");
                SyncResult::from_error(&request.session_id, &e)
            }
        }
    }

    async fn save_record(&self, record: &PersistedState) -> SyncResult {
        let record = self.confirm(record.clone().relabel(self.origin));
        let result = {
            let _guard = self.lock();
            self.write(&record, false)
        };
        match result {
            Ok(metadata) => {
                debug!(adapter = %self.name, session_id = %record.session_id, "Session record replicated");
                SyncResult::ok(&record.session_id).with_metadata(metadata)
            }
            Err(e) => {
                warn!(adapter = %self.name, session_id = %record.session_id, error = %e, "Session replication failed");
                SyncResult::from_error(&record.session_id, &e)
            }
        }
    }

    async fn load_state(&self, session_id: &str) -> Result<Option<PersistedState>> {
        let _guard = self.lock();
        self.resolve(session_id)
    }

    async fn delete_session(&self, session_id: &str) -> SyncResult {
        let result = {
            let _guard = self.lock();
            self.remove_session(session_id)
        };
        match result {
            Ok(()) => {
                debug!(adapter = %self.name, session_id = %session_id, "Session deleted");
                SyncResult::ok(session_id)
            }
            Err(e) => {
                warn!(adapter = %self.name, session_id = %session_id, error = %e, "Session delete failed");
                SyncResult::from_error(session_id, &e)
            }
        }
    }

    async fn list_sessions(&self) -> Result<Vec<SessionMetadata>> {
        let _guard = self.lock();
        self.collect_sessions()
    }

    async fn has_session(&self, session_id: &str) -> Result<bool> {
        let _guard = self.lock();
        Ok(self.resolve(session_id)?.is_some())
    }

    async fn active_session_id(&self) -> Result<Option<String>> {
        let _guard = self.lock();
        self.read_active()
    }

    async fn set_active_session_id(&self, session_id: &str) -> Result<()> {
        let _guard = self.lock();
        self.write_active(session_id)
    }

    async fn clear_active_session_id(&self) -> Result<()> {
        let _guard = self.lock();
        self.store.remove(&self.active_key())
    }

    async fn clear_all(&self) -> SyncResult {
        let result = {
            let _guard = self.lock();
            self.wipe()
        };
        match result {
            Ok(count) => {
                info!(adapter = %self.name, count = count, "Cleared all sessions");
                SyncResult::ok("all")
            }
            Err(e) => {
                warn!(adapter = %self.name, error = %e, "Clear all failed");
                SyncResult::from_error("all", &e)
            }
        }
    }

    async fn health_check(&self) -> bool {
        let result = {
            let _guard = self.lock();
            self.probe()
        };
        match result {
            Ok(healthy) => healthy,
            Err(e) => {
                warn!(adapter = %self.name, error = %e, "Local health probe failed");
                false
            }
        }
    }
}
