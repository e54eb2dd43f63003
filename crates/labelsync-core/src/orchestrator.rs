//! Sync orchestrator
//!
//! Composes the registered adapters according to the configured
//! [`SyncStrategy`](crate::config::SyncStrategy): saves go to the strategy's
//! adapters, loads reconcile diverging copies by policy, and writes accepted
//! on-device but not yet remotely are queued and pushed in the background.
//!
//! Deletes that some adapter could not apply stay queued and are retried
//! like pushes; until they land the session reads as absent.
//!
//! Every public operation reports failure as data (a failed [`SyncResult`],
//! `None`, an empty list); nothing here returns an error once the
//! orchestrator is built.
//!
//! ```ignore
//! let registry = AdapterRegistry::new()
//!     .with(Arc::new(LocalAdapter::new(store)))
//!     .with(Arc::new(RemoteAdapter::from_config(&config)?));
//! let sync = SyncOrchestrator::new(registry, config)?;
//! sync.start();
//! sync.save_state("s1", payload, "data", SaveKind::Data).await;
//! ```

pub mod conflict;
pub mod queue;
pub mod strategy;
mod worker;


pub use conflict::LoadedCopy;
pub use queue::{PendingOp, PendingQueue, PendingSync};
pub use strategy::{select_adapters, write_mode, WriteMode};

use crate::adapter::{AdapterKind, AdapterRegistry, StorageAdapter};
use crate::config::SyncConfig;
use crate::error::{Error, Result};
use crate::events::{EventBus, SyncEvent};
use crate::migration::{migrate_local_to_remote, MigrationReport};
use crate::model::{
    PersistedState, SaveKind, SaveRequest, SessionMetadata, SessionPayload, StorageOrigin,
    SyncResult, SyncStatus,
};
use crate::utils::{retry_write, RetryPolicy};
use chrono::{DateTime, Utc};
use futures::future::join_all;
use serde::Serialize;
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::{broadcast, Mutex as AsyncMutex};
use tokio::task::{JoinHandle, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Reachability of one adapter
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AdapterHealth {
    /// Adapter name
    pub name: String,
    /// Adapter kind (`local` or `remote`)
    pub kind: String,
    /// Adapter priority
    pub priority: u8,
    /// Health probe outcome
    pub healthy: bool,
}

/// Outcome of a full resync
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncReport {
    /// Sessions looked at
    pub examined: usize,
    /// Sessions copied to at least one adapter
    pub pushed: usize,
    /// Sessions every adapter already held
    pub up_to_date: usize,
    /// Sessions that could not be brought in line, with the reason
    pub failed: Vec<(String, String)>,
}

struct Worker {
    shutdown: CancellationToken,
    handle: JoinHandle<()>,
}

struct Inner {
    registry: AdapterRegistry,
    active: Vec<Arc<dyn StorageAdapter>>,
    config: SyncConfig,
    retry: RetryPolicy,
    queue: PendingQueue,
    events: EventBus,
    pushes: Mutex<JoinSet<()>>,
    worker: Mutex<Option<Worker>>,
    gates: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

impl Drop for Inner {
    fn drop(&mut self) {
        let worker = self
            .worker
            .get_mut()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
        if let Some(worker) = worker {
            worker.shutdown.cancel();
        }
    }
}

/// Summary of one session across the active adapters
struct MergedSession {
    metadata: SessionMetadata,
    holders: usize,
    on_remote: bool,
}

/// Caller-owned sync engine
///
/// Cheap to clone; clones share adapters, queue, events and tasks.
#[derive(Clone)]
pub struct SyncOrchestrator {
    inner: Arc<Inner>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl SyncOrchestrator {
    /// Build an orchestrator over `registry`
    ///
    /// # Errors
    ///
    /// `Unimplemented` when the merge policy is selected, `Configuration`
    /// when the settings are unusable or the strategy selects no adapter
    pub fn new(registry: AdapterRegistry, config: SyncConfig) -> Result<Self> {
        config.validate()?;

        let active = select_adapters(&registry, config.strategy);
        if active.is_empty() {
            return Err(Error::Configuration(format!(
                "strategy {} selects no adapters from {:?}",
                config.strategy, registry
            )));
        }

        info!(
            strategy = %config.strategy,
            conflict_resolution = %config.conflict_resolution,
            adapters = ?registry,
            "Sync orchestrator created"
        );

        Ok(Self {
            inner: Arc::new(Inner {
                retry: config.retry_policy(),
                registry,
                active,
                config,
                queue: PendingQueue::new(),
                events: EventBus::default(),
                pushes: Mutex::new(JoinSet::new()),
                worker: Mutex::new(None),
                gates: Mutex::new(HashMap::new()),
            }),
        })
    }

    /// Active configuration
    #[must_use]
    pub fn config(&self) -> &SyncConfig {
        &self.inner.config
    }

    /// Adapters the strategy uses, in order
    #[must_use]
    pub fn active_adapters(&self) -> &[Arc<dyn StorageAdapter>] {
        &self.inner.active
    }

    /// Receive sync events, background push failures included
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<SyncEvent> {
        self.inner.events.subscribe()
    }

    /// Start the reconciliation worker when auto-sync is enabled
    ///
    /// Returns whether a worker is running afterwards. Must be called from
    /// within a Tokio runtime. The worker stops on [`shutdown`](Self::shutdown)
    /// or once the last handle to this orchestrator is dropped.
    pub fn start(&self) -> bool {
        if !self.inner.config.auto_sync {
            debug!("Auto-sync disabled, worker not started");
            return false;
        }

        let mut slot = lock(&self.inner.worker);
        if slot.as_ref().is_some_and(|w| !w.handle.is_finished()) {
            return true;
        }

        let shutdown = CancellationToken::new();
        let handle = tokio::spawn(worker::run(
            Arc::downgrade(&self.inner),
            self.inner.config.sync_interval(),
            shutdown.clone(),
        ));
        *slot = Some(Worker { shutdown, handle });
        true
    }

    /// Whether the reconciliation worker is running
    #[must_use]
    pub fn is_running(&self) -> bool {
        lock(&self.inner.worker)
            .as_ref()
            .is_some_and(|w| !w.handle.is_finished())
    }

    /// Stop the worker and abort in-flight background pushes
    ///
    /// Queued entries are kept.
    pub async fn shutdown(&self) {
        let worker = lock(&self.inner.worker).take();
        if let Some(worker) = worker {
            worker.shutdown.cancel();
            if let Err(e) = worker.handle.await {
                if e.is_panic() {
                    error!(error = %e, "Sync worker panicked");
                }
            }
        }

        let mut pushes = std::mem::take(&mut *lock(&self.inner.pushes));
        pushes.abort_all();
        while pushes.join_next().await.is_some() {}
        info!("Sync orchestrator stopped");
    }

    /// Stop everything and forget queued pushes
    pub async fn reset(&self) {
        self.shutdown().await;
        self.inner.queue.clear().await;
    }

    // -- saves ------------------------------------------------------------

    /// Save a session snapshot
    ///
    /// The snapshot is stamped once, so every adapter written for this save
    /// records the same `updatedAt`.
    pub async fn save_state(
        &self,
        session_id: impl Into<String>,
        payload: SessionPayload,
        active_tab: impl Into<String>,
        kind: SaveKind,
    ) -> SyncResult {
        self.save_request(SaveRequest::new(session_id, payload, active_tab, kind))
            .await
    }

    /// Save a pre-stamped request
    ///
    /// A save supersedes an unfinished delete of the same session.
    pub async fn save_request(&self, request: SaveRequest) -> SyncResult {
        let gate = if self.inner.queue.is_deleted(&request.session_id).await {
            Some(self.session_gate(&request.session_id))
        } else {
            None
        };
        let _held = match &gate {
            Some(gate) => Some(gate.lock().await),
            None => None,
        };

        let outcome = match write_mode(self.inner.config.strategy) {
            WriteMode::Sequential => self.write_sequential(&request).await,
            WriteMode::Parallel => self.write_parallel(&request).await,
        };

        if outcome.result.success && gate.is_some() {
            if let Some(deleted_at) = self.inner.queue.cancel_delete(&request.session_id).await {
                debug!(session_id = %request.session_id, deleted_at = %deleted_at, "Save supersedes pending delete");
            }
        }

        if let Some(adapter) = &outcome.accepted_by {
            self.inner.events.publish(SyncEvent::Saved {
                session_id: request.session_id.clone(),
                adapter: adapter.name().to_string(),
                updated_at: request.stamped_at,
            });
        }

        let mut result = outcome.result;
        if outcome.needs_push {
            if let Some(local) = &outcome.local {
                self.enqueue_from(local.as_ref(), &request).await;
                if let Some(metadata) = result.metadata.as_mut() {
                    metadata.sync_status = SyncStatus::Pending;
                }
            }
        }

        result
    }

    async fn write_sequential(&self, request: &SaveRequest) -> WriteOutcome {
        let mut last_failure = None;

        for adapter in &self.inner.active {
            let (result, attempts) =
                retry_write(&self.inner.retry, || adapter.save_state(request)).await;

            if result.success {
                debug!(
                    adapter = %adapter.name(),
                    session_id = %request.session_id,
                    attempts = attempts,
                    "Save accepted"
                );
                let local = (adapter.kind() == AdapterKind::Local).then(|| adapter.clone());
                let needs_push = local.is_some() && self.has_remotes();
                return WriteOutcome {
                    result,
                    accepted_by: Some(adapter.clone()),
                    local,
                    needs_push,
                };
            }

            warn!(
                adapter = %adapter.name(),
                session_id = %request.session_id,
                error = result.error.as_deref().unwrap_or("unknown"),
                "Save rejected, trying next adapter"
            );
            last_failure = Some(result);
        }

        WriteOutcome::failed(last_failure, &request.session_id)
    }

    async fn write_parallel(&self, request: &SaveRequest) -> WriteOutcome {
        let policy = &self.inner.retry;
        let results = join_all(self.inner.active.iter().map(|adapter| async move {
            retry_write(policy, || adapter.save_state(request)).await.0
        }))
        .await;

        let accepted = |kind: AdapterKind| {
            self.inner
                .active
                .iter()
                .zip(&results)
                .filter(move |(adapter, _)| adapter.kind() == kind)
                .map(|(adapter, result)| (adapter, result.success))
        };
        let local = accepted(AdapterKind::Local)
            .find(|(_, ok)| *ok)
            .map(|(adapter, _)| adapter.clone());
        let remote_missed = accepted(AdapterKind::Remote).any(|(_, ok)| !ok);

        let first_success = self
            .inner
            .active
            .iter()
            .zip(&results)
            .find(|(_, result)| result.success);

        match first_success {
            Some((adapter, result)) => WriteOutcome {
                result: result.clone(),
                accepted_by: Some(adapter.clone()),
                needs_push: local.is_some() && remote_missed,
                local,
            },
            None => WriteOutcome::failed(results.last().cloned(), &request.session_id),
        }
    }

    fn has_remotes(&self) -> bool {
        self.remotes().next().is_some()
    }

    fn remotes(&self) -> impl Iterator<Item = &Arc<dyn StorageAdapter>> {
        self.inner
            .active
            .iter()
            .filter(|a| a.kind() == AdapterKind::Remote)
    }

    /// Queue the record `local` now holds and push it in the background
    async fn enqueue_from(&self, local: &dyn StorageAdapter, request: &SaveRequest) {
        let record = match local.load_state(&request.session_id).await {
            Ok(Some(record)) if record.updated_at == request.stamped_at => record,
            _ => PersistedState::from_request(request, None, StorageOrigin::Local),
        };
        self.enqueue(record).await;
    }

    async fn enqueue(&self, record: PersistedState) {
        let session_id = record.session_id.clone();
        let updated_at = record.updated_at;
        self.inner.queue.enqueue(record).await;
        debug!(session_id = %session_id, "Queued for remote push");
        self.inner.events.publish(SyncEvent::Queued {
            session_id: session_id.clone(),
            updated_at,
        });

        let this = self.clone();
        self.spawn_supervised(async move {
            this.push_session(&session_id).await;
        });
    }

    // -- background pushes -------------------------------------------------

    fn spawn_supervised<F>(&self, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let mut pushes = lock(&self.inner.pushes);
        Self::reap(&mut pushes);
        pushes.spawn(task);
    }

    fn reap(pushes: &mut JoinSet<()>) {
        while let Some(finished) = pushes.try_join_next() {
            if let Err(e) = finished {
                if e.is_panic() {
                    error!(error = %e, "Background push panicked");
                }
            }
        }
    }

    /// Collect finished background tasks, logging panics
    pub(crate) fn reap_pushes(&self) {
        Self::reap(&mut lock(&self.inner.pushes));
    }

    /// Per-session gate serializing queued work with deletes
    fn session_gate(&self, session_id: &str) -> Arc<AsyncMutex<()>> {
        let mut gates = lock(&self.inner.gates);
        gates.retain(|_, gate| Arc::strong_count(gate) > 1);
        gates.entry(session_id.to_string()).or_default().clone()
    }

    /// Apply the queued entry for one session
    ///
    /// Returns whether the entry was settled.
    async fn push_session(&self, session_id: &str) -> bool {
        let gate = self.session_gate(session_id);
        let _held = gate.lock().await;

        let Some(entry) = self.inner.queue.get(session_id).await else {
            return false;
        };
        match entry.op {
            PendingOp::Push { record } => self.push_record(record).await,
            PendingOp::Delete { deleted_at } => self.apply_delete(session_id, deleted_at).await,
        }
    }

    /// Push a queued record to every active remote
    async fn push_record(&self, record: PersistedState) -> bool {
        let session_id = record.session_id.as_str();
        let remotes: Vec<_> = self.remotes().cloned().collect();
        if remotes.is_empty() {
            return self.inner.queue.settle(session_id, record.updated_at).await;
        }

        let mut failures = Vec::new();
        let mut attempts_used = 0;
        let mut permanent = false;
        for remote in &remotes {
            let (result, attempts) =
                retry_write(&self.inner.retry, || remote.save_record(&record)).await;
            if !result.success {
                attempts_used = attempts_used.max(attempts);
                permanent |= result.permanent;
                failures.push(format!(
                    "{}: {}",
                    remote.name(),
                    result.error.unwrap_or_else(|| "rejected".to_string())
                ));
            }
        }

        if failures.is_empty() {
            let settled = self.inner.queue.settle(session_id, record.updated_at).await;
            info!(session_id = %session_id, settled = settled, "Pushed to remote");
            self.inner.events.publish(SyncEvent::Pushed {
                session_id: session_id.to_string(),
                updated_at: record.updated_at,
            });
            return settled;
        }

        // A permanent rejection counts as a used-up push
        if permanent {
            attempts_used = attempts_used.max(self.inner.config.retry_attempts);
        }
        self.record_failure(session_id, record.updated_at, attempts_used, failures)
            .await;
        false
    }

    /// Retry a queued delete on every active adapter
    ///
    /// A copy newer than the delete belongs to a later save and is kept.
    async fn apply_delete(&self, session_id: &str, deleted_at: DateTime<Utc>) -> bool {
        let policy = &self.inner.retry;
        let outcomes = join_all(self.inner.active.iter().map(|adapter| async move {
            if let Ok(Some(record)) = adapter.load_state(session_id).await {
                if record.updated_at > deleted_at {
                    debug!(adapter = %adapter.name(), session_id = %session_id, "Copy is newer than the delete, keeping it");
                    return (SyncResult::ok(session_id), 0);
                }
            }
            retry_write(policy, || adapter.delete_session(session_id)).await
        }))
        .await;

        let mut failures = Vec::new();
        let mut attempts_used = 0;
        for (adapter, (result, attempts)) in self.inner.active.iter().zip(outcomes) {
            if !result.success {
                attempts_used = attempts_used.max(attempts);
                failures.push(format!(
                    "{}: {}",
                    adapter.name(),
                    result.error.unwrap_or_else(|| "rejected".to_string())
                ));
            }
        }

        if failures.is_empty() {
            let settled = self.inner.queue.settle_delete(session_id, deleted_at).await;
            info!(session_id = %session_id, settled = settled, "Pending delete applied");
            self.inner.events.publish(SyncEvent::Deleted {
                session_id: session_id.to_string(),
            });
            return settled;
        }

        self.record_failure(session_id, deleted_at, attempts_used, failures)
            .await;
        false
    }

    async fn record_failure(
        &self,
        session_id: &str,
        version: DateTime<Utc>,
        attempts: u32,
        failures: Vec<String>,
    ) {
        let error = failures.join("; ");
        let total = self
            .inner
            .queue
            .record_failure(session_id, version, attempts, error.clone())
            .await
            .unwrap_or(attempts);
        warn!(
            session_id = %session_id,
            attempts = total,
            error = %error,
            "Remote work failed, keeping entry queued"
        );
        self.inner.events.publish(SyncEvent::PushFailed {
            session_id: session_id.to_string(),
            attempts: total,
            error,
        });
    }

    /// Push every queued entry once
    ///
    /// Returns how many entries were settled. Runs on every worker tick and
    /// serves as the manual retry.
    pub async fn drain_pending(&self) -> usize {
        let mut settled = 0;
        for entry in self.inner.queue.snapshot().await {
            if self.push_session(entry.session_id()).await {
                settled += 1;
            }
        }
        settled
    }

    /// Number of sessions waiting for a remote push
    pub async fn pending_count(&self) -> usize {
        self.inner.queue.len().await
    }

    /// Queue entry for a session
    pub async fn pending_entry(&self, session_id: &str) -> Option<PendingSync> {
        self.inner.queue.get(session_id).await
    }

    /// Replication state of a session, as far as the pending queue knows
    ///
    /// The queue lives in memory; [`list_sessions`](Self::list_sessions)
    /// also reports device-only sessions as pending.
    pub async fn sync_status(&self, session_id: &str) -> SyncStatus {
        self.inner
            .queue
            .status(session_id, self.inner.config.retry_attempts)
            .await
    }

    // -- loads -------------------------------------------------------------

    async fn gather(&self, session_id: &str) -> Vec<LoadedCopy> {
        let loads = join_all(self.inner.active.iter().map(|adapter| async move {
            match adapter.load_state(session_id).await {
                Ok(Some(record)) => Some(LoadedCopy {
                    adapter: adapter.clone(),
                    record,
                }),
                Ok(None) => None,
                Err(e) => {
                    warn!(adapter = %adapter.name(), session_id = %session_id, error = %e, "Load failed, ignoring adapter");
                    None
                }
            }
        }))
        .await;
        loads.into_iter().flatten().collect()
    }

    /// Load a session, reconciling diverging copies
    ///
    /// `None` when no adapter holds the session.
    pub async fn load_state(&self, session_id: &str) -> Option<PersistedState> {
        if self.inner.queue.is_deleted(session_id).await {
            debug!(session_id = %session_id, "Delete pending, reporting absent");
            return None;
        }
        let copies = self.gather(session_id).await;

        match copies.len() {
            0 => None,
            1 => copies.into_iter().next().map(|c| c.record),
            _ if !conflict::is_divergent(&copies) => {
                let index = conflict::preferred(&copies)?;
                copies.into_iter().nth(index).map(|c| c.record)
            }
            _ => self.resolve_conflict(session_id, copies),
        }
    }

    fn resolve_conflict(&self, session_id: &str, copies: Vec<LoadedCopy>) -> Option<PersistedState> {
        let policy = self.inner.config.conflict_resolution;
        warn!(session_id = %session_id, copies = copies.len(), policy = %policy, "Conflicting session copies");
        self.inner.events.publish(SyncEvent::ConflictDetected {
            session_id: session_id.to_string(),
            copies: copies.len(),
        });

        let index = match conflict::resolve(policy, &copies) {
            Ok(index) => index,
            Err(e) => {
                error!(session_id = %session_id, error = %e, "Conflict could not be resolved");
                return None;
            }
        };

        let winner = copies[index].clone();
        self.inner.events.publish(SyncEvent::ConflictResolved {
            session_id: session_id.to_string(),
            policy,
            winner: winner.adapter.name().to_string(),
            updated_at: winner.record.updated_at,
        });

        let stale: Vec<Arc<dyn StorageAdapter>> = copies
            .iter()
            .filter(|c| !c.record.same_version(&winner.record))
            .map(|c| c.adapter.clone())
            .collect();
        self.spawn_repair(winner.clone(), stale);

        Some(winner.record)
    }

    /// Write the winning copy over stale ones in the background
    ///
    /// Skipped when the session was deleted or the winner changed meanwhile.
    fn spawn_repair(&self, winner: LoadedCopy, stale: Vec<Arc<dyn StorageAdapter>>) {
        let this = self.clone();
        self.spawn_supervised(async move {
            let record = winner.record;
            let gate = this.session_gate(&record.session_id);
            let _held = gate.lock().await;

            if this.inner.queue.is_deleted(&record.session_id).await {
                debug!(session_id = %record.session_id, "Delete pending, repair skipped");
                return;
            }
            match winner.adapter.load_state(&record.session_id).await {
                Ok(Some(current)) if current.same_version(&record) => {}
                _ => {
                    debug!(session_id = %record.session_id, "Winning copy changed, repair skipped");
                    return;
                }
            }

            let retry = &this.inner.retry;
            let events = &this.inner.events;
            for adapter in stale {
                let (result, attempts) = retry_write(retry, || adapter.save_record(&record)).await;
                if result.success {
                    debug!(adapter = %adapter.name(), session_id = %record.session_id, "Stale copy repaired");
                } else {
                    let error = result.error.unwrap_or_else(|| "rejected".to_string());
                    warn!(adapter = %adapter.name(), session_id = %record.session_id, error = %error, "Stale copy repair failed");
                    events.publish(SyncEvent::PushFailed {
                        session_id: record.session_id.clone(),
                        attempts,
                        error,
                    });
                }
            }
        });
    }

    // -- other operations --------------------------------------------------

    /// Delete a session everywhere
    ///
    /// Succeeds only when every active adapter applied the delete (deleting
    /// a missing session succeeds). Otherwise the delete stays queued, the
    /// session reads as absent, and the worker retries the adapters that
    /// failed.
    pub async fn delete_session(&self, session_id: &str) -> SyncResult {
        let gate = self.session_gate(session_id);
        let _held = gate.lock().await;

        let deleted_at = self.inner.queue.enqueue_delete(session_id).await;
        let results = join_all(
            self.inner
                .active
                .iter()
                .map(|adapter| adapter.delete_session(session_id)),
        )
        .await;

        let failures: Vec<String> = self
            .inner
            .active
            .iter()
            .zip(&results)
            .filter(|(_, result)| !result.success)
            .map(|(adapter, result)| {
                let error = result.error.as_deref().unwrap_or("unknown");
                warn!(adapter = %adapter.name(), session_id = %session_id, error = %error, "Delete failed");
                format!("{}: {}", adapter.name(), error)
            })
            .collect();

        if failures.is_empty() {
            self.inner.queue.settle_delete(session_id, deleted_at).await;
            self.inner.events.publish(SyncEvent::Deleted {
                session_id: session_id.to_string(),
            });
            return SyncResult::ok(session_id);
        }

        let error = failures.join("; ");
        self.inner
            .queue
            .record_failure(session_id, deleted_at, 1, error.clone())
            .await;
        info!(session_id = %session_id, "Delete queued for retry");
        self.inner.events.publish(SyncEvent::DeleteQueued {
            session_id: session_id.to_string(),
            error: error.clone(),
        });
        SyncResult::failed(
            session_id,
            format!("delete incomplete, queued for retry: {}", error),
        )
    }

    /// Summaries across every active adapter, newest first
    ///
    /// A session held by more than one adapter reports `hybrid` origin. The
    /// sync status comes from the pending queue, except that a session no
    /// remote listed is `pending` while the strategy has remotes. Sessions
    /// with an unfinished delete are left out.
    pub async fn list_sessions(&self) -> Vec<SessionMetadata> {
        let merged = self.merged_sessions().await;
        let has_remotes = self.has_remotes();

        let mut sessions = Vec::with_capacity(merged.len());
        for merged in merged.into_values() {
            let mut metadata = merged.metadata;
            if self.inner.queue.is_deleted(&metadata.session_id).await {
                continue;
            }
            if merged.holders > 1 {
                metadata.storage_origin = StorageOrigin::Hybrid;
            }
            metadata.sync_status = match self.sync_status(&metadata.session_id).await {
                SyncStatus::Synced if has_remotes && !merged.on_remote => SyncStatus::Pending,
                status => status,
            };
            sessions.push(metadata);
        }
        crate::adapter::sort_newest_first(&mut sessions);
        sessions
    }

    async fn merged_sessions(&self) -> HashMap<String, MergedSession> {
        let lists = join_all(self.inner.active.iter().map(|adapter| async move {
            let list = match adapter.list_sessions().await {
                Ok(list) => list,
                Err(e) => {
                    warn!(adapter = %adapter.name(), error = %e, "List failed, ignoring adapter");
                    Vec::new()
                }
            };
            (adapter.kind(), list)
        }))
        .await;

        let mut merged: HashMap<String, MergedSession> = HashMap::new();
        for (kind, list) in lists {
            let remote = kind == AdapterKind::Remote;
            for metadata in list {
                match merged.get_mut(&metadata.session_id) {
                    Some(kept) => {
                        kept.holders += 1;
                        kept.on_remote |= remote;
                        if metadata.last_modified > kept.metadata.last_modified {
                            kept.metadata = metadata;
                        }
                    }
                    None => {
                        merged.insert(
                            metadata.session_id.clone(),
                            MergedSession {
                                metadata,
                                holders: 1,
                                on_remote: remote,
                            },
                        );
                    }
                }
            }
        }
        merged
    }

    /// Whether any active adapter holds the session
    pub async fn has_session(&self, session_id: &str) -> bool {
        if self.inner.queue.is_deleted(session_id).await {
            return false;
        }
        let answers = join_all(
            self.inner
                .active
                .iter()
                .map(|adapter| adapter.has_session(session_id)),
        )
        .await;
        answers.into_iter().any(|answer| matches!(answer, Ok(true)))
    }

    /// Active session reported by the first adapter (in strategy order) that
    /// has one
    pub async fn active_session_id(&self) -> Option<String> {
        for adapter in &self.inner.active {
            match adapter.active_session_id().await {
                Ok(Some(id)) => return Some(id),
                Ok(None) => {}
                Err(e) => {
                    debug!(adapter = %adapter.name(), error = %e, "Active session lookup failed");
                }
            }
        }
        None
    }

    /// Point every active adapter at a session
    pub async fn set_active_session_id(&self, session_id: &str) -> SyncResult {
        let results = join_all(self.inner.active.iter().map(|adapter| async move {
            match adapter.set_active_session_id(session_id).await {
                Ok(()) => SyncResult::ok(session_id),
                Err(e) => SyncResult::failed(session_id, e),
            }
        }))
        .await;
        first_success_or_last(results, session_id)
    }

    /// Clear the active session on every active adapter
    pub async fn clear_active_session_id(&self) -> SyncResult {
        let results = join_all(self.inner.active.iter().map(|adapter| async move {
            match adapter.clear_active_session_id().await {
                Ok(()) => SyncResult::ok("active"),
                Err(e) => SyncResult::failed("active", e),
            }
        }))
        .await;
        first_success_or_last(results, "active")
    }

    /// Remove every session from every active adapter and empty the queue
    ///
    /// Succeeds only if every adapter was cleared.
    pub async fn clear_all(&self) -> SyncResult {
        self.inner.queue.clear().await;

        let results = join_all(self.inner.active.iter().map(|adapter| adapter.clear_all())).await;
        let failures: Vec<String> = self
            .inner
            .active
            .iter()
            .zip(&results)
            .filter(|(_, result)| !result.success)
            .map(|(adapter, result)| {
                format!(
                    "{}: {}",
                    adapter.name(),
                    result.error.as_deref().unwrap_or("unknown")
                )
            })
            .collect();

        if failures.is_empty() {
            info!("All sessions cleared");
            self.inner.events.publish(SyncEvent::Cleared);
            SyncResult::ok("all")
        } else {
            SyncResult::failed("all", failures.join("; "))
        }
    }

    /// Check every active adapter
    pub async fn health(&self) -> Vec<AdapterHealth> {
        join_all(self.inner.active.iter().map(|adapter| async move {
            AdapterHealth {
                name: adapter.name().to_string(),
                kind: adapter.kind().to_string(),
                priority: adapter.priority(),
                healthy: adapter.health_check().await,
            }
        }))
        .await
    }

    /// Bring every active adapter up to the newest copy of every session
    pub async fn sync_now(&self) -> SyncReport {
        let mut ids: Vec<String> = self.merged_sessions().await.into_keys().collect();
        ids.sort();

        let mut report = SyncReport::default();
        for id in ids {
            report.examined += 1;
            if self.inner.queue.is_deleted(&id).await {
                if self.push_session(&id).await {
                    report.pushed += 1;
                } else {
                    report.failed.push((id, "delete still pending".to_string()));
                }
                continue;
            }
            match self.resync_session(&id).await {
                Ok(true) => report.pushed += 1,
                Ok(false) => report.up_to_date += 1,
                Err(reason) => report.failed.push((id, reason)),
            }
        }

        info!(
            examined = report.examined,
            pushed = report.pushed,
            up_to_date = report.up_to_date,
            failed = report.failed.len(),
            "Full resync finished"
        );
        report
    }

    /// Returns whether anything was written
    async fn resync_session(&self, session_id: &str) -> std::result::Result<bool, String> {
        let gate = self.session_gate(session_id);
        let _held = gate.lock().await;
        if self.inner.queue.is_deleted(session_id).await {
            return Ok(false);
        }

        let copies = self.gather(session_id).await;
        let Some(index) = conflict::latest(&copies, None) else {
            return Err("no adapter could load the session".to_string());
        };
        let newest = copies[index].record.clone();

        let behind: Vec<&Arc<dyn StorageAdapter>> = self
            .inner
            .active
            .iter()
            .filter(|adapter| {
                !copies.iter().any(|c| {
                    Arc::ptr_eq(&c.adapter, adapter) && c.record.same_version(&newest)
                })
            })
            .collect();

        let mut failures = Vec::new();
        for adapter in &behind {
            let (result, _) = retry_write(&self.inner.retry, || adapter.save_record(&newest)).await;
            if !result.success {
                failures.push(format!(
                    "{}: {}",
                    adapter.name(),
                    result.error.unwrap_or_else(|| "rejected".to_string())
                ));
            }
        }

        if !failures.is_empty() {
            return Err(failures.join("; "));
        }
        self.inner.queue.settle(session_id, newest.updated_at).await;
        Ok(!behind.is_empty())
    }

    /// Copy on-device sessions to the remote store
    ///
    /// Uses the highest-priority local and remote adapters in the registry.
    ///
    /// # Errors
    ///
    /// `Configuration` when the registry lacks either kind; the local
    /// adapter's error when its sessions cannot be listed
    pub async fn migrate(&self) -> Result<MigrationReport> {
        let local = self.inner.registry.of_kind(AdapterKind::Local).next();
        let remote = self.inner.registry.of_kind(AdapterKind::Remote).next();
        let (Some(local), Some(remote)) = (local, remote) else {
            return Err(Error::Configuration(
                "migration needs a local and a remote adapter".to_string(),
            ));
        };

        let report = migrate_local_to_remote(local.as_ref(), remote.as_ref()).await?;
        for id in &report.migrated {
            if let Ok(Some(record)) = local.load_state(id).await {
                self.inner.queue.settle(id, record.updated_at).await;
            }
        }
        self.inner.events.publish(SyncEvent::MigrationCompleted {
            migrated: report.migrated.len(),
            already_synced: report.already_synced.len(),
            failed: report.failed.len(),
        });
        Ok(report)
    }
}

struct WriteOutcome {
    result: SyncResult,
    accepted_by: Option<Arc<dyn StorageAdapter>>,
    local: Option<Arc<dyn StorageAdapter>>,
    needs_push: bool,
}

impl WriteOutcome {
    fn failed(last: Option<SyncResult>, session_id: &str) -> Self {
        Self {
            result: last.unwrap_or_else(|| SyncResult::failed(session_id, "no adapter attempted")),
            accepted_by: None,
            local: None,
            needs_push: false,
        }
    }
}

fn first_success_or_last(results: Vec<SyncResult>, session_id: &str) -> SyncResult {
    let mut last = None;
    for result in results {
        if result.success {
            return result;
        }
        last = Some(result);
    }
    last.unwrap_or_else(|| SyncResult::failed(session_id, "no adapter attempted"))
}
