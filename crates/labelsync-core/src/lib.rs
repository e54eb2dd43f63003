//! Labelsync Core - State Synchronization Engine
//!
//! This crate keeps labeling-session snapshots consistent between an
//! on-device key-value store and a remote session service, including:
//! - Adapters: a common storage contract with local and remote implementations
//! - Orchestrator: strategy-driven saves, conflict resolution and loads
//! - Queue: pending remote pushes retried by a background worker
//! - Migration: one-way copy of on-device sessions to the remote store
//! - Events: broadcast notifications for saves, pushes and conflicts

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod adapter;
pub mod codec;
pub mod config;
pub mod error;
pub mod events;
pub mod local;
pub mod migration;
pub mod model;
pub mod orchestrator;
pub mod remote;
pub mod utils;

pub use adapter::{AdapterKind, AdapterRegistry, StorageAdapter};
pub use config::{ConflictResolution, SyncConfig, SyncStrategy};
pub use error::{Error, Result};
pub use events::{EventBus, SyncEvent};
pub use local::{FileKvStore, KeyValueStore, LocalAdapter, MemoryKvStore};
pub use migration::{migrate_local_to_remote, MigrationReport};
pub use model::{
    PersistedState, SaveKind, SaveRequest, SessionMetadata, SessionPayload, StorageOrigin,
    SyncResult, SyncStatus,
};
pub use orchestrator::{AdapterHealth, PendingSync, SyncOrchestrator, SyncReport};
pub use remote::RemoteAdapter;
pub use utils::RetryPolicy;
