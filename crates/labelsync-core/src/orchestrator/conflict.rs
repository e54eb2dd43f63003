//! Conflict resolution between diverging session copies

use crate::adapter::{AdapterKind, StorageAdapter};
use crate::config::ConflictResolution;
use crate::error::{Error, Result};
use crate::model::PersistedState;
use std::sync::Arc;

/// One adapter's copy of a session
#[derive(Clone)]
pub struct LoadedCopy {
    /// Adapter holding the copy
    pub adapter: Arc<dyn StorageAdapter>,
    /// The copy
    pub record: PersistedState,
}

impl LoadedCopy {
    fn rank(&self) -> (chrono::DateTime<chrono::Utc>, u8, &str) {
        (
            self.record.updated_at,
            self.adapter.priority(),
            self.adapter.name(),
        )
    }
}

/// Whether the copies disagree on the version
#[must_use]
pub fn is_divergent(copies: &[LoadedCopy]) -> bool {
    copies
        .windows(2)
        .any(|pair| pair[0].record.updated_at != pair[1].record.updated_at)
}

/// Index of the copy with the highest adapter priority
///
/// Used when every copy has the same version.
#[must_use]
pub fn preferred(copies: &[LoadedCopy]) -> Option<usize> {
    copies
        .iter()
        .enumerate()
        .max_by(|(_, a), (_, b)| {
            a.adapter
                .priority()
                .cmp(&b.adapter.priority())
                .then_with(|| b.adapter.name().cmp(a.adapter.name()))
        })
        .map(|(index, _)| index)
}

/// Index of the newest copy, optionally restricted to one adapter kind
///
/// Ties on `updated_at` go to the higher priority, then the adapter name,
/// so the answer does not depend on the order the copies were gathered in.
#[must_use]
pub fn latest(copies: &[LoadedCopy], kind: Option<AdapterKind>) -> Option<usize> {
    copies
        .iter()
        .enumerate()
        .filter(|(_, copy)| kind.map_or(true, |k| copy.adapter.kind() == k))
        .max_by(|(_, a), (_, b)| a.rank().cmp(&b.rank()))
        .map(|(index, _)| index)
}

/// Pick the winning copy under `policy`
///
/// `remote-wins` and `local-wins` fall back to the newest copy when no
/// adapter of the preferred kind holds one.
///
/// # Errors
///
/// `Unimplemented` for `merge`, `Internal` when `copies` is empty
pub fn resolve(policy: ConflictResolution, copies: &[LoadedCopy]) -> Result<usize> {
    let winner = match policy {
        ConflictResolution::LatestWins => latest(copies, None),
        ConflictResolution::RemoteWins => {
            latest(copies, Some(AdapterKind::Remote)).or_else(|| latest(copies, None))
        }
        ConflictResolution::LocalWins => {
            latest(copies, Some(AdapterKind::Local)).or_else(|| latest(copies, None))
        }
        ConflictResolution::Merge => return Err(Error::Unimplemented("merge conflict resolution")),
    };
    winner.ok_or_else(|| Error::Internal("no copies to resolve".to_string()))
}
