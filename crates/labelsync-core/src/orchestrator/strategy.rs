//! Strategy to adapter-set mapping
//!
//! Pure functions over the registry; no adapter is contacted here.

use crate::adapter::{AdapterKind, AdapterRegistry, StorageAdapter};
use crate::config::SyncStrategy;
use std::sync::Arc;

/// How a save walks the active adapters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteMode {
    /// One adapter at a time, stopping at the first that accepts
    Sequential,
    /// Every adapter at once
    Parallel,
}

/// Ordered adapters a strategy uses for saves and loads
#[must_use]
pub fn select_adapters(
    registry: &AdapterRegistry,
    strategy: SyncStrategy,
) -> Vec<Arc<dyn StorageAdapter>> {
    let kinds: &[AdapterKind] = match strategy {
        SyncStrategy::LocalFirst => &[AdapterKind::Local, AdapterKind::Remote],
        SyncStrategy::RemoteFirst => &[AdapterKind::Remote, AdapterKind::Local],
        SyncStrategy::LocalOnly => &[AdapterKind::Local],
        SyncStrategy::RemoteOnly => &[AdapterKind::Remote],
        SyncStrategy::Hybrid => return registry.adapters().to_vec(),
    };

    kinds
        .iter()
        .flat_map(|kind| registry.of_kind(*kind).cloned())
        .collect()
}

/// Write mode of a strategy
#[must_use]
pub fn write_mode(strategy: SyncStrategy) -> WriteMode {
    match strategy {
        SyncStrategy::Hybrid => WriteMode::Parallel,
        _ => WriteMode::Sequential,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::local::LocalAdapter;
    use crate::remote::RemoteAdapter;
    use std::time::Duration;

    fn registry() -> AdapterRegistry {
        let remote = RemoteAdapter::new("http://127.0.0.1:9/api", Duration::from_secs(1)).unwrap();
        AdapterRegistry::new()
            .with(Arc::new(LocalAdapter::in_memory()))
            .with(Arc::new(remote))
    }

    fn kinds(adapters: &[Arc<dyn StorageAdapter>]) -> Vec<AdapterKind> {
        adapters.iter().map(|a| a.kind()).collect()
    }

    #[test]
    fn test_ordered_strategies() {
        let registry = registry();
        assert_eq!(
            kinds(&select_adapters(&registry, SyncStrategy::LocalFirst)),
            vec![AdapterKind::Local, AdapterKind::Remote]
        );
        assert_eq!(
            kinds(&select_adapters(&registry, SyncStrategy::RemoteFirst)),
            vec![AdapterKind::Remote, AdapterKind::Local]
        );
    }

    #[test]
    fn test_restricted_strategies() {
        let registry = registry();
        assert_eq!(
            kinds(&select_adapters(&registry, SyncStrategy::LocalOnly)),
            vec![AdapterKind::Local]
        );
        assert_eq!(
            kinds(&select_adapters(&registry, SyncStrategy::RemoteOnly)),
            vec![AdapterKind::Remote]
        );
    }

    #[test]
    fn test_hybrid_uses_priority_order() {
        let registry = registry();
        assert_eq!(
            kinds(&select_adapters(&registry, SyncStrategy::Hybrid)),
            vec![AdapterKind::Remote, AdapterKind::Local]
        );
        assert_eq!(write_mode(SyncStrategy::Hybrid), WriteMode::Parallel);
        assert_eq!(write_mode(SyncStrategy::LocalFirst), WriteMode::Sequential);
    }

    #[test]
    fn test_empty_selection() {
        let registry = AdapterRegistry::new().with(Arc::new(LocalAdapter::in_memory()));
        assert!(select_adapters(&registry, SyncStrategy::RemoteOnly).is_empty());
    }
}
