//! Background reconciliation loop

use super::{Inner, SyncOrchestrator};
use std::sync::Weak;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Drain the pending queue every `period` until `shutdown` fires or the
/// orchestrator is gone
///
/// Only holds the orchestrator for the length of a tick.
pub(super) async fn run(inner: Weak<Inner>, period: Duration, shutdown: CancellationToken) {
    info!(interval_secs = period.as_secs(), "Sync worker starting");

    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // The first tick completes immediately
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let Some(inner) = inner.upgrade() else {
                    debug!("Orchestrator dropped");
                    break;
                };
                let orchestrator = SyncOrchestrator { inner };
                orchestrator.reap_pushes();
                let pending = orchestrator.pending_count().await;
                if pending == 0 {
                    continue;
                }
                tokio::select! {
                    settled = orchestrator.drain_pending() => {
                        debug!(pending = pending, settled = settled, "Sync tick finished");
                    }
                    _ = shutdown.cancelled() => break,
                }
            }
            _ = shutdown.cancelled() => break,
        }
    }

    info!("Sync worker stopped");
}
