//! Long-running driver for [`CollectionSync`].
//!
//! Two things trigger a reconciliation: a fixed poll interval, and change notices pushed
//! by the source. Both are handled by a single loop that owns the engine, so a cycle
//! always finishes before the next begins. Notices arrive on a bounded queue and any
//! that pile up during a cycle are coalesced into one follow-up cycle.

use std::future::Future;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info};

use crate::contract::Source;
use crate::synchronise::CollectionSync;

/// Capacity of the change-notice queue.
pub const NOTICE_QUEUE_DEPTH: usize = 16;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct WatchSummary {
    pub cycles: u64,
    pub failed_cycles: u64,
}

/// Reconcile on every tick of `interval` and on every change notice until `shutdown`
/// resolves. Failed cycles are logged and retried on the next trigger.
///
/// On shutdown all subscriptions are dropped; files already written stay on disk.
pub async fn watch<S, F>(sync: &mut CollectionSync<S>, interval: Duration, shutdown: F) -> WatchSummary
where
    S: Source,
    F: Future<Output = ()>,
{
    let (notices, mut received) = mpsc::channel(NOTICE_QUEUE_DEPTH);
    sync.start_watching(notices);

    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    tokio::pin!(shutdown);

    let mut summary = WatchSummary::default();
    loop {
        tokio::select! {
            biased;
            _ = &mut shutdown => {
                info!("Shutdown requested, leaving watch loop");
                break;
            }
            _ = ticker.tick() => {
                debug!("Poll interval elapsed");
            }
            Some(notice) = received.recv() => {
                debug!(target = ?notice.target, "Change notice received");
                let mut coalesced = 0;
                while received.try_recv().is_ok() {
                    coalesced += 1;
                }
                if coalesced > 0 {
                    debug!(coalesced, "Coalesced queued change notices");
                }
            }
        }

        summary.cycles += 1;
        match sync.reconcile_all().await {
            Ok(report) if report.is_noop() => debug!(cycle = summary.cycles, "Nothing changed"),
            Ok(report) => info!(cycle = summary.cycles, ?report, "Cycle applied changes"),
            Err(e) => {
                summary.failed_cycles += 1;
                error!(cycle = summary.cycles, error = %e, "Reconciliation failed, retrying on next trigger");
            }
        }
    }

    sync.stop_watching();
    summary
}
