//! Batch scheduling.
//!
//! The snapshot is split into contiguous batches whose size and pause are
//! chosen once from the snapshot size. Tabs run one at a time in snapshot
//! order; cancellation is observed before and after every pause, never in
//! the middle of a tab.

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info};

use crate::browser::TabRef;
use crate::config::{BatchPlan, RefreshConfig};

use super::attempt::{TabRefresher, pause};
use super::operation::OperationCell;
use super::progress::ProgressEmitter;

// ============================================================================
// RunOutcome
// ============================================================================

/// How a scheduler run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// Every tab was processed.
    Completed,
    /// Cancellation was observed before every tab was processed.
    Cancelled,
}

// ============================================================================
// BatchScheduler
// ============================================================================

/// Drives the state machine over a snapshot, batch by batch.
#[derive(Debug, Clone)]
pub struct BatchScheduler {
    refresher: TabRefresher,
    emitter: ProgressEmitter,
    config: Arc<RefreshConfig>,
}

impl BatchScheduler {
    /// Creates a scheduler.
    #[must_use]
    pub fn new(refresher: TabRefresher, emitter: ProgressEmitter, config: Arc<RefreshConfig>) -> Self {
        Self {
            refresher,
            emitter,
            config,
        }
    }

    /// Returns the batch plan used for `total` tabs.
    ///
    /// The batch size is at least one, even for an unvalidated policy.
    #[must_use]
    pub fn plan(&self, total: usize) -> BatchPlan {
        let plan = self.config.batching.plan(total);
        BatchPlan::new(plan.size.max(1), plan.interval)
    }

    /// Processes `tabs`, folding each outcome into `cell`.
    pub async fn run(&self, tabs: &[TabRef], cell: &OperationCell) -> RunOutcome {
        if tabs.is_empty() {
            debug!(operation_id = %cell.id(), "Empty snapshot");
            return RunOutcome::Completed;
        }

        let plan = self.plan(tabs.len());
        let batches = tabs.len().div_ceil(plan.size);
        info!(
            operation_id = %cell.id(),
            total = tabs.len(),
            batch_size = plan.size,
            batches,
            interval_ms = plan.interval.as_millis(),
            "Scheduling batches"
        );

        for (index, batch) in tabs.chunks(plan.size).enumerate() {
            let stop = if index == 0 {
                cell.is_cancelled()
            } else {
                stop_after_pause(cell, plan.interval).await
            };
            if stop {
                info!(operation_id = %cell.id(), batch = index + 1, "Cancelled at batch boundary");
                return RunOutcome::Cancelled;
            }

            debug!(operation_id = %cell.id(), batch = index + 1, of = batches, "Batch started");

            for (position, tab) in batch.iter().enumerate() {
                let stop = if position == 0 {
                    cell.is_cancelled()
                } else {
                    stop_after_pause(cell, self.config.tab_delay).await
                };
                if stop {
                    info!(operation_id = %cell.id(), tab_id = %tab.id, "Cancelled before tab");
                    return RunOutcome::Cancelled;
                }

                let outcome = self.refresher.refresh(tab).await;
                self.emitter.tab_outcome(tab, &outcome).await;

                match cell.record(tab, &outcome) {
                    Some(progress) => self.emitter.report_progress(progress).await,
                    None => return RunOutcome::Cancelled,
                }
            }
        }

        RunOutcome::Completed
    }
}

/// Waits `delay` unless cancellation is already pending.
///
/// Returns `true` if the run must stop.
async fn stop_after_pause(cell: &OperationCell, delay: Duration) -> bool {
    if cell.is_cancelled() {
        return true;
    }
    pause(delay).await;
    cell.is_cancelled()
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use crate::browser::MemoryStore;
    use crate::config::BatchPolicy;
    use crate::history::HistoryStore;
    use crate::protocol::Notification;
    use crate::refresh::testing::{FakeBrowser, Fault, RecordingSink};

    struct Fixture {
        browser: Arc<FakeBrowser>,
        sink: Arc<RecordingSink>,
        scheduler: BatchScheduler,
    }

    fn fixture(config: RefreshConfig) -> Fixture {
        let config = Arc::new(config);
        let browser = Arc::new(FakeBrowser::new());
        let sink = Arc::new(RecordingSink::new());
        let history = Arc::new(HistoryStore::new(Arc::new(MemoryStore::new()), 10));
        let scheduler = BatchScheduler::new(
            TabRefresher::new(browser.clone(), browser.clone(), config.clone()),
            ProgressEmitter::new(sink.clone(), history),
            config,
        );
        Fixture {
            browser,
            sink,
            scheduler,
        }
    }

    fn assert_near(actual: Duration, expected: Duration) {
        assert!(
            actual >= expected && actual < expected + Duration::from_millis(50),
            "expected ~{expected:?}, got {actual:?}"
        );
    }

    #[tokio::test]
    async fn test_empty_snapshot_completes() {
        let fx = fixture(RefreshConfig::without_delays());
        let cell = OperationCell::standalone(Vec::new());

        assert_eq!(fx.scheduler.run(&[], &cell).await, RunOutcome::Completed);
        assert!(fx.sink.notifications().is_empty());
    }

    #[tokio::test]
    async fn test_processes_every_tab_in_order() {
        let fx = fixture(RefreshConfig::without_delays());
        let tabs = fx.browser.add_tabs(7);
        fx.browser.fail_reload(3, Fault::Always);
        let cell = OperationCell::standalone(tabs.clone());

        assert_eq!(fx.scheduler.run(&tabs, &cell).await, RunOutcome::Completed);

        let order: Vec<u32> = fx.browser.reload_log().iter().map(|(id, _)| id.get()).collect();
        assert_eq!(order, [1, 2, 4, 5, 6, 7]);

        let snapshot = cell.snapshot();
        assert_eq!(snapshot.succeeded + snapshot.failed_count, 7);
        assert_eq!(snapshot.failed_count, 1);

        let progress: Vec<usize> = fx
            .sink
            .notifications()
            .iter()
            .filter_map(|n| match n {
                Notification::RefreshProgress { current, .. } => Some(*current),
                _ => None,
            })
            .collect();
        assert_eq!(progress, [1, 2, 3, 4, 5, 6, 7]);
    }

    #[tokio::test]
    async fn test_cancelled_before_start() {
        let fx = fixture(RefreshConfig::without_delays());
        let tabs = fx.browser.add_tabs(3);
        let cell = OperationCell::standalone(tabs.clone());
        cell.cancel();

        assert_eq!(fx.scheduler.run(&tabs, &cell).await, RunOutcome::Cancelled);
        assert_eq!(fx.browser.total_reloads(), 0);
    }

    #[tokio::test]
    async fn test_cancel_finishes_current_tab() {
        let fx = fixture(
            RefreshConfig::without_delays()
                .with_batching(BatchPolicy::uniform(BatchPlan::new(5, Duration::ZERO))),
        );
        let tabs = fx.browser.add_tabs(5);
        let cell = OperationCell::standalone(tabs.clone());

        let hook_cell = cell.clone();
        fx.sink.on_notify(move |n| {
            if matches!(n, Notification::TabSucceeded { tab_id } if tab_id.get() == 2) {
                hook_cell.cancel();
            }
        });

        assert_eq!(fx.scheduler.run(&tabs, &cell).await, RunOutcome::Cancelled);
        assert_eq!(fx.browser.total_reloads(), 2);
        assert_eq!(cell.snapshot().succeeded, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_skips_pending_pauses() {
        let fx = fixture(
            RefreshConfig::without_delays()
                .with_tab_delay(Duration::from_millis(100))
                .with_batching(BatchPolicy::uniform(BatchPlan::new(2, Duration::from_secs(1)))),
        );
        let tabs = fx.browser.add_tabs(4);
        let cell = OperationCell::standalone(tabs.clone());

        let hook_cell = cell.clone();
        fx.sink.on_notify(move |n| {
            if matches!(n, Notification::RefreshProgress { current: 2, .. }) {
                hook_cell.cancel();
            }
        });

        let started = tokio::time::Instant::now();
        assert_eq!(fx.scheduler.run(&tabs, &cell).await, RunOutcome::Cancelled);

        assert_eq!(fx.browser.total_reloads(), 2);
        assert_near(started.elapsed(), Duration::from_millis(100));
    }

    #[tokio::test]
    async fn test_zero_batch_size_is_clamped() {
        let fx = fixture(
            RefreshConfig::without_delays()
                .with_batching(BatchPolicy::uniform(BatchPlan::new(0, Duration::ZERO))),
        );
        let tabs = fx.browser.add_tabs(3);
        let cell = OperationCell::standalone(tabs.clone());

        assert_eq!(fx.scheduler.plan(3).size, 1);
        assert_eq!(fx.scheduler.run(&tabs, &cell).await, RunOutcome::Completed);
        assert_eq!(fx.browser.total_reloads(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_large_snapshot_uses_small_batches() {
        let mut config = RefreshConfig::without_delays();
        config.batching = BatchPolicy::default();
        let fx = fixture(config);
        let tabs = fx.browser.add_tabs(60);
        let cell = OperationCell::standalone(tabs.clone());

        assert_eq!(fx.scheduler.plan(60), BatchPlan::new(3, Duration::from_millis(1000)));

        let started = tokio::time::Instant::now();
        assert_eq!(fx.scheduler.run(&tabs, &cell).await, RunOutcome::Completed);
        assert_near(started.elapsed(), Duration::from_secs(19));

        let log = fx.browser.reload_log();
        assert_eq!(log.len(), 60);
        for (index, (_, at)) in log.iter().enumerate() {
            let batch = u64::try_from(index / 3).expect("small index");
            assert_near(at.duration_since(started), Duration::from_secs(batch));
        }
    }
}
