//! Progress and outcome notifications.
//!
//! Every method is best effort: sink and storage failures are logged and
//! never surface to the caller.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::browser::{Indicator, NotificationSink, TabRef};
use crate::history::{HistoryEntry, HistoryStore};
use crate::protocol::Notification;

use super::attempt::TabOutcome;
use super::operation::{OperationReport, Progress};

// ============================================================================
// ProgressEmitter
// ============================================================================

/// Pushes operation progress to the UI and records history.
#[derive(Clone)]
pub struct ProgressEmitter {
    sink: Arc<dyn NotificationSink>,
    history: Arc<HistoryStore>,
}

impl fmt::Debug for ProgressEmitter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProgressEmitter")
            .field("history", &self.history)
            .finish_non_exhaustive()
    }
}

impl ProgressEmitter {
    /// Creates an emitter.
    #[must_use]
    pub fn new(sink: Arc<dyn NotificationSink>, history: Arc<HistoryStore>) -> Self {
        Self { sink, history }
    }

    /// Returns the history store.
    #[inline]
    #[must_use]
    pub fn history(&self) -> &Arc<HistoryStore> {
        &self.history
    }

    /// Switches the toolbar to its busy state.
    pub async fn busy(&self) {
        self.sink.indicate(Indicator::Busy).await;
    }

    /// Announces the tab snapshot of a new operation.
    pub async fn started(&self, tabs: &[TabRef]) {
        self.sink
            .notify(Notification::RefreshStarted {
                tabs: tabs.to_vec(),
            })
            .await;
    }

    /// Announces a single tab outcome.
    pub async fn tab_outcome(&self, tab: &TabRef, outcome: &TabOutcome) {
        let notification = match outcome {
            TabOutcome::Failed { error, .. } => Notification::TabFailed {
                tab_id: tab.id,
                error: error.to_string(),
            },
            _ => Notification::TabSucceeded { tab_id: tab.id },
        };
        self.sink.notify(notification).await;
    }

    /// Pushes the completion percentage as badge text and a progress message.
    pub async fn report_progress(&self, progress: Progress) {
        let percent = progress.percent();
        debug!(
            processed = progress.processed,
            total = progress.total,
            failed = progress.failed,
            percent,
            "Progress"
        );

        self.sink.indicate(Indicator::Progress(percent)).await;
        self.sink
            .notify(Notification::RefreshProgress {
                current: progress.processed,
                total: progress.total,
                percent,
                failed: progress.failed,
            })
            .await;
    }

    /// Prepends `entry` to the stored history.
    pub async fn record_history(&self, entry: HistoryEntry) {
        if let Err(e) = self.history.record(entry).await {
            warn!(error = %e, "Failed to persist refresh history");
        }
    }

    /// Announces the end of an operation and clears the toolbar.
    pub async fn complete(&self, report: &OperationReport) {
        self.sink
            .notify(Notification::RefreshComplete {
                success: report.success(),
                cancelled: report.cancelled(),
                details: report.details(),
                succeeded: report.succeeded,
                total: report.total_tabs,
                failed_tabs: report.failed_tabs.clone(),
            })
            .await;
        self.sink.indicate(Indicator::Idle).await;
    }
}

// ============================================================================
// Tests
// ============================================================================
