//! Operation controller.
//!
//! Owns the single operation slot. [`start`](RefreshController::start)
//! claims the slot and spawns the run; the run snapshots the tabs, hands
//! them to the scheduler and finishes the operation exactly once.
//!
//! Finish order: mark inactive, persist history, emit completion, release
//! the slot. The completion message always follows the last progress
//! message. A finished operation keeps the slot until its completion has
//! been emitted, so a new start is refused as busy until then.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;

use serde_json::json;
use tokio::sync::oneshot;
use tracing::{info, warn};

use crate::browser::TabDirectory;
use crate::config::RefreshConfig;
use crate::error::{Error, Result};
use crate::history::{HistoryEntry, HistoryStore};
use crate::identifiers::OperationId;
use crate::protocol::{CancelResponse, StartResponse};
use crate::telemetry::{ErrorReport, Telemetry};

use super::builder::ControllerBuilder;
use super::operation::{Operation, OperationCell, OperationReport, OperationSlot, OperationSnapshot, Summary};
use super::progress::ProgressEmitter;
use super::scheduler::{BatchScheduler, RunOutcome};

// ============================================================================
// OperationHandle
// ============================================================================

/// Handle to a started operation.
#[derive(Debug)]
pub struct OperationHandle {
    id: OperationId,
    report: oneshot::Receiver<OperationReport>,
}

impl OperationHandle {
    /// Returns the operation ID.
    #[inline]
    #[must_use]
    pub fn id(&self) -> OperationId {
        self.id
    }

    /// Waits for the operation to finish.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ChannelClosed`] if the run task was aborted.
    pub async fn wait(self) -> Result<OperationReport> {
        Ok(self.report.await?)
    }
}

// ============================================================================
// RefreshController
// ============================================================================

pub(crate) struct ControllerInner {
    pub(crate) config: Arc<RefreshConfig>,
    pub(crate) tabs: Arc<dyn TabDirectory>,
    pub(crate) scheduler: BatchScheduler,
    pub(crate) emitter: ProgressEmitter,
    pub(crate) telemetry: Arc<dyn Telemetry>,
    pub(crate) slot: OperationSlot,
}

/// Starts, cancels and reports refresh operations.
///
/// Cheap to clone; clones share the same operation slot.
#[derive(Clone)]
pub struct RefreshController {
    inner: Arc<ControllerInner>,
}

impl fmt::Debug for RefreshController {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RefreshController")
            .field("status", &self.status())
            .finish_non_exhaustive()
    }
}

impl RefreshController {
    /// Returns a builder.
    #[inline]
    #[must_use]
    pub fn builder() -> ControllerBuilder {
        ControllerBuilder::new()
    }

    pub(crate) fn from_inner(inner: ControllerInner) -> Self {
        Self {
            inner: Arc::new(inner),
        }
    }

    /// Returns the configuration.
    #[inline]
    #[must_use]
    pub fn config(&self) -> &RefreshConfig {
        &self.inner.config
    }

    /// Returns the history store.
    #[inline]
    #[must_use]
    pub fn history(&self) -> &Arc<HistoryStore> {
        self.inner.emitter.history()
    }

    /// Reads the stored history, newest first.
    ///
    /// # Errors
    ///
    /// Returns the storage error if the history cannot be read.
    pub async fn load_history(&self) -> Result<Vec<HistoryEntry>> {
        self.history().load().await
    }

    // ========================================================================
    // Start / Cancel / Status
    // ========================================================================

    /// Starts a new operation.
    ///
    /// Must be called inside a tokio runtime; the run is spawned.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Busy`] if an operation is running or still emitting
    /// its completion. The running operation is left untouched.
    pub async fn start(&self) -> Result<OperationHandle> {
        let cell = {
            let mut slot = self.inner.slot.lock();
            if slot.is_some() {
                return Err(Error::Busy);
            }
            let operation = Operation::new();
            let cell = OperationCell::bind(operation.id, Arc::clone(&self.inner.slot));
            *slot = Some(operation);
            cell
        };

        info!(operation_id = %cell.id(), "Refresh operation started");
        self.inner.emitter.busy().await;

        let (tx, rx) = oneshot::channel();
        let handle = OperationHandle {
            id: cell.id(),
            report: rx,
        };

        let controller = self.clone();
        tokio::spawn(async move {
            let report = controller.run(cell).await;
            let _ = tx.send(report);
        });

        Ok(handle)
    }

    /// Starts a new operation, answering in the UI message shape.
    pub async fn start_refresh(&self) -> StartResponse {
        match self.start().await {
            Ok(_) => StartResponse::accepted(),
            Err(e) => StartResponse::rejected(e.to_string()),
        }
    }

    /// Requests cooperative cancellation of the active operation.
    ///
    /// The current tab completes; no further tab or batch begins.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotActive`] if no operation is running.
    pub fn cancel(&self) -> Result<OperationId> {
        let mut slot = self.inner.slot.lock();
        match slot.as_mut() {
            Some(operation) if operation.is_active() => {
                operation.cancelled = true;
                info!(operation_id = %operation.id, "Refresh cancellation requested");
                Ok(operation.id)
            }
            _ => Err(Error::NotActive),
        }
    }

    /// Requests cancellation, answering in the UI message shape.
    #[must_use]
    pub fn cancel_refresh(&self) -> CancelResponse {
        CancelResponse {
            accepted: self.cancel().is_ok(),
        }
    }

    /// Returns the current operation view, zeroed when idle.
    #[must_use]
    pub fn status(&self) -> OperationSnapshot {
        self.inner
            .slot
            .lock()
            .as_ref()
            .map_or_else(OperationSnapshot::idle, OperationSnapshot::of)
    }

    /// Returns `true` while an operation is running.
    #[inline]
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.status().active
    }

    // ========================================================================
    // Run / Finish
    // ========================================================================

    async fn run(&self, cell: OperationCell) -> OperationReport {
        let tabs = match self.inner.tabs.list_tabs().await {
            Ok(tabs) => tabs,
            Err(e) => {
                warn!(operation_id = %cell.id(), error = %e, "Could not list tabs");
                self.inner
                    .telemetry
                    .report(ErrorReport::from_error("snapshot_error", &e))
                    .await;
                let reason = e.to_string();
                return self
                    .finish(&cell, |_| Summary::CouldNotStart { reason })
                    .await;
            }
        };

        info!(operation_id = %cell.id(), tabs = tabs.len(), "Tab snapshot taken");
        cell.set_tabs(tabs.clone());
        self.inner.emitter.started(&tabs).await;

        let outcome = self.inner.scheduler.run(&tabs, &cell).await;

        self.finish(&cell, |operation| match outcome {
            RunOutcome::Cancelled if operation.processed() < operation.tabs.len() => {
                Summary::Cancelled
            }
            _ if operation.failed.is_empty() => Summary::AllSucceeded,
            _ => Summary::PartialFailure {
                failed: operation.failed.len(),
            },
        })
        .await
    }

    /// Finishes the operation bound to `cell`.
    ///
    /// A second call for the same operation only returns a copy of the
    /// current state and emits nothing.
    async fn finish(
        &self,
        cell: &OperationCell,
        summary: impl FnOnce(&Operation) -> Summary,
    ) -> OperationReport {
        let Some(report) = cell.finish(summary) else {
            warn!(operation_id = %cell.id(), "Operation already finished");
            let operation = self
                .inner
                .slot
                .lock()
                .clone()
                .filter(|op| op.id == cell.id())
                .unwrap_or_default();
            return OperationReport::new(&operation, Summary::Cancelled);
        };

        info!(
            operation_id = %report.operation_id,
            succeeded = report.succeeded,
            failed = report.failed_tabs.len(),
            total = report.total_tabs,
            cancelled = report.cancelled(),
            "Refresh operation finished"
        );

        if !report.failed_tabs.is_empty() {
            self.inner.telemetry.report(operation_error(&report)).await;
        }

        self.inner.emitter.record_history(report.history_entry()).await;
        self.inner.emitter.complete(&report).await;
        cell.release();

        report
    }
}

/// Telemetry record for an operation that ended with failed tabs.
fn operation_error(report: &OperationReport) -> ErrorReport {
    ErrorReport::new("operation_error", report.details()).with_details(json!({
        "operationId": report.operation_id,
        "startTime": report.started_at,
        "endTime": report.finished_at,
        "totalTabs": report.total_tabs,
        "successfulTabs": report.succeeded,
        "failedTabs": report.failed_tabs,
    }))
}

// ============================================================================
// Tests
// ============================================================================
