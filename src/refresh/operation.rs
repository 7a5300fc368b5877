//! Operation state shared between the controller and the scheduler.
//!
//! One [`Operation`] lives in a mutex-guarded slot owned by the
//! controller. The scheduler reaches it only through an [`OperationCell`],
//! which is bound to a single operation id: once that operation finishes,
//! the cell reports cancellation and ignores further outcomes.

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::browser::TabRef;
use crate::history::HistoryEntry;
use crate::identifiers::{OperationId, TabId};

use super::attempt::TabOutcome;

// ============================================================================
// FailedTab
// ============================================================================

/// A tab that exhausted its retries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FailedTab {
    /// Tab ID.
    pub tab_id: TabId,
    /// Title at snapshot time.
    pub title: String,
    /// URL at snapshot time.
    pub url: String,
    /// Last error message.
    pub error: String,
}

impl FailedTab {
    /// Creates a record from the snapshot entry and the final error.
    #[must_use]
    pub fn new(tab: &TabRef, error: impl Into<String>) -> Self {
        Self {
            tab_id: tab.id,
            title: tab.display_title().to_string(),
            url: tab.url.clone(),
            error: error.into(),
        }
    }
}

// ============================================================================
// Progress
// ============================================================================

/// Counters after a tab outcome was folded in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Progress {
    /// Tabs processed so far.
    pub processed: usize,
    /// Tabs in the snapshot.
    pub total: usize,
    /// Tabs failed so far.
    pub failed: usize,
}

impl Progress {
    /// `floor(processed * 100 / total)`, or 100 for an empty snapshot.
    #[must_use]
    pub fn percent(&self) -> u8 {
        percent(self.processed, self.total)
    }
}

/// Integer completion percentage, clamped to `0..=100`.
#[must_use]
pub fn percent(processed: usize, total: usize) -> u8 {
    if total == 0 {
        return 100;
    }
    let value = processed.min(total).saturating_mul(100) / total;
    u8::try_from(value).unwrap_or(100)
}

// ============================================================================
// Operation
// ============================================================================

/// One end-to-end refresh run.
#[derive(Debug, Clone)]
pub struct Operation {
    /// Operation ID.
    pub id: OperationId,
    /// Snapshot taken at start.
    pub tabs: Vec<TabRef>,
    /// Tabs refreshed or skipped.
    pub succeeded: usize,
    /// Tabs that failed, in processing order.
    pub failed: Vec<FailedTab>,
    /// Cancellation was requested.
    pub cancelled: bool,
    /// Start time.
    pub started_at: DateTime<Utc>,
    /// `finish` has run; the operation no longer counts as active.
    finished: bool,
}

impl Operation {
    /// Creates an active operation with an empty snapshot.
    #[must_use]
    pub fn new() -> Self {
        Self {
            id: OperationId::generate(),
            tabs: Vec::new(),
            succeeded: 0,
            failed: Vec::new(),
            cancelled: false,
            started_at: Utc::now(),
            finished: false,
        }
    }

    /// Returns `true` until the operation has been finished.
    #[inline]
    #[must_use]
    pub fn is_active(&self) -> bool {
        !self.finished
    }

    /// Tabs processed so far.
    #[inline]
    #[must_use]
    pub fn processed(&self) -> usize {
        self.succeeded + self.failed.len()
    }

    fn progress(&self) -> Progress {
        Progress {
            processed: self.processed(),
            total: self.tabs.len(),
            failed: self.failed.len(),
        }
    }
}

impl Default for Operation {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// OperationSnapshot
// ============================================================================

/// Point-in-time view returned by `status()`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OperationSnapshot {
    /// An operation is running.
    pub active: bool,
    /// Tabs in the snapshot.
    pub total_tabs: usize,
    /// Tabs refreshed or skipped.
    pub succeeded: usize,
    /// Tabs that failed.
    pub failed_count: usize,
    /// Completion percentage.
    pub percent: u8,
    /// Cancellation was requested.
    pub cancelled: bool,
}

impl OperationSnapshot {
    /// Snapshot of the idle controller (all zero).
    #[inline]
    #[must_use]
    pub fn idle() -> Self {
        Self::default()
    }

    pub(crate) fn of(operation: &Operation) -> Self {
        if !operation.is_active() {
            return Self::idle();
        }
        Self {
            active: true,
            total_tabs: operation.tabs.len(),
            succeeded: operation.succeeded,
            failed_count: operation.failed.len(),
            // 0 until the snapshot is taken
            percent: if operation.tabs.is_empty() {
                0
            } else {
                operation.progress().percent()
            },
            cancelled: operation.cancelled,
        }
    }
}

// ============================================================================
// Summary / OperationReport
// ============================================================================

/// How an operation ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Summary {
    /// Every tab was refreshed or skipped.
    AllSucceeded,
    /// Every tab was processed and some failed.
    PartialFailure {
        /// Number of failed tabs.
        failed: usize,
    },
    /// The run was cancelled before every tab was processed.
    Cancelled,
    /// The tab list could not be read.
    CouldNotStart {
        /// Listing error.
        reason: String,
    },
}

/// Final result of an operation.
#[derive(Debug, Clone, PartialEq)]
pub struct OperationReport {
    /// Operation ID.
    pub operation_id: OperationId,
    /// How the operation ended.
    pub summary: Summary,
    /// Tabs in the snapshot.
    pub total_tabs: usize,
    /// Tabs refreshed or skipped.
    pub succeeded: usize,
    /// Tabs that failed.
    pub failed_tabs: Vec<FailedTab>,
    /// Start time.
    pub started_at: DateTime<Utc>,
    /// End time.
    pub finished_at: DateTime<Utc>,
}

impl OperationReport {
    pub(crate) fn new(operation: &Operation, summary: Summary) -> Self {
        Self {
            operation_id: operation.id,
            summary,
            total_tabs: operation.tabs.len(),
            succeeded: operation.succeeded,
            failed_tabs: operation.failed.clone(),
            started_at: operation.started_at,
            finished_at: Utc::now(),
        }
    }

    /// `true` only if every tab succeeded and the run was not cancelled.
    #[inline]
    #[must_use]
    pub fn success(&self) -> bool {
        self.summary == Summary::AllSucceeded
    }

    /// `true` if the run was cancelled.
    #[inline]
    #[must_use]
    pub fn cancelled(&self) -> bool {
        self.summary == Summary::Cancelled
    }

    /// Human-readable summary line.
    #[must_use]
    pub fn details(&self) -> String {
        match &self.summary {
            Summary::AllSucceeded => {
                format!("All {} tabs refreshed successfully", self.total_tabs)
            }
            Summary::PartialFailure { failed } => format!(
                "Refreshed {}/{} tabs with {failed} errors",
                self.succeeded, self.total_tabs
            ),
            Summary::Cancelled => format!(
                "Refresh cancelled after {}/{} tabs",
                self.succeeded + self.failed_tabs.len(),
                self.total_tabs
            ),
            Summary::CouldNotStart { reason } => format!("Could not start refresh: {reason}"),
        }
    }

    /// History record for this report, stamped with the start time.
    #[must_use]
    pub fn history_entry(&self) -> HistoryEntry {
        HistoryEntry {
            timestamp: self.started_at,
            total_tabs: self.total_tabs,
            successful_tabs: self.succeeded,
            failed_tabs: self.failed_tabs.clone(),
            cancelled: self.cancelled(),
        }
    }
}

// ============================================================================
// OperationCell
// ============================================================================

/// Shared slot holding at most one operation.
pub(crate) type OperationSlot = Arc<Mutex<Option<Operation>>>;

/// Handle to one operation inside the controller's slot.
#[derive(Debug, Clone)]
pub struct OperationCell {
    id: OperationId,
    slot: OperationSlot,
}

impl OperationCell {
    pub(crate) fn bind(id: OperationId, slot: OperationSlot) -> Self {
        Self { id, slot }
    }

    /// Creates a cell over a fresh operation that no controller owns.
    #[must_use]
    pub fn standalone(tabs: Vec<TabRef>) -> Self {
        let operation = Operation {
            tabs,
            ..Operation::new()
        };
        Self {
            id: operation.id,
            slot: Arc::new(Mutex::new(Some(operation))),
        }
    }

    /// Returns the bound operation id.
    #[inline]
    #[must_use]
    pub fn id(&self) -> OperationId {
        self.id
    }

    /// Runs `f` on the bound operation if it is still active.
    fn with_active<R>(&self, f: impl FnOnce(&mut Operation) -> R) -> Option<R> {
        let mut slot = self.slot.lock();
        match slot.as_mut() {
            Some(operation) if operation.id == self.id && operation.is_active() => {
                Some(f(operation))
            }
            _ => None,
        }
    }

    /// Returns `true` if cancellation was requested or the operation is gone.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.with_active(|op| op.cancelled).unwrap_or(true)
    }

    /// Requests cancellation. Returns `false` if the operation is not active.
    pub fn cancel(&self) -> bool {
        self.with_active(|op| op.cancelled = true).is_some()
    }

    /// Stores the tab snapshot.
    pub(crate) fn set_tabs(&self, tabs: Vec<TabRef>) -> bool {
        self.with_active(|op| op.tabs = tabs).is_some()
    }

    /// Folds a tab outcome into the counters.
    ///
    /// Returns the updated counters, or `None` once the operation finished.
    pub fn record(&self, tab: &TabRef, outcome: &TabOutcome) -> Option<Progress> {
        self.with_active(|op| {
            match outcome.error_message() {
                None => op.succeeded += 1,
                Some(error) => op.failed.push(FailedTab::new(tab, error)),
            }
            op.progress()
        })
    }

    /// Returns the current view of the operation.
    #[must_use]
    pub fn snapshot(&self) -> OperationSnapshot {
        self.with_active(|op| OperationSnapshot::of(op))
            .unwrap_or_default()
    }

    /// Marks the operation finished and builds its report.
    ///
    /// Only the first call per operation returns a report.
    pub(crate) fn finish(&self, summary: impl FnOnce(&Operation) -> Summary) -> Option<OperationReport> {
        self.with_active(|op| {
            op.finished = true;
            OperationReport::new(op, summary(op))
        })
    }

    /// Empties the slot if it still holds the bound operation.
    pub(crate) fn release(&self) {
        let mut slot = self.slot.lock();
        if slot.as_ref().is_some_and(|op| op.id == self.id) {
            *slot = None;
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
