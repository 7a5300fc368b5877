//! Error reporting queue.
//!
//! Reports are always queued in local storage first. They leave the machine
//! only through [`StoredTelemetry::flush`], and only once the user has
//! granted consent through the synced `errorReportingConsent` flag.
//!
//! | Key | Area | Content |
//! |-----|------|---------|
//! | `errorReportingConsent` | sync | `bool` |
//! | `pendingErrorReports` | local | `[ErrorReport]`, oldest first, at most 50 |

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::browser::KeyValueStore;
use crate::browser::storage::{get_one, set_one};
use crate::error::{Error, Result};

// ============================================================================
// Constants
// ============================================================================

/// Synced key holding the consent flag.
pub const CONSENT_KEY: &str = "errorReportingConsent";

/// Local key holding queued reports.
pub const PENDING_REPORTS_KEY: &str = "pendingErrorReports";

/// Maximum queued reports; older ones are dropped.
pub const MAX_PENDING_REPORTS: usize = 50;

// ============================================================================
// ErrorReport
// ============================================================================

/// One error report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorReport {
    /// Category (`operation_error`, `snapshot_error`, `popup_error`, ...).
    pub error_type: String,
    /// Short description.
    #[serde(default)]
    pub message: String,
    /// When the error was observed.
    pub timestamp: DateTime<Utc>,
    /// Free-form context.
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub details: Value,
}

impl ErrorReport {
    /// Creates a report timestamped now.
    #[must_use]
    pub fn new(error_type: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error_type: error_type.into(),
            message: message.into(),
            timestamp: Utc::now(),
            details: Value::Null,
        }
    }

    /// Creates a report from a crate error.
    #[must_use]
    pub fn from_error(error_type: impl Into<String>, error: &Error) -> Self {
        Self::new(error_type, error.to_string())
    }

    /// Creates a report from a UI-supplied payload.
    ///
    /// The message is taken from `details.message` when present.
    #[must_use]
    pub fn from_ui(error_type: impl Into<String>, details: Value) -> Self {
        let message = details
            .get("message")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        Self::new(error_type, message).with_details(details)
    }

    /// Attaches context.
    #[inline]
    #[must_use]
    pub fn with_details(mut self, details: Value) -> Self {
        self.details = details;
        self
    }
}

// ============================================================================
// Traits
// ============================================================================

/// Sink for captured errors. Never fails back into the caller.
#[async_trait]
pub trait Telemetry: Send + Sync {
    /// Records a report.
    async fn report(&self, report: ErrorReport);
}

/// Telemetry that drops everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullTelemetry;

#[async_trait]
impl Telemetry for NullTelemetry {
    async fn report(&self, _report: ErrorReport) {}
}

/// Transport that delivers queued reports to the reporting endpoint.
#[async_trait]
pub trait ReportUploader: Send + Sync {
    /// Uploads a batch of reports.
    async fn upload(&self, reports: &[ErrorReport]) -> Result<()>;
}

// ============================================================================
// FlushOutcome
// ============================================================================

/// Result of [`StoredTelemetry::flush`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushOutcome {
    /// The user has not consented; nothing was sent.
    NoConsent,
    /// The queue was empty.
    Empty,
    /// This many reports were uploaded and removed.
    Uploaded(usize),
}

// ============================================================================
// StoredTelemetry
// ============================================================================

/// Telemetry backed by extension storage.
pub struct StoredTelemetry {
    sync: Arc<dyn KeyValueStore>,
    local: Arc<dyn KeyValueStore>,
    limit: usize,
    /// Serializes read-modify-write cycles on the queue.
    queue_lock: Mutex<()>,
}

impl fmt::Debug for StoredTelemetry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoredTelemetry")
            .field("limit", &self.limit)
            .finish_non_exhaustive()
    }
}

impl StoredTelemetry {
    /// Creates a queue over the synced and local storage areas.
    #[must_use]
    pub fn new(sync: Arc<dyn KeyValueStore>, local: Arc<dyn KeyValueStore>) -> Self {
        Self {
            sync,
            local,
            limit: MAX_PENDING_REPORTS,
            queue_lock: Mutex::new(()),
        }
    }

    /// Overrides the queue bound.
    #[inline]
    #[must_use]
    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit.max(1);
        self
    }

    /// Returns the stored consent flag (`false` when unset).
    ///
    /// # Errors
    ///
    /// Returns the storage error if the flag cannot be read.
    pub async fn consent(&self) -> Result<bool> {
        Ok(get_one(self.sync.as_ref(), CONSENT_KEY)
            .await?
            .and_then(|v| v.as_bool())
            .unwrap_or(false))
    }

    /// Stores the consent flag.
    ///
    /// # Errors
    ///
    /// Returns the storage error if the flag cannot be written.
    pub async fn set_consent(&self, enabled: bool) -> Result<()> {
        set_one(self.sync.as_ref(), CONSENT_KEY, json!(enabled)).await?;
        info!(enabled, "Error reporting consent updated");
        Ok(())
    }

    /// Returns the queued reports, oldest first.
    ///
    /// Entries that no longer parse are skipped; the rest are kept.
    ///
    /// # Errors
    ///
    /// Returns the storage error if the queue cannot be read.
    pub async fn pending(&self) -> Result<Vec<ErrorReport>> {
        let reports = match get_one(self.local.as_ref(), PENDING_REPORTS_KEY).await? {
            Some(Value::Array(items)) => items
                .into_iter()
                .filter_map(|item| serde_json::from_value(item).ok())
                .collect(),
            _ => Vec::new(),
        };
        Ok(reports)
    }

    /// Returns the number of queued reports.
    ///
    /// # Errors
    ///
    /// Returns the storage error if the queue cannot be read.
    pub async fn pending_count(&self) -> Result<usize> {
        Ok(self.pending().await?.len())
    }

    /// Appends a report, dropping the oldest beyond the bound.
    ///
    /// # Errors
    ///
    /// Returns the storage error if the queue cannot be updated.
    pub async fn enqueue(&self, report: ErrorReport) -> Result<()> {
        let _guard = self.queue_lock.lock().await;

        let mut pending = self.pending().await?;
        pending.push(report);
        if pending.len() > self.limit {
            let excess = pending.len() - self.limit;
            pending.drain(..excess);
        }

        set_one(self.local.as_ref(), PENDING_REPORTS_KEY, serde_json::to_value(&pending)?).await
    }

    /// Uploads the whole queue if the user consented, clearing it on success.
    ///
    /// # Errors
    ///
    /// Returns the upload or storage error; the queue is kept intact.
    pub async fn flush(&self, uploader: &dyn ReportUploader) -> Result<FlushOutcome> {
        if !self.consent().await? {
            return Ok(FlushOutcome::NoConsent);
        }

        let _guard = self.queue_lock.lock().await;

        let pending = self.pending().await?;
        if pending.is_empty() {
            return Ok(FlushOutcome::Empty);
        }

        uploader.upload(&pending).await?;
        set_one(self.local.as_ref(), PENDING_REPORTS_KEY, json!([])).await?;

        info!(count = pending.len(), "Uploaded pending error reports");
        Ok(FlushOutcome::Uploaded(pending.len()))
    }
}

#[async_trait]
impl Telemetry for StoredTelemetry {
    async fn report(&self, report: ErrorReport) {
        let error_type = report.error_type.clone();
        match self.enqueue(report).await {
            Ok(()) => debug!(%error_type, "Error report queued"),
            Err(e) => warn!(%error_type, error = %e, "Failed to queue error report"),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use parking_lot::Mutex as SyncMutex;

    use crate::browser::MemoryStore;

    #[derive(Default)]
    struct RecordingUploader {
        batches: SyncMutex<Vec<usize>>,
        fail: bool,
    }

    #[async_trait]
    impl ReportUploader for RecordingUploader {
        async fn upload(&self, reports: &[ErrorReport]) -> Result<()> {
            if self.fail {
                return Err(Error::upload("endpoint unreachable"));
            }
            self.batches.lock().push(reports.len());
            Ok(())
        }
    }

    fn telemetry() -> StoredTelemetry {
        StoredTelemetry::new(Arc::new(MemoryStore::new()), Arc::new(MemoryStore::new()))
    }

    #[tokio::test]
    async fn test_report_is_queued() {
        let telemetry = telemetry();
        telemetry
            .report(ErrorReport::new("operation_error", "2 tabs failed"))
            .await;

        let pending = telemetry.pending().await.expect("read");
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].error_type, "operation_error");
    }

    #[tokio::test]
    async fn test_queue_is_bounded() {
        let telemetry = telemetry().with_limit(3);
        for n in 0..5 {
            telemetry
                .report(ErrorReport::new("popup_error", format!("error {n}")))
                .await;
        }

        let pending = telemetry.pending().await.expect("read");
        let messages: Vec<_> = pending.iter().map(|r| r.message.as_str()).collect();
        assert_eq!(messages, ["error 2", "error 3", "error 4"]);
    }

    #[tokio::test]
    async fn test_flush_requires_consent() {
        let telemetry = telemetry();
        telemetry.report(ErrorReport::new("popup_error", "x")).await;

        let uploader = RecordingUploader::default();
        let outcome = telemetry.flush(&uploader).await.expect("flush");

        assert_eq!(outcome, FlushOutcome::NoConsent);
        assert_eq!(telemetry.pending_count().await.expect("read"), 1);
        assert!(uploader.batches.lock().is_empty());
    }

    #[tokio::test]
    async fn test_flush_uploads_and_clears() {
        let telemetry = telemetry();
        telemetry.set_consent(true).await.expect("consent");
        telemetry.report(ErrorReport::new("popup_error", "a")).await;
        telemetry.report(ErrorReport::new("popup_error", "b")).await;

        let uploader = RecordingUploader::default();
        let outcome = telemetry.flush(&uploader).await.expect("flush");

        assert_eq!(outcome, FlushOutcome::Uploaded(2));
        assert_eq!(*uploader.batches.lock(), vec![2]);
        assert_eq!(telemetry.pending_count().await.expect("read"), 0);

        let outcome = telemetry.flush(&uploader).await.expect("flush");
        assert_eq!(outcome, FlushOutcome::Empty);
    }

    #[tokio::test]
    async fn test_failed_upload_keeps_queue() {
        let telemetry = telemetry();
        telemetry.set_consent(true).await.expect("consent");
        telemetry.report(ErrorReport::new("popup_error", "a")).await;

        let uploader = RecordingUploader {
            fail: true,
            ..Default::default()
        };
        assert!(telemetry.flush(&uploader).await.is_err());
        assert_eq!(telemetry.pending_count().await.expect("read"), 1);
    }

    #[tokio::test]
    async fn test_malformed_entry_does_not_drop_queue() {
        let local = Arc::new(MemoryStore::new());
        let kept = serde_json::to_value(ErrorReport::new("popup_error", "kept")).expect("serialize");
        set_one(local.as_ref(), PENDING_REPORTS_KEY, json!([kept, {"errorType": 7}, "garbage"]))
            .await
            .expect("seed");

        let telemetry = StoredTelemetry::new(Arc::new(MemoryStore::new()), local);
        assert_eq!(telemetry.pending_count().await.expect("read"), 1);

        telemetry.report(ErrorReport::new("popup_error", "new")).await;

        let pending = telemetry.pending().await.expect("read");
        let messages: Vec<_> = pending.iter().map(|r| r.message.as_str()).collect();
        assert_eq!(messages, ["kept", "new"]);
    }

    #[test]
    fn test_from_ui_takes_message() {
        let report = ErrorReport::from_ui("popup_error", json!({"message": "boom", "lineno": 3}));
        assert_eq!(report.message, "boom");
        assert_eq!(report.details["lineno"], 3);
    }
}
