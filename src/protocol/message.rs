//! Messages exchanged with the extension UI (popup).
//!
//! Both directions use an `action` discriminator, matching the
//! `runtime.sendMessage` payloads the popup already speaks.
//!
//! | Direction | Type |
//! |-----------|------|
//! | Engine → UI | [`Notification`] |
//! | UI → Engine | [`UiRequest`] |

// ============================================================================
// Imports
// ============================================================================

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::browser::TabRef;
use crate::identifiers::TabId;
use crate::refresh::FailedTab;

// ============================================================================
// Notification
// ============================================================================

/// Fire-and-forget notification pushed to any listening UI.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum Notification {
    /// An operation accepted its tab snapshot.
    RefreshStarted {
        /// Tabs that will be processed, in order.
        tabs: Vec<TabRef>,
    },

    /// Progress after a tab was processed.
    RefreshProgress {
        /// Tabs processed so far.
        current: usize,
        /// Tabs in the snapshot.
        total: usize,
        /// `floor(current * 100 / total)`.
        percent: u8,
        /// Tabs failed so far.
        failed: usize,
    },

    /// A tab was refreshed or skipped.
    TabSucceeded {
        /// Tab ID.
        tab_id: TabId,
    },

    /// A tab exhausted its retries.
    TabFailed {
        /// Tab ID.
        tab_id: TabId,
        /// Last error message.
        error: String,
    },

    /// The operation ended.
    RefreshComplete {
        /// `true` if every tab succeeded and the run was not cancelled.
        success: bool,
        /// `true` if the run was cancelled.
        cancelled: bool,
        /// Human-readable summary.
        details: String,
        /// Tabs refreshed or skipped.
        succeeded: usize,
        /// Tabs in the snapshot.
        total: usize,
        /// Tabs that failed.
        failed_tabs: Vec<FailedTab>,
    },
}

impl Notification {
    /// Returns the `action` name.
    #[must_use]
    pub fn action(&self) -> &'static str {
        match self {
            Self::RefreshStarted { .. } => "refreshStarted",
            Self::RefreshProgress { .. } => "refreshProgress",
            Self::TabSucceeded { .. } => "tabSucceeded",
            Self::TabFailed { .. } => "tabFailed",
            Self::RefreshComplete { .. } => "refreshComplete",
        }
    }
}

// ============================================================================
// UiRequest
// ============================================================================

/// Request sent by the UI, answered through an event reply.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "action", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum UiRequest {
    /// Start refreshing every tab.
    StartRefresh,

    /// Cancel the running operation.
    CancelRefresh,

    /// Query the running operation.
    GetStatus,

    /// Read the stored operation history.
    GetHistory,

    /// Queue an error report raised by the UI or a content script.
    ReportError {
        /// Report category (`popup_error`, ...).
        error_type: String,
        /// Free-form details.
        #[serde(default)]
        error_details: Value,
    },

    /// Upload queued error reports.
    SendPendingErrorReports,

    /// Store the user's error-reporting consent.
    SetErrorReportingConsent {
        /// Consent flag.
        enabled: bool,
    },
}

// ============================================================================
// Responses
// ============================================================================

/// Answer to a start request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StartResponse {
    /// Whether a new operation was started.
    pub accepted: bool,
    /// Why the request was rejected.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl StartResponse {
    /// Accepted start.
    #[inline]
    #[must_use]
    pub fn accepted() -> Self {
        Self {
            accepted: true,
            reason: None,
        }
    }

    /// Rejected start.
    #[inline]
    #[must_use]
    pub fn rejected(reason: impl Into<String>) -> Self {
        Self {
            accepted: false,
            reason: Some(reason.into()),
        }
    }
}

/// Answer to a cancel request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CancelResponse {
    /// Whether a running operation was flagged for cancellation.
    pub accepted: bool,
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use serde_json::json;

    #[test]
    fn test_progress_serialization() {
        let message = Notification::RefreshProgress {
            current: 2,
            total: 3,
            percent: 66,
            failed: 1,
        };

        let value = serde_json::to_value(&message).expect("serialize");
        assert_eq!(
            value,
            json!({"action": "refreshProgress", "current": 2, "total": 3, "percent": 66, "failed": 1})
        );
        assert_eq!(message.action(), "refreshProgress");
    }

    #[test]
    fn test_tab_failed_serialization() {
        let message = Notification::TabFailed {
            tab_id: TabId::new(5).expect("valid tab id"),
            error: "boom".into(),
        };

        let value = serde_json::to_value(&message).expect("serialize");
        assert_eq!(value, json!({"action": "tabFailed", "tabId": 5, "error": "boom"}));
    }

    #[test]
    fn test_complete_uses_camel_case() {
        let message = Notification::RefreshComplete {
            success: true,
            cancelled: false,
            details: "All 1 tabs refreshed".into(),
            succeeded: 1,
            total: 1,
            failed_tabs: vec![],
        };

        let value = serde_json::to_value(&message).expect("serialize");
        assert_eq!(value["action"], "refreshComplete");
        assert!(value.get("failedTabs").is_some());
    }

    #[test]
    fn test_parse_ui_requests() {
        let start: UiRequest =
            serde_json::from_value(json!({"action": "startRefresh"})).expect("parse");
        assert_eq!(start, UiRequest::StartRefresh);

        let report: UiRequest = serde_json::from_value(json!({
            "action": "reportError",
            "errorType": "popup_error",
            "errorDetails": {"message": "x"}
        }))
        .expect("parse");
        assert!(matches!(report, UiRequest::ReportError { ref error_type, .. } if error_type == "popup_error"));

        let consent: UiRequest = serde_json::from_value(json!({
            "action": "setErrorReportingConsent",
            "enabled": true
        }))
        .expect("parse");
        assert_eq!(consent, UiRequest::SetErrorReportingConsent { enabled: true });
    }

    #[test]
    fn test_unknown_ui_request() {
        let result = serde_json::from_value::<UiRequest>(json!({"action": "launchRockets"}));
        assert!(result.is_err());
    }

    #[test]
    fn test_start_response_serialization() {
        let value = serde_json::to_value(StartResponse::rejected("busy")).expect("serialize");
        assert_eq!(value, json!({"accepted": false, "reason": "busy"}));

        let value = serde_json::to_value(StartResponse::accepted()).expect("serialize");
        assert_eq!(value, json!({"accepted": true}));
    }
}
