//! UI notification sink.

// ============================================================================
// Imports
// ============================================================================

use async_trait::async_trait;

use crate::protocol::Notification;

// ============================================================================
// Indicator
// ============================================================================

/// Toolbar state requested from the UI collaborator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Indicator {
    /// An operation started.
    Busy,
    /// Progress badge, `0..=100`.
    Progress(u8),
    /// No operation is running.
    Idle,
}

impl Indicator {
    /// Badge text for this state (empty clears the badge).
    #[must_use]
    pub fn badge_text(self) -> String {
        match self {
            Self::Busy => "0%".to_string(),
            Self::Progress(percent) => format!("{percent}%"),
            Self::Idle => String::new(),
        }
    }
}

// ============================================================================
// NotificationSink
// ============================================================================

/// Best-effort outbound channel to whatever UI is listening.
///
/// Implementations swallow delivery failures: a missing listener must never
/// fail a refresh operation.
#[async_trait]
pub trait NotificationSink: Send + Sync {
    /// Delivers a notification.
    async fn notify(&self, notification: Notification);

    /// Updates the toolbar indicator.
    async fn indicate(&self, indicator: Indicator);
}

/// Sink that drops everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullSink;

#[async_trait]
impl NotificationSink for NullSink {
    async fn notify(&self, _notification: Notification) {}

    async fn indicate(&self, _indicator: Indicator) {}
}

// ============================================================================
// Tests
// ============================================================================
