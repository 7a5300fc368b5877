//! Event message types.
//!
//! Events are notifications sent from the remote end (extension) to the
//! local end (Rust) when the user interacts with the extension.
//!
//! # Event Types
//!
//! | Method | Meaning |
//! |--------|---------|
//! | `action.clicked` | Toolbar button clicked |
//! | `runtime.message` | Popup sent a [`UiRequest`] and awaits a reply |

// ============================================================================
// Imports
// ============================================================================

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::identifiers::RequestId;

use super::UiRequest;

// ============================================================================
// Event
// ============================================================================

/// An event notification from remote end to local end.
///
/// # Format
///
/// ```json
/// {
///   "id": "event-uuid",
///   "type": "event",
///   "method": "module.eventName",
///   "params": { ... }
/// }
/// ```
#[derive(Debug, Clone, Deserialize)]
pub struct Event {
    /// Unique identifier for EventReply correlation.
    pub id: RequestId,

    /// Event type marker (always "event").
    #[serde(rename = "type")]
    pub event_type: String,

    /// Event name in `module.eventName` format.
    pub method: String,

    /// Event-specific data.
    #[serde(default)]
    pub params: Value,
}

impl Event {
    /// Returns the module name from the method.
    #[inline]
    #[must_use]
    pub fn module(&self) -> &str {
        self.method.split('.').next().unwrap_or_default()
    }

    /// Parses the event into a typed variant.
    #[must_use]
    pub fn parse(&self) -> ParsedEvent {
        match self.method.as_str() {
            "action.clicked" => ParsedEvent::ActionClicked,

            "runtime.message" => {
                let payload = self.params.get("message").cloned().unwrap_or(Value::Null);
                match serde_json::from_value::<UiRequest>(payload) {
                    Ok(request) => ParsedEvent::UiRequest(request),
                    Err(e) => ParsedEvent::MalformedRequest {
                        message: e.to_string(),
                    },
                }
            }

            _ => ParsedEvent::Unknown {
                method: self.method.clone(),
                params: self.params.clone(),
            },
        }
    }
}

// ============================================================================
// EventReply
// ============================================================================

/// A reply from local end to remote end, answering a UI request.
///
/// # Format
///
/// ```json
/// {
///   "id": "event-uuid",
///   "replyTo": "runtime.message",
///   "result": { "accepted": true }
/// }
/// ```
#[derive(Debug, Clone, Serialize)]
pub struct EventReply {
    /// Matches the event's ID.
    pub id: RequestId,

    /// Event method being replied to.
    #[serde(rename = "replyTo")]
    pub reply_to: String,

    /// Reply payload passed to the popup's `sendResponse`.
    pub result: Value,
}

impl EventReply {
    /// Creates a reply to `event`.
    #[inline]
    #[must_use]
    pub fn to(event: &Event, result: Value) -> Self {
        Self {
            id: event.id,
            reply_to: event.method.clone(),
            result,
        }
    }
}

// ============================================================================
// ParsedEvent
// ============================================================================

/// Parsed event types for type-safe handling.
#[derive(Debug, Clone, PartialEq)]
pub enum ParsedEvent {
    /// Toolbar button clicked.
    ActionClicked,

    /// Popup request.
    UiRequest(UiRequest),

    /// `runtime.message` whose payload is not a known request.
    MalformedRequest {
        /// Parse error.
        message: String,
    },

    /// Unknown event type.
    Unknown {
        /// Event method.
        method: String,
        /// Event params.
        params: Value,
    },
}

// ============================================================================
// Tests
// ============================================================================
