//! WebSocket protocol message types.
//!
//! This module defines the message format for communication between
//! local end (Rust) and remote end (extension).
//!
//! # Protocol Overview
//!
//! | Message Type | Direction | Purpose |
//! |--------------|-----------|---------|
//! | `Request` | Local → Remote | Browser API call |
//! | `Response` | Remote → Local | Call result |
//! | `Event` | Remote → Local | Toolbar click, popup request |
//! | `EventReply` | Local → Remote | Answer to a popup request |
//!
//! Popup-facing payloads ([`Notification`], [`UiRequest`]) travel inside
//! `runtime.sendMessage` commands and `runtime.message` events.
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `command` | Command definitions by browser API module |
//! | `event` | Event and EventReply types |
//! | `message` | Popup notifications and requests |
//! | `request` | Request and Response types |

// ============================================================================
// Submodules
// ============================================================================

/// Command definitions organized by module.
pub mod command;

/// Event message types.
pub mod event;

/// Popup-facing messages.
pub mod message;

/// Request and Response message types.
pub mod request;

// ============================================================================
// Re-exports
// ============================================================================

pub use command::{
    ActionCommand, Command, IconVariant, RuntimeCommand, ScriptingCommand, StorageCommand,
    TabsCommand, TelemetryCommand,
};
pub use event::{Event, EventReply, ParsedEvent};
pub use message::{CancelResponse, Notification, StartResponse, UiRequest};
pub use request::{NO_SUCH_TAB, Request, Response, ResponseType};
