//! Command definitions organized by browser API module.
//!
//! Commands follow `module.methodName` format and map one-to-one onto the
//! extension API call the remote end performs.
//!
//! | Module | Commands |
//! |--------|----------|
//! | `tabs` | `query`, `get`, `activate`, `reload` |
//! | `scripting` | `executeScript` |
//! | `storage` | `get`, `set` |
//! | `runtime` | `sendMessage` |
//! | `action` | `setBadgeText`, `setBadgeColor`, `setIcon` |
//! | `telemetry` | `upload` |

// ============================================================================
// Imports
// ============================================================================

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::browser::StorageArea;
use crate::identifiers::TabId;

// ============================================================================
// Command Wrapper
// ============================================================================

/// All protocol commands organized by module.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Command {
    /// Tabs module commands.
    Tabs(TabsCommand),
    /// Scripting module commands.
    Scripting(ScriptingCommand),
    /// Storage module commands.
    Storage(StorageCommand),
    /// Runtime module commands.
    Runtime(RuntimeCommand),
    /// Action (toolbar button) module commands.
    Action(ActionCommand),
    /// Telemetry module commands.
    Telemetry(TelemetryCommand),
}

impl Command {
    /// Returns the `module.methodName` string.
    #[must_use]
    pub fn method(&self) -> String {
        serde_json::to_value(self)
            .ok()
            .and_then(|v| v.get("method").and_then(Value::as_str).map(str::to_string))
            .unwrap_or_default()
    }
}

// ============================================================================
// Tabs Commands
// ============================================================================

/// Tabs module commands.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "method", content = "params")]
pub enum TabsCommand {
    /// List every tab in every window.
    #[serde(rename = "tabs.query")]
    Query,

    /// Fetch one tab.
    #[serde(rename = "tabs.get")]
    Get {
        /// Tab ID.
        #[serde(rename = "tabId")]
        tab_id: TabId,
    },

    /// Make a tab active (`tabs.update(id, {active: true})`).
    #[serde(rename = "tabs.activate")]
    Activate {
        /// Tab ID.
        #[serde(rename = "tabId")]
        tab_id: TabId,
    },

    /// Reload a tab.
    #[serde(rename = "tabs.reload")]
    Reload {
        /// Tab ID.
        #[serde(rename = "tabId")]
        tab_id: TabId,
        /// Skip the HTTP cache.
        #[serde(rename = "bypassCache")]
        bypass_cache: bool,
    },
}

// ============================================================================
// Scripting Commands
// ============================================================================

/// Scripting module commands.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "method", content = "params")]
pub enum ScriptingCommand {
    /// Inject and run a script in the tab's main frame.
    #[serde(rename = "scripting.executeScript")]
    ExecuteScript {
        /// Tab ID.
        #[serde(rename = "tabId")]
        tab_id: TabId,
        /// Script source; its completion value is returned.
        script: String,
    },
}

// ============================================================================
// Storage Commands
// ============================================================================

/// Storage module commands.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "method", content = "params")]
pub enum StorageCommand {
    /// Read keys from an area.
    #[serde(rename = "storage.get")]
    Get {
        /// Storage area.
        area: StorageArea,
        /// Keys to read.
        keys: Vec<String>,
    },

    /// Write entries to an area.
    #[serde(rename = "storage.set")]
    Set {
        /// Storage area.
        area: StorageArea,
        /// Entries to write.
        items: Map<String, Value>,
    },
}

// ============================================================================
// Runtime Commands
// ============================================================================

/// Runtime module commands.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "method", content = "params")]
pub enum RuntimeCommand {
    /// Broadcast a message to extension pages (the popup).
    #[serde(rename = "runtime.sendMessage")]
    SendMessage {
        /// Message payload.
        message: Value,
    },
}

// ============================================================================
// Action Commands
// ============================================================================

/// Toolbar icon variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IconVariant {
    /// Default icon.
    Idle,
    /// Colorful icon shown while refreshing.
    Busy,
}

/// Action module commands.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "method", content = "params")]
pub enum ActionCommand {
    /// Set the badge text (empty clears it).
    #[serde(rename = "action.setBadgeText")]
    SetBadgeText {
        /// Badge text.
        text: String,
    },

    /// Set the badge background color.
    #[serde(rename = "action.setBadgeColor")]
    SetBadgeColor {
        /// CSS color.
        color: String,
    },

    /// Switch the toolbar icon.
    #[serde(rename = "action.setIcon")]
    SetIcon {
        /// Icon variant.
        variant: IconVariant,
    },
}

// ============================================================================
// Telemetry Commands
// ============================================================================

/// Telemetry module commands.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "method", content = "params")]
pub enum TelemetryCommand {
    /// POST queued error reports to the reporting endpoint.
    #[serde(rename = "telemetry.upload")]
    Upload {
        /// Reports to upload.
        reports: Vec<Value>,
    },
}

// ============================================================================
// Tests
// ============================================================================
