//! Collaborators backed by the extension connection.
//!
//! Each trait call becomes one protocol command; the extension performs the
//! matching browser API call and answers with a response.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Map, Value};
use tracing::debug;

use crate::error::{Error, Result};
use crate::identifiers::TabId;
use crate::protocol::{
    ActionCommand, Command, IconVariant, Notification, RuntimeCommand, ScriptingCommand,
    StorageCommand, TabsCommand, TelemetryCommand,
};
use crate::telemetry::{ErrorReport, ReportUploader};
use crate::transport::Connection;

use super::notify::{Indicator, NotificationSink};
use super::storage::{KeyValueStore, StorageArea};
use super::tabs::{RawTab, ReloadOptions, ScriptRunner, TabDirectory, TabRef, TabState};

// ============================================================================
// Constants
// ============================================================================

/// Timeout for best-effort UI calls.
const UI_TIMEOUT: Duration = Duration::from_secs(5);

/// Badge color while refreshing.
const BUSY_BADGE_COLOR: &str = "#4285f4";

// ============================================================================
// RemoteBrowser
// ============================================================================

/// Tab, scripting and UI access through the extension.
#[derive(Clone)]
pub struct RemoteBrowser {
    connection: Connection,
}

impl fmt::Debug for RemoteBrowser {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RemoteBrowser")
            .field("pending", &self.connection.pending_count())
            .finish_non_exhaustive()
    }
}

impl RemoteBrowser {
    /// Wraps a connection.
    #[inline]
    #[must_use]
    pub fn new(connection: Connection) -> Self {
        Self { connection }
    }

    /// Returns a store for `area` sharing this connection.
    #[inline]
    #[must_use]
    pub fn store(&self, area: StorageArea) -> RemoteStore {
        RemoteStore {
            connection: self.connection.clone(),
            area,
        }
    }

    /// Returns an uploader sharing this connection.
    #[inline]
    #[must_use]
    pub fn uploader(&self) -> RemoteUploader {
        RemoteUploader {
            connection: self.connection.clone(),
        }
    }

    /// Sends a UI command, logging and dropping any failure.
    async fn send_ui(&self, command: Command) {
        let method = command.method();
        let outcome = match self.connection.send_with_timeout(command, UI_TIMEOUT).await {
            Ok(response) => response.into_result().map(drop),
            Err(e) => Err(e),
        };

        if let Err(e) = outcome {
            debug!(%method, error = %e, "UI call not delivered");
        }
    }
}

#[async_trait]
impl TabDirectory for RemoteBrowser {
    async fn list_tabs(&self) -> Result<Vec<TabRef>> {
        let response = self.connection.send(Command::Tabs(TabsCommand::Query)).await?;
        let value = response.into_result().map_err(|e| Error::snapshot(e.to_string()))?;

        let raw: Vec<RawTab> = value
            .get("tabs")
            .cloned()
            .map(serde_json::from_value)
            .transpose()?
            .unwrap_or_default();

        let total = raw.len();
        let tabs: Vec<TabRef> = raw.into_iter().filter_map(RawTab::into_tab_ref).collect();

        debug!(total, usable = tabs.len(), "Listed tabs");
        Ok(tabs)
    }

    async fn get_tab(&self, id: TabId) -> Result<TabState> {
        let response = self
            .connection
            .send(Command::Tabs(TabsCommand::Get { tab_id: id }))
            .await?;
        let value = response.into_tab_result(id, "get")?;

        let raw: RawTab = serde_json::from_value(value.get("tab").cloned().unwrap_or(Value::Null))?;
        raw.into_tab_state().ok_or_else(|| Error::tab_not_found(id))
    }

    async fn activate_tab(&self, id: TabId) -> Result<()> {
        let response = self
            .connection
            .send(Command::Tabs(TabsCommand::Activate { tab_id: id }))
            .await?;
        response.into_tab_result(id, "activate")?;
        Ok(())
    }

    async fn reload_tab(&self, id: TabId, options: ReloadOptions) -> Result<()> {
        let response = self
            .connection
            .send(Command::Tabs(TabsCommand::Reload {
                tab_id: id,
                bypass_cache: options.bypass_cache,
            }))
            .await?;
        response.into_tab_result(id, "reload")?;
        Ok(())
    }
}

#[async_trait]
impl ScriptRunner for RemoteBrowser {
    async fn run_in_tab(&self, id: TabId, script: &str) -> Result<Value> {
        let response = self
            .connection
            .send(Command::Scripting(ScriptingCommand::ExecuteScript {
                tab_id: id,
                script: script.to_string(),
            }))
            .await?;

        if !response.is_success() {
            return Err(Error::injection(id, response.error_message()));
        }

        Ok(response
            .result
            .as_ref()
            .and_then(|v| v.get("value"))
            .cloned()
            .unwrap_or(Value::Null))
    }
}

#[async_trait]
impl NotificationSink for RemoteBrowser {
    async fn notify(&self, notification: Notification) {
        let message = match serde_json::to_value(&notification) {
            Ok(message) => message,
            Err(e) => {
                debug!(action = notification.action(), error = %e, "Unserializable notification");
                return;
            }
        };

        self.send_ui(Command::Runtime(RuntimeCommand::SendMessage { message }))
            .await;
    }

    async fn indicate(&self, indicator: Indicator) {
        match indicator {
            Indicator::Busy => {
                self.send_ui(Command::Action(ActionCommand::SetIcon {
                    variant: IconVariant::Busy,
                }))
                .await;
                self.send_ui(Command::Action(ActionCommand::SetBadgeColor {
                    color: BUSY_BADGE_COLOR.to_string(),
                }))
                .await;
            }
            Indicator::Idle => {
                self.send_ui(Command::Action(ActionCommand::SetIcon {
                    variant: IconVariant::Idle,
                }))
                .await;
            }
            Indicator::Progress(_) => {}
        }

        self.send_ui(Command::Action(ActionCommand::SetBadgeText {
            text: indicator.badge_text(),
        }))
        .await;
    }
}

// ============================================================================
// RemoteStore
// ============================================================================

/// One extension storage area.
#[derive(Clone)]
pub struct RemoteStore {
    connection: Connection,
    area: StorageArea,
}

impl fmt::Debug for RemoteStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RemoteStore")
            .field("area", &self.area)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl KeyValueStore for RemoteStore {
    async fn get(&self, keys: &[&str]) -> Result<Map<String, Value>> {
        let response = self
            .connection
            .send(Command::Storage(StorageCommand::Get {
                area: self.area,
                keys: keys.iter().map(|k| (*k).to_string()).collect(),
            }))
            .await?;

        match response.into_result().map_err(|e| Error::storage(e.to_string()))? {
            Value::Object(map) => Ok(map),
            Value::Null => Ok(Map::new()),
            other => Err(Error::storage(format!("unexpected storage result: {other}"))),
        }
    }

    async fn set(&self, items: Map<String, Value>) -> Result<()> {
        let response = self
            .connection
            .send(Command::Storage(StorageCommand::Set {
                area: self.area,
                items,
            }))
            .await?;

        response
            .into_result()
            .map(drop)
            .map_err(|e| Error::storage(e.to_string()))
    }
}

// ============================================================================
// RemoteUploader
// ============================================================================

/// Hands error reports to the extension, which POSTs them.
#[derive(Clone)]
pub struct RemoteUploader {
    connection: Connection,
}

#[async_trait]
impl ReportUploader for RemoteUploader {
    async fn upload(&self, reports: &[ErrorReport]) -> Result<()> {
        let reports = reports
            .iter()
            .map(serde_json::to_value)
            .collect::<std::result::Result<Vec<_>, _>>()?;

        let response = self
            .connection
            .send(Command::Telemetry(TelemetryCommand::Upload { reports }))
            .await?;

        response
            .into_result()
            .map(drop)
            .map_err(|e| Error::upload(e.to_string()))
    }
}
