//! In-process fakes of the browser collaborators.

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{Value, json};
use tokio::time::Instant;

use crate::browser::{
    Indicator, NotificationSink, ReloadOptions, ScriptRunner, TabDirectory, TabRef, TabState,
};
use crate::error::{Error, Result};
use crate::identifiers::TabId;
use crate::protocol::Notification;
use crate::telemetry::{ErrorReport, Telemetry};

/// Builds a tab id, panicking on zero.
pub(crate) fn tab_id(id: u32) -> TabId {
    TabId::new(id).expect("non-zero tab id")
}

// ============================================================================
// Fault
// ============================================================================

/// Scripted failure of a tab call.
#[derive(Debug, Clone, Copy)]
pub(crate) enum Fault {
    /// Every call fails.
    Always,
    /// The next `n` calls fail.
    Times(u32),
    /// The call fails and the tab disappears.
    FailAndClose,
    /// The connection to the browser is gone.
    Disconnected,
}

/// Consumes one use of `fault`; returns the error to raise and whether the
/// tab should close.
fn trip(fault: &mut Option<Fault>, id: TabId, operation: &'static str) -> Option<(Error, bool)> {
    let error = || Error::tab_operation(id, operation, "net::ERR_FAILED");
    match fault.as_mut()? {
        Fault::Always => Some((error(), false)),
        Fault::Times(0) => None,
        Fault::Times(n) => {
            *n -= 1;
            Some((error(), false))
        }
        Fault::FailAndClose => Some((error(), true)),
        Fault::Disconnected => Some((Error::ConnectionClosed, false)),
    }
}

// ============================================================================
// FakeBrowser
// ============================================================================

#[derive(Debug)]
struct FakeTab {
    tab: TabRef,
    open: bool,
    loading_checks: u32,
    media: usize,
    scripts_fail: bool,
    reload_fault: Option<Fault>,
    activate_fault: Option<Fault>,
    lookups: usize,
    activations: usize,
    reloads: usize,
    scripts: usize,
}

/// Tab directory and script runner over an in-memory tab list.
#[derive(Debug, Default)]
pub(crate) struct FakeBrowser {
    tabs: Mutex<Vec<FakeTab>>,
    list_error: Mutex<Option<String>>,
    reload_log: Mutex<Vec<(TabId, Instant)>>,
}

impl FakeBrowser {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    fn insert(&self, tab: TabRef) -> TabRef {
        self.tabs.lock().push(FakeTab {
            tab: tab.clone(),
            open: true,
            loading_checks: 0,
            media: 0,
            scripts_fail: false,
            reload_fault: None,
            activate_fault: None,
            lookups: 0,
            activations: 0,
            reloads: 0,
            scripts: 0,
        });
        tab
    }

    pub(crate) fn add_tab(&self, id: u32, url: &str) -> TabRef {
        self.insert(TabRef::new(tab_id(id), format!("Tab {id}"), url))
    }

    pub(crate) fn add_discarded_tab(&self, id: u32, url: &str) -> TabRef {
        self.insert(TabRef::new(tab_id(id), format!("Tab {id}"), url).discarded())
    }

    /// Adds tabs `1..=count` on regular pages.
    pub(crate) fn add_tabs(&self, count: u32) -> Vec<TabRef> {
        (1..=count)
            .map(|id| self.add_tab(id, &format!("https://example.com/{id}")))
            .collect()
    }

    fn with_tab<R>(&self, id: u32, f: impl FnOnce(&mut FakeTab) -> R) -> R {
        let mut tabs = self.tabs.lock();
        let tab = tabs
            .iter_mut()
            .find(|t| t.tab.id.get() == id)
            .expect("tab was added");
        f(tab)
    }

    pub(crate) fn close_tab(&self, id: u32) {
        self.with_tab(id, |t| t.open = false);
    }

    pub(crate) fn set_media(&self, id: u32, count: usize) {
        self.with_tab(id, |t| t.media = count);
    }

    /// Reports the tab as loading for the next `checks` lookups.
    pub(crate) fn set_loading(&self, id: u32, checks: u32) {
        self.with_tab(id, |t| t.loading_checks = checks);
    }

    pub(crate) fn fail_reload(&self, id: u32, fault: Fault) {
        self.with_tab(id, |t| t.reload_fault = Some(fault));
    }

    pub(crate) fn fail_activate(&self, id: u32, fault: Fault) {
        self.with_tab(id, |t| t.activate_fault = Some(fault));
    }

    pub(crate) fn fail_scripts(&self, id: u32) {
        self.with_tab(id, |t| t.scripts_fail = true);
    }

    pub(crate) fn fail_listing(&self, message: &str) {
        *self.list_error.lock() = Some(message.to_string());
    }

    pub(crate) fn lookups(&self, id: u32) -> usize {
        self.with_tab(id, |t| t.lookups)
    }

    pub(crate) fn activations(&self, id: u32) -> usize {
        self.with_tab(id, |t| t.activations)
    }

    pub(crate) fn reloads(&self, id: u32) -> usize {
        self.with_tab(id, |t| t.reloads)
    }

    pub(crate) fn scripts_run(&self, id: u32) -> usize {
        self.with_tab(id, |t| t.scripts)
    }

    pub(crate) fn total_reloads(&self) -> usize {
        self.tabs.lock().iter().map(|t| t.reloads).sum()
    }

    /// Successful reloads with their (tokio) timestamps, in order.
    pub(crate) fn reload_log(&self) -> Vec<(TabId, Instant)> {
        self.reload_log.lock().clone()
    }

    fn open_tab<R>(&self, id: TabId, f: impl FnOnce(&mut FakeTab) -> Result<R>) -> Result<R> {
        let mut tabs = self.tabs.lock();
        match tabs.iter_mut().find(|t| t.tab.id == id && t.open) {
            Some(tab) => f(tab),
            None => Err(Error::tab_not_found(id)),
        }
    }
}

#[async_trait]
impl TabDirectory for FakeBrowser {
    async fn list_tabs(&self) -> Result<Vec<TabRef>> {
        if let Some(message) = self.list_error.lock().clone() {
            return Err(Error::snapshot(message));
        }
        Ok(self
            .tabs
            .lock()
            .iter()
            .filter(|t| t.open)
            .map(|t| t.tab.clone())
            .collect())
    }

    async fn get_tab(&self, id: TabId) -> Result<TabState> {
        let mut tabs = self.tabs.lock();
        let Some(tab) = tabs.iter_mut().find(|t| t.tab.id == id) else {
            return Err(Error::tab_not_found(id));
        };
        tab.lookups += 1;
        if !tab.open {
            return Err(Error::tab_not_found(id));
        }

        let loading = tab.loading_checks > 0;
        if loading && tab.loading_checks != u32::MAX {
            tab.loading_checks -= 1;
        }

        Ok(TabState {
            id,
            url: tab.tab.url.clone(),
            discarded: tab.tab.discarded,
            loading,
        })
    }

    async fn activate_tab(&self, id: TabId) -> Result<()> {
        self.open_tab(id, |tab| {
            tab.activations += 1;
            if let Some((error, close)) = trip(&mut tab.activate_fault, id, "activate") {
                tab.open &= !close;
                return Err(error);
            }
            tab.tab.discarded = false;
            Ok(())
        })
    }

    async fn reload_tab(&self, id: TabId, _options: ReloadOptions) -> Result<()> {
        self.open_tab(id, |tab| {
            tab.reloads += 1;
            if let Some((error, close)) = trip(&mut tab.reload_fault, id, "reload") {
                tab.open &= !close;
                return Err(error);
            }
            Ok(())
        })?;
        self.reload_log.lock().push((id, Instant::now()));
        Ok(())
    }
}

#[async_trait]
impl ScriptRunner for FakeBrowser {
    async fn run_in_tab(&self, id: TabId, _script: &str) -> Result<Value> {
        self.open_tab(id, |tab| {
            tab.scripts += 1;
            if tab.scripts_fail {
                return Err(Error::injection(id, "Cannot access contents of the page"));
            }
            let states: serde_json::Map<String, Value> = (0..tab.media)
                .map(|n| (format!("video_{n}"), json!({"currentTime": 1.0, "paused": false})))
                .collect();
            Ok(Value::Object(states))
        })
    }
}

// ============================================================================
// RecordingSink
// ============================================================================

type NotifyHook = Arc<dyn Fn(&Notification) + Send + Sync>;

/// Notification sink that keeps everything it receives.
#[derive(Default)]
pub(crate) struct RecordingSink {
    notifications: Mutex<Vec<Notification>>,
    indicators: Mutex<Vec<Indicator>>,
    hook: Mutex<Option<NotifyHook>>,
}

impl RecordingSink {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Runs `hook` after every delivered notification.
    pub(crate) fn on_notify(&self, hook: impl Fn(&Notification) + Send + Sync + 'static) {
        *self.hook.lock() = Some(Arc::new(hook));
    }

    pub(crate) fn notifications(&self) -> Vec<Notification> {
        self.notifications.lock().clone()
    }

    pub(crate) fn indicators(&self) -> Vec<Indicator> {
        self.indicators.lock().clone()
    }

    pub(crate) fn actions(&self) -> Vec<&'static str> {
        self.notifications.lock().iter().map(Notification::action).collect()
    }

    /// The `refreshComplete` notification, if one was sent.
    pub(crate) fn completion(&self) -> Option<Notification> {
        self.notifications
            .lock()
            .iter()
            .find(|n| matches!(n, Notification::RefreshComplete { .. }))
            .cloned()
    }
}

#[async_trait]
impl NotificationSink for RecordingSink {
    async fn notify(&self, notification: Notification) {
        self.notifications.lock().push(notification.clone());
        let hook = self.hook.lock().clone();
        if let Some(hook) = hook {
            hook(&notification);
        }
    }

    async fn indicate(&self, indicator: Indicator) {
        self.indicators.lock().push(indicator);
    }
}

// ============================================================================
// RecordingTelemetry
// ============================================================================

/// Telemetry that keeps every report.
#[derive(Debug, Default)]
pub(crate) struct RecordingTelemetry {
    reports: Mutex<Vec<ErrorReport>>,
}

impl RecordingTelemetry {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn error_types(&self) -> Vec<String> {
        self.reports.lock().iter().map(|r| r.error_type.clone()).collect()
    }

    pub(crate) fn reports(&self) -> Vec<ErrorReport> {
        self.reports.lock().clone()
    }
}

#[async_trait]
impl Telemetry for RecordingTelemetry {
    async fn report(&self, report: ErrorReport) {
        self.reports.lock().push(report);
    }
}
