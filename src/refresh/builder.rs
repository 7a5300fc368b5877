//! Builder for [`RefreshController`].
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use refresh_em_all::{RefreshConfig, RefreshController};
//!
//! let controller = RefreshController::builder()
//!     .config(RefreshConfig::default())
//!     .browser(Arc::new(browser))
//!     .history_store(Arc::new(browser.store(StorageArea::Sync)))
//!     .build()?;
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::browser::{KeyValueStore, MemoryStore, NotificationSink, NullSink, ScriptRunner, TabDirectory};
use crate::config::RefreshConfig;
use crate::error::{Error, Result};
use crate::history::HistoryStore;
use crate::telemetry::{NullTelemetry, Telemetry};

use super::attempt::TabRefresher;
use super::controller::{ControllerInner, RefreshController};
use super::progress::ProgressEmitter;
use super::scheduler::BatchScheduler;

// ============================================================================
// ControllerBuilder
// ============================================================================

/// Collects the collaborators of a [`RefreshController`].
///
/// Tabs and scripting are required. The sink defaults to [`NullSink`],
/// telemetry to [`NullTelemetry`] and history to an in-memory store.
#[derive(Default)]
pub struct ControllerBuilder {
    config: RefreshConfig,
    tabs: Option<Arc<dyn TabDirectory>>,
    scripts: Option<Arc<dyn ScriptRunner>>,
    history: Option<Arc<dyn KeyValueStore>>,
    sink: Option<Arc<dyn NotificationSink>>,
    telemetry: Option<Arc<dyn Telemetry>>,
}

impl fmt::Debug for ControllerBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ControllerBuilder")
            .field("config", &self.config)
            .field("tabs", &self.tabs.is_some())
            .field("scripts", &self.scripts.is_some())
            .finish_non_exhaustive()
    }
}

impl ControllerBuilder {
    /// Creates an empty builder with default configuration.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the configuration.
    #[inline]
    #[must_use]
    pub fn config(mut self, config: RefreshConfig) -> Self {
        self.config = config;
        self
    }

    /// Sets the tab directory.
    #[inline]
    #[must_use]
    pub fn tabs(mut self, tabs: Arc<dyn TabDirectory>) -> Self {
        self.tabs = Some(tabs);
        self
    }

    /// Sets the script runner.
    #[inline]
    #[must_use]
    pub fn scripts(mut self, scripts: Arc<dyn ScriptRunner>) -> Self {
        self.scripts = Some(scripts);
        self
    }

    /// Uses one collaborator for both tabs and scripting.
    #[must_use]
    pub fn browser<B>(self, browser: Arc<B>) -> Self
    where
        B: TabDirectory + ScriptRunner + 'static,
    {
        let tabs: Arc<dyn TabDirectory> = browser.clone();
        self.tabs(tabs).scripts(browser)
    }

    /// Sets the store holding the history list.
    #[inline]
    #[must_use]
    pub fn history_store(mut self, store: Arc<dyn KeyValueStore>) -> Self {
        self.history = Some(store);
        self
    }

    /// Sets the notification sink.
    #[inline]
    #[must_use]
    pub fn sink(mut self, sink: Arc<dyn NotificationSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Sets the telemetry sink.
    #[inline]
    #[must_use]
    pub fn telemetry(mut self, telemetry: Arc<dyn Telemetry>) -> Self {
        self.telemetry = Some(telemetry);
        self
    }

    /// Builds the controller.
    ///
    /// # Errors
    ///
    /// - [`Error::Config`] if tabs or scripting are not set
    /// - [`Error::Config`] if the configuration is invalid
    pub fn build(self) -> Result<RefreshController> {
        self.config.validate()?;

        let tabs = self.tabs.ok_or_else(|| {
            Error::config("A tab directory is required. Use .tabs() or .browser() to set it.")
        })?;
        let scripts = self.scripts.ok_or_else(|| {
            Error::config("A script runner is required. Use .scripts() or .browser() to set it.")
        })?;

        let config = Arc::new(self.config);
        let history_store = self
            .history
            .unwrap_or_else(|| Arc::new(MemoryStore::new()));
        let history = Arc::new(HistoryStore::new(history_store, config.history_limit));
        let sink = self.sink.unwrap_or_else(|| Arc::new(NullSink));
        let telemetry = self.telemetry.unwrap_or_else(|| Arc::new(NullTelemetry));

        let emitter = ProgressEmitter::new(sink, history);
        let refresher = TabRefresher::new(Arc::clone(&tabs), scripts, Arc::clone(&config));
        let scheduler = BatchScheduler::new(refresher, emitter.clone(), Arc::clone(&config));

        Ok(RefreshController::from_inner(ControllerInner {
            config,
            tabs,
            scheduler,
            emitter,
            telemetry,
            slot: Arc::new(Mutex::new(None)),
        }))
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use crate::refresh::testing::FakeBrowser;

    #[test]
    fn test_build_requires_tabs() {
        let err = ControllerBuilder::new().build().expect_err("missing tabs");
        assert!(matches!(err, Error::Config { .. }));
    }

    #[test]
    fn test_build_requires_scripts() {
        let browser = Arc::new(FakeBrowser::new());
        let err = ControllerBuilder::new()
            .tabs(browser)
            .build()
            .expect_err("missing scripts");
        assert!(err.to_string().contains("script runner"));
    }

    #[test]
    fn test_build_validates_config() {
        let err = ControllerBuilder::new()
            .browser(Arc::new(FakeBrowser::new()))
            .config(RefreshConfig::new().with_history_limit(0))
            .build()
            .expect_err("invalid config");
        assert!(matches!(err, Error::Config { .. }));
    }

    #[test]
    fn test_build_with_defaults() {
        let controller = ControllerBuilder::new()
            .browser(Arc::new(FakeBrowser::new()))
            .config(RefreshConfig::new().with_history_limit(5))
            .build()
            .expect("valid builder");

        assert!(!controller.is_active());
        assert_eq!(controller.history().limit(), 5);
    }
}
