//! Per-tab refresh state machine.
//!
//! ```text
//! Checking ─┬─ closed / reserved ─────────────────────────► Skipped
//!           ├─ loading ──► LoadingWait ──► Checking
//!           ├─ discarded ─► activate, stabilize ─┐
//!           └─ live ──────► capture media ───────┴─► reload ─┬─► Refreshed
//!                                                            └─► Retry
//! Retry ─┬─ retries left ──► backoff ──► Checking
//!        └─ exhausted ─────────────────────────────────────► Failed
//! ```
//!
//! Activation and reload failures share one retry counter. Loading waits do
//! not consume retries but are bounded separately.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use crate::browser::{
    CAPTURE_SCRIPT, MediaSnapshot, ReloadOptions, ScriptRunner, TabDirectory, TabRef,
};
use crate::config::RefreshConfig;
use crate::error::{Error, Result};
use crate::identifiers::TabId;

// ============================================================================
// TabOutcome
// ============================================================================

/// Why a tab was counted as succeeded without a reload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// The tab was closed.
    Closed,
    /// The tab shows a browser-internal page.
    Reserved,
}

/// Terminal result of one tab.
#[derive(Debug)]
pub enum TabOutcome {
    /// The tab was reloaded.
    Refreshed {
        /// Reload attempts, including the successful one.
        attempts: u32,
        /// Media elements captured before the reload.
        preserved_media: usize,
    },
    /// The tab needed no reload.
    Skipped(SkipReason),
    /// The tab exhausted its retries or hit a permanent error.
    Failed {
        /// Last error.
        error: Error,
        /// Attempts made.
        attempts: u32,
    },
}

impl TabOutcome {
    /// Returns `true` for refreshed and skipped tabs.
    #[inline]
    #[must_use]
    pub fn is_success(&self) -> bool {
        !matches!(self, Self::Failed { .. })
    }

    /// Error message of a failed tab.
    #[must_use]
    pub fn error_message(&self) -> Option<String> {
        match self {
            Self::Failed { error, .. } => Some(error.to_string()),
            _ => None,
        }
    }
}

// ============================================================================
// TabRefresher
// ============================================================================

enum Step {
    Checking,
    LoadingWait,
    Discarded,
    Live,
    Retry(Error),
}

/// Drives one tab to a [`TabOutcome`].
#[derive(Clone)]
pub struct TabRefresher {
    tabs: Arc<dyn TabDirectory>,
    scripts: Arc<dyn ScriptRunner>,
    config: Arc<RefreshConfig>,
}

impl fmt::Debug for TabRefresher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TabRefresher")
            .field("max_retries", &self.config.retry.max_retries)
            .finish_non_exhaustive()
    }
}

impl TabRefresher {
    /// Creates a refresher over the given collaborators.
    #[must_use]
    pub fn new(
        tabs: Arc<dyn TabDirectory>,
        scripts: Arc<dyn ScriptRunner>,
        config: Arc<RefreshConfig>,
    ) -> Self {
        Self {
            tabs,
            scripts,
            config,
        }
    }

    /// Runs the state machine for `tab` until it reaches a terminal outcome.
    pub async fn refresh(&self, tab: &TabRef) -> TabOutcome {
        let id = tab.id;
        let max_retries = self.config.retry.max_retries;
        let mut retry = 0u32;
        let mut loading_waits = 0u32;
        let mut step = Step::Checking;

        loop {
            step = match step {
                Step::Checking => match self.tabs.get_tab(id).await {
                    Err(e) if e.is_tab_gone() => {
                        debug!(tab_id = %id, "Tab closed, skipping");
                        return TabOutcome::Skipped(SkipReason::Closed);
                    }
                    Err(e) => Step::Retry(e),
                    Ok(state) if state.is_reserved() => {
                        debug!(tab_id = %id, url = %state.url, "Reserved page, skipping");
                        return TabOutcome::Skipped(SkipReason::Reserved);
                    }
                    Ok(state) if state.loading && loading_waits < self.config.max_loading_waits => {
                        Step::LoadingWait
                    }
                    Ok(state) if state.discarded => Step::Discarded,
                    Ok(_) => Step::Live,
                },

                Step::LoadingWait => {
                    loading_waits += 1;
                    debug!(tab_id = %id, wait = loading_waits, "Tab still loading");
                    pause(self.config.loading_wait).await;
                    Step::Checking
                }

                Step::Discarded => match self.reload_discarded(id).await {
                    Ok(()) => {
                        return TabOutcome::Refreshed {
                            attempts: retry + 1,
                            preserved_media: 0,
                        };
                    }
                    Err(e) => Step::Retry(e),
                },

                Step::Live => {
                    let preserved_media = self.capture_media(id).await;
                    match self.tabs.reload_tab(id, ReloadOptions::bypass_cache()).await {
                        Ok(()) => {
                            return TabOutcome::Refreshed {
                                attempts: retry + 1,
                                preserved_media,
                            };
                        }
                        Err(e) => Step::Retry(e),
                    }
                }

                Step::Retry(error) => {
                    if error.is_tab_gone() {
                        debug!(tab_id = %id, "Tab closed during refresh, skipping");
                        return TabOutcome::Skipped(SkipReason::Closed);
                    }
                    if !error.is_recoverable() || retry >= max_retries {
                        warn!(tab_id = %id, attempts = retry + 1, error = %error, "Tab refresh failed");
                        return TabOutcome::Failed {
                            error,
                            attempts: retry + 1,
                        };
                    }

                    let delay = self.config.retry.delay(retry);
                    retry += 1;
                    debug!(
                        tab_id = %id,
                        attempt = retry + 1,
                        delay_ms = delay.as_millis(),
                        error = %error,
                        "Retrying tab"
                    );
                    pause(delay).await;
                    Step::Checking
                }
            };
        }
    }

    /// Activates a discarded tab, lets it settle, then reloads it.
    async fn reload_discarded(&self, id: TabId) -> Result<()> {
        self.tabs.activate_tab(id).await?;
        pause(self.config.stabilization_delay).await;
        self.tabs.reload_tab(id, ReloadOptions::bypass_cache()).await
    }

    /// Captures media state; returns the number of captured elements.
    ///
    /// Injection failures are not errors: the tab is reloaded without
    /// preservation.
    async fn capture_media(&self, id: TabId) -> usize {
        match self.scripts.run_in_tab(id, CAPTURE_SCRIPT).await {
            Ok(value) => {
                let snapshot = MediaSnapshot::from_script_result(value);
                if !snapshot.is_empty() {
                    debug!(tab_id = %id, media = snapshot.len(), playing = snapshot.playing(), "Media state captured");
                }
                pause(self.config.capture_settle_delay).await;
                snapshot.len()
            }
            Err(e) => {
                debug!(tab_id = %id, error = %e, "Media capture unavailable, reloading without it");
                0
            }
        }
    }
}

/// Sleeps unless `duration` is zero.
pub(crate) async fn pause(duration: Duration) {
    if !duration.is_zero() {
        tokio::time::sleep(duration).await;
    }
}

// ============================================================================
// Tests
// ============================================================================
