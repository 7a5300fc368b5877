//! Tab records and the tab/script collaborator traits.

// ============================================================================
// Imports
// ============================================================================

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use url::Url;

use crate::error::Result;
use crate::identifiers::TabId;

// ============================================================================
// Constants
// ============================================================================

/// URL schemes the browser refuses to reload or script from an extension.
pub const RESERVED_SCHEMES: &[&str] = &[
    "about",
    "brave",
    "chrome",
    "chrome-extension",
    "chrome-search",
    "chrome-untrusted",
    "devtools",
    "edge",
    "moz-extension",
    "opera",
    "view-source",
    "vivaldi",
];

/// Returns `true` if `url` belongs to a browser-internal or extension page.
///
/// Unparseable or empty URLs are not reserved: tabs without URL access
/// permission report no URL at all and are still reloadable.
#[must_use]
pub fn is_reserved_url(url: &str) -> bool {
    Url::parse(url).is_ok_and(|parsed| RESERVED_SCHEMES.contains(&parsed.scheme()))
}

// ============================================================================
// TabRef
// ============================================================================

/// Snapshot of a tab taken when an operation starts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TabRef {
    /// Tab ID.
    pub id: TabId,
    /// Page title (may be empty).
    #[serde(default)]
    pub title: String,
    /// Page URL (may be empty without the `tabs` permission).
    #[serde(default)]
    pub url: String,
    /// Whether the browser has unloaded the tab.
    #[serde(default)]
    pub discarded: bool,
    /// Favicon URL.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub favicon_url: Option<String>,
}

impl TabRef {
    /// Creates a loaded tab record.
    #[must_use]
    pub fn new(id: TabId, title: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            id,
            title: title.into(),
            url: url.into(),
            discarded: false,
            favicon_url: None,
        }
    }

    /// Marks the record as discarded.
    #[inline]
    #[must_use]
    pub fn discarded(mut self) -> Self {
        self.discarded = true;
        self
    }

    /// Title to show in reports, never empty.
    #[must_use]
    pub fn display_title(&self) -> &str {
        if self.title.is_empty() {
            "Unknown tab"
        } else {
            &self.title
        }
    }
}

// ============================================================================
// TabState
// ============================================================================

/// Live status of a tab, fetched right before acting on it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TabState {
    /// Tab ID.
    pub id: TabId,
    /// Current URL.
    pub url: String,
    /// Whether the browser has unloaded the tab.
    pub discarded: bool,
    /// Whether a navigation is in progress.
    pub loading: bool,
}

impl TabState {
    /// Returns `true` if the tab shows a page that cannot be reloaded.
    #[inline]
    #[must_use]
    pub fn is_reserved(&self) -> bool {
        is_reserved_url(&self.url)
    }
}

// ============================================================================
// RawTab
// ============================================================================

/// Tab record as reported by the browser tab API.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawTab {
    /// Tab ID, absent for tabs the extension cannot address.
    #[serde(default)]
    pub id: Option<i64>,
    /// Page title.
    #[serde(default)]
    pub title: Option<String>,
    /// Page URL.
    #[serde(default)]
    pub url: Option<String>,
    /// Pending URL while a navigation is committing.
    #[serde(default)]
    pub pending_url: Option<String>,
    /// Discarded flag.
    #[serde(default)]
    pub discarded: bool,
    /// `loading` or `complete`.
    #[serde(default)]
    pub status: Option<String>,
    /// Favicon URL.
    #[serde(default)]
    pub fav_icon_url: Option<String>,
}

impl RawTab {
    /// Converts to a snapshot record, or `None` without a valid id.
    #[must_use]
    pub fn into_tab_ref(self) -> Option<TabRef> {
        let id = self.id.and_then(TabId::from_wire)?;
        Some(TabRef {
            id,
            title: self.title.unwrap_or_default(),
            url: self.url.unwrap_or_default(),
            discarded: self.discarded,
            favicon_url: self.fav_icon_url,
        })
    }

    /// Converts to a live status record, or `None` without a valid id.
    #[must_use]
    pub fn into_tab_state(self) -> Option<TabState> {
        let id = self.id.and_then(TabId::from_wire)?;
        Some(TabState {
            id,
            url: self.url.or(self.pending_url).unwrap_or_default(),
            discarded: self.discarded,
            loading: self.status.as_deref() == Some("loading"),
        })
    }
}

// ============================================================================
// ReloadOptions
// ============================================================================

/// Options for a tab reload.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReloadOptions {
    /// Skip the HTTP cache.
    pub bypass_cache: bool,
}

impl ReloadOptions {
    /// Reload that bypasses the cache.
    #[inline]
    #[must_use]
    pub const fn bypass_cache() -> Self {
        Self { bypass_cache: true }
    }
}

// ============================================================================
// Collaborator Traits
// ============================================================================

/// Access to the browser's tab list.
#[async_trait]
pub trait TabDirectory: Send + Sync {
    /// Lists every open tab, excluding tabs without a valid id.
    async fn list_tabs(&self) -> Result<Vec<TabRef>>;

    /// Fetches the live status of a tab.
    ///
    /// Returns [`Error::TabNotFound`](crate::Error::TabNotFound) once the tab
    /// has been closed.
    async fn get_tab(&self, id: TabId) -> Result<TabState>;

    /// Makes a tab the active tab of its window.
    async fn activate_tab(&self, id: TabId) -> Result<()>;

    /// Reloads a tab.
    async fn reload_tab(&self, id: TabId, options: ReloadOptions) -> Result<()>;
}

/// Runs script source inside a tab's page.
#[async_trait]
pub trait ScriptRunner: Send + Sync {
    /// Executes `script` in the tab and returns its JSON result.
    async fn run_in_tab(&self, id: TabId, script: &str) -> Result<Value>;
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reserved_urls() {
        assert!(is_reserved_url("chrome://settings"));
        assert!(is_reserved_url("chrome-extension://abc/popup.html"));
        assert!(is_reserved_url("edge://newtab/"));
        assert!(is_reserved_url("about:blank"));
        assert!(is_reserved_url("moz-extension://x/page.html"));
        assert!(is_reserved_url("view-source:https://example.com"));
    }

    #[test]
    fn test_regular_urls() {
        assert!(!is_reserved_url("https://example.com"));
        assert!(!is_reserved_url("http://localhost:8080/chrome://"));
        assert!(!is_reserved_url("file:///tmp/index.html"));
        assert!(!is_reserved_url(""));
    }

    #[test]
    fn test_raw_tab_without_id_is_dropped() {
        let raw: RawTab = serde_json::from_str(r#"{"title": "devtools"}"#).expect("parse");
        assert!(raw.into_tab_ref().is_none());

        let raw: RawTab = serde_json::from_str(r#"{"id": -1}"#).expect("parse");
        assert!(raw.into_tab_ref().is_none());
    }

    #[test]
    fn test_raw_tab_into_tab_ref() {
        let raw: RawTab = serde_json::from_str(
            r#"{"id": 4, "title": "Docs", "url": "https://docs.rs", "discarded": true,
                "favIconUrl": "https://docs.rs/favicon.ico"}"#,
        )
        .expect("parse");

        let tab = raw.into_tab_ref().expect("valid tab");
        assert_eq!(tab.id.get(), 4);
        assert_eq!(tab.title, "Docs");
        assert!(tab.discarded);
        assert_eq!(tab.favicon_url.as_deref(), Some("https://docs.rs/favicon.ico"));
    }

    #[test]
    fn test_raw_tab_into_tab_state() {
        let raw: RawTab = serde_json::from_str(
            r#"{"id": 9, "status": "loading", "pendingUrl": "https://example.org"}"#,
        )
        .expect("parse");

        let state = raw.into_tab_state().expect("valid tab");
        assert!(state.loading);
        assert_eq!(state.url, "https://example.org");
        assert!(!state.is_reserved());
    }

    #[test]
    fn test_display_title() {
        let id = TabId::new(1).expect("valid tab id");
        assert_eq!(TabRef::new(id, "", "").display_title(), "Unknown tab");
        assert_eq!(TabRef::new(id, "Inbox", "").display_title(), "Inbox");
    }
}
