//! Bounded operation history.
//!
//! Entries are kept newest-first under `refreshHistory` in the synced
//! storage area.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::debug;

use crate::browser::KeyValueStore;
use crate::browser::storage::{get_one, set_one};
use crate::config::MAX_HISTORY_LIMIT;
use crate::error::Result;
use crate::refresh::FailedTab;

// ============================================================================
// Constants
// ============================================================================

/// Synced key holding the history list.
pub const HISTORY_KEY: &str = "refreshHistory";

// ============================================================================
// HistoryEntry
// ============================================================================

/// Summary of one finished operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryEntry {
    /// When the operation finished.
    pub timestamp: DateTime<Utc>,
    /// Tabs in the snapshot.
    pub total_tabs: usize,
    /// Tabs refreshed or skipped.
    pub successful_tabs: usize,
    /// Tabs that failed.
    #[serde(default)]
    pub failed_tabs: Vec<FailedTab>,
    /// The operation was cancelled.
    #[serde(default)]
    pub cancelled: bool,
}

// ============================================================================
// HistoryStore
// ============================================================================

/// History list over a key-value store.
pub struct HistoryStore {
    store: Arc<dyn KeyValueStore>,
    limit: usize,
    write_lock: Mutex<()>,
}

impl fmt::Debug for HistoryStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HistoryStore")
            .field("limit", &self.limit)
            .finish_non_exhaustive()
    }
}

impl HistoryStore {
    /// Creates a history bounded to `limit` entries (clamped to `1..=20`).
    #[must_use]
    pub fn new(store: Arc<dyn KeyValueStore>, limit: usize) -> Self {
        Self {
            store,
            limit: limit.clamp(1, MAX_HISTORY_LIMIT),
            write_lock: Mutex::new(()),
        }
    }

    /// Returns the entry bound.
    #[inline]
    #[must_use]
    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Returns the stored entries, newest first.
    ///
    /// Entries that no longer parse are dropped.
    ///
    /// # Errors
    ///
    /// Returns the storage error if the list cannot be read.
    pub async fn load(&self) -> Result<Vec<HistoryEntry>> {
        let entries = match get_one(self.store.as_ref(), HISTORY_KEY).await? {
            Some(Value::Array(items)) => items
                .into_iter()
                .filter_map(|item| serde_json::from_value(item).ok())
                .collect(),
            _ => Vec::new(),
        };
        Ok(entries)
    }

    /// Prepends `entry` and evicts the oldest entries beyond the bound.
    ///
    /// # Errors
    ///
    /// Returns the storage error if the list cannot be updated.
    pub async fn record(&self, entry: HistoryEntry) -> Result<()> {
        let _guard = self.write_lock.lock().await;

        let mut entries = self.load().await?;
        entries.insert(0, entry);
        entries.truncate(self.limit);

        set_one(self.store.as_ref(), HISTORY_KEY, serde_json::to_value(&entries)?).await?;
        debug!(entries = entries.len(), "History updated");
        Ok(())
    }

    /// Removes every entry.
    ///
    /// # Errors
    ///
    /// Returns the storage error if the list cannot be written.
    pub async fn clear(&self) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        set_one(self.store.as_ref(), HISTORY_KEY, Value::Array(Vec::new())).await
    }
}

// ============================================================================
// Tests
// ============================================================================
