//! Extension key-value storage.
//!
//! Mirrors the `storage.sync` / `storage.local` areas: values are JSON, reads
//! return only the keys that are present.

// ============================================================================
// Imports
// ============================================================================

use async_trait::async_trait;
use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::Result;

// ============================================================================
// StorageArea
// ============================================================================

/// Storage area of the extension storage API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageArea {
    /// Small, synced across the user's browsers.
    Sync,
    /// Larger, local to this browser profile.
    Local,
}

// ============================================================================
// KeyValueStore
// ============================================================================

/// Durable key-value store.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Reads the given keys; absent keys are omitted from the result.
    async fn get(&self, keys: &[&str]) -> Result<Map<String, Value>>;

    /// Writes every entry of `items`.
    async fn set(&self, items: Map<String, Value>) -> Result<()>;
}

/// Reads a single key.
pub(crate) async fn get_one(store: &dyn KeyValueStore, key: &str) -> Result<Option<Value>> {
    let mut values = store.get(&[key]).await?;
    Ok(values.remove(key))
}

/// Writes a single key.
pub(crate) async fn set_one(store: &dyn KeyValueStore, key: &str, value: Value) -> Result<()> {
    let mut items = Map::new();
    items.insert(key.to_string(), value);
    store.set(items).await
}

// ============================================================================
// MemoryStore
// ============================================================================

/// In-process store, used when no browser storage is attached and in tests.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<FxHashMap<String, Value>>,
}

impl MemoryStore {
    /// Creates an empty store.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a copy of the value stored under `key`.
    #[must_use]
    pub fn peek(&self, key: &str) -> Option<Value> {
        self.entries.lock().get(key).cloned()
    }

    /// Returns the number of stored keys.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Returns `true` if nothing is stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn get(&self, keys: &[&str]) -> Result<Map<String, Value>> {
        let entries = self.entries.lock();
        Ok(keys
            .iter()
            .filter_map(|key| entries.get(*key).map(|v| ((*key).to_string(), v.clone())))
            .collect())
    }

    async fn set(&self, items: Map<String, Value>) -> Result<()> {
        self.entries.lock().extend(items);
        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use serde_json::json;

    #[tokio::test]
    async fn test_memory_store_roundtrip() {
        let store = MemoryStore::new();
        set_one(&store, "errorReportingConsent", json!(true))
            .await
            .expect("set");

        let values = store
            .get(&["errorReportingConsent", "missing"])
            .await
            .expect("get");

        assert_eq!(values.len(), 1);
        assert_eq!(values.get("errorReportingConsent"), Some(&json!(true)));
    }

    #[tokio::test]
    async fn test_get_one_missing() {
        let store = MemoryStore::new();
        assert!(get_one(&store, "refreshHistory").await.expect("get").is_none());
        assert!(store.is_empty());
    }

    #[test]
    fn test_storage_area_serde() {
        assert_eq!(
            serde_json::to_string(&StorageArea::Sync).expect("serialize"),
            "\"sync\""
        );
    }
}
