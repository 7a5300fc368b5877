//! Browser collaborators consumed by the refresh engine.
//!
//! | Type | Description |
//! |------|-------------|
//! | [`TabDirectory`] | List, inspect, activate and reload tabs |
//! | [`ScriptRunner`] | Run script source inside a tab |
//! | [`KeyValueStore`] | Extension storage areas |
//! | [`NotificationSink`] | Best-effort messages to the popup and toolbar |
//! | [`RemoteBrowser`] | All of the above over the extension connection |
//!
//! # Example
//!
//! ```ignore
//! use refresh_em_all::browser::{RemoteBrowser, StorageArea, TabDirectory};
//!
//! let browser = RemoteBrowser::new(connection);
//! for tab in browser.list_tabs().await? {
//!     println!("{} {}", tab.id, tab.url);
//! }
//! let history = browser.store(StorageArea::Sync);
//! ```

// ============================================================================
// Submodules
// ============================================================================

/// Media playback capture.
pub mod media;

/// UI notification sink.
pub mod notify;

/// Connection-backed collaborators.
pub mod remote;

/// Extension key-value storage.
pub mod storage;

/// Tab records and tab/script traits.
pub mod tabs;

// ============================================================================
// Re-exports
// ============================================================================

pub use media::{CAPTURE_SCRIPT, MEDIA_STATE_KEY, MediaSnapshot, MediaState};
pub use notify::{Indicator, NotificationSink, NullSink};
pub use remote::{RemoteBrowser, RemoteStore, RemoteUploader};
pub use storage::{KeyValueStore, MemoryStore, StorageArea};
pub use tabs::{
    RESERVED_SCHEMES, RawTab, ReloadOptions, ScriptRunner, TabDirectory, TabRef, TabState,
    is_reserved_url,
};
