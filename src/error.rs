//! Error types for the refresh engine.
//!
//! # Usage
//!
//! All fallible operations return [`Result<T>`] which uses [`Error`]:
//!
//! ```ignore
//! use refresh_em_all::{Error, Result};
//!
//! async fn reload(tabs: &dyn TabDirectory, id: TabId) -> Result<()> {
//!     tabs.reload_tab(id, ReloadOptions::bypass_cache()).await?;
//!     Ok(())
//! }
//! ```
//!
//! # Error Categories
//!
//! | Category | Variants |
//! |----------|----------|
//! | Configuration | [`Error::Config`] |
//! | Operation | [`Error::Busy`], [`Error::NotActive`], [`Error::Snapshot`] |
//! | Tab | [`Error::TabNotFound`], [`Error::TabOperation`], [`Error::Injection`] |
//! | Storage | [`Error::Storage`], [`Error::Upload`] |
//! | Connection | [`Error::Connection`], [`Error::ConnectionTimeout`], [`Error::ConnectionClosed`] |
//! | Protocol | [`Error::Protocol`], [`Error::RequestTimeout`] |
//! | External | [`Error::Io`], [`Error::Json`], [`Error::WebSocket`] |

// ============================================================================
// Imports
// ============================================================================

use std::io::Error as IoError;
use std::result::Result as StdResult;

use thiserror::Error;
use tokio::sync::oneshot::error::RecvError;
use tokio_tungstenite::tungstenite::Error as WsError;

use crate::identifiers::{RequestId, TabId};

// ============================================================================
// Result Alias
// ============================================================================

/// Result type alias using crate [`enum@Error`].
pub type Result<T> = StdResult<T, Error>;

// ============================================================================
// Error Enum
// ============================================================================

/// Main error type for the crate.
#[derive(Error, Debug)]
pub enum Error {
    // ========================================================================
    // Configuration Errors
    // ========================================================================
    /// Configuration error.
    ///
    /// Returned when a [`RefreshConfig`](crate::RefreshConfig) is invalid.
    #[error("Configuration error: {message}")]
    Config {
        /// Description of the configuration error.
        message: String,
    },

    // ========================================================================
    // Operation Errors
    // ========================================================================
    /// A refresh operation is already running.
    #[error("A refresh operation is already in progress")]
    Busy,

    /// No refresh operation is running.
    #[error("No refresh operation is in progress")]
    NotActive,

    /// The initial tab listing failed.
    #[error("Failed to list tabs: {message}")]
    Snapshot {
        /// Description of the listing failure.
        message: String,
    },

    // ========================================================================
    // Tab Errors
    // ========================================================================
    /// Tab no longer exists.
    #[error("Tab not found: {tab_id}")]
    TabNotFound {
        /// The missing tab ID.
        tab_id: TabId,
    },

    /// A tab API call failed.
    ///
    /// Activation and reload failures are retried by the state machine.
    #[error("Failed to {operation} tab {tab_id}: {message}")]
    TabOperation {
        /// Tab the call targeted.
        tab_id: TabId,
        /// Short name of the call (`activate`, `reload`).
        operation: &'static str,
        /// Message reported by the browser.
        message: String,
    },

    /// Script injection into a tab failed.
    #[error("Script injection failed in tab {tab_id}: {message}")]
    Injection {
        /// Tab the script targeted.
        tab_id: TabId,
        /// Message reported by the browser.
        message: String,
    },

    // ========================================================================
    // Storage Errors
    // ========================================================================
    /// Key-value storage failure.
    #[error("Storage error: {message}")]
    Storage {
        /// Description of the storage error.
        message: String,
    },

    /// Error report upload failed.
    #[error("Error report upload failed: {message}")]
    Upload {
        /// Description of the upload failure.
        message: String,
    },

    // ========================================================================
    // Connection Errors
    // ========================================================================
    /// WebSocket connection failed.
    #[error("Connection failed: {message}")]
    Connection {
        /// Description of the connection error.
        message: String,
    },

    /// Timed out waiting for the extension to connect.
    #[error("Connection timeout after {timeout_ms}ms")]
    ConnectionTimeout {
        /// Milliseconds waited before timeout.
        timeout_ms: u64,
    },

    /// WebSocket connection closed unexpectedly.
    #[error("Connection closed")]
    ConnectionClosed,

    // ========================================================================
    // Protocol Errors
    // ========================================================================
    /// Protocol violation or error response from the extension.
    #[error("Protocol error: {message}")]
    Protocol {
        /// Description of the protocol error.
        message: String,
    },

    /// Command request timeout.
    #[error("Request {request_id} timed out after {timeout_ms}ms")]
    RequestTimeout {
        /// The request ID that timed out.
        request_id: RequestId,
        /// Milliseconds waited before timeout.
        timeout_ms: u64,
    },

    // ========================================================================
    // External Errors
    // ========================================================================
    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] IoError),

    /// JSON serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// WebSocket error.
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] WsError),

    /// Channel receive error.
    #[error("Channel closed")]
    ChannelClosed(#[from] RecvError),
}

// ============================================================================
// Error Constructors
// ============================================================================

impl Error {
    /// Creates a configuration error.
    #[inline]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Creates a snapshot error.
    #[inline]
    pub fn snapshot(message: impl Into<String>) -> Self {
        Self::Snapshot {
            message: message.into(),
        }
    }

    /// Creates a tab not found error.
    #[inline]
    pub fn tab_not_found(tab_id: TabId) -> Self {
        Self::TabNotFound { tab_id }
    }

    /// Creates a tab operation error.
    #[inline]
    pub fn tab_operation(
        tab_id: TabId,
        operation: &'static str,
        message: impl Into<String>,
    ) -> Self {
        Self::TabOperation {
            tab_id,
            operation,
            message: message.into(),
        }
    }

    /// Creates a script injection error.
    #[inline]
    pub fn injection(tab_id: TabId, message: impl Into<String>) -> Self {
        Self::Injection {
            tab_id,
            message: message.into(),
        }
    }

    /// Creates a storage error.
    #[inline]
    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage {
            message: message.into(),
        }
    }

    /// Creates an upload error.
    #[inline]
    pub fn upload(message: impl Into<String>) -> Self {
        Self::Upload {
            message: message.into(),
        }
    }

    /// Creates a connection error.
    #[inline]
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
        }
    }

    /// Creates a connection timeout error.
    #[inline]
    pub fn connection_timeout(timeout_ms: u64) -> Self {
        Self::ConnectionTimeout { timeout_ms }
    }

    /// Creates a protocol error.
    #[inline]
    pub fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol {
            message: message.into(),
        }
    }

    /// Creates a request timeout error.
    #[inline]
    pub fn request_timeout(request_id: RequestId, timeout_ms: u64) -> Self {
        Self::RequestTimeout {
            request_id,
            timeout_ms,
        }
    }
}

// ============================================================================
// Error Predicates
// ============================================================================

impl Error {
    /// Returns `true` if this is a timeout error.
    #[inline]
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(
            self,
            Self::ConnectionTimeout { .. } | Self::RequestTimeout { .. }
        )
    }

    /// Returns `true` if this is a connection error.
    #[inline]
    #[must_use]
    pub fn is_connection_error(&self) -> bool {
        matches!(
            self,
            Self::Connection { .. }
                | Self::ConnectionTimeout { .. }
                | Self::ConnectionClosed
                | Self::WebSocket(_)
        )
    }

    /// Returns `true` if the targeted tab has been closed.
    ///
    /// A closed tab has nothing left to refresh and counts as a skip.
    #[inline]
    #[must_use]
    pub fn is_tab_gone(&self) -> bool {
        matches!(self, Self::TabNotFound { .. })
    }

    /// Returns `true` if this error may succeed on retry.
    #[inline]
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::TabOperation { .. }
                | Self::Protocol { .. }
                | Self::RequestTimeout { .. }
                | Self::ConnectionTimeout { .. }
        )
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use std::io::ErrorKind;

    fn tab(id: u32) -> TabId {
        TabId::new(id).expect("valid tab id")
    }

    #[test]
    fn test_error_display() {
        let err = Error::tab_operation(tab(3), "reload", "Tab is busy");
        assert_eq!(err.to_string(), "Failed to reload tab 3: Tab is busy");
    }

    #[test]
    fn test_busy_display() {
        assert_eq!(
            Error::Busy.to_string(),
            "A refresh operation is already in progress"
        );
    }

    #[test]
    fn test_is_tab_gone() {
        assert!(Error::tab_not_found(tab(1)).is_tab_gone());
        assert!(!Error::tab_operation(tab(1), "reload", "x").is_tab_gone());
    }

    #[test]
    fn test_is_recoverable() {
        assert!(Error::tab_operation(tab(1), "activate", "x").is_recoverable());
        assert!(Error::protocol("bad").is_recoverable());
        assert!(!Error::config("test").is_recoverable());
        assert!(!Error::ConnectionClosed.is_recoverable());
    }

    #[test]
    fn test_is_connection_error() {
        assert!(Error::connection("test").is_connection_error());
        assert!(Error::ConnectionClosed.is_connection_error());
        assert!(Error::connection_timeout(1000).is_timeout());
        assert!(!Error::storage("full").is_connection_error());
    }

    #[test]
    fn test_from_io_error() {
        let io_err = IoError::new(ErrorKind::NotFound, "file not found");
        let err: Error = io_err.into();
        assert!(matches!(err, Error::Io(_)));
    }

    #[test]
    fn test_from_json_error() {
        let json_err = serde_json::from_str::<String>("invalid").unwrap_err();
        let err: Error = json_err.into();
        assert!(matches!(err, Error::Json(_)));
    }
}
