//! Refresh Em All - reload every open browser tab.
//!
//! Reloads all tabs on demand in paced batches, retrying failures with
//! backoff, preserving media playback position where possible, and keeping
//! a bounded history of past runs.
//!
//! # Architecture
//!
//! The crate is the local end of a two-part system:
//!
//! - **Local End (Rust)**: Owns the refresh engine, sends commands, receives events via WebSocket
//! - **Remote End (Extension)**: Executes `tabs.*`, `scripting.*`, `storage.*` and `action.*`
//!   calls, forwards toolbar clicks and popup messages
//!
//! Key design principles:
//!
//! - One operation at a time, owned by a [`RefreshController`]
//! - Tabs are processed one at a time; cancellation is cooperative
//! - Per-tab errors become data; only a failed tab listing aborts a run
//! - The engine depends on traits, so it runs against a fake browser in tests
//!
//! # Quick Start
//!
//! ```no_run
//! use std::net::{IpAddr, Ipv4Addr};
//! use refresh_em_all::{Host, RefreshConfig, Result};
//! use refresh_em_all::transport::PendingServer;
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let server = PendingServer::bind(IpAddr::V4(Ipv4Addr::LOCALHOST), 7878).await?;
//!     let (connection, remote) = server.accept().await?;
//!
//!     let host = Host::new(connection, remote, RefreshConfig::default())?;
//!     host.run().await;
//!     Ok(())
//! }
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`refresh`] | Controller, scheduler, per-tab state machine, progress |
//! | [`browser`] | Collaborator traits and their connection-backed implementations |
//! | [`config`] | [`RefreshConfig`] and its batching/retry policies |
//! | [`history`] | Bounded operation history |
//! | [`telemetry`] | Consent-gated error report queue |
//! | [`stress`] | Back-to-back refresh runs |
//! | [`host`] | Wires a connection to the engine |
//! | [`error`] | Error types and [`Result`] alias |
//! | [`identifiers`] | Type-safe ID wrappers |
//! | [`protocol`] | WebSocket message types |
//! | [`transport`] | WebSocket transport layer |

// ============================================================================
// Modules
// ============================================================================

/// Browser collaborators.
///
/// Traits the engine consumes ([`TabDirectory`], [`ScriptRunner`],
/// [`KeyValueStore`], [`NotificationSink`]) and their implementations over
/// the extension connection.
pub mod browser;

/// Engine configuration.
pub mod config;

/// Error types and result aliases.
///
/// All fallible operations return [`Result<T>`] which uses [`Error`].
pub mod error;

/// Bounded operation history.
pub mod history;

/// Connection host.
pub mod host;

/// Type-safe identifiers.
///
/// Newtype wrappers prevent mixing incompatible IDs at compile time.
pub mod identifiers;

/// WebSocket protocol message types.
pub mod protocol;

/// Tab-refresh orchestration engine.
pub mod refresh;

/// Back-to-back refresh runs.
pub mod stress;

/// Error report queue.
pub mod telemetry;

/// WebSocket transport layer.
///
/// Handles the WebSocket server and connection management.
pub mod transport;

// ============================================================================
// Re-exports
// ============================================================================

// Browser types
pub use browser::{
    Indicator, KeyValueStore, MemoryStore, NotificationSink, NullSink, RemoteBrowser,
    ScriptRunner, StorageArea, TabDirectory, TabRef, TabState,
};

// Configuration
pub use config::{Backoff, BatchPlan, BatchPolicy, BatchTier, RefreshConfig, RetryPolicy};

// Error types
pub use error::{Error, Result};

// History
pub use history::{HistoryEntry, HistoryStore};

// Host
pub use host::Host;

// Identifier types
pub use identifiers::{OperationId, RequestId, TabId};

// Engine
pub use refresh::{
    FailedTab, OperationHandle, OperationReport, OperationSnapshot, RefreshController, Summary,
    TabOutcome,
};

// Protocol types
pub use protocol::{Notification, UiRequest};

// Stress mode
pub use stress::{StressReport, run_stress};

// Telemetry
pub use telemetry::{ErrorReport, NullTelemetry, ReportUploader, StoredTelemetry, Telemetry};

// Transport types
pub use transport::{Connection, PendingServer, RemoteInfo};
