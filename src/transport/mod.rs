//! WebSocket transport layer.
//!
//! This module handles communication between local end (Rust) and
//! remote end (extension) via WebSocket.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────┐                              ┌─────────────────┐
//! │  Host (Rust)    │                              │  Extension      │
//! │                 │         WebSocket            │  (Background)   │
//! │  PendingServer  │◄────────────────────────────►│                 │
//! │  → Connection   │      localhost:PORT          │  WebSocket      │
//! │                 │                              │  Client         │
//! └─────────────────┘                              └─────────────────┘
//! ```
//!
//! # Connection Lifecycle
//!
//! 1. `PendingServer::bind` - Bind to localhost
//! 2. `PendingServer::accept` - Wait for the extension and its handshake
//! 3. `Connection` - Send commands, receive responses/events
//! 4. `Connection::shutdown` - Close the connection
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `connection` | WebSocket connection and event loop |
//! | `server` | WebSocket server binding and acceptance |

// ============================================================================
// Submodules
// ============================================================================

/// WebSocket connection and event loop.
pub mod connection;

/// WebSocket server the extension connects to.
pub mod server;

// ============================================================================
// Re-exports
// ============================================================================

pub use connection::{Connection, EventHandler, RemoteInfo};
pub use server::PendingServer;
