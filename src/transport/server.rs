//! WebSocket server the extension connects to.
//!
//! # Connection Flow
//!
//! 1. Rust binds the server to `127.0.0.1:<port>` (0 picks a free port)
//! 2. The extension is configured with the server URL and connects
//! 3. The extension sends its handshake message
//! 4. Connection established, ready for commands

// ============================================================================
// Imports
// ============================================================================

use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use tokio::net::TcpListener;
use tokio::time::timeout;
use tracing::{debug, info};

use crate::error::{Error, Result};

use super::Connection;
use super::connection::RemoteInfo;

// ============================================================================
// Constants
// ============================================================================

/// Default time to wait for the extension to connect.
const DEFAULT_ACCEPT_TIMEOUT: Duration = Duration::from_secs(30);

// ============================================================================
// PendingServer
// ============================================================================

/// A WebSocket server that is bound but not yet connected.
///
/// # Example
///
/// ```ignore
/// use std::net::{IpAddr, Ipv4Addr};
/// use refresh_em_all::transport::PendingServer;
///
/// let server = PendingServer::bind(IpAddr::V4(Ipv4Addr::LOCALHOST), 0).await?;
/// println!("point the extension at {}", server.ws_url());
///
/// let (connection, remote) = server.accept().await?;
/// ```
pub struct PendingServer {
    /// TCP listener for incoming connections.
    listener: TcpListener,
    /// Address the server is bound to.
    addr: SocketAddr,
    /// How long [`accept`](Self::accept) waits.
    accept_timeout: Option<Duration>,
}

impl PendingServer {
    /// Binds a WebSocket server to the specified address and port.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] if binding fails.
    pub async fn bind(ip: IpAddr, port: u16) -> Result<Self> {
        let listener = TcpListener::bind(SocketAddr::new(ip, port)).await?;
        let addr = listener.local_addr()?;

        debug!(%addr, "WebSocket server bound");

        Ok(Self {
            listener,
            addr,
            accept_timeout: Some(DEFAULT_ACCEPT_TIMEOUT),
        })
    }

    /// Sets how long to wait for the extension; `None` waits forever.
    #[inline]
    #[must_use]
    pub fn with_accept_timeout(mut self, accept_timeout: Option<Duration>) -> Self {
        self.accept_timeout = accept_timeout;
        self
    }

    /// Returns the port the server is bound to.
    #[inline]
    #[must_use]
    pub fn port(&self) -> u16 {
        self.addr.port()
    }

    /// Returns the local socket address.
    #[inline]
    #[must_use]
    pub fn local_addr(&self) -> SocketAddr {
        self.addr
    }

    /// Returns the WebSocket URL for this server.
    #[inline]
    #[must_use]
    pub fn ws_url(&self) -> String {
        format!("ws://{}", self.addr)
    }

    /// Accepts the extension's connection and completes the handshake.
    ///
    /// # Errors
    ///
    /// - [`Error::ConnectionTimeout`] if the extension doesn't connect in time
    /// - [`Error::Connection`] if WebSocket upgrade fails
    /// - [`Error::ConnectionTimeout`] / [`Error::ConnectionClosed`] if the
    ///   handshake fails
    pub async fn accept(self) -> Result<(Connection, RemoteInfo)> {
        let (stream, peer) = match self.accept_timeout {
            Some(limit) => timeout(limit, self.listener.accept())
                .await
                .map_err(|_| Error::connection_timeout(limit.as_millis() as u64))??,
            None => self.listener.accept().await?,
        };

        debug!(%peer, "TCP connection accepted");

        let ws_stream = tokio_tungstenite::accept_async(stream)
            .await
            .map_err(|e| Error::connection(format!("WebSocket upgrade failed: {e}")))?;

        info!(port = self.addr.port(), "Extension connected");

        let connection = Connection::new(ws_stream);
        let remote = connection.wait_handshake().await?;

        Ok((connection, remote))
    }
}

// ============================================================================
// Tests
// ============================================================================
