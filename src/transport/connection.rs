//! WebSocket connection and event loop.
//!
//! The connection spawns a tokio task that handles:
//!
//! - Incoming messages from the extension (responses, events)
//! - Outgoing requests and event replies from Rust
//! - Request/response correlation by UUID
//! - Event handler callbacks

// ============================================================================
// Imports
// ============================================================================

use std::ops::ControlFlow;
use std::sync::Arc;
use std::time::Duration;

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use serde_json::{from_str, to_string};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tokio::time::timeout;
use tokio_tungstenite::WebSocketStream;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tracing::{debug, error, trace, warn};

use crate::error::{Error, Result};
use crate::identifiers::RequestId;
use crate::protocol::{Command, Event, EventReply, Request, Response};

// ============================================================================
// Constants
// ============================================================================

/// Default timeout for a browser API call.
const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(30);

/// Maximum pending requests before rejecting new ones.
const MAX_PENDING_REQUESTS: usize = 100;

/// Timeout for the extension's handshake message.
const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(30);

// ============================================================================
// Types
// ============================================================================

type WsSink = SplitSink<WebSocketStream<TcpStream>, Message>;
type WsStream = SplitStream<WebSocketStream<TcpStream>>;

/// Map of request IDs to response channels.
type CorrelationMap = FxHashMap<RequestId, oneshot::Sender<Result<Response>>>;

/// Event handler callback type.
///
/// Called on the event loop for each event received from the extension.
/// Return `Some(EventReply)` to answer immediately; replies that need further
/// browser calls are sent later with [`Connection::reply`].
pub type EventHandler = Box<dyn Fn(Event) -> Option<EventReply> + Send + Sync>;

// ============================================================================
// RemoteInfo
// ============================================================================

/// Data carried by the extension's handshake message.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RemoteInfo {
    /// Extension manifest version.
    pub extension_version: String,
    /// Browser user agent.
    pub user_agent: String,
}

// ============================================================================
// ConnectionCommand
// ============================================================================

/// Internal commands for the event loop.
enum ConnectionCommand {
    /// Send a request and wait for response.
    Send {
        request: Request,
        response_tx: oneshot::Sender<Result<Response>>,
    },
    /// Send a deferred event reply.
    Reply(EventReply),
    /// Remove a timed-out correlation entry.
    RemoveCorrelation(RequestId),
    /// Shutdown the connection.
    Shutdown,
}

// ============================================================================
// Connection
// ============================================================================

/// WebSocket connection to the extension.
///
/// Cloning is cheap; all clones drive the same event loop.
#[derive(Clone)]
pub struct Connection {
    /// Channel for sending commands to the event loop.
    command_tx: mpsc::UnboundedSender<ConnectionCommand>,
    /// Correlation map (shared with event loop).
    correlation: Arc<Mutex<CorrelationMap>>,
    /// Event handler (shared with event loop).
    event_handler: Arc<Mutex<Option<EventHandler>>>,
    /// Handshake receiver, registered before the event loop starts.
    handshake: Arc<Mutex<Option<oneshot::Receiver<Result<Response>>>>>,
}

impl Connection {
    /// Creates a new connection from a WebSocket stream.
    ///
    /// Spawns the event loop task internally.
    pub(crate) fn new(ws_stream: WebSocketStream<TcpStream>) -> Self {
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let correlation = Arc::new(Mutex::new(CorrelationMap::default()));
        let event_handler: Arc<Mutex<Option<EventHandler>>> = Arc::new(Mutex::new(None));

        let (handshake_tx, handshake_rx) = oneshot::channel();
        correlation.lock().insert(RequestId::handshake(), handshake_tx);

        let (sink, stream) = ws_stream.split();
        let event_loop = EventLoop {
            sink,
            correlation: Arc::clone(&correlation),
            event_handler: Arc::clone(&event_handler),
        };
        tokio::spawn(event_loop.run(stream, command_rx));

        Self {
            command_tx,
            correlation,
            event_handler,
            handshake: Arc::new(Mutex::new(Some(handshake_rx))),
        }
    }

    /// Waits for the handshake message.
    ///
    /// The extension sends a success response with the nil UUID right after
    /// connecting.
    ///
    /// # Errors
    ///
    /// - [`Error::ConnectionTimeout`] if no handshake arrives within 30s
    /// - [`Error::ConnectionClosed`] if the connection closes first
    pub async fn wait_handshake(&self) -> Result<RemoteInfo> {
        let rx = self
            .handshake
            .lock()
            .take()
            .ok_or_else(|| Error::protocol("Handshake already consumed"))?;

        let response = timeout(HANDSHAKE_TIMEOUT, rx)
            .await
            .map_err(|_| Error::connection_timeout(HANDSHAKE_TIMEOUT.as_millis() as u64))??;
        let response = response?;

        let info = RemoteInfo {
            extension_version: response.get_string("extensionVersion"),
            user_agent: response.get_string("userAgent"),
        };

        debug!(extension_version = %info.extension_version, "Handshake completed");
        Ok(info)
    }

    /// Sets the event handler callback.
    pub fn set_event_handler(&self, handler: EventHandler) {
        *self.event_handler.lock() = Some(handler);
    }

    /// Clears the event handler.
    pub fn clear_event_handler(&self) {
        *self.event_handler.lock() = None;
    }

    /// Sends a command and waits for its response with the default timeout.
    ///
    /// # Errors
    ///
    /// See [`send_with_timeout`](Self::send_with_timeout).
    pub async fn send(&self, command: Command) -> Result<Response> {
        self.send_with_timeout(command, DEFAULT_COMMAND_TIMEOUT)
            .await
    }

    /// Sends a command and waits up to `limit` for its response.
    ///
    /// # Errors
    ///
    /// - [`Error::Protocol`] if too many requests are already in flight
    /// - [`Error::ConnectionClosed`] if the event loop has stopped
    /// - [`Error::RequestTimeout`] if no response arrives in time
    pub async fn send_with_timeout(&self, command: Command, limit: Duration) -> Result<Response> {
        self.ensure_capacity()?;

        let request = Request::new(command);
        let request_id = request.id;
        let (response_tx, response_rx) = oneshot::channel();

        self.command_tx
            .send(ConnectionCommand::Send {
                request,
                response_tx,
            })
            .map_err(|_| Error::ConnectionClosed)?;

        let Ok(received) = timeout(limit, response_rx).await else {
            let _ = self
                .command_tx
                .send(ConnectionCommand::RemoveCorrelation(request_id));
            return Err(Error::request_timeout(request_id, limit.as_millis() as u64));
        };

        received.map_err(|_| Error::ConnectionClosed)?
    }

    /// Sends an event reply that could not be produced by the handler.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConnectionClosed`] if the event loop has stopped.
    pub fn reply(&self, reply: EventReply) -> Result<()> {
        self.command_tx
            .send(ConnectionCommand::Reply(reply))
            .map_err(|_| Error::ConnectionClosed)
    }

    /// Returns `true` once the event loop has stopped.
    #[inline]
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.command_tx.is_closed()
    }

    /// Resolves once the event loop has stopped.
    pub async fn closed(&self) {
        self.command_tx.closed().await;
    }

    /// Returns the number of requests awaiting a response.
    #[inline]
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.correlation.lock().len()
    }

    /// Closes the socket and stops the event loop.
    pub fn shutdown(&self) {
        let _ = self.command_tx.send(ConnectionCommand::Shutdown);
    }

    fn ensure_capacity(&self) -> Result<()> {
        let pending = self.correlation.lock().len();
        if pending < MAX_PENDING_REQUESTS {
            return Ok(());
        }

        warn!(pending, max = MAX_PENDING_REQUESTS, "Request rejected, too many in flight");
        Err(Error::protocol(format!(
            "{pending} requests already in flight (limit {MAX_PENDING_REQUESTS})"
        )))
    }
}

// ============================================================================
// Incoming
// ============================================================================

/// A text frame from the extension, classified.
enum Incoming {
    Response(Response),
    Event(Event),
    Unrecognized,
}

impl Incoming {
    fn parse(text: &str) -> Self {
        if let Ok(response) = from_str::<Response>(text) {
            Self::Response(response)
        } else if let Ok(event) = from_str::<Event>(text) {
            Self::Event(event)
        } else {
            Self::Unrecognized
        }
    }
}

// ============================================================================
// EventLoop
// ============================================================================

/// State owned by the spawned I/O task.
struct EventLoop {
    sink: WsSink,
    correlation: Arc<Mutex<CorrelationMap>>,
    event_handler: Arc<Mutex<Option<EventHandler>>>,
}

impl EventLoop {
    /// Multiplexes socket frames and handle commands until either side stops.
    async fn run(mut self, mut stream: WsStream, mut commands: mpsc::UnboundedReceiver<ConnectionCommand>) {
        loop {
            let flow = tokio::select! {
                frame = stream.next() => self.on_frame(frame).await,
                command = commands.recv() => self.on_command(command).await,
            };
            if flow.is_break() {
                break;
            }
        }

        commands.close();
        self.fail_pending();
        debug!("Event loop terminated");
    }

    async fn on_frame(&mut self, frame: Option<std::result::Result<Message, WsError>>) -> ControlFlow<()> {
        match frame {
            Some(Ok(Message::Text(text))) => {
                if let Some(reply) = self.dispatch(&text) {
                    self.write_reply(&reply).await;
                }
            }
            Some(Ok(Message::Close(_))) => {
                debug!("WebSocket closed by remote");
                return ControlFlow::Break(());
            }
            Some(Err(e)) => {
                error!(error = %e, "WebSocket error");
                return ControlFlow::Break(());
            }
            None => {
                debug!("WebSocket stream ended");
                return ControlFlow::Break(());
            }
            // Binary, Ping, Pong
            Some(Ok(_)) => {}
        }
        ControlFlow::Continue(())
    }

    async fn on_command(&mut self, command: Option<ConnectionCommand>) -> ControlFlow<()> {
        match command {
            Some(ConnectionCommand::Send {
                request,
                response_tx,
            }) => self.write_request(request, response_tx).await,
            Some(ConnectionCommand::Reply(reply)) => self.write_reply(&reply).await,
            Some(ConnectionCommand::RemoveCorrelation(request_id)) => {
                if self.correlation.lock().remove(&request_id).is_some() {
                    debug!(%request_id, "Dropped timed-out request");
                }
            }
            Some(ConnectionCommand::Shutdown) => {
                debug!("Shutdown requested");
                let _ = self.sink.close().await;
                return ControlFlow::Break(());
            }
            None => {
                debug!("All connection handles dropped");
                return ControlFlow::Break(());
            }
        }
        ControlFlow::Continue(())
    }

    /// Routes a text frame; returns the handler's immediate reply, if any.
    fn dispatch(&self, text: &str) -> Option<EventReply> {
        match Incoming::parse(text) {
            Incoming::Response(response) => {
                let waiter = self.correlation.lock().remove(&response.id);
                match waiter {
                    Some(tx) => {
                        let _ = tx.send(Ok(response));
                    }
                    None => warn!(id = %response.id, "Response for unknown request"),
                }
                None
            }
            Incoming::Event(event) => {
                let handler = self.event_handler.lock();
                match handler.as_ref() {
                    Some(handler) => handler(event),
                    None => {
                        debug!(method = %event.method, "Event dropped, no handler installed");
                        None
                    }
                }
            }
            Incoming::Unrecognized => {
                warn!(frame = %text, "Unrecognized message from extension");
                None
            }
        }
    }

    async fn write_request(&mut self, request: Request, response_tx: oneshot::Sender<Result<Response>>) {
        let json = match to_string(&request) {
            Ok(json) => json,
            Err(e) => {
                let _ = response_tx.send(Err(Error::Json(e)));
                return;
            }
        };

        // Registered before writing: the response can arrive before the write returns.
        let request_id = request.id;
        self.correlation.lock().insert(request_id, response_tx);

        match self.sink.send(Message::Text(json.into())).await {
            Ok(()) => trace!(%request_id, method = %request.command.method(), "Request sent"),
            Err(e) => {
                let waiter = self.correlation.lock().remove(&request_id);
                if let Some(tx) = waiter {
                    let _ = tx.send(Err(Error::connection(e.to_string())));
                }
            }
        }
    }

    async fn write_reply(&mut self, reply: &EventReply) {
        let json = match to_string(reply) {
            Ok(json) => json,
            Err(e) => {
                warn!(error = %e, "Failed to serialize event reply");
                return;
            }
        };

        if let Err(e) = self.sink.send(Message::Text(json.into())).await {
            warn!(id = %reply.id, error = %e, "Failed to send event reply");
        }
    }

    fn fail_pending(&self) {
        let pending: Vec<_> = self.correlation.lock().drain().map(|(_, tx)| tx).collect();
        if pending.is_empty() {
            return;
        }

        debug!(count = pending.len(), "Failing requests left in flight");
        for tx in pending {
            let _ = tx.send(Err(Error::ConnectionClosed));
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
