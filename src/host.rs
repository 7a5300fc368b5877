//! Host wiring one extension connection to the refresh engine.
//!
//! Toolbar clicks start a refresh. Popup requests arrive as
//! `runtime.message` events; requests that only touch in-process state are
//! answered from the event loop, the rest are answered from spawned tasks
//! through [`Connection::reply`] so the loop never waits on the extension.
//!
//! | Request | Reply |
//! |---------|-------|
//! | `startRefresh` | `{accepted, reason?}` |
//! | `cancelRefresh` | `{accepted}` |
//! | `getStatus` | `{active, totalTabs, succeeded, failedCount, percent, cancelled}` |
//! | `getHistory` | `{history: [...]}` |
//! | `reportError` | `{queued: true}` once stored |
//! | `sendPendingErrorReports` | `{success, sent}` |
//! | `setErrorReportingConsent` | `{success}` |

// ============================================================================
// Imports
// ============================================================================

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use serde_json::{Value, json};
use tracing::{debug, info, warn};

use crate::browser::{RemoteBrowser, RemoteUploader, StorageArea};
use crate::config::RefreshConfig;
use crate::error::Result;
use crate::protocol::{Event, EventReply, ParsedEvent, UiRequest};
use crate::refresh::RefreshController;
use crate::telemetry::{ErrorReport, FlushOutcome, StoredTelemetry, Telemetry};
use crate::transport::{Connection, RemoteInfo};

// ============================================================================
// Constants
// ============================================================================

/// Interval between automatic uploads of queued error reports.
pub const FLUSH_INTERVAL: Duration = Duration::from_secs(30 * 60);

// ============================================================================
// Host
// ============================================================================

/// Serves one extension connection.
#[derive(Clone)]
pub struct Host {
    connection: Connection,
    remote: RemoteInfo,
    controller: RefreshController,
    telemetry: Arc<StoredTelemetry>,
    uploader: RemoteUploader,
}

impl std::fmt::Debug for Host {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Host")
            .field("remote", &self.remote)
            .field("controller", &self.controller)
            .finish_non_exhaustive()
    }
}

impl Host {
    /// Builds the engine over an accepted connection.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`](crate::Error::Config) if `config` is invalid.
    pub fn new(connection: Connection, remote: RemoteInfo, config: RefreshConfig) -> Result<Self> {
        let browser = RemoteBrowser::new(connection.clone());
        let telemetry = Arc::new(StoredTelemetry::new(
            Arc::new(browser.store(StorageArea::Sync)),
            Arc::new(browser.store(StorageArea::Local)),
        ));

        let controller = RefreshController::builder()
            .config(config)
            .history_store(Arc::new(browser.store(StorageArea::Sync)))
            .sink(Arc::new(browser.clone()))
            .telemetry(telemetry.clone())
            .browser(Arc::new(browser.clone()))
            .build()?;

        Ok(Self {
            connection,
            remote,
            controller,
            telemetry,
            uploader: browser.uploader(),
        })
    }

    /// Returns the extension's handshake data.
    #[inline]
    #[must_use]
    pub fn remote(&self) -> &RemoteInfo {
        &self.remote
    }

    /// Returns the controller.
    #[inline]
    #[must_use]
    pub fn controller(&self) -> &RefreshController {
        &self.controller
    }

    /// Returns the telemetry queue.
    #[inline]
    #[must_use]
    pub fn telemetry(&self) -> &Arc<StoredTelemetry> {
        &self.telemetry
    }

    /// Serves events until the connection closes.
    ///
    /// Queued error reports are uploaded right away and then every
    /// [`FLUSH_INTERVAL`].
    pub async fn run(self) {
        info!(
            extension_version = %self.remote.extension_version,
            user_agent = %self.remote.user_agent,
            "Serving extension"
        );

        let host = self.clone();
        self.connection
            .set_event_handler(Box::new(move |event| host.handle_event(event)));

        let mut flush = tokio::time::interval(FLUSH_INTERVAL);
        loop {
            tokio::select! {
                _ = flush.tick() => {
                    let _ = self.flush_reports().await;
                }
                () = self.connection.closed() => {
                    break;
                }
            }
        }

        self.connection.clear_event_handler();
        if self.controller.cancel().is_ok() {
            debug!("Cancelled running operation after disconnect");
        }
        info!("Extension disconnected");
    }

    /// Uploads queued reports, logging the result.
    async fn flush_reports(&self) -> Result<FlushOutcome> {
        let outcome = self.telemetry.flush(&self.uploader).await;
        match &outcome {
            Ok(FlushOutcome::Uploaded(count)) => debug!(count, "Pending reports flushed"),
            Ok(_) => {}
            Err(e) if e.is_connection_error() => {
                debug!(error = %e, "Pending reports kept, extension unreachable");
            }
            Err(e) => warn!(error = %e, "Failed to flush pending reports"),
        }
        outcome
    }

    // ========================================================================
    // Event Handling
    // ========================================================================

    fn handle_event(&self, event: Event) -> Option<EventReply> {
        match event.parse() {
            ParsedEvent::ActionClicked => {
                let controller = self.controller.clone();
                tokio::spawn(async move {
                    let response = controller.start_refresh().await;
                    if let Some(reason) = response.reason {
                        debug!(%reason, "Toolbar click ignored");
                    }
                });
                None
            }

            ParsedEvent::UiRequest(request) => self.handle_request(&event, request),

            ParsedEvent::MalformedRequest { message } => {
                warn!(%message, "Malformed popup request");
                Some(EventReply::to(&event, json!({ "error": message })))
            }

            ParsedEvent::Unknown { method, .. } => {
                debug!(%method, "Unhandled event");
                None
            }
        }
    }

    fn handle_request(&self, event: &Event, request: UiRequest) -> Option<EventReply> {
        debug!(?request, "Popup request");

        match request {
            UiRequest::CancelRefresh => Some(EventReply::to(
                event,
                to_json(&self.controller.cancel_refresh()),
            )),

            UiRequest::GetStatus => {
                Some(EventReply::to(event, to_json(&self.controller.status())))
            }

            UiRequest::StartRefresh => {
                let controller = self.controller.clone();
                self.reply_later(event, async move { to_json(&controller.start_refresh().await) });
                None
            }

            UiRequest::GetHistory => {
                let controller = self.controller.clone();
                self.reply_later(event, async move {
                    match controller.load_history().await {
                        Ok(history) => json!({ "history": history }),
                        Err(e) => json!({ "history": [], "error": e.to_string() }),
                    }
                });
                None
            }

            UiRequest::ReportError {
                error_type,
                error_details,
            } => {
                let telemetry = Arc::clone(&self.telemetry);
                self.reply_later(event, async move {
                    telemetry
                        .report(ErrorReport::from_ui(error_type, error_details))
                        .await;
                    json!({ "queued": true })
                });
                None
            }

            UiRequest::SendPendingErrorReports => {
                let host = self.clone();
                self.reply_later(event, async move {
                    match host.flush_reports().await {
                        Ok(FlushOutcome::Uploaded(sent)) => json!({ "success": true, "sent": sent }),
                        Ok(FlushOutcome::Empty) => json!({ "success": true, "sent": 0 }),
                        Ok(FlushOutcome::NoConsent) => {
                            json!({ "success": false, "sent": 0, "reason": "no consent" })
                        }
                        Err(e) => json!({ "success": false, "sent": 0, "reason": e.to_string() }),
                    }
                });
                None
            }

            UiRequest::SetErrorReportingConsent { enabled } => {
                let telemetry = Arc::clone(&self.telemetry);
                self.reply_later(event, async move {
                    match telemetry.set_consent(enabled).await {
                        Ok(()) => json!({ "success": true }),
                        Err(e) => json!({ "success": false, "reason": e.to_string() }),
                    }
                });
                None
            }
        }
    }

    /// Answers `event` with the output of `reply` once it resolves.
    fn reply_later<F>(&self, event: &Event, reply: F)
    where
        F: Future<Output = Value> + Send + 'static,
    {
        let connection = self.connection.clone();
        let id = event.id;
        let reply_to = event.method.clone();

        tokio::spawn(async move {
            let result = reply.await;
            if let Err(e) = connection.reply(EventReply {
                id,
                reply_to,
                result,
            }) {
                debug!(error = %e, "Reply not delivered");
            }
        });
    }
}

fn to_json<T: serde::Serialize>(value: &T) -> Value {
    serde_json::to_value(value).unwrap_or(Value::Null)
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use std::net::{IpAddr, Ipv4Addr};

    use futures_util::{SinkExt, StreamExt};
    use parking_lot::Mutex;
    use tokio::net::TcpStream;
    use tokio::sync::mpsc;
    use tokio_tungstenite::tungstenite::Message;
    use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};

    use crate::transport::PendingServer;

    type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

    /// Minimal extension: answers commands for two tabs and forwards
    /// everything it receives to the test.
    struct FakeExtension {
        outgoing: mpsc::UnboundedSender<Value>,
        incoming: mpsc::UnboundedReceiver<Value>,
        reloads: Arc<Mutex<Vec<i64>>>,
    }

    impl FakeExtension {
        async fn connect(url: String) -> Self {
            let (mut socket, _) = connect_async(url).await.expect("connect");
            let handshake = json!({
                "id": "00000000-0000-0000-0000-000000000000",
                "type": "success",
                "result": { "extensionVersion": "2.1.0", "userAgent": "TestBrowser/1.0" }
            });
            socket
                .send(Message::Text(handshake.to_string().into()))
                .await
                .expect("handshake");

            let (outgoing, outgoing_rx) = mpsc::unbounded_channel();
            let (incoming_tx, incoming) = mpsc::unbounded_channel();
            let reloads = Arc::new(Mutex::new(Vec::new()));
            tokio::spawn(Self::serve(socket, outgoing_rx, incoming_tx, Arc::clone(&reloads)));

            Self {
                outgoing,
                incoming,
                reloads,
            }
        }

        async fn serve(
            socket: Socket,
            mut outgoing: mpsc::UnboundedReceiver<Value>,
            incoming: mpsc::UnboundedSender<Value>,
            reloads: Arc<Mutex<Vec<i64>>>,
        ) {
            let (mut write, mut read) = socket.split();
            let mut store = serde_json::Map::new();
            loop {
                tokio::select! {
                    Some(message) = outgoing.recv() => {
                        if write.send(Message::Text(message.to_string().into())).await.is_err() {
                            break;
                        }
                    }
                    message = read.next() => {
                        let Some(Ok(Message::Text(text))) = message else { break };
                        let value: Value = serde_json::from_str(&text).expect("json");
                        if let Some(method) = value.get("method").and_then(Value::as_str) {
                            let params = &value["params"];
                            let result = match method {
                                "tabs.query" => json!({ "tabs": [
                                    { "id": 1, "title": "One", "url": "https://one.test", "status": "complete" },
                                    { "id": 2, "title": "Two", "url": "https://two.test", "status": "complete" },
                                    { "title": "No id" }
                                ]}),
                                "tabs.get" => {
                                    let tab_id = params["tabId"].clone();
                                    json!({ "tab": { "id": tab_id, "url": "https://tab.test", "status": "complete" } })
                                }
                                "tabs.reload" => {
                                    reloads.lock().push(params["tabId"].as_i64().unwrap_or_default());
                                    json!({})
                                }
                                "scripting.executeScript" => json!({ "value": {} }),
                                "storage.get" => Value::Object(store.clone()),
                                "storage.set" => {
                                    if let Some(items) = params["items"].as_object() {
                                        store.extend(items.clone());
                                    }
                                    json!({})
                                }
                                _ => json!({}),
                            };
                            let response = json!({ "id": value["id"], "type": "success", "result": result });
                            if write.send(Message::Text(response.to_string().into())).await.is_err() {
                                break;
                            }
                        }
                        let _ = incoming.send(value);
                    }
                }
            }
        }

        fn event(&self, method: &str, params: Value) -> String {
            let id = crate::identifiers::RequestId::generate().to_string();
            let _ = self.outgoing.send(json!({
                "id": id, "type": "event", "method": method, "params": params
            }));
            id
        }

        fn ui_request(&self, message: Value) -> String {
            self.event("runtime.message", json!({ "message": message }))
        }

        /// Waits for the first message matching `predicate`.
        async fn expect(&mut self, predicate: impl Fn(&Value) -> bool) -> Value {
            let wait = async {
                while let Some(value) = self.incoming.recv().await {
                    if predicate(&value) {
                        return value;
                    }
                }
                panic!("extension stream ended");
            };
            tokio::time::timeout(Duration::from_secs(10), wait)
                .await
                .expect("message in time")
        }

        async fn reply_to(&mut self, id: &str) -> Value {
            let id = id.to_string();
            self.expect(move |v| v.get("replyTo").is_some() && v["id"] == id.as_str())
                .await["result"]
                .clone()
        }
    }

    async fn connected_host() -> (Host, FakeExtension) {
        let server = PendingServer::bind(IpAddr::V4(Ipv4Addr::LOCALHOST), 0)
            .await
            .expect("bind");
        let url = server.ws_url();

        let (accepted, extension) = tokio::join!(server.accept(), FakeExtension::connect(url));
        let (connection, remote) = accepted.expect("accept");

        let host = Host::new(connection, remote, RefreshConfig::without_delays()).expect("host");
        tokio::spawn(host.clone().run());
        (host, extension)
    }

    fn is_completion(value: &Value) -> bool {
        value["method"] == "runtime.sendMessage"
            && value["params"]["message"]["action"] == "refreshComplete"
    }

    #[tokio::test]
    async fn test_handshake_info() {
        let (host, _extension) = connected_host().await;
        assert_eq!(host.remote().extension_version, "2.1.0");
        assert_eq!(host.remote().user_agent, "TestBrowser/1.0");
    }

    #[tokio::test]
    async fn test_toolbar_click_refreshes_every_tab() {
        let (host, mut extension) = connected_host().await;

        extension.event("action.clicked", json!({}));
        let completion = extension.expect(is_completion).await;

        let message = &completion["params"]["message"];
        assert_eq!(message["success"], true);
        assert_eq!(message["succeeded"], 2);
        assert_eq!(message["total"], 2);
        assert_eq!(*extension.reloads.lock(), vec![1, 2]);

        let id = extension.ui_request(json!({ "action": "getHistory" }));
        let reply = extension.reply_to(&id).await;
        assert_eq!(reply["history"][0]["totalTabs"], 2);
        assert_eq!(reply["history"][0]["successfulTabs"], 2);

        assert!(!host.controller().is_active());
    }

    #[tokio::test]
    async fn test_popup_requests() {
        let (_host, mut extension) = connected_host().await;

        let id = extension.ui_request(json!({ "action": "getStatus" }));
        let status = extension.reply_to(&id).await;
        assert_eq!(status["active"], false);
        assert_eq!(status["totalTabs"], 0);

        let id = extension.ui_request(json!({ "action": "cancelRefresh" }));
        assert_eq!(extension.reply_to(&id).await, json!({ "accepted": false }));

        let id = extension.ui_request(json!({ "action": "startRefresh" }));
        assert_eq!(extension.reply_to(&id).await["accepted"], true);
        extension.expect(is_completion).await;

        let id = extension.ui_request(json!({ "action": "bogus" }));
        assert!(extension.reply_to(&id).await.get("error").is_some());
    }

    #[tokio::test]
    async fn test_error_reports_require_consent() {
        let (host, mut extension) = connected_host().await;

        let id = extension.ui_request(json!({
            "action": "reportError",
            "errorType": "popup_error",
            "errorDetails": { "message": "render failed" }
        }));
        assert_eq!(extension.reply_to(&id).await["queued"], true);

        let id = extension.ui_request(json!({ "action": "sendPendingErrorReports" }));
        assert_eq!(extension.reply_to(&id).await["success"], false);

        let id = extension.ui_request(json!({ "action": "setErrorReportingConsent", "enabled": true }));
        assert_eq!(extension.reply_to(&id).await["success"], true);

        let id = extension.ui_request(json!({ "action": "sendPendingErrorReports" }));
        let upload = extension
            .expect(|v| v["method"] == "telemetry.upload")
            .await;
        assert_eq!(upload["params"]["reports"][0]["errorType"], "popup_error");

        let reply = extension.reply_to(&id).await;
        assert_eq!(reply["success"], true);
        assert_eq!(reply["sent"], 1);
        assert_eq!(host.telemetry().pending_count().await.expect("count"), 0);
    }
}
