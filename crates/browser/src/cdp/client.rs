//! CDP Client - The Core Communication Layer
//!
//! Design decisions:
//! 1. Single WebSocket per browser connection (no per-session WS overhead)
//! 2. Async message passing - no locks on the receive path
//! 3. Request/response matching via ID, events fanned out to callbacks and a broadcast stream
//! 4. Every request is bounded by a timeout. No retries, no queuing. Let the caller decide.

use dashmap::DashMap;
use futures_util::{stream::SplitSink, SinkExt, StreamExt};
use serde_json::Value;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::net::TcpStream;
use tokio::sync::{broadcast, oneshot, RwLock};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;

use super::protocol::*;

type WsSink = SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, Message>;

/// Default bound on a single request/response round trip
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Error, Debug)]
pub enum CDPError {
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("CDP protocol error: {code} - {message}")]
    Protocol { code: i32, message: String },

    #[error("Request timeout: {0}")]
    Timeout(String),

    #[error("Connection closed")]
    Closed,

    #[error("Invalid response for request {0}")]
    InvalidResponse(RequestId),
}

/// Result type for CDP operations
pub type Result<T> = std::result::Result<T, CDPError>;

/// Event subscriber callback
pub type EventCallback = Arc<dyn Fn(CDPEvent) + Send + Sync>;

/// CDP Client - manages single WebSocket connection to browser
pub struct CDPClient {
    /// Monotonic request ID counter
    next_id: AtomicU64,

    /// Pending requests waiting for responses
    /// Key: request_id, Value: oneshot sender for response
    pending: Arc<DashMap<RequestId, oneshot::Sender<CDPResponse>>>,

    /// Event subscribers
    /// Key: method name (e.g., "Page.loadEventFired"), Value: callbacks
    subscribers: Arc<DashMap<String, Vec<EventCallback>>>,

    /// Every event, for short-lived waiters that must not leave callbacks behind
    events: broadcast::Sender<CDPEvent>,

    /// WebSocket write half (wrapped for concurrent sending)
    ws_sink: Arc<RwLock<WsSink>>,

    request_timeout: Duration,

    /// Stops the reader task
    shutdown: CancellationToken,
}

impl CDPClient {
    /// Connect to Chrome DevTools Protocol endpoint
    pub async fn connect(ws_url: &str) -> Result<Arc<Self>> {
        Self::connect_with_timeout(ws_url, DEFAULT_REQUEST_TIMEOUT).await
    }

    /// Connect with a custom per-request timeout
    pub async fn connect_with_timeout(ws_url: &str, request_timeout: Duration) -> Result<Arc<Self>> {
        let (ws_stream, _) = connect_async(ws_url).await?;
        let (sink, mut stream) = ws_stream.split();
        let (events, _) = broadcast::channel(1024);

        let client = Arc::new(Self {
            next_id: AtomicU64::new(1),
            pending: Arc::new(DashMap::new()),
            subscribers: Arc::new(DashMap::new()),
            events,
            ws_sink: Arc::new(RwLock::new(sink)),
            request_timeout,
            shutdown: CancellationToken::new(),
        });

        // Spawn message receiver task
        let client_clone = client.clone();
        let shutdown = client.shutdown.clone();

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    msg = stream.next() => {
                        match msg {
                            Some(Ok(Message::Text(text))) => {
                                if let Err(e) = client_clone.handle_message(&text).await {
                                    tracing::error!("Failed to handle message: {}", e);
                                }
                            }
                            Some(Ok(Message::Close(_))) | None => {
                                tracing::info!("WebSocket closed");
                                break;
                            }
                            Some(Err(e)) => {
                                tracing::error!("WebSocket error: {}", e);
                                break;
                            }
                            _ => {}
                        }
                    }
                    _ = shutdown.cancelled() => {
                        tracing::info!("Shutdown signal received");
                        break;
                    }
                }
            }

            // Dropping the senders fails every waiter with Closed
            client_clone.pending.clear();
        });

        Ok(client)
    }

    pub fn request_timeout(&self) -> Duration {
        self.request_timeout
    }

    /// Send CDP request and wait for response
    pub async fn send_request(
        &self,
        method: impl Into<String>,
        params: Option<Value>,
        session_id: Option<SessionId>,
    ) -> Result<Value> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let request = CDPRequest {
            id,
            method: method.into(),
            params,
            session_id,
        };

        if self.shutdown.is_cancelled() {
            return Err(CDPError::Closed);
        }

        let (tx, rx) = oneshot::channel();
        self.pending.insert(id, tx);

        // Serialize and send
        let json = serde_json::to_string(&request)?;
        let mut sink = self.ws_sink.write().await;
        if let Err(e) = sink.send(Message::Text(json)).await {
            self.pending.remove(&id);
            return Err(CDPError::WebSocket(e));
        }
        drop(sink); // Release lock immediately

        // Wait for response
        let response = match tokio::time::timeout(self.request_timeout, rx).await {
            Ok(Ok(response)) => response,
            Ok(Err(_)) => return Err(CDPError::Closed),
            Err(_) => {
                self.pending.remove(&id);
                tracing::warn!("{} timed out after {:?}", request.method, self.request_timeout);
                return Err(CDPError::Timeout(request.method));
            }
        };

        if response.id != id {
            return Err(CDPError::InvalidResponse(response.id));
        }

        if let Some(error) = response.error {
            return Err(CDPError::Protocol {
                code: error.code,
                message: error.message,
            });
        }

        Ok(response.result.unwrap_or(Value::Null))
    }

    /// Subscribe to CDP events
    pub fn subscribe(&self, method: impl Into<String>, callback: EventCallback) {
        let method = method.into();
        self.subscribers
            .entry(method)
            .or_insert_with(Vec::new)
            .push(callback);
    }

    /// Stream of every event received after this call
    pub fn events(&self) -> broadcast::Receiver<CDPEvent> {
        self.events.subscribe()
    }

    /// Handle incoming WebSocket message
    async fn handle_message(&self, text: &str) -> Result<()> {
        let msg: CDPMessage = serde_json::from_str(text)?;

        match msg {
            CDPMessage::Response(response) => {
                if let Some((_, tx)) = self.pending.remove(&response.id) {
                    let _ = tx.send(response); // Ignore send errors (receiver dropped)
                } else {
                    tracing::warn!("Received response for unknown request: {}", response.id);
                }
            }
            CDPMessage::Event(event) => {
                if let Some(subscribers) = self.subscribers.get(&event.method) {
                    for callback in subscribers.value() {
                        callback(event.clone());
                    }
                }
                let _ = self.events.send(event); // No receivers is fine
            }
        }

        Ok(())
    }

    pub fn is_closed(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    /// Close connection gracefully
    pub async fn close(&self) -> Result<()> {
        if self.shutdown.is_cancelled() {
            return Ok(());
        }
        self.shutdown.cancel();
        let mut sink = self.ws_sink.write().await;
        sink.close().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tokio::net::TcpListener;

    /// Minimal DevTools endpoint: answers every request except `Hang.*`,
    /// fails `Bad.*`, and fires one event before each answer.
    async fn mock_browser() -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();
            while let Some(Ok(Message::Text(text))) = ws.next().await {
                let request: Value = serde_json::from_str(&text).unwrap();
                let method = request["method"].as_str().unwrap_or_default().to_string();
                if method.starts_with("Hang.") {
                    continue;
                }

                let event = json!({ "method": "Page.loadEventFired", "params": { "timestamp": 1.0 } });
                ws.send(Message::Text(event.to_string())).await.unwrap();

                let response = if method.starts_with("Bad.") {
                    json!({ "id": request["id"], "error": { "code": -32601, "message": "not found" } })
                } else {
                    json!({ "id": request["id"], "result": { "echo": method, "session": request["sessionId"] } })
                };
                ws.send(Message::Text(response.to_string())).await.unwrap();
            }
        });

        format!("ws://{}", addr)
    }

    #[tokio::test]
    async fn test_request_response_roundtrip() {
        let client = CDPClient::connect(&mock_browser().await).await.unwrap();

        let result = client
            .send_request("Browser.getVersion", None, Some("S1".to_string()))
            .await
            .unwrap();
        assert_eq!(result["echo"], "Browser.getVersion");
        assert_eq!(result["session"], "S1");

        client.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_protocol_error_surfaces() {
        let client = CDPClient::connect(&mock_browser().await).await.unwrap();

        match client.send_request("Bad.method", None, None).await {
            Err(CDPError::Protocol { code, message }) => {
                assert_eq!(code, -32601);
                assert_eq!(message, "not found");
            }
            other => panic!("expected protocol error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_request_times_out() {
        let client = CDPClient::connect_with_timeout(&mock_browser().await, Duration::from_millis(50))
            .await
            .unwrap();

        match client.send_request("Hang.forever", None, None).await {
            Err(CDPError::Timeout(method)) => assert_eq!(method, "Hang.forever"),
            other => panic!("expected timeout, got {:?}", other),
        }
        assert!(client.pending.is_empty());
    }

    #[tokio::test]
    async fn test_events_reach_callbacks_and_stream() {
        let client = CDPClient::connect(&mock_browser().await).await.unwrap();

        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        client.subscribe(
            "Page.loadEventFired",
            Arc::new(move |event| {
                let _ = tx.send(event.method);
            }),
        );
        let mut stream = client.events();

        client.send_request("Page.enable", None, None).await.unwrap();

        assert_eq!(rx.recv().await.unwrap(), "Page.loadEventFired");
        assert_eq!(stream.recv().await.unwrap().method, "Page.loadEventFired");
    }

    #[tokio::test]
    async fn test_closed_client_rejects_requests() {
        let client = CDPClient::connect(&mock_browser().await).await.unwrap();
        client.close().await.unwrap();
        assert!(client.is_closed());
        assert!(matches!(
            client.send_request("Browser.getVersion", None, None).await,
            Err(CDPError::Closed)
        ));
    }
}
