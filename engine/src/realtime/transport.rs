//! Session Transport
//!
//! One persistent WebSocket per active call, registered by call id. The
//! registry owns the lifecycle: `connect` replaces any existing transport
//! for the same call, a spawned read loop forwards inbound frames as tagged
//! [`SessionEvent`]s, and every exit path — remote close, socket error,
//! local shutdown, failed handshake — deregisters the handle.
//!
//! The backend originates the session greeting, so nothing is sent after
//! the socket opens; this side only reads until told otherwise.

use chrono::{DateTime, Utc};
use futures::stream::StreamExt;
use futures::SinkExt;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, RwLock};
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tracing::{debug, info, warn};

use super::{RealtimeError, Result};

/// Lifecycle state of a registered transport
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    /// Handshake in progress
    Connecting,
    /// Socket open, read loop running
    Open,
}

/// Inbound event from a session socket, tagged for routing
#[derive(Debug, Clone)]
pub enum SessionEvent {
    /// A control frame carrying a recognizable `type` field
    Control {
        call_id: String,
        event_type: String,
        raw: serde_json::Value,
    },

    /// Valid JSON without a `type` field; kept for future routing
    Unknown { call_id: String, raw: String },

    /// The session socket closed (remote close, error, or local shutdown)
    Closed { call_id: String },
}

/// Status snapshot of one transport, for the status endpoint
#[derive(Debug, Clone, Serialize)]
pub struct TransportStatus {
    pub call_id: String,
    pub state: ConnectionState,
    pub opened_at: DateTime<Utc>,
}

struct ActiveTransport {
    state: ConnectionState,
    opened_at: DateTime<Utc>,
    shutdown: Option<oneshot::Sender<()>>,
}

type TransportMap = Arc<RwLock<HashMap<String, ActiveTransport>>>;

/// Registry of active session transports, keyed by call id
pub struct TransportRegistry {
    ws_url: String,
    api_key: String,
    sockets: TransportMap,
    events: mpsc::Sender<SessionEvent>,
}

impl TransportRegistry {
    /// Create a registry. Inbound frames are forwarded on `events`.
    pub fn new(
        ws_url: impl Into<String>,
        api_key: impl Into<String>,
        events: mpsc::Sender<SessionEvent>,
    ) -> Self {
        Self {
            ws_url: ws_url.into(),
            api_key: api_key.into(),
            sockets: Arc::new(RwLock::new(HashMap::new())),
            events,
        }
    }

    /// Open the session socket for a call.
    ///
    /// Any existing transport for the same call is closed first — replace,
    /// never duplicate. On handshake failure the registered entry is
    /// removed before the error is returned, so no `connecting` handle can
    /// leak.
    pub async fn connect(&self, call_id: &str) -> Result<()> {
        let (shutdown_tx, shutdown_rx) = oneshot::channel();

        {
            let mut sockets = self.sockets.write().await;
            if let Some(mut old) = sockets.remove(call_id) {
                info!("Replacing existing session transport for call {}", call_id);
                if let Some(tx) = old.shutdown.take() {
                    let _ = tx.send(());
                }
            }
            sockets.insert(
                call_id.to_string(),
                ActiveTransport {
                    state: ConnectionState::Connecting,
                    opened_at: Utc::now(),
                    shutdown: Some(shutdown_tx),
                },
            );
        }

        let url = format!("{}?call_id={}", self.ws_url, call_id);
        let request = build_request(&url, &self.api_key);
        let request = match request {
            Ok(r) => r,
            Err(e) => {
                self.deregister(call_id).await;
                return Err(e);
            }
        };

        let stream = match tokio_tungstenite::connect_async(request).await {
            Ok((stream, _response)) => stream,
            Err(e) => {
                self.deregister(call_id).await;
                return Err(RealtimeError::HandshakeFailed(e.to_string()));
            }
        };

        // Mark open — unless the call was terminated mid-handshake, in
        // which case the connection is simply dropped.
        {
            let mut sockets = self.sockets.write().await;
            match sockets.get_mut(call_id) {
                Some(transport) => transport.state = ConnectionState::Open,
                None => {
                    debug!(
                        "Call {} terminated during handshake, dropping connection",
                        call_id
                    );
                    return Ok(());
                }
            }
        }

        info!("Session socket open for call {}", call_id);

        tokio::spawn(read_loop(
            call_id.to_string(),
            stream,
            shutdown_rx,
            Arc::clone(&self.sockets),
            self.events.clone(),
        ));

        Ok(())
    }

    /// Close the transport for a call. Idempotent: unknown id is a no-op.
    pub async fn close(&self, call_id: &str) -> bool {
        let mut sockets = self.sockets.write().await;
        match sockets.remove(call_id) {
            Some(mut transport) => {
                if let Some(tx) = transport.shutdown.take() {
                    let _ = tx.send(());
                }
                info!("Closed session transport for call {}", call_id);
                true
            }
            None => false,
        }
    }

    /// True while a transport for this call is connecting or open
    pub async fn is_active(&self, call_id: &str) -> bool {
        self.sockets.read().await.contains_key(call_id)
    }

    /// Current state of a call's transport, if one is registered
    pub async fn state(&self, call_id: &str) -> Option<ConnectionState> {
        self.sockets.read().await.get(call_id).map(|t| t.state)
    }

    /// Number of registered transports
    pub async fn active_count(&self) -> usize {
        self.sockets.read().await.len()
    }

    /// Snapshot of every registered transport
    pub async fn snapshot(&self) -> Vec<TransportStatus> {
        self.sockets
            .read()
            .await
            .iter()
            .map(|(call_id, t)| TransportStatus {
                call_id: call_id.clone(),
                state: t.state,
                opened_at: t.opened_at,
            })
            .collect()
    }

    async fn deregister(&self, call_id: &str) {
        self.sockets.write().await.remove(call_id);
    }
}

fn build_request(
    url: &str,
    api_key: &str,
) -> Result<tokio_tungstenite::tungstenite::handshake::client::Request> {
    let mut request = url
        .into_client_request()
        .map_err(|e| RealtimeError::HandshakeFailed(e.to_string()))?;

    let bearer: tokio_tungstenite::tungstenite::http::HeaderValue = format!("Bearer {}", api_key)
        .parse()
        .map_err(|_| RealtimeError::HandshakeFailed("invalid authorization header".to_string()))?;
    request.headers_mut().insert("Authorization", bearer);

    Ok(request)
}

/// Per-connection read loop. Runs until the socket closes, errors, or a
/// local shutdown fires; always deregisters on the way out.
async fn read_loop(
    call_id: String,
    stream: tokio_tungstenite::WebSocketStream<
        tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
    >,
    mut shutdown_rx: oneshot::Receiver<()>,
    sockets: TransportMap,
    events: mpsc::Sender<SessionEvent>,
) {
    let (mut write, mut read) = stream.split();

    loop {
        tokio::select! {
            msg = read.next() => {
                match msg {
                    Some(Ok(WsMessage::Text(text))) => {
                        match parse_frame(&call_id, &text) {
                            Some(event) => {
                                if events.send(event).await.is_err() {
                                    break;
                                }
                            }
                            None => {
                                warn!("Dropping malformed frame for call {}", call_id);
                            }
                        }
                    }
                    Some(Ok(WsMessage::Ping(data))) => {
                        let _ = write.send(WsMessage::Pong(data)).await;
                    }
                    Some(Ok(WsMessage::Close(_))) | None => {
                        info!("Session socket closed by backend for call {}", call_id);
                        break;
                    }
                    Some(Err(e)) => {
                        warn!("Session socket error for call {}: {}", call_id, e);
                        break;
                    }
                    _ => {} // Binary, Pong, Frame — ignore
                }
            }
            _ = &mut shutdown_rx => {
                debug!("Local shutdown of session socket for call {}", call_id);
                let _ = write.send(WsMessage::Close(None)).await;
                break;
            }
        }
    }

    sockets.write().await.remove(&call_id);
    let _ = events
        .send(SessionEvent::Closed {
            call_id: call_id.clone(),
        })
        .await;
}

/// Tag one inbound text frame. `None` means the frame is malformed (not
/// JSON) and should be dropped.
fn parse_frame(call_id: &str, text: &str) -> Option<SessionEvent> {
    let value: serde_json::Value = serde_json::from_str(text).ok()?;

    match value.get("type").and_then(|t| t.as_str()) {
        Some(event_type) => Some(SessionEvent::Control {
            call_id: call_id.to_string(),
            event_type: event_type.to_string(),
            raw: value,
        }),
        None => Some(SessionEvent::Unknown {
            call_id: call_id.to_string(),
            raw: text.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_frame_control() {
        let event = parse_frame("c1", r#"{"type":"session.created","id":"s1"}"#);
        match event {
            Some(SessionEvent::Control {
                call_id,
                event_type,
                raw,
            }) => {
                assert_eq!(call_id, "c1");
                assert_eq!(event_type, "session.created");
                assert_eq!(raw["id"], "s1");
            }
            other => panic!("Expected control event, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_frame_unknown() {
        let event = parse_frame("c1", r#"{"hello":"world"}"#);
        assert!(matches!(event, Some(SessionEvent::Unknown { .. })));
    }

    #[test]
    fn test_parse_frame_malformed_dropped() {
        assert!(parse_frame("c1", "not json at all").is_none());
    }

    #[tokio::test]
    async fn test_connect_failure_leaves_no_handle() {
        let (tx, _rx) = mpsc::channel(8);
        // Nothing listens on this port; the handshake fails fast.
        let registry = TransportRegistry::new("ws://127.0.0.1:9", "key", tx);

        let result = registry.connect("c1").await;

        assert!(matches!(result, Err(RealtimeError::HandshakeFailed(_))));
        assert!(!registry.is_active("c1").await);
        assert_eq!(registry.active_count().await, 0);
    }

    #[tokio::test]
    async fn test_close_unknown_id_is_noop() {
        let (tx, _rx) = mpsc::channel(8);
        let registry = TransportRegistry::new("ws://127.0.0.1:9", "key", tx);

        assert!(!registry.close("nope").await);
    }
}
