//! Relay transport
//!
//! A single-connection JSON-RPC 2.0 client hosted on a WebSocket. Outbound
//! calls are correlated to relay acks by frame id; inbound `waku_subscription`
//! deliveries are surfaced as events. On disconnect every in-flight call fails
//! and the connection is re-dialed with capped backoff; the engines replay
//! their subscriptions when the `Connected` event fires.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use thiserror::Error;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::header::AUTHORIZATION;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, error, warn};

use super::rpc::{RelayAck, RelayNack, RelayRequest, RelayRpc};
use crate::topic::Topic;

/// Transport errors
#[derive(Error, Debug, Clone)]
pub enum TransportError {
    /// Connection failed
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Not connected to the relay
    #[error("Connection closed")]
    Disconnected,

    /// Send failed
    #[error("Failed to send: {0}")]
    SendFailed(String),

    /// The relay rejected the call
    #[error("Relay error {code}: {message}")]
    Rpc {
        /// Relay error code
        code: i64,
        /// Relay error message
        message: String,
    },

    /// Invalid data
    #[error("Invalid data: {0}")]
    InvalidData(String),
}

/// Result type for transport operations
pub type TransportResult<T> = Result<T, TransportError>;

/// Connection lifecycle and delivery events
#[derive(Debug, Clone)]
pub enum TransportEvent {
    /// The connection is (re-)established
    Connected,
    /// The connection dropped; in-flight calls have failed
    Disconnected,
    /// A message arrived on a subscribed topic
    Message {
        /// Topic the message was published to
        topic: Topic,
        /// Hex-framed payload
        message: String,
    },
}

/// Abstract relay transport
///
/// The transport moves opaque hex strings between topics; framing and
/// encryption live above it. Publish is never retried here; subscribe and
/// unsubscribe are retried at most once.
#[async_trait]
pub trait RelayTransport: Send + Sync {
    /// Publish a message, completing on the relay's ack
    async fn publish(&self, topic: &Topic, message: String, ttl: u64) -> TransportResult<()>;

    /// Subscribe to a topic
    async fn subscribe(&self, topic: &Topic) -> TransportResult<()>;

    /// Unsubscribe from a topic
    async fn unsubscribe(&self, topic: &Topic) -> TransportResult<()>;
}

type WsSink = SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, Message>;
type WsStream = SplitStream<WebSocketStream<MaybeTlsStream<TcpStream>>>;

struct WsShared {
    url: String,
    api_key: Option<String>,
    sink: tokio::sync::Mutex<Option<WsSink>>,
    pending: Mutex<HashMap<u64, oneshot::Sender<TransportResult<serde_json::Value>>>>,
    subscriptions: Mutex<HashMap<Topic, String>>,
    next_id: AtomicU64,
    events: mpsc::UnboundedSender<TransportEvent>,
    closed: AtomicBool,
}

/// WebSocket-hosted relay transport
#[derive(Clone)]
pub struct WsTransport {
    shared: Arc<WsShared>,
}

impl WsTransport {
    /// Dial the relay and return the transport and its event stream
    ///
    /// The API key, when given, is sent as a bearer token on the upgrade
    /// request.
    pub async fn connect(
        url: impl Into<String>,
        api_key: Option<String>,
    ) -> TransportResult<(Self, mpsc::UnboundedReceiver<TransportEvent>)> {
        let (events, events_rx) = mpsc::unbounded_channel();
        let shared = Arc::new(WsShared {
            url: url.into(),
            api_key,
            sink: tokio::sync::Mutex::new(None),
            pending: Mutex::new(HashMap::new()),
            subscriptions: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            events,
            closed: AtomicBool::new(false),
        });

        dial(shared.clone()).await?;
        Ok((WsTransport { shared }, events_rx))
    }

    /// Tear the connection down for good; no reconnect will follow
    pub async fn close(&self) {
        self.shared.closed.store(true, Ordering::SeqCst);
        if let Some(mut sink) = self.shared.sink.lock().await.take() {
            let _ = sink.close().await;
        }
    }

    async fn rpc(&self, request: RelayRequest) -> TransportResult<serde_json::Value> {
        let id = self.shared.next_id.fetch_add(1, Ordering::Relaxed);
        let frame = RelayRpc::new(id, request);
        let json =
            serde_json::to_string(&frame).map_err(|e| TransportError::SendFailed(e.to_string()))?;

        let (tx, rx) = oneshot::channel();
        self.shared.pending.lock().unwrap().insert(id, tx);

        let send_result = {
            let mut guard = self.shared.sink.lock().await;
            match guard.as_mut() {
                None => Err(TransportError::Disconnected),
                Some(sink) => sink
                    .send(Message::Text(json))
                    .await
                    .map_err(|e| TransportError::SendFailed(e.to_string())),
            }
        };
        if let Err(e) = send_result {
            self.shared.pending.lock().unwrap().remove(&id);
            return Err(e);
        }

        rx.await.map_err(|_| TransportError::Disconnected)?
    }

    async fn subscribe_once(&self, topic: &Topic) -> TransportResult<()> {
        let result = self
            .rpc(RelayRequest::Subscribe {
                topic: topic.clone(),
            })
            .await?;
        let subscription = result
            .as_str()
            .ok_or_else(|| TransportError::InvalidData("subscribe ack is not a string".into()))?;
        self.shared
            .subscriptions
            .lock()
            .unwrap()
            .insert(topic.clone(), subscription.to_string());
        Ok(())
    }

    async fn unsubscribe_once(&self, topic: &Topic) -> TransportResult<()> {
        let subscription = self.shared.subscriptions.lock().unwrap().remove(topic);
        match subscription {
            Some(id) => self.rpc(RelayRequest::Unsubscribe { id }).await.map(|_| ()),
            // nothing to cancel
            None => Ok(()),
        }
    }
}

#[async_trait]
impl RelayTransport for WsTransport {
    async fn publish(&self, topic: &Topic, message: String, ttl: u64) -> TransportResult<()> {
        self.rpc(RelayRequest::Publish {
            topic: topic.clone(),
            message,
            ttl,
        })
        .await
        .map(|_| ())
    }

    async fn subscribe(&self, topic: &Topic) -> TransportResult<()> {
        match self.subscribe_once(topic).await {
            Err(TransportError::Disconnected) => self.subscribe_once(topic).await,
            result => result,
        }
    }

    async fn unsubscribe(&self, topic: &Topic) -> TransportResult<()> {
        match self.unsubscribe_once(topic).await {
            Err(TransportError::Disconnected) => self.unsubscribe_once(topic).await,
            result => result,
        }
    }
}

async fn dial(shared: Arc<WsShared>) -> TransportResult<()> {
    let mut request = shared
        .url
        .as_str()
        .into_client_request()
        .map_err(|e| TransportError::ConnectionFailed(e.to_string()))?;
    if let Some(key) = &shared.api_key {
        let value = HeaderValue::from_str(&format!("Bearer {key}"))
            .map_err(|e| TransportError::ConnectionFailed(e.to_string()))?;
        request.headers_mut().insert(AUTHORIZATION, value);
    }

    let (ws, _) = connect_async(request)
        .await
        .map_err(|e| TransportError::ConnectionFailed(e.to_string()))?;
    let (sink, stream) = ws.split();

    // Subscription ids from the previous connection are void
    shared.subscriptions.lock().unwrap().clear();
    *shared.sink.lock().await = Some(sink);
    let _ = shared.events.send(TransportEvent::Connected);

    tokio::spawn(read_loop(shared, stream));
    Ok(())
}

async fn read_loop(shared: Arc<WsShared>, mut stream: WsStream) {
    while let Some(frame) = stream.next().await {
        match frame {
            Ok(Message::Text(text)) => handle_frame(&shared, &text).await,
            Ok(Message::Ping(data)) => {
                if let Some(sink) = shared.sink.lock().await.as_mut() {
                    let _ = sink.send(Message::Pong(data)).await;
                }
            }
            Ok(Message::Close(_)) => break,
            Err(e) => {
                error!("websocket error: {e}");
                break;
            }
            _ => {}
        }
    }

    *shared.sink.lock().await = None;
    // dropping the completions fails every in-flight call
    shared.pending.lock().unwrap().clear();
    let _ = shared.events.send(TransportEvent::Disconnected);

    if !shared.closed.load(Ordering::SeqCst) {
        tokio::spawn(reconnect(shared));
    }
}

async fn handle_frame(shared: &Arc<WsShared>, text: &str) {
    if let Ok(frame) = serde_json::from_str::<RelayRpc>(text) {
        match frame.request {
            RelayRequest::Subscription { data, .. } => {
                // ack the delivery before handing it upwards
                let ack = RelayAck::new(frame.id, serde_json::json!(true));
                if let Ok(json) = serde_json::to_string(&ack) {
                    if let Some(sink) = shared.sink.lock().await.as_mut() {
                        let _ = sink.send(Message::Text(json)).await;
                    }
                }
                let _ = shared.events.send(TransportEvent::Message {
                    topic: data.topic,
                    message: data.message,
                });
            }
            other => warn!("unexpected relay call: {other:?}"),
        }
        return;
    }

    if let Ok(nack) = serde_json::from_str::<RelayNack>(text) {
        if let Some(tx) = shared.pending.lock().unwrap().remove(&nack.id) {
            let _ = tx.send(Err(TransportError::Rpc {
                code: nack.error.code,
                message: nack.error.message,
            }));
        }
        return;
    }

    if let Ok(ack) = serde_json::from_str::<RelayAck>(text) {
        if let Some(tx) = shared.pending.lock().unwrap().remove(&ack.id) {
            let _ = tx.send(Ok(ack.result));
        } else {
            debug!("ack for unknown frame {}", ack.id);
        }
        return;
    }

    warn!("undecodable relay frame, dropped");
}

fn reconnect(shared: Arc<WsShared>) -> Pin<Box<dyn Future<Output = ()> + Send>> {
    Box::pin(async move {
        let mut delay = Duration::from_secs(1);
        loop {
            tokio::time::sleep(delay).await;
            if shared.closed.load(Ordering::SeqCst) {
                return;
            }
            match dial(shared.clone()).await {
                Ok(()) => return,
                Err(e) => {
                    warn!("reconnect failed: {e}");
                    delay = (delay * 2).min(Duration::from_secs(30));
                }
            }
        }
    })
}
