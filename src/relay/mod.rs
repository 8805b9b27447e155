//! Relay façade
//!
//! The bridge between the engines and the transport. Outbound: typed protocol
//! calls are wrapped in a JSON-RPC envelope, serialized under the topic's key,
//! and published. Inbound: hex payloads are opened and classified as request,
//! response, or error; requests flow to the engines, responses complete the
//! matching outstanding publish. Correlation is keyed by JSON-RPC `id`, so
//! concurrent publishes on one topic each receive their own response.

pub mod memory;
pub mod rpc;
pub mod transport;

pub use memory::{MemoryRelay, MemoryTransport};
pub use transport::{RelayTransport, TransportError, TransportEvent, TransportResult, WsTransport};

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use thiserror::Error;
use tokio::sync::oneshot;
use tracing::{debug, warn};

use crate::protocol::envelope::{ClientRequest, JsonRpcError, JsonRpcResponse, ProtocolCall, RpcReply};
use crate::serializer::{Serializer, SerializerError};
use crate::topic::Topic;

/// Relay-side retention for handshake messages, seconds
pub const HANDSHAKE_TTL: u64 = 30;

/// Relay-side retention for settled-session messages, seconds
pub const SESSION_TTL: u64 = 604_800;

/// Default client-side timeout for a correlated response
pub const DEFAULT_RESPONSE_TIMEOUT: Duration = Duration::from_secs(60);

/// Errors from the relay façade
#[derive(Error, Debug)]
pub enum RelayError {
    /// Payload could not be encoded or decoded
    #[error(transparent)]
    Serializer(#[from] SerializerError),

    /// The transport failed
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// No response arrived within the correlation window
    #[error("timed out awaiting a response")]
    ResponseTimeout,
}

/// A decoded inbound protocol request, tagged with its topic
#[derive(Debug, Clone)]
pub struct InboundRequest {
    /// Topic the request arrived on
    pub topic: Topic,
    /// The decoded envelope
    pub request: ClientRequest,
}

/// The engines' gateway to the relay
pub struct Relay {
    transport: Arc<dyn RelayTransport>,
    serializer: Serializer,
    pending: Mutex<HashMap<i64, oneshot::Sender<RpcReply>>>,
    response_timeout: Duration,
}

impl Relay {
    /// Wrap a transport and serializer
    pub fn new(
        transport: Arc<dyn RelayTransport>,
        serializer: Serializer,
        response_timeout: Duration,
    ) -> Self {
        Relay {
            transport,
            serializer,
            pending: Mutex::new(HashMap::new()),
            response_timeout,
        }
    }

    /// Publish a protocol call, completing on the relay's ack
    ///
    /// Returns the envelope id, which a later inbound reply may reference.
    pub async fn publish(
        &self,
        topic: &Topic,
        call: ProtocolCall,
        ttl: u64,
    ) -> Result<i64, RelayError> {
        let request = ClientRequest::new(call);
        let message = self.serializer.serialize(topic, &request)?;
        debug!(topic = %topic, method = request.call.method(), "publish");
        self.transport.publish(topic, message, ttl).await?;
        Ok(request.id)
    }

    /// Publish a protocol call and await the peer's correlated reply
    ///
    /// The server ack is observed first; the reply is matched by JSON-RPC id
    /// within the configured timeout. Dropping the returned future discards
    /// any eventual reply silently.
    pub async fn request(
        &self,
        topic: &Topic,
        call: ProtocolCall,
        ttl: u64,
    ) -> Result<RpcReply, RelayError> {
        let request = ClientRequest::new(call);
        let message = self.serializer.serialize(topic, &request)?;

        let (tx, rx) = oneshot::channel();
        self.pending.lock().unwrap().insert(request.id, tx);

        debug!(topic = %topic, method = request.call.method(), id = request.id, "request");
        if let Err(e) = self.transport.publish(topic, message, ttl).await {
            self.pending.lock().unwrap().remove(&request.id);
            return Err(e.into());
        }

        match tokio::time::timeout(self.response_timeout, rx).await {
            Ok(Ok(reply)) => Ok(reply),
            // completion dropped with the connection
            Ok(Err(_)) => Err(RelayError::Transport(TransportError::Disconnected)),
            Err(_) => {
                self.pending.lock().unwrap().remove(&request.id);
                Err(RelayError::ResponseTimeout)
            }
        }
    }

    /// Publish a JSON-RPC reply for an inbound request
    pub async fn respond(&self, topic: &Topic, reply: RpcReply) -> Result<(), RelayError> {
        let message = match &reply {
            RpcReply::Result(response) => self.serializer.serialize(topic, response)?,
            RpcReply::Error(error) => self.serializer.serialize(topic, error)?,
        };
        self.transport.publish(topic, message, SESSION_TTL).await?;
        Ok(())
    }

    /// Subscribe the transport to a topic
    pub async fn subscribe(&self, topic: &Topic) -> Result<(), RelayError> {
        Ok(self.transport.subscribe(topic).await?)
    }

    /// Unsubscribe the transport from a topic
    pub async fn unsubscribe(&self, topic: &Topic) -> Result<(), RelayError> {
        Ok(self.transport.unsubscribe(topic).await?)
    }

    /// Classify an inbound payload
    ///
    /// Requests are handed back for engine dispatch; replies complete the
    /// outstanding publish they correlate to. Undecodable payloads are logged
    /// and dropped.
    pub fn process_inbound(&self, topic: &Topic, message: &str) -> Option<InboundRequest> {
        let plaintext = match self.serializer.open(topic, message) {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(topic = %topic, "dropping undecryptable payload: {e}");
                return None;
            }
        };

        if let Ok(request) = serde_json::from_slice::<ClientRequest>(&plaintext) {
            return Some(InboundRequest {
                topic: topic.clone(),
                request,
            });
        }

        if let Ok(response) = serde_json::from_slice::<JsonRpcResponse>(&plaintext) {
            self.complete(RpcReply::Result(response));
            return None;
        }

        if let Ok(error) = serde_json::from_slice::<JsonRpcError>(&plaintext) {
            self.complete(RpcReply::Error(error));
            return None;
        }

        warn!(topic = %topic, "dropping undecodable payload");
        None
    }

    fn complete(&self, reply: RpcReply) {
        match self.pending.lock().unwrap().remove(&reply.id()) {
            Some(tx) => {
                // a cancelled caller dropped the receiver; discard silently
                let _ = tx.send(reply);
            }
            None => debug!(id = reply.id(), "reply without outstanding request"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::KeyStore;
    use crate::protocol::session::{AppRequest, SessionPayloadParams};
    use tokio::sync::mpsc;

    fn unkeyed_relay(
        transport: MemoryTransport,
    ) -> (Arc<Relay>, Serializer) {
        let serializer = Serializer::new(Arc::new(KeyStore::new()));
        let relay = Arc::new(Relay::new(
            Arc::new(transport),
            serializer.clone(),
            Duration::from_secs(5),
        ));
        (relay, serializer)
    }

    fn payload_call(marker: &str) -> ProtocolCall {
        ProtocolCall::SessionPayload(SessionPayloadParams {
            request: AppRequest {
                method: marker.to_string(),
                params: serde_json::Value::Null,
            },
            chain_id: None,
        })
    }

    /// Pump transport events into the façade until the receiver closes
    fn spawn_pump(relay: Arc<Relay>, mut rx: mpsc::UnboundedReceiver<TransportEvent>) {
        tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                if let TransportEvent::Message { topic, message } = event {
                    relay.process_inbound(&topic, &message);
                }
            }
        });
    }

    #[tokio::test]
    async fn test_request_completes_with_matching_reply() {
        let hub = MemoryRelay::new();
        let (ours, ours_rx) = hub.attach();
        let (peer, mut peer_rx) = hub.attach();
        let topic = Topic::generate();

        let (relay, serializer) = unkeyed_relay(ours);
        relay.subscribe(&topic).await.unwrap();
        peer.subscribe(&topic).await.unwrap();
        spawn_pump(relay.clone(), ours_rx);

        // the peer answers whatever request it sees
        let peer_serializer = serializer.clone();
        let peer_topic = topic.clone();
        tokio::spawn(async move {
            while let Some(event) = peer_rx.recv().await {
                if let TransportEvent::Message { message, .. } = event {
                    let request: ClientRequest =
                        peer_serializer.deserialize(&peer_topic, &message).unwrap();
                    let reply = JsonRpcResponse::new(request.id, serde_json::json!("pong"));
                    let encoded = peer_serializer.serialize(&peer_topic, &reply).unwrap();
                    peer.publish(&peer_topic, encoded, 30).await.unwrap();
                }
            }
        });

        let reply = relay
            .request(&topic, payload_call("ping"), HANDSHAKE_TTL)
            .await
            .unwrap();
        match reply {
            RpcReply::Result(response) => assert_eq!(response.result, "pong"),
            other => panic!("expected result, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_concurrent_requests_each_get_their_own_reply() {
        let hub = MemoryRelay::new();
        let (ours, ours_rx) = hub.attach();
        let (peer, mut peer_rx) = hub.attach();
        let topic = Topic::generate();

        let (relay, serializer) = unkeyed_relay(ours);
        relay.subscribe(&topic).await.unwrap();
        peer.subscribe(&topic).await.unwrap();
        spawn_pump(relay.clone(), ours_rx);

        // the peer echoes each request's method back as its result
        let peer_serializer = serializer.clone();
        let peer_topic = topic.clone();
        tokio::spawn(async move {
            let mut held: Vec<ClientRequest> = Vec::new();
            while let Some(event) = peer_rx.recv().await {
                if let TransportEvent::Message { message, .. } = event {
                    let request: ClientRequest =
                        peer_serializer.deserialize(&peer_topic, &message).unwrap();
                    held.push(request);
                    if held.len() == 2 {
                        // answer in reverse arrival order
                        for request in held.drain(..).rev() {
                            let marker = match &request.call {
                                ProtocolCall::SessionPayload(p) => p.request.method.clone(),
                                _ => unreachable!(),
                            };
                            let reply =
                                JsonRpcResponse::new(request.id, serde_json::json!(marker));
                            let encoded =
                                peer_serializer.serialize(&peer_topic, &reply).unwrap();
                            peer.publish(&peer_topic, encoded, 30).await.unwrap();
                        }
                    }
                }
            }
        });

        let (first, second) = tokio::join!(
            relay.request(&topic, payload_call("first"), HANDSHAKE_TTL),
            relay.request(&topic, payload_call("second"), HANDSHAKE_TTL),
        );
        match first.unwrap() {
            RpcReply::Result(response) => assert_eq!(response.result, "first"),
            other => panic!("mismatched reply {other:?}"),
        }
        match second.unwrap() {
            RpcReply::Result(response) => assert_eq!(response.result, "second"),
            other => panic!("mismatched reply {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_request_times_out_without_reply() {
        let hub = MemoryRelay::new();
        let (ours, _ours_rx) = hub.attach();
        let topic = Topic::generate();

        let serializer = Serializer::new(Arc::new(KeyStore::new()));
        let relay = Relay::new(Arc::new(ours), serializer, Duration::from_millis(50));

        let result = relay.request(&topic, payload_call("void"), HANDSHAKE_TTL).await;
        assert!(matches!(result, Err(RelayError::ResponseTimeout)));
        // the dangling completion was removed
        assert!(relay.pending.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_undecodable_inbound_is_dropped() {
        let hub = MemoryRelay::new();
        let (ours, _rx) = hub.attach();
        let (relay, _serializer) = unkeyed_relay(ours);
        let topic = Topic::generate();

        assert!(relay.process_inbound(&topic, "zz-not-hex").is_none());
        assert!(relay
            .process_inbound(&topic, &hex::encode(b"not json"))
            .is_none());
    }
}
