//! Pairwise Relay Server
//!
//! A development relay speaking the waku JSON-RPC wire protocol: clients
//! subscribe to topics and publish opaque hex blobs, the relay fans each
//! publish out to every other subscriber. Zero knowledge: payloads are
//! end-to-end encrypted and never inspected.
//!
//! Usage:
//!   pairwise-relay [--port 8765] [--host 0.0.0.0]

use clap::Parser;
use futures_util::{SinkExt, StreamExt};
use pairwise::relay::rpc::{RelayAck, RelayRequest, RelayRpc, SubscriptionData};
use pairwise::Topic;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_tungstenite::{accept_async, tungstenite::Message};
use tracing::{error, info, warn};

/// Pairwise Relay Server
#[derive(Parser)]
#[command(name = "pairwise-relay")]
#[command(about = "waku JSON-RPC relay for pairwise clients")]
struct Args {
    /// Port to listen on
    #[arg(short, long, default_value = "8765")]
    port: u16,

    /// Host to bind to
    #[arg(long, default_value = "0.0.0.0")]
    host: String,
}

/// One subscription: which client, under which subscription id
struct Subscription {
    client: u64,
    id: String,
}

/// Server state
struct RelayState {
    clients: Mutex<HashMap<u64, mpsc::UnboundedSender<String>>>,
    subscriptions: Mutex<HashMap<Topic, Vec<Subscription>>>,
    next_client: AtomicU64,
    next_frame: AtomicU64,
}

impl RelayState {
    fn new() -> Self {
        RelayState {
            clients: Mutex::new(HashMap::new()),
            subscriptions: Mutex::new(HashMap::new()),
            next_client: AtomicU64::new(1),
            next_frame: AtomicU64::new(1),
        }
    }

    fn attach(&self, outbound: mpsc::UnboundedSender<String>) -> u64 {
        let id = self.next_client.fetch_add(1, Ordering::Relaxed);
        self.clients.lock().unwrap().insert(id, outbound);
        id
    }

    fn detach(&self, client: u64) {
        self.clients.lock().unwrap().remove(&client);
        let mut subscriptions = self.subscriptions.lock().unwrap();
        for subs in subscriptions.values_mut() {
            subs.retain(|s| s.client != client);
        }
        subscriptions.retain(|_, subs| !subs.is_empty());
    }

    fn subscribe(&self, client: u64, topic: Topic) -> String {
        let id = hex::encode(rand::random::<[u8; 16]>());
        self.subscriptions
            .lock()
            .unwrap()
            .entry(topic)
            .or_default()
            .push(Subscription {
                client,
                id: id.clone(),
            });
        id
    }

    fn unsubscribe(&self, client: u64, subscription: &str) {
        let mut subscriptions = self.subscriptions.lock().unwrap();
        for subs in subscriptions.values_mut() {
            subs.retain(|s| !(s.client == client && s.id == subscription));
        }
        subscriptions.retain(|_, subs| !subs.is_empty());
    }

    /// Fan a publish out to every other subscriber of the topic
    fn publish(&self, publisher: u64, topic: &Topic, message: &str) {
        let subscriptions = self.subscriptions.lock().unwrap();
        let clients = self.clients.lock().unwrap();
        let Some(subs) = subscriptions.get(topic) else {
            return;
        };
        for sub in subs.iter().filter(|s| s.client != publisher) {
            let Some(outbound) = clients.get(&sub.client) else {
                continue;
            };
            let frame = RelayRpc::new(
                self.next_frame.fetch_add(1, Ordering::Relaxed),
                RelayRequest::Subscription {
                    id: sub.id.clone(),
                    data: SubscriptionData {
                        topic: topic.clone(),
                        message: message.to_string(),
                    },
                },
            );
            match serde_json::to_string(&frame) {
                Ok(json) => {
                    let _ = outbound.send(json);
                }
                Err(e) => error!("failed to encode delivery: {e}"),
            }
        }
    }
}

/// Handle a single WebSocket connection
async fn handle_connection(stream: TcpStream, addr: SocketAddr, state: Arc<RelayState>) {
    info!("New connection from: {}", addr);

    let ws_stream = match accept_async(stream).await {
        Ok(ws) => ws,
        Err(e) => {
            error!("WebSocket handshake failed for {}: {}", addr, e);
            return;
        }
    };

    let (mut write, mut read) = ws_stream.split();
    let (outbound, mut outbound_rx) = mpsc::unbounded_channel::<String>();
    let client = state.attach(outbound);

    loop {
        tokio::select! {
            // frames from the client
            frame = read.next() => {
                match frame {
                    Some(Ok(Message::Text(text))) => {
                        let Ok(rpc) = serde_json::from_str::<RelayRpc>(&text) else {
                            // delivery acks and anything else are ignored
                            continue;
                        };
                        let ack = match rpc.request {
                            RelayRequest::Publish { topic, message, .. } => {
                                state.publish(client, &topic, &message);
                                RelayAck::new(rpc.id, serde_json::json!(true))
                            }
                            RelayRequest::Subscribe { topic } => {
                                let id = state.subscribe(client, topic);
                                RelayAck::new(rpc.id, serde_json::json!(id))
                            }
                            RelayRequest::Unsubscribe { id } => {
                                state.unsubscribe(client, &id);
                                RelayAck::new(rpc.id, serde_json::json!(true))
                            }
                            RelayRequest::Subscription { .. } => {
                                warn!("client {} sent a delivery frame", addr);
                                continue;
                            }
                        };
                        if let Ok(json) = serde_json::to_string(&ack) {
                            let _ = write.send(Message::Text(json)).await;
                        }
                    }

                    Some(Ok(Message::Close(_))) | None => {
                        info!("Client {} disconnected", addr);
                        break;
                    }

                    Some(Ok(Message::Ping(data))) => {
                        let _ = write.send(Message::Pong(data)).await;
                    }

                    Some(Err(e)) => {
                        error!("WebSocket error from {}: {}", addr, e);
                        break;
                    }

                    _ => {}
                }
            }

            // deliveries bound for this client
            delivery = outbound_rx.recv() => {
                match delivery {
                    Some(json) => {
                        let _ = write.send(Message::Text(json)).await;
                    }
                    None => break,
                }
            }
        }
    }

    state.detach(client);
}

#[tokio::main]
async fn main() {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("pairwise_relay=info".parse().unwrap()),
        )
        .init();

    let args = Args::parse();
    let addr = format!("{}:{}", args.host, args.port);

    let listener = TcpListener::bind(&addr).await.expect("Failed to bind");
    info!("Pairwise Relay Server listening on ws://{}", addr);

    let state = Arc::new(RelayState::new());

    while let Ok((stream, addr)) = listener.accept().await {
        let state = state.clone();
        tokio::spawn(handle_connection(stream, addr, state));
    }
}
