//! In-memory relay
//!
//! An in-process stand-in for the relay server: topic-keyed fan-out between
//! attached clients, with the same delivery semantics the real relay gives us
//! (publisher excluded, arrival order preserved). Used by the integration
//! tests, which also need to inspect the live subscription set and to force
//! disconnect/reconnect cycles.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::mpsc;

use super::transport::{RelayTransport, TransportError, TransportEvent, TransportResult};
use crate::topic::Topic;

struct ClientSlot {
    events: mpsc::UnboundedSender<TransportEvent>,
    topics: HashSet<Topic>,
    online: bool,
}

#[derive(Default)]
struct HubState {
    next_client: usize,
    clients: HashMap<usize, ClientSlot>,
}

/// An in-process relay hub clients attach to
#[derive(Clone, Default)]
pub struct MemoryRelay {
    state: Arc<Mutex<HubState>>,
}

impl MemoryRelay {
    /// Create an empty hub
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach a client, returning its transport and event stream
    pub fn attach(&self) -> (MemoryTransport, mpsc::UnboundedReceiver<TransportEvent>) {
        let (events, events_rx) = mpsc::unbounded_channel();
        let mut state = self.state.lock().unwrap();
        let id = state.next_client;
        state.next_client += 1;
        let _ = events.send(TransportEvent::Connected);
        state.clients.insert(
            id,
            ClientSlot {
                events,
                topics: HashSet::new(),
                online: true,
            },
        );
        (
            MemoryTransport {
                id,
                state: self.state.clone(),
            },
            events_rx,
        )
    }

    /// Drop a client's connection: clears its subscriptions and emits
    /// `Disconnected`, exactly like a severed WebSocket
    pub fn disconnect(&self, transport: &MemoryTransport) {
        let mut state = self.state.lock().unwrap();
        if let Some(slot) = state.clients.get_mut(&transport.id) {
            slot.online = false;
            slot.topics.clear();
            let _ = slot.events.send(TransportEvent::Disconnected);
        }
    }

    /// Bring a dropped client back and emit `Connected`
    pub fn reconnect(&self, transport: &MemoryTransport) {
        let mut state = self.state.lock().unwrap();
        if let Some(slot) = state.clients.get_mut(&transport.id) {
            slot.online = true;
            let _ = slot.events.send(TransportEvent::Connected);
        }
    }

    /// The topics a client currently holds subscriptions for
    pub fn subscriptions(&self, transport: &MemoryTransport) -> BTreeSet<Topic> {
        let state = self.state.lock().unwrap();
        state
            .clients
            .get(&transport.id)
            .map(|slot| slot.topics.iter().cloned().collect())
            .unwrap_or_default()
    }
}

/// One client's handle onto a [`MemoryRelay`]
#[derive(Clone)]
pub struct MemoryTransport {
    id: usize,
    state: Arc<Mutex<HubState>>,
}

#[async_trait]
impl RelayTransport for MemoryTransport {
    async fn publish(&self, topic: &Topic, message: String, _ttl: u64) -> TransportResult<()> {
        let state = self.state.lock().unwrap();
        let publisher = state
            .clients
            .get(&self.id)
            .ok_or(TransportError::Disconnected)?;
        if !publisher.online {
            return Err(TransportError::Disconnected);
        }

        for (id, slot) in &state.clients {
            if *id != self.id && slot.online && slot.topics.contains(topic) {
                let _ = slot.events.send(TransportEvent::Message {
                    topic: topic.clone(),
                    message: message.clone(),
                });
            }
        }
        Ok(())
    }

    async fn subscribe(&self, topic: &Topic) -> TransportResult<()> {
        let mut state = self.state.lock().unwrap();
        let slot = state
            .clients
            .get_mut(&self.id)
            .ok_or(TransportError::Disconnected)?;
        if !slot.online {
            return Err(TransportError::Disconnected);
        }
        slot.topics.insert(topic.clone());
        Ok(())
    }

    async fn unsubscribe(&self, topic: &Topic) -> TransportResult<()> {
        let mut state = self.state.lock().unwrap();
        let slot = state
            .clients
            .get_mut(&self.id)
            .ok_or(TransportError::Disconnected)?;
        if !slot.online {
            return Err(TransportError::Disconnected);
        }
        slot.topics.remove(topic);
        Ok(())
    }
}
