//! Top-level client
//!
//! Owns the engines, the relay façade, and the driver task that pumps
//! transport events through them. Lifecycle changes reach the host through a
//! delegate held weakly: once the host drops it, dispatch becomes a no-op.

use std::collections::BTreeSet;
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::crypto::KeyStore;
use crate::engine::{EngineEvent, PairingEngine, SessionEngine, SessionRequestEvent};
use crate::error::ClientError;
use crate::protocol::envelope::RpcReply;
use crate::protocol::pairing::{Pairing, SettledPairing};
use crate::protocol::session::{PendingSession, Session, SessionProposeParams, SettledSession};
use crate::protocol::types::{AppMetadata, Reason, SessionPermissions};
use crate::protocol::uri::PairingUri;
use crate::relay::{Relay, RelayTransport, TransportEvent, DEFAULT_RESPONSE_TIMEOUT};
use crate::serializer::Serializer;
use crate::store::{MemorySequenceStore, SequenceStorage};
use crate::topic::Topic;

/// Client configuration
#[derive(Clone)]
pub struct ClientConfig {
    /// This application's metadata, shared with peers at settlement
    pub metadata: AppMetadata,
    /// Whether this client claims the controller role for its sequences
    pub is_controller: bool,
    /// Client-side timeout for correlated responses
    pub response_timeout: Duration,
    /// How often expired sequences are swept
    pub sweep_interval: Duration,
}

impl ClientConfig {
    /// A configuration with the default timeouts
    pub fn new(metadata: AppMetadata, is_controller: bool) -> Self {
        ClientConfig {
            metadata,
            is_controller,
            response_timeout: DEFAULT_RESPONSE_TIMEOUT,
            sweep_interval: Duration::from_secs(3600),
        }
    }
}

/// Host-facing lifecycle events
///
/// Every method has a no-op default so hosts implement only what they need.
pub trait ClientDelegate: Send + Sync {
    /// A pairing reached the settled state
    fn on_pairing_settled(&self, _pairing: SettledPairing) {}
    /// A session proposal arrived; answer with `approve` or `reject`
    fn on_session_proposal(&self, _proposal: SessionProposeParams) {}
    /// A session reached the settled state
    fn on_session_settled(&self, _session: SettledSession) {}
    /// The peer rejected our session proposal
    fn on_session_rejected(&self, _topic: Topic, _reason: Reason) {}
    /// A session was closed, locally or by the peer
    fn on_session_deleted(&self, _topic: Topic, _reason: Reason) {}
    /// A validated application call arrived; answer with `respond`
    fn on_session_request(&self, _event: SessionRequestEvent) {}
}

/// Parameters for [`Client::connect`]
#[derive(Clone, Default)]
pub struct ConnectParams {
    /// Settled pairing to propose the session over; when absent a new
    /// pairing is proposed instead and its URI returned
    pub pairing_topic: Option<Topic>,
    /// Permissions requested for the session
    pub permissions: SessionPermissions,
}

/// What [`Client::connect`] produced
#[derive(Debug, Clone)]
pub enum ConnectOutcome {
    /// A new pairing was proposed; share this URI with the peer
    Pairing(PairingUri),
    /// A session proposal went out over the given pairing
    Session(PendingSession),
}

type SharedDelegate = Arc<Mutex<Option<Weak<dyn ClientDelegate>>>>;

/// A pairing/session protocol client
pub struct Client {
    pairing: Arc<PairingEngine>,
    session: Arc<SessionEngine>,
    delegate: SharedDelegate,
    driver: JoinHandle<()>,
    sweeper: JoinHandle<()>,
}

impl Client {
    /// Build a client over a transport, with in-memory sequence stores
    pub fn new(
        config: ClientConfig,
        transport: Arc<dyn RelayTransport>,
        transport_events: mpsc::UnboundedReceiver<TransportEvent>,
    ) -> Self {
        Self::with_storage(
            config,
            transport,
            transport_events,
            Arc::new(MemorySequenceStore::new()),
            Arc::new(MemorySequenceStore::new()),
        )
    }

    /// Build a client with caller-provided sequence storage backends
    pub fn with_storage(
        config: ClientConfig,
        transport: Arc<dyn RelayTransport>,
        transport_events: mpsc::UnboundedReceiver<TransportEvent>,
        pairings: Arc<dyn SequenceStorage<Pairing>>,
        sessions: Arc<dyn SequenceStorage<Session>>,
    ) -> Self {
        let keys = Arc::new(KeyStore::new());
        let relay = Arc::new(Relay::new(
            transport,
            Serializer::new(keys.clone()),
            config.response_timeout,
        ));

        let (engine_events, engine_events_rx) = mpsc::unbounded_channel();
        let pairing = Arc::new(PairingEngine::new(
            keys.clone(),
            pairings.clone(),
            relay.clone(),
            config.metadata.clone(),
            config.is_controller,
            engine_events.clone(),
        ));
        let session = Arc::new(SessionEngine::new(
            keys,
            sessions,
            pairings,
            relay.clone(),
            config.metadata,
            config.is_controller,
            engine_events,
        ));

        let delegate: SharedDelegate = Arc::new(Mutex::new(None));
        let driver = tokio::spawn(drive(
            pairing.clone(),
            session.clone(),
            relay,
            delegate.clone(),
            transport_events,
            engine_events_rx,
        ));
        let sweeper = tokio::spawn(sweep(
            pairing.clone(),
            session.clone(),
            config.sweep_interval,
        ));

        Client {
            pairing,
            session,
            delegate,
            driver,
            sweeper,
        }
    }

    /// Register the host delegate; only a weak reference is retained
    pub fn set_delegate<D: ClientDelegate + 'static>(&self, delegate: &Arc<D>) {
        let delegate: Arc<dyn ClientDelegate> = delegate.clone();
        let weak: Weak<dyn ClientDelegate> = Arc::downgrade(&delegate);
        *self.delegate.lock().unwrap() = Some(weak);
    }

    /// Propose a pairing (no `pairing_topic`) or a session over an existing
    /// settled pairing
    pub async fn connect(&self, params: ConnectParams) -> Result<ConnectOutcome, ClientError> {
        match params.pairing_topic {
            None => Ok(ConnectOutcome::Pairing(self.pairing.propose().await?)),
            Some(topic) => Ok(ConnectOutcome::Session(
                self.session.propose(&topic, params.permissions).await?,
            )),
        }
    }

    /// Settle the pairing a URI proposes
    pub async fn pair(&self, uri: &str) -> Result<SettledPairing, ClientError> {
        let uri: PairingUri = uri.parse()?;
        self.pairing.pair(&uri).await
    }

    /// Approve a received session proposal, exposing accounts
    pub async fn approve(
        &self,
        proposal: &SessionProposeParams,
        accounts: BTreeSet<String>,
    ) -> Result<SettledSession, ClientError> {
        self.session.approve(proposal, accounts).await
    }

    /// Decline a received session proposal
    pub async fn reject(
        &self,
        proposal: &SessionProposeParams,
        reason: Reason,
    ) -> Result<(), ClientError> {
        self.session.reject(proposal, reason).await
    }

    /// Issue an application call on a settled session and await the reply
    pub async fn request(
        &self,
        topic: &Topic,
        method: &str,
        params: serde_json::Value,
        chain_id: Option<String>,
    ) -> Result<RpcReply, ClientError> {
        self.session.request(topic, method, params, chain_id).await
    }

    /// Reply to an inbound application call
    pub async fn respond(&self, topic: &Topic, reply: RpcReply) -> Result<(), ClientError> {
        self.session.respond(topic, reply).await
    }

    /// Close a settled session, notifying the peer
    pub async fn disconnect(&self, topic: &Topic, reason: Reason) -> Result<(), ClientError> {
        self.session.delete(topic, reason).await
    }

    /// Snapshot of the stored pairings
    pub fn pairings(&self) -> Vec<Pairing> {
        self.pairing.sequences()
    }

    /// Snapshot of the stored sessions
    pub fn sessions(&self) -> Vec<Session> {
        self.session.sequences()
    }
}

impl Drop for Client {
    fn drop(&mut self) {
        self.driver.abort();
        self.sweeper.abort();
    }
}

/// Pump transport and engine events; one task per client serializes every
/// state transition
async fn drive(
    pairing: Arc<PairingEngine>,
    session: Arc<SessionEngine>,
    relay: Arc<Relay>,
    delegate: SharedDelegate,
    mut transport_events: mpsc::UnboundedReceiver<TransportEvent>,
    mut engine_events: mpsc::UnboundedReceiver<EngineEvent>,
) {
    loop {
        tokio::select! {
            event = transport_events.recv() => match event {
                None => break,
                Some(TransportEvent::Connected) => {
                    pairing.restore_subscriptions().await;
                    session.restore_subscriptions().await;
                }
                Some(TransportEvent::Disconnected) => debug!("transport disconnected"),
                Some(TransportEvent::Message { topic, message }) => {
                    if let Some(inbound) = relay.process_inbound(&topic, &message) {
                        if pairing.handles(&topic) {
                            pairing.handle_inbound(&topic, &inbound.request).await;
                        } else if session.handles(&topic) {
                            session.handle_inbound(&topic, &inbound.request).await;
                        } else {
                            debug!(topic = %topic, "no engine subscribed, dropped");
                        }
                    }
                }
            },
            event = engine_events.recv() => match event {
                None => break,
                Some(event) => dispatch(&delegate, event),
            },
        }
    }
}

fn dispatch(delegate: &SharedDelegate, event: EngineEvent) {
    let delegate = delegate
        .lock()
        .unwrap()
        .as_ref()
        .and_then(|weak| weak.upgrade());
    let Some(delegate) = delegate else {
        // the host is gone; events die here
        return;
    };
    match event {
        EngineEvent::PairingSettled(pairing) => delegate.on_pairing_settled(pairing),
        EngineEvent::SessionProposal(proposal) => delegate.on_session_proposal(proposal),
        EngineEvent::SessionSettled(session) => delegate.on_session_settled(session),
        EngineEvent::SessionRejected { topic, reason } => {
            delegate.on_session_rejected(topic, reason)
        }
        EngineEvent::SessionDeleted { topic, reason } => {
            delegate.on_session_deleted(topic, reason)
        }
        EngineEvent::SessionRequest(event) => delegate.on_session_request(event),
    }
}

async fn sweep(pairing: Arc<PairingEngine>, session: Arc<SessionEngine>, interval: Duration) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    ticker.tick().await; // the first tick fires immediately
    loop {
        ticker.tick().await;
        let now = crate::unix_now();
        pairing.purge_expired(now).await;
        session.purge_expired(now).await;
    }
}
