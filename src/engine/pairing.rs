//! Pairing engine
//!
//! Drives the pairing lifecycle: proposed over a URI, settled by an approve
//! on the proposal topic, then migrated onto the settled topic derived from
//! the shared secret. A settled pairing is the carrier for session proposals.

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::{EngineEvent, PAIRING_LIFETIME};
use crate::crypto::{AgreementKeys, KeyStore};
use crate::error::ClientError;
use crate::protocol::envelope::{ClientRequest, ProtocolCall};
use crate::protocol::pairing::{
    Pairing, PairingApproveParams, PairingPayloadParams, PairingPayloadRequest, PairingProposal,
    PairingProposer, PairingState, PendingPairing, SettledPairing,
};
use crate::protocol::types::{AppMetadata, Participant, PendingStatus, RelayProtocol};
use crate::protocol::uri::PairingUri;
use crate::relay::{Relay, HANDSHAKE_TTL};
use crate::store::SequenceStorage;
use crate::subscriber::Subscriber;
use crate::topic::Topic;

/// The pairing state machine
pub struct PairingEngine {
    keys: Arc<KeyStore>,
    store: Arc<dyn SequenceStorage<Pairing>>,
    relay: Arc<Relay>,
    subscriber: Subscriber,
    metadata: AppMetadata,
    is_controller: bool,
    events: mpsc::UnboundedSender<EngineEvent>,
}

impl PairingEngine {
    /// Wire up a pairing engine
    pub fn new(
        keys: Arc<KeyStore>,
        store: Arc<dyn SequenceStorage<Pairing>>,
        relay: Arc<Relay>,
        metadata: AppMetadata,
        is_controller: bool,
        events: mpsc::UnboundedSender<EngineEvent>,
    ) -> Self {
        let subscriber = Subscriber::new(relay.clone());
        PairingEngine {
            keys,
            store,
            relay,
            subscriber,
            metadata,
            is_controller,
            events,
        }
    }

    /// Whether this engine consumes messages on the topic
    pub fn handles(&self, topic: &Topic) -> bool {
        self.subscriber.is_subscribed(topic)
    }

    /// Read access to the stored pairings
    pub fn sequences(&self) -> Vec<Pairing> {
        self.store.entries()
    }

    /// Proposer side: create a pending pairing and emit its URI
    pub async fn propose(&self) -> Result<PairingUri, ClientError> {
        let secret = self.keys.generate_private_key();
        let topic = Topic::generate();

        let proposal = PairingProposal {
            topic: topic.clone(),
            relay: RelayProtocol::default(),
            proposer: PairingProposer {
                public_key: *secret.public_key(),
                controller: self.is_controller,
            },
        };

        let pending = PendingPairing {
            status: PendingStatus::Proposed,
            topic: topic.clone(),
            relay: proposal.relay.clone(),
            self_party: Participant {
                public_key: *secret.public_key(),
                metadata: Some(self.metadata.clone()),
            },
            proposal: proposal.clone(),
        };
        self.store
            .insert(topic.clone(), Pairing::Pending(pending))
            .map_err(|e| ClientError::ProposalGeneration(e.to_string()))?;

        if let Err(e) = self.subscriber.set_subscription(topic.clone()).await {
            self.store.remove(&topic);
            self.keys.remove_private_key(secret.public_key());
            return Err(ClientError::ProposalGeneration(e.to_string()));
        }

        info!(topic = %topic, "pairing proposed");
        Ok(PairingUri::from_proposal(&proposal))
    }

    /// Responder side: settle the pairing a URI proposes
    pub async fn pair(&self, uri: &PairingUri) -> Result<SettledPairing, ClientError> {
        let proposal = uri.proposal();

        // exactly one side may be controller, checked before any state change
        if proposal.proposer.controller == self.is_controller {
            return Err(ClientError::UnauthorizedMatchingController);
        }

        let secret = self.keys.generate_private_key();
        let agreement = AgreementKeys::derive(&secret, &proposal.proposer.public_key);
        let settled_topic = agreement.settled_topic();
        let expiry = crate::unix_now() + PAIRING_LIFETIME;

        // keys must be live before the settled-topic subscription is
        self.keys.set_agreement(settled_topic.clone(), agreement);
        if let Err(e) = self.subscriber.set_subscription(settled_topic.clone()).await {
            self.keys.remove_agreement(&settled_topic);
            self.keys.remove_private_key(secret.public_key());
            return Err(e.into());
        }

        let approve = PairingApproveParams {
            relay: proposal.relay.clone(),
            responder: Participant::from_key(*secret.public_key()),
            expiry,
            state: PairingState {
                metadata: Some(self.metadata.clone()),
            },
        };

        // published on the proposal topic, which has no key: the proposer
        // cannot decrypt anything yet
        let publish = self
            .relay
            .publish(
                &proposal.topic,
                ProtocolCall::PairingApprove(approve.clone()),
                HANDSHAKE_TTL,
            )
            .await;
        if let Err(e) = publish {
            self.keys.remove_agreement(&settled_topic);
            self.keys.remove_private_key(secret.public_key());
            let _ = self.subscriber.remove_subscription(&settled_topic).await;
            return Err(e.into());
        }

        let settled = SettledPairing {
            topic: settled_topic.clone(),
            relay: proposal.relay,
            self_party: Participant {
                public_key: *secret.public_key(),
                metadata: Some(self.metadata.clone()),
            },
            peer: Participant::from_key(proposal.proposer.public_key),
            expiry,
            state: approve.state,
        };
        self.store
            .insert(settled_topic.clone(), Pairing::Settled(settled.clone()))?;
        self.keys.remove_private_key(secret.public_key());

        info!(topic = %settled_topic, "pairing settled");
        let _ = self.events.send(EngineEvent::PairingSettled(settled.clone()));
        Ok(settled)
    }

    /// Route an inbound request on one of our topics
    pub async fn handle_inbound(&self, topic: &Topic, request: &ClientRequest) {
        match &request.call {
            ProtocolCall::PairingApprove(params) => {
                if let Err(e) = self.on_approve(topic, params).await {
                    warn!(topic = %topic, "pairing approve failed: {e}");
                    self.abandon(topic).await;
                }
            }
            ProtocolCall::PairingPayload(params) => {
                if let Err(e) = self.on_payload(topic, params) {
                    warn!(topic = %topic, "pairing payload dropped: {e}");
                }
            }
            ProtocolCall::PairingPing => debug!(topic = %topic, "pairing_ping reserved, dropped"),
            other => {
                warn!(topic = %topic, method = other.method(), "unexpected method on pairing topic")
            }
        }
    }

    /// Proposer side: the responder approved on the proposal topic
    async fn on_approve(
        &self,
        topic: &Topic,
        params: &PairingApproveParams,
    ) -> Result<(), ClientError> {
        let pairing = self
            .store
            .get(topic)
            .ok_or_else(|| ClientError::NoSequenceForTopic(topic.clone()))?;
        let pending = match pairing {
            Pairing::Pending(pending) => pending,
            Pairing::Settled(_) => {
                debug!(topic = %topic, "duplicate approve, ignored");
                return Ok(());
            }
        };

        let secret = self
            .keys
            .private_key(&pending.proposal.proposer.public_key)
            .ok_or_else(|| ClientError::KeyNotFound(topic.clone()))?;
        let agreement = AgreementKeys::derive(&secret, &params.responder.public_key);
        let settled_topic = agreement.settled_topic();
        self.keys.set_agreement(settled_topic.clone(), agreement);

        let settled = SettledPairing {
            topic: settled_topic.clone(),
            relay: params.relay.clone(),
            self_party: pending.self_party.clone(),
            peer: Participant {
                public_key: params.responder.public_key,
                metadata: params.state.metadata.clone(),
            },
            expiry: params.expiry,
            state: params.state.clone(),
        };
        self.store
            .migrate(topic, settled_topic.clone(), Pairing::Settled(settled.clone()))?;

        self.subscriber.set_subscription(settled_topic.clone()).await?;
        let _ = self.subscriber.remove_subscription(topic).await;
        self.keys
            .remove_private_key(&pending.proposal.proposer.public_key);

        info!(topic = %settled_topic, pending = %topic, "pairing settled");
        let _ = self.events.send(EngineEvent::PairingSettled(settled));
        Ok(())
    }

    /// A request carried over a settled pairing
    fn on_payload(&self, topic: &Topic, params: &PairingPayloadParams) -> Result<(), ClientError> {
        match self.store.get(topic) {
            Some(Pairing::Settled(_)) => {}
            _ => return Err(ClientError::NoSequenceForTopic(topic.clone())),
        }

        match &params.request {
            PairingPayloadRequest::SessionPropose(proposal) => {
                // the approve for the proposal topic will be sealed with the
                // pairing key, so carry the agreement over before anyone
                // publishes there
                let agreement = self
                    .keys
                    .agreement(topic)
                    .ok_or_else(|| ClientError::KeyNotFound(topic.clone()))?;
                self.keys
                    .set_agreement(proposal.topic.clone(), (*agreement).clone());

                debug!(pairing = %topic, session = %proposal.topic, "session proposal received");
                let _ = self
                    .events
                    .send(EngineEvent::SessionProposal(proposal.clone()));
            }
        }
        Ok(())
    }

    /// Drop a sequence whose handshake failed; crypto failures are fatal to
    /// the sequence they concern
    async fn abandon(&self, topic: &Topic) {
        if let Some(pairing) = self.store.remove(topic) {
            if let Pairing::Pending(pending) = &pairing {
                self.keys
                    .remove_private_key(&pending.proposal.proposer.public_key);
            }
        }
        self.keys.remove_agreement(topic);
        let _ = self.subscriber.remove_subscription(topic).await;
    }

    /// Replay every stored topic's subscription after a reconnect
    pub async fn restore_subscriptions(&self) {
        for topic in self.store.topics() {
            if let Err(e) = self.subscriber.set_subscription(topic.clone()).await {
                warn!(topic = %topic, "failed to restore subscription: {e}");
            }
        }
    }

    /// Drop settled pairings past their expiry
    pub async fn purge_expired(&self, now: u64) {
        for pairing in self.store.entries() {
            if let Pairing::Settled(settled) = pairing {
                if settled.expiry <= now {
                    info!(topic = %settled.topic, "pairing expired");
                    self.store.remove(&settled.topic);
                    self.keys.remove_agreement(&settled.topic);
                    let _ = self.subscriber.remove_subscription(&settled.topic).await;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::AgreementSecretKey;
    use crate::relay::{MemoryRelay, MemoryTransport, DEFAULT_RESPONSE_TIMEOUT};
    use crate::serializer::Serializer;
    use crate::store::MemorySequenceStore;

    struct Rig {
        hub: MemoryRelay,
        transport: MemoryTransport,
        keys: Arc<KeyStore>,
        engine: PairingEngine,
        events: mpsc::UnboundedReceiver<EngineEvent>,
    }

    fn rig(is_controller: bool) -> Rig {
        let hub = MemoryRelay::new();
        let (transport, _transport_events) = hub.attach();
        let keys = Arc::new(KeyStore::new());
        let relay = Arc::new(Relay::new(
            Arc::new(transport.clone()),
            Serializer::new(keys.clone()),
            DEFAULT_RESPONSE_TIMEOUT,
        ));
        let (events_tx, events) = mpsc::unbounded_channel();
        let engine = PairingEngine::new(
            keys.clone(),
            Arc::new(MemorySequenceStore::new()),
            relay,
            AppMetadata::default(),
            is_controller,
            events_tx,
        );
        Rig {
            hub,
            transport,
            keys,
            engine,
            events,
        }
    }

    #[tokio::test]
    async fn test_propose_creates_pending_and_subscribes() {
        let mut rig = rig(true);

        let uri = rig.engine.propose().await.unwrap();
        assert!(uri.controller);

        match rig.engine.store.get(&uri.topic) {
            Some(Pairing::Pending(pending)) => {
                assert_eq!(pending.status, PendingStatus::Proposed);
                assert_eq!(pending.proposal.proposer.public_key, uri.public_key);
            }
            other => panic!("expected pending pairing, got {other:?}"),
        }
        assert!(rig.hub.subscriptions(&rig.transport).contains(&uri.topic));
        assert!(rig.keys.private_key(&uri.public_key).is_some());
        assert!(rig.events.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_pair_rejects_matching_controller() {
        let proposer = rig(true);
        let responder = rig(true);

        let uri = proposer.engine.propose().await.unwrap();
        let result = responder.engine.pair(&uri).await;

        assert!(matches!(
            result,
            Err(ClientError::UnauthorizedMatchingController)
        ));
        // no state was created on the responder
        assert!(responder.engine.store.topics().is_empty());
        assert!(responder.hub.subscriptions(&responder.transport).is_empty());
    }

    #[tokio::test]
    async fn test_pair_settles_on_shared_secret_topic() {
        let mut responder = rig(false);
        let proposer_secret = AgreementSecretKey::generate();
        let uri = PairingUri {
            topic: Topic::generate(),
            version: crate::protocol::uri::PROTOCOL_VERSION,
            controller: true,
            public_key: *proposer_secret.public_key(),
            relay: RelayProtocol::default(),
        };

        let settled = responder.engine.pair(&uri).await.unwrap();

        // settled topic must be sha256 of the DH output
        let agreement = responder.keys.agreement(&settled.topic).unwrap();
        assert_eq!(agreement.settled_topic(), settled.topic);
        assert_eq!(
            proposer_secret
                .diffie_hellman(&settled.self_party.public_key)
                .settled_topic(),
            settled.topic
        );
        assert!(matches!(
            responder.events.try_recv(),
            Ok(EngineEvent::PairingSettled(_))
        ));
        assert!(responder
            .hub
            .subscriptions(&responder.transport)
            .contains(&settled.topic));
    }

    #[tokio::test]
    async fn test_inbound_approve_migrates_to_settled_topic() {
        let mut proposer = rig(true);
        let uri = proposer.engine.propose().await.unwrap();

        // fabricate the responder half
        let responder_secret = AgreementSecretKey::generate();
        let expected_topic = responder_secret
            .diffie_hellman(&uri.public_key)
            .settled_topic();
        let approve = PairingApproveParams {
            relay: RelayProtocol::default(),
            responder: Participant::from_key(*responder_secret.public_key()),
            expiry: crate::unix_now() + 60,
            state: PairingState::default(),
        };
        let request = ClientRequest::new(ProtocolCall::PairingApprove(approve));

        proposer.engine.handle_inbound(&uri.topic, &request).await;

        assert!(proposer.engine.store.get(&uri.topic).is_none());
        assert!(matches!(
            proposer.engine.store.get(&expected_topic),
            Some(Pairing::Settled(_))
        ));
        let subs = proposer.hub.subscriptions(&proposer.transport);
        assert!(subs.contains(&expected_topic));
        assert!(!subs.contains(&uri.topic));
        // the handshake key is spent
        assert!(proposer.keys.private_key(&uri.public_key).is_none());
        assert!(matches!(
            proposer.events.try_recv(),
            Ok(EngineEvent::PairingSettled(_))
        ));
    }

    #[tokio::test]
    async fn test_expired_pairings_are_swept() {
        let responder = rig(false);
        let proposer_secret = AgreementSecretKey::generate();
        let uri = PairingUri {
            topic: Topic::generate(),
            version: crate::protocol::uri::PROTOCOL_VERSION,
            controller: true,
            public_key: *proposer_secret.public_key(),
            relay: RelayProtocol::default(),
        };
        let settled = responder.engine.pair(&uri).await.unwrap();

        responder.engine.purge_expired(settled.expiry + 1).await;

        assert!(responder.engine.store.get(&settled.topic).is_none());
        assert!(responder.keys.agreement(&settled.topic).is_none());
        assert!(!responder
            .hub
            .subscriptions(&responder.transport)
            .contains(&settled.topic));
    }
}
