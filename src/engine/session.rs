//! Session engine
//!
//! Mirrors the pairing engine's shape over a pairing's settled topic: a
//! proposal rides a `pairing_payload`, the approve travels on the proposal
//! topic sealed with the pairing's key, and settlement migrates onto the
//! topic derived from the fresh session agreement. Settled sessions carry
//! permissioned application payloads.

use std::collections::BTreeSet;
use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::{EngineEvent, SessionRequestEvent, SESSION_LIFETIME};
use crate::crypto::{AgreementKeys, KeyStore};
use crate::error::{codes, ClientError};
use crate::protocol::envelope::{ClientRequest, JsonRpcError, ProtocolCall, RpcReply};
use crate::protocol::pairing::{Pairing, PairingPayloadParams, PairingPayloadRequest};
use crate::protocol::session::{
    AppRequest, PendingSession, Session, SessionApproveParams, SessionDeleteParams,
    SessionPayloadParams, SessionProposeParams, SessionProposer, SessionRejectParams, SessionState,
    SettledSession,
};
use crate::protocol::types::{
    AppMetadata, Participant, PendingStatus, Reason, SessionPermissions, SettledPermissions,
};
use crate::relay::{Relay, HANDSHAKE_TTL, SESSION_TTL};
use crate::store::SequenceStorage;
use crate::subscriber::Subscriber;
use crate::topic::Topic;

/// The session state machine
pub struct SessionEngine {
    keys: Arc<KeyStore>,
    store: Arc<dyn SequenceStorage<Session>>,
    pairings: Arc<dyn SequenceStorage<Pairing>>,
    relay: Arc<Relay>,
    subscriber: Subscriber,
    metadata: AppMetadata,
    is_controller: bool,
    events: mpsc::UnboundedSender<EngineEvent>,
}

impl SessionEngine {
    /// Wire up a session engine
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        keys: Arc<KeyStore>,
        store: Arc<dyn SequenceStorage<Session>>,
        pairings: Arc<dyn SequenceStorage<Pairing>>,
        relay: Arc<Relay>,
        metadata: AppMetadata,
        is_controller: bool,
        events: mpsc::UnboundedSender<EngineEvent>,
    ) -> Self {
        let subscriber = Subscriber::new(relay.clone());
        SessionEngine {
            keys,
            store,
            pairings,
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

    /// Read access to the stored sessions
    pub fn sequences(&self) -> Vec<Session> {
        self.store.entries()
    }

    /// Proposer side: ride a session proposal over a settled pairing
    pub async fn propose(
        &self,
        pairing_topic: &Topic,
        permissions: SessionPermissions,
    ) -> Result<PendingSession, ClientError> {
        let pairing = self
            .pairings
            .get(pairing_topic)
            .ok_or_else(|| ClientError::NoSequenceForTopic(pairing_topic.clone()))?;
        let relay_protocol = match pairing {
            Pairing::Settled(settled) => settled.relay,
            Pairing::Pending(_) => {
                return Err(ClientError::NoSequenceForTopic(pairing_topic.clone()))
            }
        };

        let secret = self.keys.generate_private_key();
        let topic = Topic::generate();

        let proposal = SessionProposeParams {
            topic: topic.clone(),
            relay: relay_protocol.clone(),
            proposer: SessionProposer {
                public_key: *secret.public_key(),
                controller: self.is_controller,
                metadata: self.metadata.clone(),
            },
            permissions,
            ttl: SESSION_LIFETIME,
        };
        let pending = PendingSession {
            status: PendingStatus::Proposed,
            topic: topic.clone(),
            relay: relay_protocol,
            self_party: Participant {
                public_key: *secret.public_key(),
                metadata: Some(self.metadata.clone()),
            },
            proposal: proposal.clone(),
        };
        self.store
            .insert(topic.clone(), Session::Pending(pending.clone()))?;

        // the approve will arrive on the proposal topic sealed with the
        // pairing's key; install it before the subscription goes live
        let pairing_agreement = self
            .keys
            .agreement(pairing_topic)
            .ok_or_else(|| ClientError::KeyNotFound(pairing_topic.clone()))?;
        self.keys
            .set_agreement(topic.clone(), (*pairing_agreement).clone());

        if let Err(e) = self.subscriber.set_subscription(topic.clone()).await {
            self.rollback_pending(&topic, secret.public_key()).await;
            return Err(e.into());
        }

        let payload = PairingPayloadParams {
            request: PairingPayloadRequest::SessionPropose(proposal),
        };
        if let Err(e) = self
            .relay
            .publish(
                pairing_topic,
                ProtocolCall::PairingPayload(payload),
                HANDSHAKE_TTL,
            )
            .await
        {
            self.rollback_pending(&topic, secret.public_key()).await;
            return Err(e.into());
        }

        info!(pairing = %pairing_topic, session = %topic, "session proposed");
        Ok(pending)
    }

    /// Responder side: approve a received proposal, exposing accounts
    pub async fn approve(
        &self,
        proposal: &SessionProposeParams,
        accounts: BTreeSet<String>,
    ) -> Result<SettledSession, ClientError> {
        // exactly one side may be controller
        if proposal.proposer.controller == self.is_controller {
            return Err(ClientError::UnauthorizedMatchingController);
        }

        let secret = self.keys.generate_private_key();
        let agreement = AgreementKeys::derive(&secret, &proposal.proposer.public_key);
        let settled_topic = agreement.settled_topic();
        let expiry = crate::unix_now() + proposal.ttl;
        let state = SessionState { accounts };

        let pending = PendingSession {
            status: PendingStatus::Responded,
            topic: proposal.topic.clone(),
            relay: proposal.relay.clone(),
            self_party: Participant {
                public_key: *secret.public_key(),
                metadata: Some(self.metadata.clone()),
            },
            proposal: proposal.clone(),
        };
        self.store
            .insert(proposal.topic.clone(), Session::Pending(pending))?;

        let approve = SessionApproveParams {
            relay: proposal.relay.clone(),
            responder: Participant {
                public_key: *secret.public_key(),
                metadata: Some(self.metadata.clone()),
            },
            expiry,
            state: state.clone(),
        };
        // sealed with the pairing agreement installed when the proposal
        // arrived over the pairing
        if let Err(e) = self
            .relay
            .publish(
                &proposal.topic,
                ProtocolCall::SessionApprove(approve),
                HANDSHAKE_TTL,
            )
            .await
        {
            self.store.remove(&proposal.topic);
            self.keys.remove_private_key(secret.public_key());
            return Err(e.into());
        }

        // acked: settle
        self.keys.set_agreement(settled_topic.clone(), agreement);
        let controller_key = if proposal.proposer.controller {
            proposal.proposer.public_key
        } else {
            *secret.public_key()
        };
        let settled = SettledSession {
            topic: settled_topic.clone(),
            relay: proposal.relay.clone(),
            self_party: Participant {
                public_key: *secret.public_key(),
                metadata: Some(self.metadata.clone()),
            },
            peer: Participant {
                public_key: proposal.proposer.public_key,
                metadata: Some(proposal.proposer.metadata.clone()),
            },
            permissions: SettledPermissions::from_proposed(
                proposal.permissions.clone(),
                controller_key,
            ),
            expiry,
            state,
        };
        self.store.migrate(
            &proposal.topic,
            settled_topic.clone(),
            Session::Settled(settled.clone()),
        )?;
        self.subscriber.set_subscription(settled_topic.clone()).await?;
        // the pairing-copied key and the handshake key are spent
        self.keys.remove_agreement(&proposal.topic);
        self.keys.remove_private_key(secret.public_key());

        info!(topic = %settled_topic, "session settled");
        let _ = self.events.send(EngineEvent::SessionSettled(settled.clone()));
        Ok(settled)
    }

    /// Responder side: decline a received proposal; nothing is persisted
    pub async fn reject(
        &self,
        proposal: &SessionProposeParams,
        reason: Reason,
    ) -> Result<(), ClientError> {
        self.relay
            .publish(
                &proposal.topic,
                ProtocolCall::SessionReject(SessionRejectParams { reason }),
                HANDSHAKE_TTL,
            )
            .await?;
        self.keys.remove_agreement(&proposal.topic);
        Ok(())
    }

    /// Issue an application call on a settled session and await the reply
    pub async fn request(
        &self,
        topic: &Topic,
        method: &str,
        params: serde_json::Value,
        chain_id: Option<String>,
    ) -> Result<RpcReply, ClientError> {
        match self.store.get(topic) {
            Some(Session::Settled(_)) => {}
            _ => return Err(ClientError::NoSequenceForTopic(topic.clone())),
        }

        let payload = SessionPayloadParams {
            request: AppRequest {
                method: method.to_string(),
                params,
            },
            chain_id,
        };
        Ok(self
            .relay
            .request(topic, ProtocolCall::SessionPayload(payload), SESSION_TTL)
            .await?)
    }

    /// Publish a reply to an inbound application call
    pub async fn respond(&self, topic: &Topic, reply: RpcReply) -> Result<(), ClientError> {
        match self.store.get(topic) {
            Some(Session::Settled(_)) => {}
            _ => return Err(ClientError::NoSequenceForTopic(topic.clone())),
        }
        Ok(self.relay.respond(topic, reply).await?)
    }

    /// Close a settled session, notifying the peer
    pub async fn delete(&self, topic: &Topic, reason: Reason) -> Result<(), ClientError> {
        match self.store.get(topic) {
            Some(Session::Settled(_)) => {}
            _ => return Err(ClientError::NoSequenceForTopic(topic.clone())),
        }

        // publish while the agreement key is still live
        self.relay
            .publish(
                topic,
                ProtocolCall::SessionDelete(SessionDeleteParams {
                    reason: reason.clone(),
                }),
                SESSION_TTL,
            )
            .await?;
        self.teardown(topic).await;

        info!(topic = %topic, code = reason.code, "session deleted");
        let _ = self.events.send(EngineEvent::SessionDeleted {
            topic: topic.clone(),
            reason,
        });
        Ok(())
    }

    /// Route an inbound request on one of our topics
    pub async fn handle_inbound(&self, topic: &Topic, request: &ClientRequest) {
        match &request.call {
            ProtocolCall::SessionApprove(params) => {
                if let Err(e) = self.on_approve(topic, params).await {
                    // fatal to this sequence: drop it and tell the host
                    warn!(topic = %topic, "session approve failed: {e}");
                    self.abandon(topic).await;
                    let _ = self.events.send(EngineEvent::SessionRejected {
                        topic: topic.clone(),
                        reason: Reason::new(codes::INTERNAL, e.to_string()),
                    });
                }
            }
            ProtocolCall::SessionReject(params) => self.on_reject(topic, &params.reason).await,
            ProtocolCall::SessionDelete(params) => {
                self.teardown(topic).await;
                info!(topic = %topic, code = params.reason.code, "session deleted by peer");
                let _ = self.events.send(EngineEvent::SessionDeleted {
                    topic: topic.clone(),
                    reason: params.reason.clone(),
                });
            }
            ProtocolCall::SessionPayload(params) => {
                self.on_payload(topic, request.id, params).await
            }
            ProtocolCall::SessionPing
            | ProtocolCall::SessionUpdate(_)
            | ProtocolCall::SessionUpgrade(_)
            | ProtocolCall::SessionNotification(_) => {
                debug!(topic = %topic, method = request.call.method(), "reserved method, dropped")
            }
            other => {
                warn!(topic = %topic, method = other.method(), "unexpected method on session topic")
            }
        }
    }

    /// Proposer side: the responder approved on the proposal topic
    async fn on_approve(
        &self,
        topic: &Topic,
        params: &SessionApproveParams,
    ) -> Result<(), ClientError> {
        let session = self
            .store
            .get(topic)
            .ok_or_else(|| ClientError::NoSequenceForTopic(topic.clone()))?;
        let pending = match session {
            Session::Pending(pending) => pending,
            Session::Settled(_) => {
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

        let controller_key = if pending.proposal.proposer.controller {
            pending.proposal.proposer.public_key
        } else {
            params.responder.public_key
        };
        let settled = SettledSession {
            topic: settled_topic.clone(),
            relay: params.relay.clone(),
            self_party: pending.self_party.clone(),
            peer: params.responder.clone(),
            permissions: SettledPermissions::from_proposed(
                pending.proposal.permissions.clone(),
                controller_key,
            ),
            expiry: params.expiry,
            state: params.state.clone(),
        };
        self.store
            .migrate(topic, settled_topic.clone(), Session::Settled(settled.clone()))?;

        self.subscriber.set_subscription(settled_topic.clone()).await?;
        let _ = self.subscriber.remove_subscription(topic).await;
        // the pairing-copied key and the handshake key are spent
        self.keys.remove_agreement(topic);
        self.keys
            .remove_private_key(&pending.proposal.proposer.public_key);

        info!(topic = %settled_topic, pending = %topic, "session settled");
        let _ = self.events.send(EngineEvent::SessionSettled(settled));
        Ok(())
    }

    /// Proposer side: the responder declined
    async fn on_reject(&self, topic: &Topic, reason: &Reason) {
        if let Some(Session::Pending(pending)) = self.store.remove(topic) {
            self.keys
                .remove_private_key(&pending.proposal.proposer.public_key);
        }
        self.keys.remove_agreement(topic);
        let _ = self.subscriber.remove_subscription(topic).await;

        info!(topic = %topic, code = reason.code, "session rejected by peer");
        let _ = self.events.send(EngineEvent::SessionRejected {
            topic: topic.clone(),
            reason: reason.clone(),
        });
    }

    /// Validate an inbound application call and surface it to the host
    ///
    /// Policy failures answer with a JSON-RPC error carrying the request's
    /// id; a missing sequence drops the message, which also swallows traffic
    /// trailing a deletion.
    async fn on_payload(&self, topic: &Topic, id: i64, params: &SessionPayloadParams) {
        let session = match self.store.get(topic) {
            Some(Session::Settled(settled)) => settled,
            _ => {
                debug!(topic = %topic, "payload without settled session, dropped");
                return;
            }
        };

        if let Some(chain) = &params.chain_id {
            if !session.permissions.blockchains.chains.contains(chain) {
                self.refuse(
                    topic,
                    id,
                    codes::UNAUTHORIZED_TARGET_CHAIN,
                    format!("chain {chain} is not permitted by the session"),
                )
                .await;
                return;
            }
        }
        if !session
            .permissions
            .jsonrpc
            .methods
            .contains(&params.request.method)
        {
            self.refuse(
                topic,
                id,
                codes::UNAUTHORIZED_JSONRPC_METHOD,
                format!(
                    "method {} is not permitted by the session",
                    params.request.method
                ),
            )
            .await;
            return;
        }

        let _ = self.events.send(EngineEvent::SessionRequest(SessionRequestEvent {
            topic: topic.clone(),
            id,
            request: params.request.clone(),
            chain_id: params.chain_id.clone(),
        }));
    }

    async fn refuse(&self, topic: &Topic, id: i64, code: i64, message: String) {
        warn!(topic = %topic, code, "rejecting inbound payload: {message}");
        let reply = RpcReply::Error(JsonRpcError::new(id, code, message));
        if let Err(e) = self.relay.respond(topic, reply).await {
            warn!(topic = %topic, "failed to publish payload rejection: {e}");
        }
    }

    async fn rollback_pending(
        &self,
        topic: &Topic,
        handshake_key: &crate::crypto::AgreementPublicKey,
    ) {
        self.store.remove(topic);
        self.keys.remove_agreement(topic);
        self.keys.remove_private_key(handshake_key);
        let _ = self.subscriber.remove_subscription(topic).await;
    }

    /// Drop a sequence whose handshake failed
    async fn abandon(&self, topic: &Topic) {
        if let Some(Session::Pending(pending)) = self.store.remove(topic) {
            self.keys
                .remove_private_key(&pending.proposal.proposer.public_key);
        }
        self.keys.remove_agreement(topic);
        let _ = self.subscriber.remove_subscription(topic).await;
    }

    async fn teardown(&self, topic: &Topic) {
        self.store.remove(topic);
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

    /// Drop settled sessions past their expiry
    pub async fn purge_expired(&self, now: u64) {
        for session in self.store.entries() {
            if let Session::Settled(settled) = session {
                if settled.expiry <= now {
                    info!(topic = %settled.topic, "session expired");
                    self.teardown(&settled.topic).await;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::AgreementSecretKey;
    use crate::protocol::types::RelayProtocol;
    use crate::relay::{MemoryRelay, MemoryTransport, DEFAULT_RESPONSE_TIMEOUT};
    use crate::serializer::Serializer;
    use crate::store::MemorySequenceStore;

    struct Rig {
        hub: MemoryRelay,
        transport: MemoryTransport,
        keys: Arc<KeyStore>,
        engine: SessionEngine,
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
        let engine = SessionEngine::new(
            keys.clone(),
            Arc::new(MemorySequenceStore::new()),
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

    fn permissions() -> SessionPermissions {
        let mut permissions = SessionPermissions::default();
        permissions.blockchains.chains.insert("eip155:1".into());
        permissions.jsonrpc.methods.insert("personal_sign".into());
        permissions
    }

    fn proposal_for(rig: &Rig, proposer_controller: bool) -> SessionProposeParams {
        // install a "pairing" agreement under the proposal topic, the way the
        // pairing engine does when the payload arrives
        let proposer = AgreementSecretKey::generate();
        let responder = AgreementSecretKey::generate();
        let pairing_agreement = AgreementKeys::derive(&responder, proposer.public_key());
        let topic = Topic::generate();
        rig.keys.set_agreement(topic.clone(), pairing_agreement);

        SessionProposeParams {
            topic,
            relay: RelayProtocol::default(),
            proposer: SessionProposer {
                public_key: *proposer.public_key(),
                controller: proposer_controller,
                metadata: AppMetadata::default(),
            },
            permissions: permissions(),
            ttl: SESSION_LIFETIME,
        }
    }

    #[tokio::test]
    async fn test_approve_settles_and_pins_controller() {
        let mut rig = rig(false);
        let proposal = proposal_for(&rig, true);

        let settled = rig.engine.approve(&proposal, BTreeSet::new()).await.unwrap();

        // settled topic is derived from the fresh session agreement
        let agreement = rig.keys.agreement(&settled.topic).unwrap();
        assert_eq!(agreement.settled_topic(), settled.topic);
        // the proposer was controller, so its key is pinned
        assert_eq!(
            settled.permissions.controller.public_key,
            proposal.proposer.public_key
        );
        // proposal-topic key is spent
        assert!(rig.keys.agreement(&proposal.topic).is_none());
        assert!(rig.engine.store.get(&proposal.topic).is_none());
        assert!(rig.hub.subscriptions(&rig.transport).contains(&settled.topic));
        assert!(matches!(
            rig.events.try_recv(),
            Ok(EngineEvent::SessionSettled(_))
        ));
    }

    #[tokio::test]
    async fn test_approve_rejects_matching_controller() {
        let rig = rig(true);
        let proposal = proposal_for(&rig, true);

        assert!(matches!(
            rig.engine.approve(&proposal, BTreeSet::new()).await,
            Err(ClientError::UnauthorizedMatchingController)
        ));
        assert!(rig.engine.store.topics().is_empty());
    }

    #[tokio::test]
    async fn test_request_requires_settled_session() {
        let rig = rig(true);
        let topic = Topic::generate();

        assert!(matches!(
            rig.engine
                .request(&topic, "personal_sign", serde_json::Value::Null, None)
                .await,
            Err(ClientError::NoSequenceForTopic(_))
        ));
    }

    #[tokio::test]
    async fn test_inbound_payload_validation() {
        let mut rig = rig(false);
        let proposal = proposal_for(&rig, true);
        let settled = rig.engine.approve(&proposal, BTreeSet::new()).await.unwrap();
        let _ = rig.events.try_recv();

        // chain outside the permissions is refused without surfacing
        let bad_chain = SessionPayloadParams {
            request: AppRequest {
                method: "personal_sign".into(),
                params: serde_json::Value::Null,
            },
            chain_id: Some("eip155:2".into()),
        };
        rig.engine.on_payload(&settled.topic, 1, &bad_chain).await;
        assert!(rig.events.try_recv().is_err());

        // method outside the permissions likewise
        let bad_method = SessionPayloadParams {
            request: AppRequest {
                method: "eth_sendTransaction".into(),
                params: serde_json::Value::Null,
            },
            chain_id: Some("eip155:1".into()),
        };
        rig.engine.on_payload(&settled.topic, 2, &bad_method).await;
        assert!(rig.events.try_recv().is_err());

        // a permitted call surfaces to the host
        let good = SessionPayloadParams {
            request: AppRequest {
                method: "personal_sign".into(),
                params: serde_json::Value::Null,
            },
            chain_id: Some("eip155:1".into()),
        };
        rig.engine.on_payload(&settled.topic, 3, &good).await;
        match rig.events.try_recv() {
            Ok(EngineEvent::SessionRequest(event)) => {
                assert_eq!(event.id, 3);
                assert_eq!(event.request.method, "personal_sign");
            }
            other => panic!("expected request event, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_payload_on_unknown_topic_is_dropped() {
        let mut rig = rig(false);
        let params = SessionPayloadParams {
            request: AppRequest {
                method: "personal_sign".into(),
                params: serde_json::Value::Null,
            },
            chain_id: None,
        };
        rig.engine.on_payload(&Topic::generate(), 1, &params).await;
        assert!(rig.events.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_delete_tears_down_and_notifies() {
        let mut rig = rig(false);
        let proposal = proposal_for(&rig, true);
        let settled = rig.engine.approve(&proposal, BTreeSet::new()).await.unwrap();
        let _ = rig.events.try_recv();

        rig.engine
            .delete(&settled.topic, Reason::new(6000, "user"))
            .await
            .unwrap();

        assert!(rig.engine.store.get(&settled.topic).is_none());
        assert!(rig.keys.agreement(&settled.topic).is_none());
        assert!(!rig.hub.subscriptions(&rig.transport).contains(&settled.topic));
        assert!(matches!(
            rig.events.try_recv(),
            Ok(EngineEvent::SessionDeleted { .. })
        ));
    }

    #[tokio::test]
    async fn test_inbound_reject_clears_pending() {
        let mut rig = rig(true);

        // seed a settled pairing so propose() has a carrier
        let pairing_topic = seed_pairing(&rig);
        let pending = rig
            .engine
            .propose(&pairing_topic, permissions())
            .await
            .unwrap();

        rig.engine
            .on_reject(&pending.topic, &Reason::new(5000, "declined"))
            .await;

        assert!(rig.engine.store.get(&pending.topic).is_none());
        assert!(rig.keys.agreement(&pending.topic).is_none());
        assert!(matches!(
            rig.events.try_recv(),
            Ok(EngineEvent::SessionRejected { .. })
        ));
    }

    fn seed_pairing(rig: &Rig) -> Topic {
        use crate::protocol::pairing::{PairingState, SettledPairing};

        let ours = AgreementSecretKey::generate();
        let theirs = AgreementSecretKey::generate();
        let agreement = AgreementKeys::derive(&ours, theirs.public_key());
        let topic = agreement.settled_topic();
        rig.keys.set_agreement(topic.clone(), agreement);
        rig.engine
            .pairings
            .insert(
                topic.clone(),
                Pairing::Settled(SettledPairing {
                    topic: topic.clone(),
                    relay: RelayProtocol::default(),
                    self_party: Participant::from_key(*ours.public_key()),
                    peer: Participant::from_key(*theirs.public_key()),
                    expiry: crate::unix_now() + 600,
                    state: PairingState::default(),
                }),
            )
            .unwrap();
        topic
    }
}
