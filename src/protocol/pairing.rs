//! Pairing sequence types
//!
//! A pairing is the persistent encrypted channel two clients bootstrap over
//! the pairing URI. Once settled it carries `pairing_payload` requests whose
//! only defined content is a session proposal.

use serde::{Deserialize, Serialize};

use super::session::SessionProposeParams;
use super::types::{AppMetadata, Participant, PendingStatus, RelayProtocol};
use crate::crypto::AgreementPublicKey;
use crate::topic::Topic;

/// The proposing side of a pairing handshake
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PairingProposer {
    /// The proposer's agreement public key
    pub public_key: AgreementPublicKey,
    /// Whether the proposer claims the controller role
    pub controller: bool,
}

/// A pairing proposal, shared out of band as a pairing URI
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PairingProposal {
    /// The proposal topic the approval will arrive on
    pub topic: Topic,
    /// Relay carrying the sequence
    pub relay: RelayProtocol,
    /// The proposing participant
    pub proposer: PairingProposer,
}

/// Settlement state shared through `pairing_approve`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct PairingState {
    /// The responder's application metadata
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<AppMetadata>,
}

/// Parameters of a `pairing_approve` request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PairingApproveParams {
    /// Relay carrying the settled pairing
    pub relay: RelayProtocol,
    /// The responding participant
    pub responder: Participant,
    /// Settled pairing expiry, unix seconds
    pub expiry: u64,
    /// Settlement state
    pub state: PairingState,
}

/// The request carried inside a `pairing_payload`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "method", content = "params", rename_all = "snake_case")]
pub enum PairingPayloadRequest {
    /// A session proposal riding the settled pairing
    SessionPropose(SessionProposeParams),
}

/// Parameters of a `pairing_payload` request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PairingPayloadParams {
    /// The carried request
    pub request: PairingPayloadRequest,
}

/// A pairing awaiting settlement
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingPairing {
    /// Handshake progress
    pub status: PendingStatus,
    /// Current topic (the proposal topic)
    pub topic: Topic,
    /// Relay carrying the sequence
    pub relay: RelayProtocol,
    /// Our side
    #[serde(rename = "self")]
    pub self_party: Participant,
    /// The proposal this pairing settles from
    pub proposal: PairingProposal,
}

/// A settled pairing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SettledPairing {
    /// The settled topic, SHA-256 of the shared secret
    pub topic: Topic,
    /// Relay carrying the sequence
    pub relay: RelayProtocol,
    /// Our side
    #[serde(rename = "self")]
    pub self_party: Participant,
    /// The peer
    pub peer: Participant,
    /// Expiry, unix seconds
    pub expiry: u64,
    /// Settlement state
    pub state: PairingState,
}

/// A pairing sequence, keyed in the store by its current topic
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Pairing {
    /// Awaiting settlement
    Pending(PendingPairing),
    /// Settled
    Settled(SettledPairing),
}

impl Pairing {
    /// The topic this sequence is currently keyed by
    pub fn topic(&self) -> &Topic {
        match self {
            Pairing::Pending(pending) => &pending.topic,
            Pairing::Settled(settled) => &settled.topic,
        }
    }

    /// Expiry of a settled pairing
    pub fn expiry(&self) -> Option<u64> {
        match self {
            Pairing::Pending(_) => None,
            Pairing::Settled(settled) => Some(settled.expiry),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::AgreementSecretKey;

    #[test]
    fn test_payload_request_wire_shape() {
        let key = AgreementSecretKey::generate();
        let proposal = SessionProposeParams {
            topic: Topic::generate(),
            relay: RelayProtocol::default(),
            proposer: super::super::session::SessionProposer {
                public_key: *key.public_key(),
                controller: false,
                metadata: AppMetadata::default(),
            },
            permissions: Default::default(),
            ttl: 60,
        };

        let params = PairingPayloadParams {
            request: PairingPayloadRequest::SessionPropose(proposal),
        };

        let json = serde_json::to_value(&params).unwrap();
        assert_eq!(json["request"]["method"], "session_propose");
        assert!(json["request"]["params"]["proposer"]["publicKey"].is_string());

        let restored: PairingPayloadParams = serde_json::from_value(json).unwrap();
        assert_eq!(params, restored);
    }

    #[test]
    fn test_sequence_variant_tagging() {
        let key = AgreementSecretKey::generate();
        let settled = Pairing::Settled(SettledPairing {
            topic: Topic::generate(),
            relay: RelayProtocol::default(),
            self_party: Participant::from_key(*key.public_key()),
            peer: Participant::from_key(*key.public_key()),
            expiry: 1000,
            state: PairingState::default(),
        });

        let json = serde_json::to_value(&settled).unwrap();
        assert_eq!(json["type"], "settled");
        assert!(json["self"].is_object());

        let restored: Pairing = serde_json::from_value(json).unwrap();
        assert_eq!(settled, restored);
    }
}
