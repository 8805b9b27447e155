//! Session sequence types
//!
//! A session is the permissioned JSON-RPC channel an application settles with
//! a wallet. Proposals ride an existing pairing; everything afterwards lives
//! on the session's own topics.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use super::types::{
    AppMetadata, Participant, PendingStatus, Reason, RelayProtocol, SessionPermissions,
    SettledPermissions,
};
use crate::crypto::AgreementPublicKey;
use crate::topic::Topic;

/// The proposing side of a session handshake
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionProposer {
    /// The proposer's agreement public key
    pub public_key: AgreementPublicKey,
    /// Whether the proposer claims the controller role
    pub controller: bool,
    /// The proposing application's metadata
    pub metadata: AppMetadata,
}

/// Parameters of a `session_propose`, carried inside a `pairing_payload`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionProposeParams {
    /// The proposal topic the approval will arrive on
    pub topic: Topic,
    /// Relay carrying the sequence
    pub relay: RelayProtocol,
    /// The proposing participant
    pub proposer: SessionProposer,
    /// Requested permissions
    pub permissions: SessionPermissions,
    /// Seconds until a settled session expires
    pub ttl: u64,
}

/// Account state shared at approval, as CAIP-10 account ids
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct SessionState {
    /// Exposed accounts, e.g. `eip155:1:0xab...`
    pub accounts: BTreeSet<String>,
}

/// Parameters of a `session_approve` request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionApproveParams {
    /// Relay carrying the settled session
    pub relay: RelayProtocol,
    /// The responding participant
    pub responder: Participant,
    /// Settled session expiry, unix seconds
    pub expiry: u64,
    /// Accounts exposed to the session
    pub state: SessionState,
}

/// Parameters of a `session_reject` request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionRejectParams {
    /// Why the proposal was rejected
    pub reason: Reason,
}

/// Parameters of a `session_delete` request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionDeleteParams {
    /// Why the session was closed
    pub reason: Reason,
}

/// An application-level JSON-RPC call carried by `session_payload`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppRequest {
    /// Method name, checked against the session's permissions
    pub method: String,
    /// Method parameters, opaque to the engine
    pub params: serde_json::Value,
}

/// Parameters of a `session_payload` request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionPayloadParams {
    /// The carried application call
    pub request: AppRequest,
    /// Target chain, checked against the session's permissions
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chain_id: Option<String>,
}

/// A session awaiting settlement
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingSession {
    /// Handshake progress
    pub status: PendingStatus,
    /// Current topic (the proposal topic)
    pub topic: Topic,
    /// Relay carrying the sequence
    pub relay: RelayProtocol,
    /// Our side
    #[serde(rename = "self")]
    pub self_party: Participant,
    /// The proposal this session settles from
    pub proposal: SessionProposeParams,
}

/// A settled session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SettledSession {
    /// The settled topic, SHA-256 of the shared secret
    pub topic: Topic,
    /// Relay carrying the sequence
    pub relay: RelayProtocol,
    /// Our side
    #[serde(rename = "self")]
    pub self_party: Participant,
    /// The peer
    pub peer: Participant,
    /// Granted permissions, controller pinned
    pub permissions: SettledPermissions,
    /// Expiry, unix seconds
    pub expiry: u64,
    /// Accounts exposed to the session
    pub state: SessionState,
}

/// A session sequence, keyed in the store by its current topic
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Session {
    /// Awaiting settlement
    Pending(PendingSession),
    /// Settled
    Settled(SettledSession),
}

impl Session {
    /// The topic this sequence is currently keyed by
    pub fn topic(&self) -> &Topic {
        match self {
            Session::Pending(pending) => &pending.topic,
            Session::Settled(settled) => &settled.topic,
        }
    }

    /// Expiry of a settled session
    pub fn expiry(&self) -> Option<u64> {
        match self {
            Session::Pending(_) => None,
            Session::Settled(settled) => Some(settled.expiry),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_payload_params_wire_shape() {
        let params = SessionPayloadParams {
            request: AppRequest {
                method: "personal_sign".into(),
                params: serde_json::json!(["0xdeadbeef", "0xabc"]),
            },
            chain_id: Some("eip155:1".into()),
        };

        let json = serde_json::to_value(&params).unwrap();
        assert_eq!(json["chainId"], "eip155:1");
        assert_eq!(json["request"]["method"], "personal_sign");

        let restored: SessionPayloadParams = serde_json::from_value(json).unwrap();
        assert_eq!(params, restored);
    }

    #[test]
    fn test_payload_params_without_chain() {
        let params = SessionPayloadParams {
            request: AppRequest {
                method: "eth_accounts".into(),
                params: serde_json::Value::Null,
            },
            chain_id: None,
        };

        let json = serde_json::to_value(&params).unwrap();
        assert!(json.get("chainId").is_none());
    }
}
