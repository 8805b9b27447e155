//! Shared protocol types

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::crypto::AgreementPublicKey;

/// Host application metadata, opaque to the protocol
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct AppMetadata {
    /// Application name
    pub name: String,
    /// Short human-readable description
    pub description: String,
    /// Application URL
    pub url: String,
    /// Icon URLs
    pub icons: Vec<String>,
}

/// The relay protocol a sequence is carried over
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelayProtocol {
    /// Protocol identifier, e.g. `waku`
    pub protocol: String,
}

impl Default for RelayProtocol {
    fn default() -> Self {
        RelayProtocol {
            protocol: "waku".to_string(),
        }
    }
}

/// One side of a sequence
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Participant {
    /// The participant's agreement public key
    pub public_key: AgreementPublicKey,
    /// Application metadata, when the participant has shared it
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<AppMetadata>,
}

impl Participant {
    /// A participant known only by its public key
    pub fn from_key(public_key: AgreementPublicKey) -> Self {
        Participant {
            public_key,
            metadata: None,
        }
    }
}

/// Progress of a pending sequence
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PendingStatus {
    /// Proposal emitted, awaiting the peer
    Proposed,
    /// Approval published, awaiting the relay ack
    Responded,
}

/// Chains a session may address, as CAIP-2 identifiers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct BlockchainPermissions {
    /// Permitted CAIP-2 chain ids, e.g. `eip155:1`
    pub chains: BTreeSet<String>,
}

/// JSON-RPC methods a session may invoke
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct JsonRpcPermissions {
    /// Permitted method names
    pub methods: BTreeSet<String>,
}

/// Permissions requested with a session proposal
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct SessionPermissions {
    /// Permitted chains
    pub blockchains: BlockchainPermissions,
    /// Permitted methods
    pub jsonrpc: JsonRpcPermissions,
}

/// The participant allowed to mutate a sequence post-settlement
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Controller {
    /// The controller's agreement public key
    pub public_key: AgreementPublicKey,
}

/// Permissions of a settled session, with the controller pinned
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettledPermissions {
    /// Permitted chains
    pub blockchains: BlockchainPermissions,
    /// Permitted methods
    pub jsonrpc: JsonRpcPermissions,
    /// The controlling participant
    pub controller: Controller,
}

impl SettledPermissions {
    /// Pin the controller key onto proposed permissions
    pub fn from_proposed(proposed: SessionPermissions, controller: AgreementPublicKey) -> Self {
        SettledPermissions {
            blockchains: proposed.blockchains,
            jsonrpc: proposed.jsonrpc,
            controller: Controller {
                public_key: controller,
            },
        }
    }
}

/// A coded reason attached to rejections and deletions
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reason {
    /// Numeric reason code
    pub code: i64,
    /// Human-readable message
    pub message: String,
}

impl Reason {
    /// Convenience constructor
    pub fn new(code: i64, message: impl Into<String>) -> Self {
        Reason {
            code,
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_participant_serde_shape() {
        let key = crate::crypto::AgreementSecretKey::generate();
        let participant = Participant::from_key(*key.public_key());

        let json = serde_json::to_value(&participant).unwrap();
        assert!(json.get("publicKey").is_some());
        // absent metadata is omitted, not null
        assert!(json.get("metadata").is_none());
    }

    #[test]
    fn test_settled_permissions_pin_controller() {
        let key = crate::crypto::AgreementSecretKey::generate();
        let mut proposed = SessionPermissions::default();
        proposed.blockchains.chains.insert("eip155:1".into());
        proposed.jsonrpc.methods.insert("personal_sign".into());

        let settled = SettledPermissions::from_proposed(proposed.clone(), *key.public_key());
        assert_eq!(settled.blockchains, proposed.blockchains);
        assert_eq!(settled.jsonrpc, proposed.jsonrpc);
        assert_eq!(settled.controller.public_key, *key.public_key());
    }
}
