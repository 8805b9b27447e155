//! Client error taxonomy

use thiserror::Error;

use crate::crypto::CryptoError;
use crate::protocol::uri::UriError;
use crate::relay::{RelayError, TransportError};
use crate::serializer::SerializerError;
use crate::store::StoreError;
use crate::topic::Topic;

/// Everything a client operation can fail with
#[derive(Error, Debug)]
pub enum ClientError {
    /// WebSocket failure, decode failure, or publish ack failure
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// No agreement key for a topic; unrecoverable without a new handshake
    #[error("no agreement key for topic {0}")]
    KeyNotFound(Topic),

    /// Store lookup miss
    #[error("no sequence for topic {0}")]
    NoSequenceForTopic(Topic),

    /// Both peers claim the controller role
    #[error("peer and local client both claim the controller role")]
    UnauthorizedMatchingController,

    /// The target chain is outside the session's permissions
    #[error("chain {0} is not permitted by the session")]
    UnauthorizedTargetChain(String),

    /// The method is outside the session's permissions
    #[error("method {0} is not permitted by the session")]
    UnauthorizedJsonRpcMethod(String),

    /// The pairing URI could not be parsed
    #[error("malformed pairing uri: {0}")]
    Uri(#[from] UriError),

    /// Entropy or store-write failure while building a proposal
    #[error("pairing proposal could not be created: {0}")]
    ProposalGeneration(String),

    /// Ciphertext or JSON malformed
    #[error("payload could not be decoded: {0}")]
    Deserialization(#[from] SerializerError),

    /// Key agreement or AEAD failure; fatal to the sequence it concerns
    #[error(transparent)]
    Crypto(#[from] CryptoError),

    /// Sequence store failure
    #[error(transparent)]
    Store(#[from] StoreError),

    /// No response arrived within the correlation window
    #[error("timed out awaiting a response")]
    ResponseTimeout,
}

impl From<RelayError> for ClientError {
    fn from(error: RelayError) -> Self {
        match error {
            RelayError::Serializer(e) => ClientError::Deserialization(e),
            RelayError::Transport(e) => ClientError::Transport(e),
            RelayError::ResponseTimeout => ClientError::ResponseTimeout,
        }
    }
}

/// JSON-RPC error codes published for protocol-level failures
pub mod codes {
    /// Store lookup miss for the request's topic
    pub const NO_SEQUENCE_FOR_TOPIC: i64 = 1301;
    /// Ciphertext or JSON malformed
    pub const DESERIALIZATION_FAILED: i64 = 1601;
    /// The target chain is outside the session's permissions
    pub const UNAUTHORIZED_TARGET_CHAIN: i64 = 3000;
    /// The method is outside the session's permissions
    pub const UNAUTHORIZED_JSONRPC_METHOD: i64 = 3001;
    /// Both peers claim the controller role
    pub const UNAUTHORIZED_MATCHING_CONTROLLER: i64 = 3002;
    /// Internal or transport failure
    pub const INTERNAL: i64 = 9000;
}

impl ClientError {
    /// The JSON-RPC error code published for this failure
    pub fn json_rpc_code(&self) -> i64 {
        match self {
            ClientError::NoSequenceForTopic(_) => codes::NO_SEQUENCE_FOR_TOPIC,
            ClientError::Deserialization(_) => codes::DESERIALIZATION_FAILED,
            ClientError::UnauthorizedTargetChain(_) => codes::UNAUTHORIZED_TARGET_CHAIN,
            ClientError::UnauthorizedJsonRpcMethod(_) => codes::UNAUTHORIZED_JSONRPC_METHOD,
            ClientError::UnauthorizedMatchingController => {
                codes::UNAUTHORIZED_MATCHING_CONTROLLER
            }
            _ => codes::INTERNAL,
        }
    }
}
