//! Relay wire protocol
//!
//! JSON-RPC 2.0 over the WebSocket. Client to server: `waku_publish`,
//! `waku_subscribe`, `waku_unsubscribe`. Server to client: `waku_subscription`
//! plus acks for the outstanding client calls.

use serde::{Deserialize, Serialize};

use crate::topic::Topic;

/// A relay method and its parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "method", content = "params")]
pub enum RelayRequest {
    /// Publish a message to every subscriber of a topic
    #[serde(rename = "waku_publish")]
    Publish {
        /// Target topic
        topic: Topic,
        /// Hex-framed payload
        message: String,
        /// Relay-side retention, seconds
        ttl: u64,
    },

    /// Subscribe to a topic; the ack carries the subscription id
    #[serde(rename = "waku_subscribe")]
    Subscribe {
        /// Topic to watch
        topic: Topic,
    },

    /// Cancel a subscription by id
    #[serde(rename = "waku_unsubscribe")]
    Unsubscribe {
        /// Subscription id from the subscribe ack
        id: String,
    },

    /// A delivery pushed by the relay
    #[serde(rename = "waku_subscription")]
    Subscription {
        /// Subscription id the delivery belongs to
        id: String,
        /// The delivered message
        data: SubscriptionData,
    },
}

/// Payload of a `waku_subscription` delivery
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubscriptionData {
    /// Topic the message was published to
    pub topic: Topic,
    /// Hex-framed payload
    pub message: String,
}

/// An RPC frame exchanged with the relay
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelayRpc {
    /// Frame id
    pub id: u64,
    /// Always `2.0`
    pub jsonrpc: String,
    /// The call
    #[serde(flatten)]
    pub request: RelayRequest,
}

impl RelayRpc {
    /// Wrap a request with an id
    pub fn new(id: u64, request: RelayRequest) -> Self {
        RelayRpc {
            id,
            jsonrpc: "2.0".to_string(),
            request,
        }
    }
}

/// A successful ack from the relay
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelayAck {
    /// Id of the acked frame
    pub id: u64,
    /// Always `2.0`
    pub jsonrpc: String,
    /// `true` for publish/unsubscribe, the subscription id for subscribe
    pub result: serde_json::Value,
}

impl RelayAck {
    /// Build an ack for a frame id
    pub fn new(id: u64, result: serde_json::Value) -> Self {
        RelayAck {
            id,
            jsonrpc: "2.0".to_string(),
            result,
        }
    }
}

/// The error member of a relay error frame
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelayErrorBody {
    /// Error code
    pub code: i64,
    /// Human-readable message
    pub message: String,
}

/// An error frame from the relay
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelayNack {
    /// Id of the failed frame
    pub id: u64,
    /// Always `2.0`
    pub jsonrpc: String,
    /// The error
    pub error: RelayErrorBody,
}
