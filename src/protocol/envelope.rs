//! JSON-RPC envelope
//!
//! Every protocol message is a JSON-RPC 2.0 document. Requests carry a method
//! discriminant and the matching params variant; responses correlate to an
//! outstanding publish purely by `id`.

use serde::{Deserialize, Serialize};

use super::pairing::{PairingApproveParams, PairingPayloadParams};
use super::session::{
    SessionApproveParams, SessionDeleteParams, SessionPayloadParams, SessionProposeParams,
    SessionRejectParams,
};

/// The JSON-RPC version string
pub const JSONRPC_VERSION: &str = "2.0";

/// Generate a request id: millisecond timestamp with three random digits
/// appended, unique enough for correlation within a client's lifetime
pub fn generate_request_id() -> i64 {
    use rand::Rng;
    use std::time::{SystemTime, UNIX_EPOCH};

    let millis = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as i64;
    millis * 1000 + rand::thread_rng().gen_range(0..1000)
}

/// A protocol operation and its parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "method", content = "params", rename_all = "snake_case")]
pub enum ProtocolCall {
    /// Settle a pairing on its proposal topic
    PairingApprove(PairingApproveParams),
    /// Carry a request over a settled pairing
    PairingPayload(PairingPayloadParams),
    /// Reserved
    PairingPing,
    /// Propose a session (only ever nested in `pairing_payload`)
    SessionPropose(SessionProposeParams),
    /// Settle a session on its proposal topic
    SessionApprove(SessionApproveParams),
    /// Decline a session proposal
    SessionReject(SessionRejectParams),
    /// Reserved extension point
    SessionUpdate(serde_json::Value),
    /// Reserved extension point
    SessionUpgrade(serde_json::Value),
    /// Close a settled session
    SessionDelete(SessionDeleteParams),
    /// An application call on a settled session
    SessionPayload(SessionPayloadParams),
    /// Reserved
    SessionPing,
    /// Reserved
    SessionNotification(serde_json::Value),
}

impl ProtocolCall {
    /// The wire method name, for logging
    pub fn method(&self) -> &'static str {
        match self {
            ProtocolCall::PairingApprove(_) => "pairing_approve",
            ProtocolCall::PairingPayload(_) => "pairing_payload",
            ProtocolCall::PairingPing => "pairing_ping",
            ProtocolCall::SessionPropose(_) => "session_propose",
            ProtocolCall::SessionApprove(_) => "session_approve",
            ProtocolCall::SessionReject(_) => "session_reject",
            ProtocolCall::SessionUpdate(_) => "session_update",
            ProtocolCall::SessionUpgrade(_) => "session_upgrade",
            ProtocolCall::SessionDelete(_) => "session_delete",
            ProtocolCall::SessionPayload(_) => "session_payload",
            ProtocolCall::SessionPing => "session_ping",
            ProtocolCall::SessionNotification(_) => "session_notification",
        }
    }
}

/// A protocol request envelope
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientRequest {
    /// Correlation id
    pub id: i64,
    /// Always `2.0`
    pub jsonrpc: String,
    /// The operation
    #[serde(flatten)]
    pub call: ProtocolCall,
}

impl ClientRequest {
    /// Wrap a call with a fresh id
    pub fn new(call: ProtocolCall) -> Self {
        ClientRequest {
            id: generate_request_id(),
            jsonrpc: JSONRPC_VERSION.to_string(),
            call,
        }
    }
}

/// A successful JSON-RPC response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcResponse {
    /// Correlation id of the request this answers
    pub id: i64,
    /// Always `2.0`
    pub jsonrpc: String,
    /// The result value
    pub result: serde_json::Value,
}

impl JsonRpcResponse {
    /// Build a response for a request id
    pub fn new(id: i64, result: serde_json::Value) -> Self {
        JsonRpcResponse {
            id,
            jsonrpc: JSONRPC_VERSION.to_string(),
            result,
        }
    }
}

/// The error member of a JSON-RPC error response
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    /// Error code
    pub code: i64,
    /// Human-readable message
    pub message: String,
}

/// A JSON-RPC error response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcError {
    /// Correlation id of the request this answers
    pub id: i64,
    /// Always `2.0`
    pub jsonrpc: String,
    /// The error
    pub error: ErrorBody,
}

impl JsonRpcError {
    /// Build an error response for a request id
    pub fn new(id: i64, code: i64, message: impl Into<String>) -> Self {
        JsonRpcError {
            id,
            jsonrpc: JSONRPC_VERSION.to_string(),
            error: ErrorBody {
                code,
                message: message.into(),
            },
        }
    }
}

/// Either outcome of a correlated publish
#[derive(Debug, Clone, PartialEq)]
pub enum RpcReply {
    /// The peer answered with a result
    Result(JsonRpcResponse),
    /// The peer answered with an error
    Error(JsonRpcError),
}

impl RpcReply {
    /// The correlation id the reply carries
    pub fn id(&self) -> i64 {
        match self {
            RpcReply::Result(response) => response.id,
            RpcReply::Error(error) => error.id,
        }
    }

    /// Whether this reply is an error
    pub fn is_error(&self) -> bool {
        matches!(self, RpcReply::Error(_))
    }
}
