//! Protocol data model
//!
//! The typed vocabulary of the wire protocol: participants and permissions,
//! per-method request parameters, the pending/settled sequence variants, the
//! pairing URI, and the JSON-RPC envelope every message travels in.

pub mod envelope;
pub mod pairing;
pub mod session;
pub mod types;
pub mod uri;

pub use envelope::{ClientRequest, ErrorBody, JsonRpcError, JsonRpcResponse, ProtocolCall, RpcReply};
pub use pairing::{
    Pairing, PairingApproveParams, PairingPayloadParams, PairingPayloadRequest, PairingProposal,
    PairingProposer, PairingState, PendingPairing, SettledPairing,
};
pub use session::{
    AppRequest, PendingSession, Session, SessionApproveParams, SessionDeleteParams,
    SessionPayloadParams, SessionProposeParams, SessionProposer, SessionRejectParams, SessionState,
    SettledSession,
};
pub use types::{
    AppMetadata, BlockchainPermissions, Controller, JsonRpcPermissions, Participant, PendingStatus,
    Reason, RelayProtocol, SessionPermissions, SettledPermissions,
};
pub use uri::{PairingUri, UriError, PROTOCOL_VERSION};
