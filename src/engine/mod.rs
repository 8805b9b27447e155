//! Sequence engines
//!
//! The pairing and session state machines. Each engine owns its sequence
//! store slice and its subscriber, talks to the relay façade for I/O, and
//! reports lifecycle changes as events; the client forwards those to the host
//! delegate.

pub mod pairing;
pub mod session;

pub use pairing::PairingEngine;
pub use session::SessionEngine;

use crate::protocol::pairing::SettledPairing;
use crate::protocol::session::{AppRequest, SessionProposeParams, SettledSession};
use crate::protocol::types::Reason;
use crate::topic::Topic;

/// Default lifetime of a settled pairing, seconds
pub const PAIRING_LIFETIME: u64 = 30 * 86_400;

/// Default lifetime of a settled session, seconds
pub const SESSION_LIFETIME: u64 = 7 * 86_400;

/// An inbound application call that passed validation
#[derive(Debug, Clone)]
pub struct SessionRequestEvent {
    /// Session topic the call arrived on
    pub topic: Topic,
    /// Envelope id to respond with
    pub id: i64,
    /// The application call
    pub request: AppRequest,
    /// Target chain, already checked against the permissions
    pub chain_id: Option<String>,
}

/// Lifecycle events the engines report upwards
#[derive(Debug, Clone)]
pub enum EngineEvent {
    /// A pairing reached the settled state
    PairingSettled(SettledPairing),
    /// A session proposal arrived over a pairing
    SessionProposal(SessionProposeParams),
    /// A session reached the settled state
    SessionSettled(SettledSession),
    /// The peer rejected our session proposal
    SessionRejected {
        /// Proposal topic
        topic: Topic,
        /// Rejection reason
        reason: Reason,
    },
    /// A session was closed, locally or by the peer
    SessionDeleted {
        /// Session topic
        topic: Topic,
        /// Deletion reason
        reason: Reason,
    },
    /// An inbound application call passed validation
    SessionRequest(SessionRequestEvent),
}
