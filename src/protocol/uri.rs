//! Pairing URI
//!
//! Wire format, bit-exact:
//! `wc:{topic}@{version}?controller={0|1}&publicKey={hex}&relay={percent-encoded-json}`
//!
//! Parsing is strict; unknown query keys are ignored.

use std::fmt;
use std::str::FromStr;

use thiserror::Error;
use url::form_urlencoded;

use super::pairing::{PairingProposal, PairingProposer};
use super::types::RelayProtocol;
use crate::crypto::AgreementPublicKey;
use crate::topic::{InvalidTopic, Topic};

/// Protocol version carried in the URI
pub const PROTOCOL_VERSION: u32 = 2;

/// Errors from parsing a pairing URI
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum UriError {
    /// The URI does not start with `wc:`
    #[error("pairing uri must use the wc: scheme")]
    InvalidScheme,

    /// No query string present
    #[error("pairing uri has no query")]
    MissingQuery,

    /// The `{topic}@{version}` head is malformed
    #[error("malformed topic/version segment")]
    MalformedHead,

    /// The topic is not 64 lowercase hex characters
    #[error(transparent)]
    InvalidTopic(#[from] InvalidTopic),

    /// The version is not a number
    #[error("invalid protocol version")]
    InvalidVersion,

    /// A required query parameter is absent
    #[error("missing query parameter `{0}`")]
    MissingParameter(&'static str),

    /// A query parameter failed to parse
    #[error("invalid query parameter `{0}`")]
    InvalidParameter(&'static str),
}

/// A parsed pairing URI
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PairingUri {
    /// The proposal topic
    pub topic: Topic,
    /// Protocol version
    pub version: u32,
    /// Whether the proposer claims the controller role
    pub controller: bool,
    /// The proposer's agreement public key
    pub public_key: AgreementPublicKey,
    /// Relay the approval must be published on
    pub relay: RelayProtocol,
}

impl PairingUri {
    /// Build the URI for a proposal
    pub fn from_proposal(proposal: &PairingProposal) -> Self {
        PairingUri {
            topic: proposal.topic.clone(),
            version: PROTOCOL_VERSION,
            controller: proposal.proposer.controller,
            public_key: proposal.proposer.public_key,
            relay: proposal.relay.clone(),
        }
    }

    /// Recover the proposal this URI encodes
    pub fn proposal(&self) -> PairingProposal {
        PairingProposal {
            topic: self.topic.clone(),
            relay: self.relay.clone(),
            proposer: PairingProposer {
                public_key: self.public_key,
                controller: self.controller,
            },
        }
    }
}

impl fmt::Display for PairingUri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let relay_json = serde_json::to_string(&self.relay).map_err(|_| fmt::Error)?;
        let relay_encoded: String = form_urlencoded::byte_serialize(relay_json.as_bytes()).collect();
        write!(
            f,
            "wc:{}@{}?controller={}&publicKey={}&relay={}",
            self.topic,
            self.version,
            if self.controller { 1 } else { 0 },
            self.public_key.to_hex(),
            relay_encoded
        )
    }
}

impl FromStr for PairingUri {
    type Err = UriError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let rest = s.strip_prefix("wc:").ok_or(UriError::InvalidScheme)?;
        let (head, query) = rest.split_once('?').ok_or(UriError::MissingQuery)?;
        let (topic, version) = head.split_once('@').ok_or(UriError::MalformedHead)?;

        let topic = Topic::parse(topic)?;
        let version: u32 = version.parse().map_err(|_| UriError::InvalidVersion)?;

        let mut controller = None;
        let mut public_key = None;
        let mut relay = None;
        for (key, value) in form_urlencoded::parse(query.as_bytes()) {
            match key.as_ref() {
                "controller" => {
                    controller = Some(match value.as_ref() {
                        "0" => false,
                        "1" => true,
                        _ => return Err(UriError::InvalidParameter("controller")),
                    });
                }
                "publicKey" => {
                    public_key = Some(
                        AgreementPublicKey::from_hex(&value)
                            .map_err(|_| UriError::InvalidParameter("publicKey"))?,
                    );
                }
                "relay" => {
                    relay = Some(
                        serde_json::from_str::<RelayProtocol>(&value)
                            .map_err(|_| UriError::InvalidParameter("relay"))?,
                    );
                }
                // unknown keys are ignored
                _ => {}
            }
        }

        Ok(PairingUri {
            topic,
            version,
            controller: controller.ok_or(UriError::MissingParameter("controller"))?,
            public_key: public_key.ok_or(UriError::MissingParameter("publicKey"))?,
            relay: relay.ok_or(UriError::MissingParameter("relay"))?,
        })
    }
}
