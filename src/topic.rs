//! Sequence topics
//!
//! A topic is an opaque 32-byte random identifier, hex-encoded lower-case.
//! It serves double duty: subscription key on the relay and index into the
//! sequence store.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Size of a topic in raw bytes
pub const TOPIC_SIZE: usize = 32;

/// Error produced when a string is not a valid topic
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("invalid topic: expected {} lowercase hex characters", TOPIC_SIZE * 2)]
pub struct InvalidTopic;

/// A 32-byte sequence identifier, stored as lowercase hex
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Topic(String);

impl Topic {
    /// Generate a fresh random topic
    pub fn generate() -> Self {
        Topic(hex::encode(crate::crypto::random_bytes::<TOPIC_SIZE>()))
    }

    /// Build a topic from raw bytes (e.g. a hash output)
    pub fn from_raw(bytes: [u8; TOPIC_SIZE]) -> Self {
        Topic(hex::encode(bytes))
    }

    /// Validate and wrap an existing hex string
    pub fn parse(value: &str) -> Result<Self, InvalidTopic> {
        if value.len() != TOPIC_SIZE * 2 {
            return Err(InvalidTopic);
        }
        if !value.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f')) {
            return Err(InvalidTopic);
        }
        Ok(Topic(value.to_string()))
    }

    /// The hex representation
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Topic({}...)", &self.0[..16])
    }
}

impl FromStr for Topic {
    type Err = InvalidTopic;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Topic::parse(s)
    }
}

impl TryFrom<String> for Topic {
    type Error = InvalidTopic;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Topic::parse(&value)
    }
}

impl From<Topic> for String {
    fn from(topic: Topic) -> String {
        topic.0
    }
}
