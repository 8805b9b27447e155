//! Payload serialization
//!
//! Every relay message is a hex string. When the key store holds an agreement
//! for the topic, the JSON payload is sealed with the topic's symmetric key
//! first; otherwise the hex frames the raw UTF-8 JSON. The unencrypted path
//! exists only for the handshake bootstrap, where the proposer has no key yet.

use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;

use crate::crypto::{Cipher, CryptoError, KeyStore};
use crate::topic::Topic;

/// Errors from encoding or decoding a relay payload
#[derive(Error, Debug)]
pub enum SerializerError {
    /// The message is not valid hex
    #[error("payload is not valid hex: {0}")]
    Hex(#[from] hex::FromHexError),

    /// Sealing or opening the payload failed
    #[error(transparent)]
    Crypto(#[from] CryptoError),

    /// The plaintext is not the expected JSON document
    #[error("payload is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// Encodes and decodes payloads under a topic's key
#[derive(Clone)]
pub struct Serializer {
    keys: Arc<KeyStore>,
}

impl Serializer {
    /// Create a serializer backed by the given key store
    pub fn new(keys: Arc<KeyStore>) -> Self {
        Serializer { keys }
    }

    /// JSON-encode a payload and frame it for the relay
    pub fn serialize<T: Serialize>(
        &self,
        topic: &Topic,
        payload: &T,
    ) -> Result<String, SerializerError> {
        let json = serde_json::to_vec(payload)?;
        let bytes = match self.keys.agreement(topic) {
            Some(agreement) => Cipher::encrypt(agreement.symmetric_key(), &json)?,
            None => json,
        };
        Ok(hex::encode(bytes))
    }

    /// Reverse of [`serialize`](Self::serialize)
    pub fn deserialize<T: DeserializeOwned>(
        &self,
        topic: &Topic,
        message: &str,
    ) -> Result<T, SerializerError> {
        let plaintext = self.open(topic, message)?;
        Ok(serde_json::from_slice(&plaintext)?)
    }

    /// Recover the plaintext JSON bytes of a message without typing them
    pub fn open(&self, topic: &Topic, message: &str) -> Result<Vec<u8>, SerializerError> {
        let bytes = hex::decode(message)?;
        match self.keys.agreement(topic) {
            Some(agreement) => Ok(Cipher::decrypt(agreement.symmetric_key(), &bytes)?),
            None => Ok(bytes),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::{AgreementKeys, AgreementSecretKey};
    use serde::Deserialize;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Probe {
        value: String,
        count: u32,
    }

    fn keyed_topic(keys: &KeyStore) -> Topic {
        let alice = AgreementSecretKey::generate();
        let bob = AgreementSecretKey::generate();
        let agreement = AgreementKeys::derive(&alice, bob.public_key());
        let topic = agreement.settled_topic();
        keys.set_agreement(topic.clone(), agreement);
        topic
    }

    #[test]
    fn test_plaintext_roundtrip_without_key() {
        let keys = Arc::new(KeyStore::new());
        let serializer = Serializer::new(keys);
        let topic = Topic::generate();

        let probe = Probe {
            value: "bootstrap".into(),
            count: 1,
        };
        let message = serializer.serialize(&topic, &probe).unwrap();

        // Without a key the hex frames readable JSON
        let raw = hex::decode(&message).unwrap();
        assert!(serde_json::from_slice::<Probe>(&raw).is_ok());

        let restored: Probe = serializer.deserialize(&topic, &message).unwrap();
        assert_eq!(probe, restored);
    }

    #[test]
    fn test_encrypted_roundtrip_with_key() {
        let keys = Arc::new(KeyStore::new());
        let serializer = Serializer::new(keys.clone());
        let topic = keyed_topic(&keys);

        let probe = Probe {
            value: "settled".into(),
            count: 7,
        };
        let message = serializer.serialize(&topic, &probe).unwrap();

        // With a key the payload must not be readable JSON
        let raw = hex::decode(&message).unwrap();
        assert!(serde_json::from_slice::<Probe>(&raw).is_err());

        let restored: Probe = serializer.deserialize(&topic, &message).unwrap();
        assert_eq!(probe, restored);
    }

    #[test]
    fn test_decode_fails_once_key_dropped() {
        let keys = Arc::new(KeyStore::new());
        let serializer = Serializer::new(keys.clone());
        let topic = keyed_topic(&keys);

        let message = serializer
            .serialize(
                &topic,
                &Probe {
                    value: "x".into(),
                    count: 0,
                },
            )
            .unwrap();

        keys.remove_agreement(&topic);
        assert!(serializer.deserialize::<Probe>(&topic, &message).is_err());
    }

    #[test]
    fn test_garbage_is_rejected() {
        let keys = Arc::new(KeyStore::new());
        let serializer = Serializer::new(keys);
        let topic = Topic::generate();

        assert!(serializer.deserialize::<Probe>(&topic, "not hex").is_err());
        assert!(serializer
            .deserialize::<Probe>(&topic, &hex::encode(b"not json"))
            .is_err());
    }
}
