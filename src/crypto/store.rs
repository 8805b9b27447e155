//! Key store
//!
//! Exclusive owner of all key material. Private keys are indexed by their
//! public half while a handshake is in flight; agreement keys are indexed by
//! the topic that references them and live exactly as long as that sequence.
//! Nothing leaves the store except behind an `Arc`.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use super::exchange::{AgreementKeys, AgreementPublicKey, AgreementSecretKey};
use crate::topic::Topic;

/// In-memory owner of private keys and per-topic agreement keys
#[derive(Default)]
pub struct KeyStore {
    private_keys: Mutex<HashMap<AgreementPublicKey, Arc<AgreementSecretKey>>>,
    agreements: Mutex<HashMap<Topic, Arc<AgreementKeys>>>,
}

impl KeyStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Generate a fresh ephemeral private key and retain it
    pub fn generate_private_key(&self) -> Arc<AgreementSecretKey> {
        let secret = Arc::new(AgreementSecretKey::generate());
        self.private_keys
            .lock()
            .unwrap()
            .insert(*secret.public_key(), secret.clone());
        secret
    }

    /// Look up a retained private key by its public half
    pub fn private_key(&self, public: &AgreementPublicKey) -> Option<Arc<AgreementSecretKey>> {
        self.private_keys.lock().unwrap().get(public).cloned()
    }

    /// Drop a private key once its handshake has settled
    pub fn remove_private_key(&self, public: &AgreementPublicKey) {
        self.private_keys.lock().unwrap().remove(public);
    }

    /// Install the agreement keys for a topic
    pub fn set_agreement(&self, topic: Topic, keys: AgreementKeys) {
        self.agreements.lock().unwrap().insert(topic, Arc::new(keys));
    }

    /// The agreement keys for a topic, if any
    pub fn agreement(&self, topic: &Topic) -> Option<Arc<AgreementKeys>> {
        self.agreements.lock().unwrap().get(topic).cloned()
    }

    /// Drop the agreement keys for a topic
    pub fn remove_agreement(&self, topic: &Topic) {
        self.agreements.lock().unwrap().remove(topic);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_private_key_lifecycle() {
        let store = KeyStore::new();

        let secret = store.generate_private_key();
        let public = *secret.public_key();

        assert!(store.private_key(&public).is_some());
        store.remove_private_key(&public);
        assert!(store.private_key(&public).is_none());
    }

    #[test]
    fn test_agreement_lifecycle() {
        let store = KeyStore::new();
        let alice = AgreementSecretKey::generate();
        let bob = AgreementSecretKey::generate();
        let keys = AgreementKeys::derive(&alice, bob.public_key());
        let topic = keys.settled_topic();

        assert!(store.agreement(&topic).is_none());
        store.set_agreement(topic.clone(), keys);
        assert!(store.agreement(&topic).is_some());
        store.remove_agreement(&topic);
        assert!(store.agreement(&topic).is_none());
    }

    #[test]
    fn test_agreement_is_shared_not_copied() {
        let store = KeyStore::new();
        let alice = AgreementSecretKey::generate();
        let bob = AgreementSecretKey::generate();
        let keys = AgreementKeys::derive(&alice, bob.public_key());
        let topic = keys.settled_topic();

        store.set_agreement(topic.clone(), keys);
        let a = store.agreement(&topic).unwrap();
        let b = store.agreement(&topic).unwrap();
        assert!(Arc::ptr_eq(&a, &b));
    }
}
