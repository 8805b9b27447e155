//! Cryptographic primitives for the pairing/session handshake
//!
//! This module provides the building blocks the engines rely on:
//! - `exchange`: X25519 ECDH agreement, one ephemeral keypair per sequence
//! - `cipher`: ChaCha20-Poly1305 AEAD encryption of relay payloads
//! - `store`: ownership of private keys and per-topic agreement keys

pub mod cipher;
pub mod error;
pub mod exchange;
pub mod store;

// Re-export commonly used types
pub use cipher::Cipher;
pub use error::{CryptoError, CryptoResult};
pub use exchange::{AgreementKeys, AgreementPublicKey, AgreementSecretKey, SharedSecret};
pub use store::KeyStore;

/// Generate cryptographically secure random bytes
pub fn random_bytes<const N: usize>() -> [u8; N] {
    use rand::RngCore;
    let mut bytes = [0u8; N];
    rand::thread_rng().fill_bytes(&mut bytes);
    bytes
}

#[cfg(test)]
mod integration_tests {
    use super::*;

    #[test]
    fn test_agreement_and_encryption_flow() {
        // Two parties derive the same agreement from opposite key halves
        let proposer = AgreementSecretKey::generate();
        let responder = AgreementSecretKey::generate();

        let proposer_keys = AgreementKeys::derive(&proposer, responder.public_key());
        let responder_keys = AgreementKeys::derive(&responder, proposer.public_key());

        assert_eq!(
            proposer_keys.shared.as_bytes(),
            responder_keys.shared.as_bytes()
        );
        assert_eq!(proposer_keys.settled_topic(), responder_keys.settled_topic());

        // The shared secret doubles as the AEAD key for the settled topic
        let message = b"payload bound for the settled topic";
        let sealed = Cipher::encrypt(proposer_keys.symmetric_key(), message).unwrap();
        let opened = Cipher::decrypt(responder_keys.symmetric_key(), &sealed).unwrap();
        assert_eq!(message, opened.as_slice());
    }
}
