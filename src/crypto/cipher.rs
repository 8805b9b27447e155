//! ChaCha20-Poly1305 AEAD Encryption
//!
//! Every payload on a keyed topic is sealed with the topic's symmetric key.
//! Wire format: nonce || ciphertext || tag.

use chacha20poly1305::{
    aead::{Aead, KeyInit},
    ChaCha20Poly1305, Nonce,
};
use rand::RngCore;

use super::error::{CryptoError, CryptoResult};

/// Size of the encryption key in bytes
pub const KEY_SIZE: usize = 32;

/// Size of the nonce in bytes
pub const NONCE_SIZE: usize = 12;

/// Size of the authentication tag in bytes
pub const TAG_SIZE: usize = 16;

/// Symmetric cipher for relay payloads
pub struct Cipher;

impl Cipher {
    /// Encrypt data with authentication, using a fresh random nonce
    ///
    /// Returns: nonce || ciphertext || tag
    pub fn encrypt(key: &[u8; KEY_SIZE], plaintext: &[u8]) -> CryptoResult<Vec<u8>> {
        let cipher = ChaCha20Poly1305::new(key.into());

        let mut nonce_bytes = [0u8; NONCE_SIZE];
        rand::thread_rng().fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let ciphertext = cipher
            .encrypt(nonce, plaintext)
            .map_err(|e| CryptoError::EncryptionFailed(e.to_string()))?;

        let mut result = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
        result.extend_from_slice(&nonce_bytes);
        result.extend_from_slice(&ciphertext);
        Ok(result)
    }

    /// Decrypt data
    ///
    /// Input: nonce || ciphertext || tag
    pub fn decrypt(key: &[u8; KEY_SIZE], sealed: &[u8]) -> CryptoResult<Vec<u8>> {
        // Minimum size: nonce + tag
        if sealed.len() < NONCE_SIZE + TAG_SIZE {
            return Err(CryptoError::DecryptionFailed);
        }

        let cipher = ChaCha20Poly1305::new(key.into());

        let nonce = Nonce::from_slice(&sealed[..NONCE_SIZE]);
        let encrypted = &sealed[NONCE_SIZE..];

        cipher
            .decrypt(nonce, encrypted)
            .map_err(|_| CryptoError::DecryptionFailed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encrypt_decrypt() {
        let key = [42u8; KEY_SIZE];
        let plaintext = b"session payload";

        let sealed = Cipher::encrypt(&key, plaintext).unwrap();
        let opened = Cipher::decrypt(&key, &sealed).unwrap();

        assert_eq!(plaintext, opened.as_slice());
    }

    #[test]
    fn test_ciphertext_different_each_time() {
        let key = [42u8; KEY_SIZE];
        let plaintext = b"hello";

        let ct1 = Cipher::encrypt(&key, plaintext).unwrap();
        let ct2 = Cipher::encrypt(&key, plaintext).unwrap();

        // Different nonces mean different ciphertexts
        assert_ne!(ct1, ct2);
    }

    #[test]
    fn test_wrong_key_fails() {
        let key1 = [1u8; KEY_SIZE];
        let key2 = [2u8; KEY_SIZE];

        let sealed = Cipher::encrypt(&key1, b"secret").unwrap();
        assert!(Cipher::decrypt(&key2, &sealed).is_err());
    }

    #[test]
    fn test_tampered_ciphertext_fails() {
        let key = [42u8; KEY_SIZE];

        let mut sealed = Cipher::encrypt(&key, b"hello").unwrap();
        if let Some(byte) = sealed.get_mut(NONCE_SIZE + 1) {
            *byte ^= 0xFF;
        }

        assert!(Cipher::decrypt(&key, &sealed).is_err());
    }

    #[test]
    fn test_truncated_input_fails() {
        let key = [42u8; KEY_SIZE];
        assert!(Cipher::decrypt(&key, &[0u8; NONCE_SIZE]).is_err());
    }

    #[test]
    fn test_empty_plaintext() {
        let key = [42u8; KEY_SIZE];

        let sealed = Cipher::encrypt(&key, b"").unwrap();
        let opened = Cipher::decrypt(&key, &sealed).unwrap();

        assert!(opened.is_empty());
    }
}
