//! X25519 Key Agreement
//!
//! Each sequence handshake uses a fresh ephemeral X25519 keypair. The raw
//! Diffie-Hellman output is the sequence's symmetric key, and its SHA-256
//! digest becomes the settled topic both sides converge on.

use rand::rngs::OsRng;
use sha2::{Digest, Sha256};
use x25519_dalek::{PublicKey as X25519Public, StaticSecret};
use zeroize::ZeroizeOnDrop;

use super::error::{CryptoError, CryptoResult};
use crate::topic::Topic;

/// Size of keys and shared secrets in bytes
pub const KEY_SIZE: usize = 32;

/// A public key for key agreement (X25519)
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct AgreementPublicKey(pub [u8; KEY_SIZE]);

impl AgreementPublicKey {
    /// Create from raw bytes
    pub fn from_bytes(bytes: &[u8]) -> CryptoResult<Self> {
        if bytes.len() != KEY_SIZE {
            return Err(CryptoError::InvalidKeyLength {
                expected: KEY_SIZE,
                actual: bytes.len(),
            });
        }
        let mut arr = [0u8; KEY_SIZE];
        arr.copy_from_slice(bytes);
        Ok(AgreementPublicKey(arr))
    }

    /// Get raw bytes
    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.0
    }

    /// Convert to hex
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Create from hex
    pub fn from_hex(s: &str) -> CryptoResult<Self> {
        let bytes = hex::decode(s).map_err(|_| CryptoError::InvalidPublicKey)?;
        Self::from_bytes(&bytes)
    }
}

impl std::fmt::Debug for AgreementPublicKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "AgreementPublicKey({}...)", &self.to_hex()[..16])
    }
}

impl serde::Serialize for AgreementPublicKey {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> serde::Deserialize<'de> for AgreementPublicKey {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Self::from_hex(&s).map_err(serde::de::Error::custom)
    }
}

/// Shared secret derived from key agreement
///
/// Used directly as the AEAD key for the sequence's settled topic.
#[derive(Clone, ZeroizeOnDrop)]
pub struct SharedSecret {
    secret: [u8; KEY_SIZE],
}

impl SharedSecret {
    /// Get the raw bytes (be careful with this!)
    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.secret
    }

    /// The settled topic for this agreement: SHA-256 of the shared secret
    pub fn settled_topic(&self) -> Topic {
        let digest: [u8; KEY_SIZE] = Sha256::digest(self.secret).into();
        Topic::from_raw(digest)
    }
}

/// An ephemeral keypair for key agreement
///
/// Generated once per sequence handshake and dropped at settlement.
#[derive(ZeroizeOnDrop)]
pub struct AgreementSecretKey {
    #[zeroize(skip)]
    public_key: AgreementPublicKey,
    secret_key: [u8; KEY_SIZE],
}

impl AgreementSecretKey {
    /// Generate a new ephemeral keypair
    pub fn generate() -> Self {
        let secret = StaticSecret::random_from_rng(OsRng);
        let public = X25519Public::from(&secret);

        AgreementSecretKey {
            public_key: AgreementPublicKey(public.to_bytes()),
            secret_key: secret.to_bytes(),
        }
    }

    /// Get the public key to share with the peer
    pub fn public_key(&self) -> &AgreementPublicKey {
        &self.public_key
    }

    /// Compute the shared secret with a peer's public key
    pub fn diffie_hellman(&self, peer_public: &AgreementPublicKey) -> SharedSecret {
        let secret = StaticSecret::from(self.secret_key);
        let peer = X25519Public::from(peer_public.0);
        let shared = secret.diffie_hellman(&peer);

        SharedSecret {
            secret: shared.to_bytes(),
        }
    }
}

/// The full key material bound to a topic
///
/// Both public halves are kept so the controller of a settled sequence can be
/// identified and the agreement re-derived after a restore.
#[derive(Clone)]
pub struct AgreementKeys {
    /// The raw DH output, used as the topic's symmetric key
    pub shared: SharedSecret,
    /// Our public half
    pub self_public: AgreementPublicKey,
    /// The peer's public half
    pub peer_public: AgreementPublicKey,
}

impl AgreementKeys {
    /// Run the agreement between our secret key and the peer's public key
    pub fn derive(secret: &AgreementSecretKey, peer_public: &AgreementPublicKey) -> Self {
        AgreementKeys {
            shared: secret.diffie_hellman(peer_public),
            self_public: *secret.public_key(),
            peer_public: *peer_public,
        }
    }

    /// The settled topic both peers converge on
    pub fn settled_topic(&self) -> Topic {
        self.shared.settled_topic()
    }

    /// The AEAD key for payloads on the settled topic
    pub fn symmetric_key(&self) -> &[u8; KEY_SIZE] {
        self.shared.as_bytes()
    }
}
