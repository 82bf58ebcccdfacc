//! X25519 key pairs and Diffie-Hellman key agreement.
//!
//! Peer public keys are validated before use: a key must be exactly 32 bytes,
//! must not be the all-zero point, and must produce a contributory shared
//! secret (low-order points are rejected).

use base64::{engine::general_purpose::STANDARD, Engine as _};
use rand::rngs::OsRng;
use sha2::{Digest, Sha256};
use x25519_dalek::{PublicKey, StaticSecret};
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

use crate::error::{CryptoError, Result};

/// Length of an encoded X25519 public key.
pub const PUBLIC_KEY_LEN: usize = 32;

/// A local X25519 identity key pair.
#[derive(Clone)]
pub struct KeyPair {
    secret: StaticSecret,
    public: PublicKey,
}

impl KeyPair {
    /// Generate a new random key pair from the OS CSPRNG.
    pub fn generate() -> Self {
        let secret = StaticSecret::random_from_rng(OsRng);
        let public = PublicKey::from(&secret);
        Self { secret, public }
    }

    /// Rebuild a key pair from private key bytes held by a key store.
    pub fn from_private_key(mut private: [u8; 32]) -> Self {
        let secret = StaticSecret::from(private);
        private.zeroize();
        let public = PublicKey::from(&secret);
        Self { secret, public }
    }

    /// Export the private half for a key store. The buffer is wiped on drop.
    pub fn export_private_key(&self) -> Zeroizing<[u8; 32]> {
        Zeroizing::new(self.secret.to_bytes())
    }

    /// The public half, in the form peers receive it.
    pub fn public_key(&self) -> PeerPublicKey {
        PeerPublicKey(*self.public.as_bytes())
    }

    /// Perform X25519 key agreement with a peer.
    pub fn agree(&self, peer: &PeerPublicKey) -> Result<SharedSecret> {
        let shared = self.secret.diffie_hellman(&PublicKey::from(peer.0));
        if !shared.was_contributory() {
            log::warn!("rejected low-order peer key {}", peer.fingerprint_hex());
            return Err(CryptoError::InvalidPeerKey("low-order point".into()));
        }
        Ok(SharedSecret(*shared.as_bytes()))
    }
}

impl std::fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyPair")
            .field("public", &hex::encode(self.public.as_bytes()))
            .field("private", &"[REDACTED]")
            .finish()
    }
}

/// Perform key agreement between a local key pair and a peer public key.
pub fn agree(my_key: &KeyPair, peer: &PeerPublicKey) -> Result<SharedSecret> {
    my_key.agree(peer)
}

/// A validated X25519 public key received from a peer.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PeerPublicKey([u8; PUBLIC_KEY_LEN]);

impl PeerPublicKey {
    /// Decode a public key from raw bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let key: [u8; PUBLIC_KEY_LEN] = bytes.try_into().map_err(|_| {
            CryptoError::InvalidPeerKey(format!(
                "expected {PUBLIC_KEY_LEN} bytes, got {}",
                bytes.len()
            ))
        })?;
        if key == [0u8; PUBLIC_KEY_LEN] {
            return Err(CryptoError::InvalidPeerKey("identity point".into()));
        }
        Ok(Self(key))
    }

    /// Decode a public key from standard base64.
    pub fn from_base64(encoded: &str) -> Result<Self> {
        let bytes = STANDARD
            .decode(encoded.trim())
            .map_err(|e| CryptoError::InvalidPeerKey(format!("base64: {e}")))?;
        Self::from_bytes(&bytes)
    }

    /// Encode as standard base64.
    pub fn to_base64(&self) -> String {
        STANDARD.encode(self.0)
    }

    pub fn as_bytes(&self) -> &[u8; PUBLIC_KEY_LEN] {
        &self.0
    }

    /// SHA-256 of the key as hex, in space-separated groups of four, for
    /// comparing out of band.
    pub fn fingerprint(&self) -> String {
        let digest = hex::encode(Sha256::digest(self.0));
        let mut grouped = String::with_capacity(digest.len() + digest.len() / 4);
        for (i, c) in digest.chars().enumerate() {
            if i > 0 && i % 4 == 0 {
                grouped.push(' ');
            }
            grouped.push(c);
        }
        grouped
    }

    /// Short hex prefix used in log lines.
    pub(crate) fn fingerprint_hex(&self) -> String {
        hex::encode(&self.0[..4])
    }
}

impl std::fmt::Debug for PeerPublicKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "PeerPublicKey({})", hex::encode(self.0))
    }
}

/// Raw Diffie-Hellman output. Only ever fed into key derivation.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct SharedSecret([u8; 32]);

impl SharedSecret {
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl std::fmt::Debug for SharedSecret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SharedSecret([REDACTED])")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_pair_generation() {
        let kp = KeyPair::generate();
        assert_ne!(kp.public_key().as_bytes(), &[0u8; 32]);
    }

    #[test]
    fn test_fingerprint_format() {
        let fingerprint = KeyPair::generate().public_key().fingerprint();
        let groups: Vec<&str> = fingerprint.split(' ').collect();
        assert_eq!(groups.len(), 16);
        assert!(groups.iter().all(|g| g.len() == 4));
    }

    #[test]
    fn test_dh_agreement() {
        let alice = KeyPair::generate();
        let bob = KeyPair::generate();

        let alice_shared = alice.agree(&bob.public_key()).unwrap();
        let bob_shared = agree(&bob, &alice.public_key()).unwrap();

        assert_eq!(alice_shared.as_bytes(), bob_shared.as_bytes());
    }

    #[test]
    fn test_private_key_round_trip() {
        let kp = KeyPair::generate();
        let restored = KeyPair::from_private_key(*kp.export_private_key());
        assert_eq!(kp.public_key(), restored.public_key());
    }

    #[test]
    fn test_rejects_wrong_length() {
        let err = PeerPublicKey::from_bytes(&[1u8; 31]).unwrap_err();
        assert!(matches!(err, CryptoError::InvalidPeerKey(_)));
    }

    #[test]
    fn test_rejects_identity_point() {
        let err = PeerPublicKey::from_bytes(&[0u8; 32]).unwrap_err();
        assert!(matches!(err, CryptoError::InvalidPeerKey(_)));
    }

    #[test]
    fn test_rejects_low_order_point() {
        // u = 1 has order 4 on Curve25519.
        let mut low_order = [0u8; 32];
        low_order[0] = 1;
        let peer = PeerPublicKey::from_bytes(&low_order).unwrap();

        let err = KeyPair::generate().agree(&peer).unwrap_err();
        assert!(matches!(err, CryptoError::InvalidPeerKey(_)));
    }

    #[test]
    fn test_base64_round_trip() {
        let public = KeyPair::generate().public_key();
        let decoded = PeerPublicKey::from_base64(&public.to_base64()).unwrap();
        assert_eq!(public, decoded);
    }

    #[test]
    fn test_rejects_bad_base64() {
        let err = PeerPublicKey::from_base64("not base64 !!").unwrap_err();
        assert!(matches!(err, CryptoError::InvalidPeerKey(_)));
    }

    #[test]
    fn test_debug_redacts_private_key() {
        let rendered = format!("{:?}", KeyPair::generate());
        assert!(rendered.contains("[REDACTED]"));
    }
}
