//! HKDF-SHA256 key derivation.
//!
//! Every symmetric key in a session descends from the root key through
//! [`derive`], keyed by a context label.

use hkdf::Hkdf;
use sha2::Sha256;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::crypto::SharedSecret;
use crate::error::{CryptoError, Result};

/// Length of every derived key.
pub const KEY_LEN: usize = 32;

pub(crate) const LABEL_SEND: &[u8] = b"send";
pub(crate) const LABEL_RECEIVE: &[u8] = b"receive";
pub(crate) const LABEL_RATCHET: &[u8] = b"ratchet";
pub(crate) const LABEL_ROOT: &[u8] = b"root";
pub(crate) const LABEL_SESSION_ID: &[u8] = b"session-id";
const LABEL_MESSAGE: &[u8] = b"msg";

/// Derive a 32-byte key from `input_key` under `label`.
///
/// Same inputs always produce the same output; different labels give
/// unrelated keys. Empty input keys are rejected.
pub fn derive(input_key: &[u8], label: &[u8]) -> Result<[u8; KEY_LEN]> {
    derive_salted(None, input_key, label)
}

fn derive_salted(salt: Option<&[u8]>, input_key: &[u8], label: &[u8]) -> Result<[u8; KEY_LEN]> {
    if input_key.is_empty() {
        return Err(CryptoError::EmptyKeyMaterial);
    }
    let hkdf = Hkdf::<Sha256>::new(salt, input_key);
    let mut okm = [0u8; KEY_LEN];
    let Ok(()) = hkdf.expand(label, &mut okm) else {
        unreachable!("32 bytes is a valid HKDF-SHA256 output length");
    };
    Ok(okm)
}

/// Label binding a message key to its chain index: `"msg" || index` (big-endian).
pub fn message_label(index: u64) -> [u8; 11] {
    let mut label = [0u8; 11];
    label[..3].copy_from_slice(LABEL_MESSAGE);
    label[3..].copy_from_slice(&index.to_be_bytes());
    label
}

/// Root secret of a session, derived once from the handshake output.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct RootKey([u8; KEY_LEN]);

impl RootKey {
    pub fn from_bytes(bytes: [u8; KEY_LEN]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; KEY_LEN] {
        &self.0
    }
}

impl std::fmt::Debug for RootKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("RootKey([REDACTED])")
    }
}

/// Turn a Diffie-Hellman output into a root key.
///
/// `salt` binds the root to the handshake transcript (both public keys and any
/// caller-supplied context), so the same shared secret under a new context
/// yields an unrelated session.
pub fn derive_root_key(shared: &SharedSecret, salt: &[u8]) -> Result<RootKey> {
    let salt = (!salt.is_empty()).then_some(salt);
    derive_salted(salt, shared.as_bytes(), LABEL_ROOT).map(RootKey)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_derive_is_deterministic() {
        let a = derive(b"input key material", b"label").unwrap();
        let b = derive(b"input key material", b"label").unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_labels_separate_outputs() {
        let key = [0x42u8; 32];
        let send = derive(&key, LABEL_SEND).unwrap();
        let receive = derive(&key, LABEL_RECEIVE).unwrap();
        let ratchet = derive(&key, LABEL_RATCHET).unwrap();

        assert_ne!(send, receive);
        assert_ne!(send, ratchet);
        assert_ne!(receive, ratchet);
    }

    #[test]
    fn test_message_labels_differ_per_index() {
        let key = [0x42u8; 32];
        let k0 = derive(&key, &message_label(0)).unwrap();
        let k1 = derive(&key, &message_label(1)).unwrap();
        assert_ne!(k0, k1);
    }

    #[test]
    fn test_message_label_layout() {
        let label = message_label(0x0102);
        assert_eq!(&label[..3], b"msg");
        assert_eq!(&label[3..], &[0, 0, 0, 0, 0, 0, 0x01, 0x02]);
    }

    #[test]
    fn test_rejects_empty_input() {
        assert!(matches!(derive(&[], b"label"), Err(CryptoError::EmptyKeyMaterial)));
    }

    #[test]
    fn test_empty_label_is_allowed() {
        assert!(derive(b"key", b"").is_ok());
    }
}
