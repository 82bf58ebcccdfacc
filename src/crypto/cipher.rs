//! AES-256-GCM sealing for message payloads.
//!
//! Each message key is used for exactly one operation, so a random 96-bit
//! nonce per call is sufficient.

use aes_gcm::{
    aead::{Aead, KeyInit, Payload},
    Aes256Gcm, Key, Nonce,
};
use rand::{rngs::OsRng, RngCore};

use crate::crypto::MessageKey;
use crate::error::{CryptoError, Result};

/// Nonce length in bytes.
pub const NONCE_LEN: usize = 12;

/// Authentication tag length in bytes (128-bit tag).
pub const TAG_LEN: usize = 16;

/// Stateless AEAD codec over message keys.
pub struct AeadCodec;

impl AeadCodec {
    /// Draw a fresh nonce from the OS CSPRNG.
    pub fn generate_nonce() -> [u8; NONCE_LEN] {
        let mut nonce = [0u8; NONCE_LEN];
        OsRng.fill_bytes(&mut nonce);
        nonce
    }

    /// Encrypt `plaintext`, returning `ciphertext || tag`.
    pub fn seal(
        key: &MessageKey,
        nonce: &[u8; NONCE_LEN],
        plaintext: &[u8],
        aad: &[u8],
    ) -> Result<Vec<u8>> {
        let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key.key()));
        cipher
            .encrypt(Nonce::from_slice(nonce), Payload { msg: plaintext, aad })
            .map_err(|_| CryptoError::EncryptionFailed)
    }

    /// Verify and decrypt `ciphertext || tag`.
    pub fn open(
        key: &MessageKey,
        nonce: &[u8; NONCE_LEN],
        ciphertext: &[u8],
        aad: &[u8],
    ) -> Result<Vec<u8>> {
        if ciphertext.len() < TAG_LEN {
            return Err(CryptoError::AuthenticationFailed);
        }
        let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key.key()));
        cipher
            .decrypt(Nonce::from_slice(nonce), Payload { msg: ciphertext, aad })
            .map_err(|_| CryptoError::AuthenticationFailed)
    }
}
