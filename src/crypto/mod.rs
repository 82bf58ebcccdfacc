//! Cryptographic primitives for the messaging core.
//!
//! This module provides:
//! - X25519 key agreement with peer key validation
//! - HKDF-SHA256 key derivation
//! - The single-direction ratchet chain
//! - AES-256-GCM sealing

mod keypair;
pub mod kdf;
mod chain;
mod cipher;

pub use keypair::{agree, KeyPair, PeerPublicKey, SharedSecret, PUBLIC_KEY_LEN};
pub use kdf::{derive, derive_root_key, RootKey, KEY_LEN};
pub use chain::{ChainKey, MessageKey, RatchetChain, SkippedKeys};
pub use cipher::{AeadCodec, NONCE_LEN, TAG_LEN};
