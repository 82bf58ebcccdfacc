//! Error types for the messaging core.
//!
//! Every cryptographic failure surfaces as a typed [`CryptoError`] so callers
//! can tell a wrong key apart from malformed input or a replayed message.

use thiserror::Error;

/// Errors raised by key agreement, ratcheting, sealing and session bookkeeping.
#[derive(Debug, Error)]
pub enum CryptoError {
    /// The peer public key failed to decode or is a weak point.
    #[error("invalid peer key: {0}")]
    InvalidPeerKey(String),

    /// The envelope belongs to another session.
    #[error("session mismatch: envelope for {received}, session is {expected}")]
    SessionMismatch { expected: String, received: String },

    /// The message key was already consumed or can no longer be recovered.
    #[error("no message key for index {index}")]
    KeyNotFound { index: u64 },

    /// The index gap (or the skipped-key cache) exceeds the configured bound.
    #[error("skip limit exceeded: {requested} keys requested, limit is {limit}")]
    SkipLimitExceeded { requested: u64, limit: u64 },

    /// The AEAD tag did not verify.
    #[error("authentication failed")]
    AuthenticationFailed,

    /// The AEAD refused to seal; keys are freshly derived so this is unexpected.
    #[error("encryption failed")]
    EncryptionFailed,

    /// Key derivation was handed an empty input key.
    #[error("empty key material")]
    EmptyKeyMaterial,

    /// The chain index reached its maximum value.
    #[error("ratchet chain exhausted at index {index}")]
    ChainExhausted { index: u64 },

    /// The envelope or record carries a version this build does not speak.
    #[error("unsupported version {0}")]
    UnsupportedVersion(u32),

    /// The envelope could not be decoded.
    #[error("malformed envelope: {0}")]
    MalformedEnvelope(String),

    /// No session exists for the given peer.
    #[error("no session for peer {0}")]
    SessionNotFound(String),

    /// A contact with this id is already registered.
    #[error("contact already exists: {0}")]
    ContactExists(String),

    /// No contact with this id is registered.
    #[error("contact not found: {0}")]
    ContactNotFound(String),

    /// The session store failed.
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Errors raised by session persistence backends.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("not found")]
    NotFound,
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("corrupt record: {0}")]
    Corrupt(String),
    #[error("lock poisoned")]
    LockPoisoned,
}

/// Reasons a decrypted message must not be shown yet.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PolicyError {
    #[error("message is time-locked for another {remaining_ms} ms")]
    TimeLocked { remaining_ms: i64 },
    #[error("{distance_m:.0} m from the geofence centre")]
    OutsideGeofence { distance_m: f64 },
}

/// Result alias for core operations.
pub type Result<T> = std::result::Result<T, CryptoError>;

/// Result alias for store operations.
pub type StoreResult<T> = std::result::Result<T, StoreError>;
