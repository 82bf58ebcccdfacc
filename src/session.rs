//! Per-peer double ratchet session.
//!
//! A session owns one send chain and one receive chain derived from the
//! handshake root key. The two peers derive the same pair of chains with the
//! roles swapped, so one side's send chain mirrors the other's receive chain.
//!
//! Out-of-order delivery is handled by caching the keys of skipped indices in
//! a bounded map. A decrypt that would overflow the cache is refused before any
//! state changes.
//!
//! A decrypt that steps the receive chain forward and then fails
//! authentication still leaves the chain advanced: the key for that index is
//! gone. Keys already sitting in the skipped cache are only removed once they
//! open a message successfully.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Builder;
use zeroize::Zeroizing;

use crate::config::CoreConfig;
use crate::crypto::kdf::{self, LABEL_RECEIVE, LABEL_SEND, LABEL_SESSION_ID};
use crate::crypto::{
    derive_root_key, AeadCodec, ChainKey, KeyPair, MessageKey, PeerPublicKey, RatchetChain, RootKey,
};
use crate::envelope::{header_aad, EncryptedEnvelope, EnvelopeMetadata, ENVELOPE_VERSION};
use crate::error::{CryptoError, Result};

/// Which side of the handshake this session sits on.
///
/// The side with the lexicographically smaller public key is the initiator;
/// the initiator sends on the `"send"` chain, the responder on `"receive"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionRole {
    Initiator,
    Responder,
}

impl SessionRole {
    pub fn for_keys(local: &PeerPublicKey, peer: &PeerPublicKey) -> Self {
        if local < peer {
            SessionRole::Initiator
        } else {
            SessionRole::Responder
        }
    }
}

/// Establish a session with a peer from the local key pair and their public key.
pub fn create_session(
    peer_id: impl Into<String>,
    my_key: &KeyPair,
    peer_public: &PeerPublicKey,
    config: &CoreConfig,
) -> Result<CryptoSession> {
    create_session_with_context(peer_id, my_key, peer_public, &[], config)
}

/// Like [`create_session`], mixing an agreed handshake context into the root.
///
/// Both peers must supply the same context. A fresh context gives a fresh
/// root key even when the long-term key pairs are unchanged.
pub fn create_session_with_context(
    peer_id: impl Into<String>,
    my_key: &KeyPair,
    peer_public: &PeerPublicKey,
    context: &[u8],
    config: &CoreConfig,
) -> Result<CryptoSession> {
    let local_public = my_key.public_key();
    if &local_public == peer_public {
        return Err(CryptoError::InvalidPeerKey("peer key equals local key".into()));
    }

    let shared = my_key.agree(peer_public)?;
    let role = SessionRole::for_keys(&local_public, peer_public);
    let (first, second) = match role {
        SessionRole::Initiator => (&local_public, peer_public),
        SessionRole::Responder => (peer_public, &local_public),
    };

    let mut salt = Vec::with_capacity(64 + context.len());
    salt.extend_from_slice(first.as_bytes());
    salt.extend_from_slice(second.as_bytes());
    salt.extend_from_slice(context);

    let root = derive_root_key(&shared, &salt)?;
    CryptoSession::initialize(peer_id, &root, role, config)
}

/// Ratchet state shared with one peer.
#[derive(Debug)]
pub struct CryptoSession {
    session_id: String,
    peer_id: String,
    send_chain: RatchetChain,
    receive_chain: RatchetChain,
    skipped_keys: BTreeMap<u64, MessageKey>,
    max_skipped_keys: usize,
    created_at: DateTime<Utc>,
    last_message_at: DateTime<Utc>,
    message_count: u64,
}

impl CryptoSession {
    /// Derive both chains and the session id from a root key.
    pub fn initialize(
        peer_id: impl Into<String>,
        root: &RootKey,
        role: SessionRole,
        config: &CoreConfig,
    ) -> Result<Self> {
        let (send_label, receive_label) = match role {
            SessionRole::Initiator => (LABEL_SEND, LABEL_RECEIVE),
            SessionRole::Responder => (LABEL_RECEIVE, LABEL_SEND),
        };

        let send_key = ChainKey::from_bytes(kdf::derive(root.as_bytes(), send_label)?);
        let receive_key = ChainKey::from_bytes(kdf::derive(root.as_bytes(), receive_label)?);
        let session_id = session_id_from_root(root)?;
        let now = Utc::now();

        let session = Self {
            session_id,
            peer_id: peer_id.into(),
            send_chain: RatchetChain::new(send_key).with_max_skip(config.max_skip),
            receive_chain: RatchetChain::new(receive_key).with_max_skip(config.max_skip),
            skipped_keys: BTreeMap::new(),
            max_skipped_keys: config.max_skipped_keys,
            created_at: now,
            last_message_at: now,
            message_count: 0,
        };
        log::debug!(
            "session {} initialized for peer {} as {:?}",
            session.session_id,
            session.peer_id,
            role
        );
        Ok(session)
    }

    /// Rebuild a session at a stored chain position. The skipped cache starts empty.
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn resume(
        session_id: String,
        peer_id: String,
        send_chain: RatchetChain,
        receive_chain: RatchetChain,
        config: &CoreConfig,
        created_at: DateTime<Utc>,
        last_message_at: DateTime<Utc>,
        message_count: u64,
    ) -> Self {
        Self {
            session_id,
            peer_id,
            send_chain: send_chain.with_max_skip(config.max_skip),
            receive_chain: receive_chain.with_max_skip(config.max_skip),
            skipped_keys: BTreeMap::new(),
            max_skipped_keys: config.max_skipped_keys,
            created_at,
            last_message_at,
            message_count,
        }
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn peer_id(&self) -> &str {
        &self.peer_id
    }

    /// Index the next outgoing message will use.
    pub fn send_index(&self) -> u64 {
        self.send_chain.index()
    }

    /// Lowest index not yet reached by the receive chain.
    pub fn receive_index(&self) -> u64 {
        self.receive_chain.index()
    }

    pub fn skipped_key_count(&self) -> usize {
        self.skipped_keys.len()
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn last_message_at(&self) -> DateTime<Utc> {
        self.last_message_at
    }

    pub fn message_count(&self) -> u64 {
        self.message_count
    }

    pub(crate) fn send_chain(&self) -> &RatchetChain {
        &self.send_chain
    }

    pub(crate) fn receive_chain(&self) -> &RatchetChain {
        &self.receive_chain
    }

    pub fn encrypt(&mut self, plaintext: &[u8]) -> Result<EncryptedEnvelope> {
        self.encrypt_with_metadata(plaintext, &[], EnvelopeMetadata::default())
    }

    pub fn encrypt_with_aad(&mut self, plaintext: &[u8], aad: &[u8]) -> Result<EncryptedEnvelope> {
        self.encrypt_with_metadata(plaintext, aad, EnvelopeMetadata::default())
    }

    /// Seal `plaintext` under the next send key.
    ///
    /// The send chain advances even if sealing fails, so a key is never used twice.
    pub fn encrypt_with_metadata(
        &mut self,
        plaintext: &[u8],
        aad: &[u8],
        metadata: EnvelopeMetadata,
    ) -> Result<EncryptedEnvelope> {
        let (key, index) = self.send_chain.step()?;
        let nonce = AeadCodec::generate_nonce();
        let header = header_aad(ENVELOPE_VERSION, &self.session_id, index, aad);
        let ciphertext = AeadCodec::seal(&key, &nonce, plaintext, &header)?;

        self.record_activity();
        log::debug!("session {} sealed message {}", self.session_id, index);

        Ok(EncryptedEnvelope::from_parts(
            ENVELOPE_VERSION,
            self.session_id.clone(),
            index,
            nonce,
            ciphertext,
            metadata,
        ))
    }

    pub fn decrypt(&mut self, envelope: &EncryptedEnvelope) -> Result<Vec<u8>> {
        self.decrypt_with_aad(envelope, &[])
    }

    /// Open an envelope addressed to this session.
    pub fn decrypt_with_aad(&mut self, envelope: &EncryptedEnvelope, aad: &[u8]) -> Result<Vec<u8>> {
        if envelope.session_id() != self.session_id {
            return Err(CryptoError::SessionMismatch {
                expected: self.session_id.clone(),
                received: envelope.session_id().to_string(),
            });
        }
        if envelope.version() != ENVELOPE_VERSION {
            return Err(CryptoError::UnsupportedVersion(envelope.version()));
        }

        let index = envelope.index();
        let aad = envelope.associated_data(aad);

        if index < self.receive_chain.index() {
            return self.open_skipped(envelope, index, &aad);
        }

        let gap = index - self.receive_chain.index();
        let limit = self.receive_chain.max_skip();
        if gap > limit {
            log::warn!("session {} refused gap of {} (limit {})", self.session_id, gap, limit);
            return Err(CryptoError::SkipLimitExceeded { requested: gap, limit });
        }
        let cached = self.skipped_keys.len() as u64 + gap;
        if cached > self.max_skipped_keys as u64 {
            log::warn!(
                "session {} skipped-key cache would hold {} keys (limit {})",
                self.session_id,
                cached,
                self.max_skipped_keys
            );
            return Err(CryptoError::SkipLimitExceeded {
                requested: cached,
                limit: self.max_skipped_keys as u64,
            });
        }

        let (skipped, key) = self.receive_chain.step_to(index)?;
        self.skipped_keys.extend(skipped);

        let plaintext = AeadCodec::open(&key, envelope.nonce(), envelope.ciphertext(), &aad)
            .inspect_err(|_| {
                log::warn!("session {} failed to authenticate message {}", self.session_id, index)
            })?;

        self.record_activity();
        log::debug!("session {} opened message {}", self.session_id, index);
        Ok(plaintext)
    }

    fn open_skipped(&mut self, envelope: &EncryptedEnvelope, index: u64, aad: &[u8]) -> Result<Vec<u8>> {
        let key = self
            .skipped_keys
            .get(&index)
            .ok_or(CryptoError::KeyNotFound { index })?;

        let plaintext = AeadCodec::open(key, envelope.nonce(), envelope.ciphertext(), aad)
            .inspect_err(|_| {
                log::warn!(
                    "session {} failed to authenticate skipped message {}",
                    self.session_id,
                    index
                )
            })?;

        // Dropping the removed key wipes it.
        self.skipped_keys.remove(&index);
        self.record_activity();
        log::debug!("session {} opened skipped message {}", self.session_id, index);
        Ok(plaintext)
    }

    fn record_activity(&mut self) {
        self.message_count += 1;
        self.last_message_at = Utc::now();
    }

    /// Wipe all key material held by the session.
    pub fn destroy(mut self) {
        self.skipped_keys.clear();
        log::debug!("session {} destroyed", self.session_id);
    }
}

fn session_id_from_root(root: &RootKey) -> Result<String> {
    let derived = Zeroizing::new(kdf::derive(root.as_bytes(), LABEL_SESSION_ID)?);
    let mut bytes = [0u8; 16];
    bytes.copy_from_slice(&derived[..16]);
    Ok(Builder::from_random_bytes(bytes).into_uuid().to_string())
}
