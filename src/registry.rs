//! Per-peer session table.
//!
//! [`SessionRegistry`] owns the local key pair, the sessions keyed by peer id
//! and the store they are persisted to. Each session sits behind its own
//! mutex, so operations on one peer are serialized while different peers
//! proceed in parallel. Every successful encrypt or decrypt writes the new
//! chain position to the store before returning.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::CoreConfig;
use crate::crypto::{KeyPair, PeerPublicKey};
use crate::envelope::{self, EncryptedEnvelope, EnvelopeMetadata};
use crate::error::{CryptoError, Result, StoreError};
use crate::session::{create_session_with_context, CryptoSession};
use crate::store::{MemoryStore, SessionStore};

type SharedSession = Arc<Mutex<CryptoSession>>;

/// Snapshot of one peer's session for contact lists.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerSummary {
    pub peer_id: String,
    pub session_id: String,
    pub created_at: DateTime<Utc>,
    pub last_message_at: DateTime<Utc>,
    pub message_count: u64,
    pub send_index: u64,
    pub receive_index: u64,
}

impl PeerSummary {
    fn of(session: &CryptoSession) -> Self {
        Self {
            peer_id: session.peer_id().to_string(),
            session_id: session.session_id().to_string(),
            created_at: session.created_at(),
            last_message_at: session.last_message_at(),
            message_count: session.message_count(),
            send_index: session.send_index(),
            receive_index: session.receive_index(),
        }
    }
}

/// A decrypted armored message together with the peer it was routed to.
#[derive(Debug, Clone, PartialEq)]
pub struct ReceivedMessage {
    pub peer_id: String,
    pub plaintext: Vec<u8>,
    pub metadata: EnvelopeMetadata,
}

/// Sessions for every known peer plus their persistence.
pub struct SessionRegistry {
    config: CoreConfig,
    key_pair: KeyPair,
    store: Box<dyn SessionStore>,
    sessions: RwLock<HashMap<String, SharedSession>>,
}

impl SessionRegistry {
    pub fn new(config: CoreConfig, key_pair: KeyPair, store: Box<dyn SessionStore>) -> Self {
        Self {
            config,
            key_pair,
            store,
            sessions: RwLock::new(HashMap::new()),
        }
    }

    /// Registry backed by a [`MemoryStore`].
    pub fn in_memory(config: CoreConfig, key_pair: KeyPair) -> Self {
        Self::new(config, key_pair, Box::new(MemoryStore::new()))
    }

    pub fn config(&self) -> &CoreConfig {
        &self.config
    }

    pub fn public_key(&self) -> PeerPublicKey {
        self.key_pair.public_key()
    }

    /// Establish (or replace) the session with `peer_id`. Returns the session id.
    pub fn create_session(&self, peer_id: &str, peer_public: &PeerPublicKey) -> Result<String> {
        self.create_session_with_context(peer_id, peer_public, &[])
    }

    /// Like [`create_session`](Self::create_session) with a handshake context
    /// mixed into the root key.
    pub fn create_session_with_context(
        &self,
        peer_id: &str,
        peer_public: &PeerPublicKey,
        context: &[u8],
    ) -> Result<String> {
        let session =
            create_session_with_context(peer_id, &self.key_pair, peer_public, context, &self.config)?;
        self.store.save(&session)?;

        let session_id = session.session_id().to_string();
        let previous = self
            .sessions
            .write()
            .map_err(poisoned)?
            .insert(peer_id.to_string(), Arc::new(Mutex::new(session)));
        if previous.is_some() {
            log::info!("replaced session for peer {}", peer_id);
        }
        log::debug!("session {} created for peer {}", session_id, peer_id);
        Ok(session_id)
    }

    pub fn has_session(&self, peer_id: &str) -> Result<bool> {
        Ok(self.sessions.read().map_err(poisoned)?.contains_key(peer_id))
    }

    pub fn encrypt(&self, peer_id: &str, plaintext: &[u8]) -> Result<EncryptedEnvelope> {
        self.encrypt_with_metadata(peer_id, plaintext, EnvelopeMetadata::default())
    }

    /// Seal a message for `peer_id` carrying unlock metadata.
    ///
    /// If the new position cannot be persisted the store error is returned and
    /// the envelope discarded; the in-memory chain has still moved past its key.
    pub fn encrypt_with_metadata(
        &self,
        peer_id: &str,
        plaintext: &[u8],
        metadata: EnvelopeMetadata,
    ) -> Result<EncryptedEnvelope> {
        self.with_session(peer_id, |session| {
            session.encrypt_with_metadata(plaintext, &[], metadata)
        })
    }

    /// Open an envelope from `peer_id`.
    ///
    /// A failed decrypt that still moved the receive chain is persisted too,
    /// so a restore never brings back a spent position.
    pub fn decrypt(&self, peer_id: &str, envelope: &EncryptedEnvelope) -> Result<Vec<u8>> {
        self.with_session(peer_id, |session| session.decrypt(envelope))
    }

    /// Run `op` under the peer's lock and save the session afterwards if the
    /// call succeeded or moved either chain.
    fn with_session<T>(
        &self,
        peer_id: &str,
        op: impl FnOnce(&mut CryptoSession) -> Result<T>,
    ) -> Result<T> {
        let shared = self.session(peer_id)?;
        let mut session = shared.lock().map_err(poisoned)?;

        let before = (session.send_index(), session.receive_index());
        let result = op(&mut *session);
        let moved = (session.send_index(), session.receive_index()) != before;

        if result.is_ok() || moved {
            if let Err(save_err) = self.store.save(&session) {
                return match result {
                    Ok(_) => Err(save_err),
                    Err(original) => {
                        log::warn!(
                            "could not persist advanced session for peer {}: {}",
                            peer_id,
                            save_err
                        );
                        Err(original)
                    }
                };
            }
        }
        result
    }

    /// Decode an armored envelope, route it to its peer by session id and open it.
    pub fn decrypt_armored(&self, text: &str) -> Result<ReceivedMessage> {
        let envelope = EncryptedEnvelope::dearmor(text)?;
        let peer_id = self
            .peer_for_session(envelope.session_id())?
            .ok_or_else(|| CryptoError::SessionNotFound(envelope.session_id().to_string()))?;
        let plaintext = self.decrypt(&peer_id, &envelope)?;
        Ok(ReceivedMessage {
            peer_id,
            plaintext,
            metadata: envelope.metadata().clone(),
        })
    }

    /// Peer whose session produced an armored envelope, if it is one of ours.
    pub fn detect_peer(&self, text: &str) -> Result<Option<String>> {
        if !envelope::looks_armored(text) {
            return Ok(None);
        }
        match envelope::session_id_hint(text) {
            Ok(session_id) => self.peer_for_session(&session_id),
            Err(e) => {
                log::debug!("armored text did not decode: {}", e);
                Ok(None)
            }
        }
    }

    /// Write a peer's current chain position to the store.
    pub fn persist(&self, peer_id: &str) -> Result<()> {
        let shared = self.session(peer_id)?;
        let session = shared.lock().map_err(poisoned)?;
        self.store.save(&session)
    }

    /// Load a peer's session from the store. Returns `false` if none is stored.
    pub fn restore(&self, peer_id: &str) -> Result<bool> {
        let Some(session) = self.store.load(peer_id, &self.config)? else {
            return Ok(false);
        };
        log::debug!("restored session {} for peer {}", session.session_id(), peer_id);
        self.sessions
            .write()
            .map_err(poisoned)?
            .insert(peer_id.to_string(), Arc::new(Mutex::new(session)));
        Ok(true)
    }

    /// Load every stored session. Records that fail validation are skipped.
    pub fn restore_all(&self) -> Result<usize> {
        let mut restored = 0;
        for peer_id in self.store.list_peers()? {
            match self.restore(&peer_id) {
                Ok(true) => restored += 1,
                Ok(false) => {}
                Err(e) => log::warn!("skipping stored session for peer {}: {}", peer_id, e),
            }
        }
        Ok(restored)
    }

    /// Drop a peer's session, wipe its keys and delete the stored record.
    pub fn remove_peer(&self, peer_id: &str) -> Result<()> {
        let removed = self.sessions.write().map_err(poisoned)?.remove(peer_id);
        if let Some(shared) = removed {
            // Another thread may still hold a clone; its keys wipe when that drops.
            if let Ok(mutex) = Arc::try_unwrap(shared) {
                mutex.into_inner().map_err(poisoned)?.destroy();
            }
        }
        self.store.delete_session(peer_id)?;
        log::debug!("removed peer {}", peer_id);
        Ok(())
    }

    /// Summaries of all live sessions, ordered by peer id.
    pub fn peers(&self) -> Result<Vec<PeerSummary>> {
        let sessions: Vec<SharedSession> =
            self.sessions.read().map_err(poisoned)?.values().cloned().collect();
        let mut summaries = sessions
            .iter()
            .map(|shared| shared.lock().map(|s| PeerSummary::of(&s)).map_err(poisoned))
            .collect::<Result<Vec<_>>>()?;
        summaries.sort_by(|a, b| a.peer_id.cmp(&b.peer_id));
        Ok(summaries)
    }

    fn session(&self, peer_id: &str) -> Result<SharedSession> {
        self.sessions
            .read()
            .map_err(poisoned)?
            .get(peer_id)
            .cloned()
            .ok_or_else(|| CryptoError::SessionNotFound(peer_id.to_string()))
    }

    fn peer_for_session(&self, session_id: &str) -> Result<Option<String>> {
        let sessions: Vec<(String, SharedSession)> = self
            .sessions
            .read()
            .map_err(poisoned)?
            .iter()
            .map(|(peer, shared)| (peer.clone(), Arc::clone(shared)))
            .collect();
        for (peer_id, shared) in sessions {
            if shared.lock().map_err(poisoned)?.session_id() == session_id {
                return Ok(Some(peer_id));
            }
        }
        Ok(None)
    }
}

impl std::fmt::Debug for SessionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionRegistry")
            .field("config", &self.config)
            .field("public_key", &self.key_pair.public_key())
            .finish_non_exhaustive()
    }
}

fn poisoned<T>(_: T) -> CryptoError {
    StoreError::LockPoisoned.into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StoreResult;
    use crate::store::FileStore;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::thread;

    /// Memory store whose writes can be switched off.
    struct FlakyStore {
        inner: MemoryStore,
        failing: Arc<AtomicBool>,
    }

    impl SessionStore for FlakyStore {
        fn get_session(&self, peer_id: &str) -> StoreResult<Option<Vec<u8>>> {
            self.inner.get_session(peer_id)
        }

        fn has_session(&self, peer_id: &str) -> StoreResult<bool> {
            self.inner.has_session(peer_id)
        }

        fn put_session(&self, peer_id: &str, record: &[u8]) -> StoreResult<()> {
            if self.failing.load(Ordering::SeqCst) {
                return Err(StoreError::Io(std::io::Error::other("disk full")));
            }
            self.inner.put_session(peer_id, record)
        }

        fn delete_session(&self, peer_id: &str) -> StoreResult<()> {
            self.inner.delete_session(peer_id)
        }

        fn list_peers(&self) -> StoreResult<Vec<String>> {
            self.inner.list_peers()
        }
    }

    fn forge(envelope: &EncryptedEnvelope) -> EncryptedEnvelope {
        let mut ciphertext = envelope.ciphertext().to_vec();
        ciphertext[0] ^= 0x01;
        EncryptedEnvelope::from_parts(
            envelope.version(),
            envelope.session_id(),
            envelope.index(),
            *envelope.nonce(),
            ciphertext,
            EnvelopeMetadata::default(),
        )
    }

    fn receive_index(registry: &SessionRegistry, peer_id: &str) -> u64 {
        registry
            .peers()
            .unwrap()
            .into_iter()
            .find(|p| p.peer_id == peer_id)
            .unwrap()
            .receive_index
    }

    fn linked() -> (SessionRegistry, SessionRegistry) {
        let alice = SessionRegistry::in_memory(CoreConfig::default(), KeyPair::generate());
        let bob = SessionRegistry::in_memory(CoreConfig::default(), KeyPair::generate());
        alice.create_session("bob", &bob.public_key()).unwrap();
        bob.create_session("alice", &alice.public_key()).unwrap();
        (alice, bob)
    }

    #[test]
    fn test_round_trip_through_registries() {
        let (alice, bob) = linked();

        let envelope = alice.encrypt("bob", b"hello").unwrap();
        assert_eq!(bob.decrypt("alice", &envelope).unwrap(), b"hello");

        let reply = bob.encrypt("alice", b"hi").unwrap();
        assert_eq!(alice.decrypt("bob", &reply).unwrap(), b"hi");
    }

    #[test]
    fn test_unknown_peer() {
        let (alice, _) = linked();
        let err = alice.encrypt("mallory", b"x").unwrap_err();
        assert!(matches!(err, CryptoError::SessionNotFound(ref peer) if peer == "mallory"));
    }

    #[test]
    fn test_armored_message_is_routed_by_session_id() {
        let (alice, bob) = linked();
        let carol_key = KeyPair::generate();
        bob.create_session("carol", &carol_key.public_key()).unwrap();

        let metadata = EnvelopeMetadata::default().with_unlock_time(42);
        let armored = alice
            .encrypt_with_metadata("bob", b"routed", metadata.clone())
            .unwrap()
            .armor()
            .unwrap();

        assert_eq!(bob.detect_peer(&armored).unwrap().as_deref(), Some("alice"));
        let received = bob.decrypt_armored(&armored).unwrap();
        assert_eq!(received.peer_id, "alice");
        assert_eq!(received.plaintext, b"routed");
        assert_eq!(received.metadata, metadata);
    }

    #[test]
    fn test_detect_peer_ignores_plain_text() {
        let (_, bob) = linked();
        assert_eq!(bob.detect_peer("just some words typed by a person").unwrap(), None);
        assert_eq!(bob.detect_peer("QKC1!!!!not-base64!!!!!!").unwrap(), None);
    }

    #[test]
    fn test_decrypt_armored_from_unknown_session() {
        let (alice, bob) = linked();
        alice.create_session("carol", &KeyPair::generate().public_key()).unwrap();
        let armored = alice.encrypt("carol", b"x").unwrap().armor().unwrap();

        assert_eq!(bob.detect_peer(&armored).unwrap(), None);
        assert!(matches!(
            bob.decrypt_armored(&armored),
            Err(CryptoError::SessionNotFound(_))
        ));
    }

    #[test]
    fn test_restore_all_after_restart() {
        let dir = tempfile::tempdir().unwrap();
        let bob_key = KeyPair::generate();
        let alice = SessionRegistry::in_memory(CoreConfig::default(), KeyPair::generate());

        let bob = SessionRegistry::new(
            CoreConfig::default(),
            bob_key.clone(),
            Box::new(FileStore::open(dir.path()).unwrap()),
        );
        alice.create_session("bob", &bob.public_key()).unwrap();
        bob.create_session("alice", &alice.public_key()).unwrap();
        let first = alice.encrypt("bob", b"one").unwrap();
        bob.decrypt("alice", &first).unwrap();
        drop(bob);

        let bob = SessionRegistry::new(
            CoreConfig::default(),
            bob_key,
            Box::new(FileStore::open(dir.path()).unwrap()),
        );
        assert!(!bob.has_session("alice").unwrap());
        assert_eq!(bob.restore_all().unwrap(), 1);

        let second = alice.encrypt("bob", b"two").unwrap();
        assert_eq!(bob.decrypt("alice", &second).unwrap(), b"two");
        assert_eq!(bob.peers().unwrap()[0].receive_index, 2);
    }

    #[test]
    fn test_restore_missing_peer() {
        let (alice, _) = linked();
        assert!(!alice.restore("nobody").unwrap());
    }

    #[test]
    fn test_remove_peer_deletes_record() {
        let (alice, _) = linked();
        alice.remove_peer("bob").unwrap();

        assert!(!alice.has_session("bob").unwrap());
        assert!(!alice.restore("bob").unwrap());
        assert!(alice.peers().unwrap().is_empty());
    }

    #[test]
    fn test_peers_are_sorted_summaries() {
        let alice = SessionRegistry::in_memory(CoreConfig::default(), KeyPair::generate());
        alice.create_session("zoe", &KeyPair::generate().public_key()).unwrap();
        alice.create_session("bob", &KeyPair::generate().public_key()).unwrap();
        alice.encrypt("zoe", b"x").unwrap();

        let peers = alice.peers().unwrap();
        assert_eq!(peers.len(), 2);
        assert_eq!(peers[0].peer_id, "bob");
        assert_eq!(peers[1].peer_id, "zoe");
        assert_eq!(peers[1].send_index, 1);
        assert_eq!(peers[1].message_count, 1);
    }

    #[test]
    fn test_concurrent_peers() {
        let alice = Arc::new(SessionRegistry::in_memory(
            CoreConfig::default(),
            KeyPair::generate(),
        ));
        let peers: Vec<String> = (0..4).map(|i| format!("peer-{i}")).collect();
        for peer in &peers {
            alice.create_session(peer, &KeyPair::generate().public_key()).unwrap();
        }

        let handles: Vec<_> = peers
            .iter()
            .cloned()
            .map(|peer| {
                let alice = Arc::clone(&alice);
                thread::spawn(move || {
                    (0..25)
                        .map(|_| alice.encrypt(&peer, b"tick").unwrap().index())
                        .collect::<Vec<_>>()
                })
            })
            .collect();

        for handle in handles {
            assert_eq!(handle.join().unwrap(), (0..25).collect::<Vec<u64>>());
        }
    }

    #[test]
    fn test_failed_decrypt_advance_survives_restore() {
        let (alice, bob) = linked();
        let envelopes: Vec<_> = (0..6u8).map(|i| alice.encrypt("bob", &[i]).unwrap()).collect();

        let err = bob.decrypt("alice", &forge(&envelopes[5])).unwrap_err();
        assert!(matches!(err, CryptoError::AuthenticationFailed));
        assert_eq!(receive_index(&bob, "alice"), 6);

        assert!(bob.restore("alice").unwrap());
        assert_eq!(receive_index(&bob, "alice"), 6);
        assert!(matches!(
            bob.decrypt("alice", &envelopes[0]),
            Err(CryptoError::KeyNotFound { index: 0 })
        ));
        assert!(matches!(
            bob.decrypt("alice", &envelopes[5]),
            Err(CryptoError::KeyNotFound { index: 5 })
        ));
    }

    #[test]
    fn test_failed_skipped_decrypt_keeps_stored_position() {
        let (alice, bob) = linked();
        let m0 = alice.encrypt("bob", b"zero").unwrap();
        let m1 = alice.encrypt("bob", b"one").unwrap();
        bob.decrypt("alice", &m1).unwrap();

        // Cached key path: nothing moves, and the real message still opens.
        assert!(matches!(
            bob.decrypt("alice", &forge(&m0)),
            Err(CryptoError::AuthenticationFailed)
        ));
        assert_eq!(bob.decrypt("alice", &m0).unwrap(), b"zero");
    }

    #[test]
    fn test_encrypt_reports_store_failure_without_reusing_key() {
        let failing = Arc::new(AtomicBool::new(false));
        let store = FlakyStore {
            inner: MemoryStore::new(),
            failing: Arc::clone(&failing),
        };
        let alice = SessionRegistry::new(CoreConfig::default(), KeyPair::generate(), Box::new(store));
        let bob = SessionRegistry::in_memory(CoreConfig::default(), KeyPair::generate());
        alice.create_session("bob", &bob.public_key()).unwrap();
        bob.create_session("alice", &alice.public_key()).unwrap();

        failing.store(true, Ordering::SeqCst);
        let err = alice
            .encrypt_with_metadata("bob", b"lost", EnvelopeMetadata::default())
            .unwrap_err();
        assert!(matches!(err, CryptoError::Store(StoreError::Io(_))));
        assert!(matches!(alice.persist("bob"), Err(CryptoError::Store(_))));

        failing.store(false, Ordering::SeqCst);
        let next = alice.encrypt("bob", b"kept").unwrap();
        assert_eq!(next.index(), 1);
        assert_eq!(bob.decrypt("alice", &next).unwrap(), b"kept");

        assert!(alice.restore("bob").unwrap());
        assert_eq!(alice.encrypt("bob", b"after restore").unwrap().index(), 2);
    }

    #[test]
    fn test_failed_decrypt_keeps_original_error_when_save_fails() {
        let failing = Arc::new(AtomicBool::new(false));
        let store = FlakyStore {
            inner: MemoryStore::new(),
            failing: Arc::clone(&failing),
        };
        let alice = SessionRegistry::in_memory(CoreConfig::default(), KeyPair::generate());
        let bob = SessionRegistry::new(CoreConfig::default(), KeyPair::generate(), Box::new(store));
        alice.create_session("bob", &bob.public_key()).unwrap();
        bob.create_session("alice", &alice.public_key()).unwrap();
        let m0 = alice.encrypt("bob", b"zero").unwrap();

        failing.store(true, Ordering::SeqCst);
        assert!(matches!(
            bob.decrypt("alice", &forge(&m0)),
            Err(CryptoError::AuthenticationFailed)
        ));
    }
}
