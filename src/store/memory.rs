//! In-memory store implementation for development and testing.
//!
//! For persistence across restarts use [`FileStore`](crate::store::FileStore).

use std::collections::HashMap;
use std::sync::RwLock;

use zeroize::Zeroizing;

use crate::error::{StoreError, StoreResult};
use crate::store::SessionStore;

/// In-memory session store.
#[derive(Default)]
pub struct MemoryStore {
    sessions: RwLock<HashMap<String, Zeroizing<Vec<u8>>>>,
}

impl MemoryStore {
    /// Create a new in-memory store.
    pub fn new() -> Self {
        Self::default()
    }
}

impl SessionStore for MemoryStore {
    fn get_session(&self, peer_id: &str) -> StoreResult<Option<Vec<u8>>> {
        let sessions = self.sessions.read().map_err(|_| StoreError::LockPoisoned)?;
        Ok(sessions.get(peer_id).map(|record| record.to_vec()))
    }

    fn has_session(&self, peer_id: &str) -> StoreResult<bool> {
        let sessions = self.sessions.read().map_err(|_| StoreError::LockPoisoned)?;
        Ok(sessions.contains_key(peer_id))
    }

    fn put_session(&self, peer_id: &str, record: &[u8]) -> StoreResult<()> {
        let mut sessions = self.sessions.write().map_err(|_| StoreError::LockPoisoned)?;
        sessions.insert(peer_id.to_string(), Zeroizing::new(record.to_vec()));
        Ok(())
    }

    fn delete_session(&self, peer_id: &str) -> StoreResult<()> {
        let mut sessions = self.sessions.write().map_err(|_| StoreError::LockPoisoned)?;
        sessions.remove(peer_id);
        Ok(())
    }

    fn list_peers(&self) -> StoreResult<Vec<String>> {
        let sessions = self.sessions.read().map_err(|_| StoreError::LockPoisoned)?;
        let mut peers: Vec<String> = sessions.keys().cloned().collect();
        peers.sort();
        Ok(peers)
    }
}
