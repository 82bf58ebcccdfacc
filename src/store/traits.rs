//! Store traits for session persistence.
//!
//! Backends only move opaque bytes; the record schema lives in
//! [`SessionRecord`](crate::store::SessionRecord).

use crate::config::CoreConfig;
use crate::error::{Result, StoreError, StoreResult};
use crate::session::CryptoSession;
use crate::store::SessionRecord;

/// Session store keyed by peer id.
pub trait SessionStore: Send + Sync {
    /// Get the serialized session for a peer.
    fn get_session(&self, peer_id: &str) -> StoreResult<Option<Vec<u8>>>;

    /// Check if a session exists.
    fn has_session(&self, peer_id: &str) -> StoreResult<bool>;

    /// Store a serialized session.
    fn put_session(&self, peer_id: &str, record: &[u8]) -> StoreResult<()>;

    /// Delete a session.
    fn delete_session(&self, peer_id: &str) -> StoreResult<()>;

    /// Peers with a stored session.
    fn list_peers(&self) -> StoreResult<Vec<String>>;

    /// Serialize and store a session's current position.
    fn save(&self, session: &CryptoSession) -> Result<()> {
        let bytes = SessionRecord::from_session(session).to_bytes()?;
        self.put_session(session.peer_id(), &bytes)?;
        Ok(())
    }

    /// Load and validate the session stored for a peer.
    fn load(&self, peer_id: &str, config: &CoreConfig) -> Result<Option<CryptoSession>> {
        let Some(bytes) = self.get_session(peer_id)? else {
            return Ok(None);
        };
        let record = SessionRecord::from_bytes(&bytes)?;
        if record.peer_id != peer_id {
            return Err(StoreError::Corrupt(format!(
                "record for {} stored under {}",
                record.peer_id, peer_id
            ))
            .into());
        }
        record.into_session(config).map(Some)
    }
}
