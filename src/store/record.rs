//! Persisted form of a session.
//!
//! Only the current chain positions are stored. The skipped-key cache is not:
//! after a restore, indices below the stored receive index that were never
//! opened come back as `KeyNotFound`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

use crate::config::CoreConfig;
use crate::crypto::{ChainKey, RatchetChain};
use crate::encoding;
use crate::error::{CryptoError, Result, StoreError, StoreResult};
use crate::session::CryptoSession;

/// Schema version written by this build.
pub const RECORD_VERSION: u32 = 1;

/// Serialized session state.
#[derive(Serialize, Deserialize, Zeroize, ZeroizeOnDrop)]
pub struct SessionRecord {
    #[zeroize(skip)]
    pub version: u32,
    #[zeroize(skip)]
    pub session_id: String,
    #[zeroize(skip)]
    pub peer_id: String,
    #[serde(with = "encoding::key32")]
    send_chain_key: [u8; 32],
    #[zeroize(skip)]
    pub send_index: u64,
    #[serde(with = "encoding::key32")]
    receive_chain_key: [u8; 32],
    #[zeroize(skip)]
    pub receive_index: u64,
    #[zeroize(skip)]
    pub created_at: DateTime<Utc>,
    #[zeroize(skip)]
    pub last_message_at: DateTime<Utc>,
    #[zeroize(skip)]
    pub message_count: u64,
}

impl SessionRecord {
    /// Snapshot a session's current position.
    pub fn from_session(session: &CryptoSession) -> Self {
        Self {
            version: RECORD_VERSION,
            session_id: session.session_id().to_string(),
            peer_id: session.peer_id().to_string(),
            send_chain_key: *session.send_chain().chain_key().as_bytes(),
            send_index: session.send_index(),
            receive_chain_key: *session.receive_chain().chain_key().as_bytes(),
            receive_index: session.receive_index(),
            created_at: session.created_at(),
            last_message_at: session.last_message_at(),
            message_count: session.message_count(),
        }
    }

    /// Rebuild the session this record describes.
    pub fn into_session(mut self, config: &CoreConfig) -> Result<CryptoSession> {
        self.validate()?;
        let send_chain =
            RatchetChain::from_parts(ChainKey::from_bytes(self.send_chain_key), self.send_index);
        let receive_chain = RatchetChain::from_parts(
            ChainKey::from_bytes(self.receive_chain_key),
            self.receive_index,
        );
        Ok(CryptoSession::resume(
            std::mem::take(&mut self.session_id),
            std::mem::take(&mut self.peer_id),
            send_chain,
            receive_chain,
            config,
            self.created_at,
            self.last_message_at,
            self.message_count,
        ))
    }

    fn validate(&self) -> Result<()> {
        if self.version != RECORD_VERSION {
            return Err(CryptoError::UnsupportedVersion(self.version));
        }
        if self.session_id.is_empty() || self.peer_id.is_empty() {
            return Err(StoreError::Corrupt("missing session or peer id".into()).into());
        }
        if self.send_chain_key == [0u8; 32] || self.receive_chain_key == [0u8; 32] {
            return Err(StoreError::Corrupt("zeroed chain key".into()).into());
        }
        Ok(())
    }

    pub fn to_bytes(&self) -> StoreResult<Zeroizing<Vec<u8>>> {
        Ok(Zeroizing::new(serde_json::to_vec(self)?))
    }

    pub fn from_bytes(bytes: &[u8]) -> StoreResult<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }

    pub fn to_json(&self) -> StoreResult<Zeroizing<String>> {
        Ok(Zeroizing::new(serde_json::to_string(self)?))
    }

    pub fn from_json(json: &str) -> StoreResult<Self> {
        Self::from_bytes(json.as_bytes())
    }
}

impl std::fmt::Debug for SessionRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionRecord")
            .field("version", &self.version)
            .field("session_id", &self.session_id)
            .field("peer_id", &self.peer_id)
            .field("send_index", &self.send_index)
            .field("receive_index", &self.receive_index)
            .field("message_count", &self.message_count)
            .finish_non_exhaustive()
    }
}
