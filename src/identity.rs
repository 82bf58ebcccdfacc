//! Long-term device identity and the public payload shared over QR or NFC.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

use crate::crypto::{KeyPair, PeerPublicKey};
use crate::encoding;
use crate::error::{CryptoError, Result, StoreError};

/// Type tag carried by public key payloads.
pub const PAYLOAD_TYPE: &str = "QKEYBOARD_PUBLIC_KEY";

/// Payload format version.
pub const PAYLOAD_VERSION: &str = "1.0";

/// This device's key pair and id.
#[derive(Clone)]
pub struct Identity {
    key_pair: KeyPair,
    device_id: Uuid,
}

impl Identity {
    pub fn generate() -> Self {
        Self::new(KeyPair::generate(), Uuid::new_v4())
    }

    pub fn new(key_pair: KeyPair, device_id: Uuid) -> Self {
        Self { key_pair, device_id }
    }

    pub fn key_pair(&self) -> &KeyPair {
        &self.key_pair
    }

    pub fn into_key_pair(self) -> KeyPair {
        self.key_pair
    }

    pub fn device_id(&self) -> Uuid {
        self.device_id
    }

    pub fn public_key(&self) -> PeerPublicKey {
        self.key_pair.public_key()
    }

    pub fn public_key_base64(&self) -> String {
        self.public_key().to_base64()
    }

    /// JSON document to hand to a peer out of band.
    pub fn public_payload(&self) -> Result<String> {
        let payload = PublicKeyPayload {
            kind: PAYLOAD_TYPE.to_string(),
            version: PAYLOAD_VERSION.to_string(),
            key: self.public_key_base64(),
            device_id: self.device_id.to_string(),
            timestamp: Utc::now().timestamp_millis(),
        };
        serde_json::to_string(&payload).map_err(|e| StoreError::from(e).into())
    }

    /// Serialize including the private key, for the caller's secure storage.
    pub fn to_json(&self) -> Result<Zeroizing<String>> {
        let stored = StoredIdentity {
            private_key: *self.key_pair.export_private_key(),
            device_id: self.device_id,
        };
        let json = serde_json::to_string(&stored).map_err(StoreError::from)?;
        Ok(Zeroizing::new(json))
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let stored: StoredIdentity = serde_json::from_str(json).map_err(StoreError::from)?;
        Ok(Self::new(
            KeyPair::from_private_key(stored.private_key),
            stored.device_id,
        ))
    }
}

impl std::fmt::Debug for Identity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Identity")
            .field("device_id", &self.device_id)
            .field("public_key", &self.public_key())
            .finish_non_exhaustive()
    }
}

#[derive(Serialize, Deserialize, Zeroize, ZeroizeOnDrop)]
struct StoredIdentity {
    #[serde(with = "encoding::key32")]
    private_key: [u8; 32],
    #[zeroize(skip)]
    device_id: Uuid,
}

/// A peer's advertised public key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublicKeyPayload {
    #[serde(rename = "type")]
    pub kind: String,
    pub version: String,
    pub key: String,
    pub device_id: String,
    /// Milliseconds since the Unix epoch.
    pub timestamp: i64,
}

impl PublicKeyPayload {
    /// Parse a scanned payload, checking the type tag and the key.
    pub fn parse(json: &str) -> Result<(Self, PeerPublicKey)> {
        let payload: Self = serde_json::from_str(json)
            .map_err(|e| CryptoError::InvalidPeerKey(format!("payload: {e}")))?;
        if payload.kind != PAYLOAD_TYPE {
            return Err(CryptoError::InvalidPeerKey(format!(
                "unexpected payload type {}",
                payload.kind
            )));
        }
        let key = PeerPublicKey::from_base64(&payload.key)?;
        Ok((payload, key))
    }
}
