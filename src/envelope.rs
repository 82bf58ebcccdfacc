//! Wire and storage form of a single ciphertext.
//!
//! Envelopes serialize to a compact JSON object
//! (`{"v":1,"sid":..,"idx":..,"iv":..,"ct":..}` plus optional `unlock_time`
//! and `geo` metadata). For copy/paste or QR transport the JSON is armored as
//! `QKC1` followed by URL-safe base64.

use base64::{engine::general_purpose::URL_SAFE, Engine as _};
use serde::{Deserialize, Serialize};

use crate::config::CoreConfig;
use crate::crypto::{NONCE_LEN, TAG_LEN};
use crate::encoding;
use crate::error::{CryptoError, Result};

/// Envelope format version produced by this build.
pub const ENVELOPE_VERSION: u32 = 1;

/// Prefix marking armored envelopes.
pub const ARMOR_PREFIX: &str = "QKC1";

/// Armored text shorter than this is never treated as an envelope.
const MIN_ARMORED_LEN: usize = 20;

/// Location constraint attached by the sender.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Geofence {
    pub lat: f64,
    pub lon: f64,
    /// Radius in metres.
    pub radius: u32,
}

/// Optional access-policy hints. Evaluated by the caller, never by decrypt.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EnvelopeMetadata {
    /// Earliest time (ms since the Unix epoch) the message should be shown.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unlock_time: Option<i64>,
    #[serde(rename = "geo", default, skip_serializing_if = "Option::is_none")]
    pub geofence: Option<Geofence>,
}

impl EnvelopeMetadata {
    pub fn is_empty(&self) -> bool {
        self.unlock_time.is_none() && self.geofence.is_none()
    }

    pub fn with_unlock_time(mut self, unlock_time_ms: i64) -> Self {
        self.unlock_time = Some(unlock_time_ms);
        self
    }

    pub fn with_geofence(mut self, lat: f64, lon: f64, radius: u32) -> Self {
        self.geofence = Some(Geofence { lat, lon, radius });
        self
    }

    /// Fence around a point using the configured default radius.
    pub fn with_default_geofence(self, lat: f64, lon: f64, config: &CoreConfig) -> Self {
        self.with_geofence(lat, lon, config.default_geofence_radius_m)
    }
}

/// One sealed message. Immutable once built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EncryptedEnvelope {
    #[serde(rename = "v")]
    version: u32,
    #[serde(rename = "sid")]
    session_id: String,
    #[serde(rename = "idx")]
    index: u64,
    #[serde(rename = "iv", with = "encoding::nonce")]
    nonce: [u8; NONCE_LEN],
    #[serde(rename = "ct", with = "encoding::bytes")]
    ciphertext: Vec<u8>,
    #[serde(flatten)]
    metadata: EnvelopeMetadata,
}

impl EncryptedEnvelope {
    /// Assemble an envelope from its parts.
    pub fn from_parts(
        version: u32,
        session_id: impl Into<String>,
        index: u64,
        nonce: [u8; NONCE_LEN],
        ciphertext: Vec<u8>,
        metadata: EnvelopeMetadata,
    ) -> Self {
        Self {
            version,
            session_id: session_id.into(),
            index,
            nonce,
            ciphertext,
            metadata,
        }
    }

    pub fn version(&self) -> u32 {
        self.version
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn index(&self) -> u64 {
        self.index
    }

    pub fn nonce(&self) -> &[u8; NONCE_LEN] {
        &self.nonce
    }

    /// Ciphertext with the 16-byte tag appended.
    pub fn ciphertext(&self) -> &[u8] {
        &self.ciphertext
    }

    pub fn metadata(&self) -> &EnvelopeMetadata {
        &self.metadata
    }

    /// Associated data authenticated alongside the payload.
    ///
    /// Binds the header (version, session id, index) so a relabelled envelope
    /// fails authentication; caller-supplied data is appended after it.
    pub fn associated_data(&self, extra: &[u8]) -> Vec<u8> {
        header_aad(self.version, &self.session_id, self.index, extra)
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self).map_err(|e| CryptoError::MalformedEnvelope(e.to_string()))
    }

    /// Parse and validate an envelope.
    pub fn from_json(json: &[u8]) -> Result<Self> {
        let envelope: Self = serde_json::from_slice(json)
            .map_err(|e| CryptoError::MalformedEnvelope(e.to_string()))?;
        envelope.validate()?;
        Ok(envelope)
    }

    fn validate(&self) -> Result<()> {
        if self.version != ENVELOPE_VERSION {
            return Err(CryptoError::UnsupportedVersion(self.version));
        }
        if self.session_id.is_empty() {
            return Err(CryptoError::MalformedEnvelope("empty session id".into()));
        }
        if self.ciphertext.len() < TAG_LEN {
            return Err(CryptoError::MalformedEnvelope(format!(
                "ciphertext shorter than the {TAG_LEN}-byte tag"
            )));
        }
        Ok(())
    }

    /// Text form for copy/paste and QR payloads.
    pub fn armor(&self) -> Result<String> {
        let json = self.to_json()?;
        Ok(format!("{ARMOR_PREFIX}{}", URL_SAFE.encode(json)))
    }

    /// Inverse of [`armor`](Self::armor).
    pub fn dearmor(text: &str) -> Result<Self> {
        let body = text
            .trim()
            .strip_prefix(ARMOR_PREFIX)
            .ok_or_else(|| CryptoError::MalformedEnvelope("missing armor prefix".into()))?;
        let json = URL_SAFE
            .decode(body)
            .map_err(|e| CryptoError::MalformedEnvelope(format!("base64: {e}")))?;
        Self::from_json(&json)
    }
}

pub(crate) fn header_aad(version: u32, session_id: &str, index: u64, extra: &[u8]) -> Vec<u8> {
    let mut aad = Vec::with_capacity(4 + 4 + session_id.len() + 8 + extra.len());
    aad.extend_from_slice(&version.to_be_bytes());
    aad.extend_from_slice(&(session_id.len() as u32).to_be_bytes());
    aad.extend_from_slice(session_id.as_bytes());
    aad.extend_from_slice(&index.to_be_bytes());
    aad.extend_from_slice(extra);
    aad
}

/// Cheap check whether `text` looks like an armored envelope.
pub fn looks_armored(text: &str) -> bool {
    let text = text.trim();
    text.starts_with(ARMOR_PREFIX) && text.len() > MIN_ARMORED_LEN
}

/// Read the session id from an armored envelope without decrypting it.
pub fn session_id_hint(text: &str) -> Result<String> {
    EncryptedEnvelope::dearmor(text).map(|envelope| envelope.session_id)
}
