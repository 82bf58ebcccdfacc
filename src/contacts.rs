//! Contact book kept alongside the sessions.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::crypto::PeerPublicKey;
use crate::error::{CryptoError, Result, StoreError};

/// Characters kept from a message for the contact list preview.
const PREVIEW_CHARS: usize = 40;

/// A peer the user exchanges messages with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contact {
    pub id: String,
    pub display_name: String,
    /// Grouped SHA-256 fingerprint of the peer's public key.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fingerprint: Option<String>,
    #[serde(default)]
    pub verified: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_message: Option<String>,
    pub last_message_at: DateTime<Utc>,
}

impl Contact {
    pub fn new(id: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            display_name: display_name.into(),
            fingerprint: None,
            verified: false,
            last_message: None,
            last_message_at: Utc::now(),
        }
    }

    /// Attach the fingerprint of the peer's public key.
    pub fn with_public_key(mut self, key: &PeerPublicKey) -> Self {
        self.fingerprint = Some(key.fingerprint());
        self
    }
}

/// Contacts keyed by id.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContactRegistry {
    contacts: BTreeMap<String, Contact>,
}

impl ContactRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new contact. Fails if the id is taken.
    pub fn add(&mut self, contact: Contact) -> Result<()> {
        if self.contacts.contains_key(&contact.id) {
            return Err(CryptoError::ContactExists(contact.id));
        }
        log::debug!("added contact {}", contact.id);
        self.contacts.insert(contact.id.clone(), contact);
        Ok(())
    }

    pub fn remove(&mut self, id: &str) -> Result<Contact> {
        self.contacts
            .remove(id)
            .ok_or_else(|| CryptoError::ContactNotFound(id.to_string()))
    }

    /// Replace an existing contact with the same id.
    pub fn update(&mut self, contact: Contact) -> Result<()> {
        let slot = self
            .contacts
            .get_mut(&contact.id)
            .ok_or_else(|| CryptoError::ContactNotFound(contact.id.clone()))?;
        *slot = contact;
        Ok(())
    }

    pub fn get(&self, id: &str) -> Option<&Contact> {
        self.contacts.get(id)
    }

    /// All contacts, most recent conversation first.
    pub fn all(&self) -> Vec<&Contact> {
        let mut contacts: Vec<&Contact> = self.contacts.values().collect();
        contacts.sort_by(|a, b| b.last_message_at.cmp(&a.last_message_at));
        contacts
    }

    pub fn set_verified(&mut self, id: &str, verified: bool) -> Result<()> {
        self.contact_mut(id)?.verified = verified;
        Ok(())
    }

    /// Store a new fingerprint. A changed fingerprint clears the verified flag.
    pub fn set_fingerprint(&mut self, id: &str, fingerprint: impl Into<String>) -> Result<()> {
        let fingerprint = fingerprint.into();
        let contact = self.contact_mut(id)?;
        if contact.fingerprint.as_deref() != Some(fingerprint.as_str()) {
            if contact.verified {
                log::warn!("fingerprint changed for verified contact {}", id);
            }
            contact.verified = false;
        }
        contact.fingerprint = Some(fingerprint);
        Ok(())
    }

    /// Update the preview and timestamp shown in the contact list.
    pub fn record_last_message(&mut self, id: &str, text: &str, at: DateTime<Utc>) -> Result<()> {
        let contact = self.contact_mut(id)?;
        contact.last_message = Some(preview(text));
        contact.last_message_at = at;
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.contacts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.contacts.is_empty()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.contacts.contains_key(id)
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self).map_err(|e| StoreError::from(e).into())
    }

    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| StoreError::from(e).into())
    }

    fn contact_mut(&mut self, id: &str) -> Result<&mut Contact> {
        self.contacts
            .get_mut(id)
            .ok_or_else(|| CryptoError::ContactNotFound(id.to_string()))
    }
}

fn preview(text: &str) -> String {
    let mut chars = text.chars();
    let head: String = chars.by_ref().take(PREVIEW_CHARS).collect();
    if chars.next().is_some() {
        format!("{head}…")
    } else {
        head
    }
}
