//! Bounded history of sent and received plaintexts, newest first.

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::CoreConfig;
use crate::error::{Result, StoreError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Sent,
    Received,
}

/// How the ciphertext was presented on the wire. Informational only.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransportMode {
    #[default]
    Raw,
    Fairytale,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggedMessage {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub contact: String,
    pub text: String,
    pub direction: Direction,
    pub mode: TransportMode,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageLog {
    capacity: usize,
    entries: VecDeque<LoggedMessage>,
}

impl Default for MessageLog {
    fn default() -> Self {
        Self::new(&CoreConfig::default())
    }
}

impl MessageLog {
    pub fn new(config: &CoreConfig) -> Self {
        Self::with_capacity(config.max_log_entries)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            capacity,
            entries: VecDeque::with_capacity(capacity),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn log_sent(&mut self, contact: &str, text: &str, mode: TransportMode) -> &LoggedMessage {
        self.push(contact, text, Direction::Sent, mode)
    }

    pub fn log_received(&mut self, contact: &str, text: &str, mode: TransportMode) -> &LoggedMessage {
        self.push(contact, text, Direction::Received, mode)
    }

    fn push(
        &mut self,
        contact: &str,
        text: &str,
        direction: Direction,
        mode: TransportMode,
    ) -> &LoggedMessage {
        self.entries.push_front(LoggedMessage {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            contact: contact.to_string(),
            text: text.to_string(),
            direction,
            mode,
        });
        self.entries.truncate(self.capacity.max(1));
        log::debug!("logged {:?} message for {}", direction, contact);
        &self.entries[0]
    }

    /// All entries, newest first.
    pub fn messages(&self) -> impl Iterator<Item = &LoggedMessage> {
        self.entries.iter()
    }

    /// Entries exchanged with one contact, newest first.
    pub fn messages_for<'a>(&'a self, contact: &'a str) -> impl Iterator<Item = &'a LoggedMessage> + 'a {
        self.entries.iter().filter(move |m| m.contact == contact)
    }

    pub fn last(&self) -> Option<&LoggedMessage> {
        self.entries.front()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Drop every entry for `contact`. Returns how many were removed.
    pub fn clear_contact(&mut self, contact: &str) -> usize {
        let before = self.entries.len();
        self.entries.retain(|m| m.contact != contact);
        before - self.entries.len()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self).map_err(|e| StoreError::from(e).into())
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let mut log: Self = serde_json::from_str(json).map_err(StoreError::from)?;
        log.entries.truncate(log.capacity.max(1));
        Ok(log)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_newest_first() {
        let mut log = MessageLog::default();
        log.log_sent("bob", "first", TransportMode::Raw);
        log.log_received("bob", "second", TransportMode::Fairytale);

        let texts: Vec<&str> = log.messages().map(|m| m.text.as_str()).collect();
        assert_eq!(texts, ["second", "first"]);
        assert_eq!(log.last().unwrap().direction, Direction::Received);
        assert_eq!(log.last().unwrap().mode, TransportMode::Fairytale);
    }

    #[test]
    fn test_capacity_drops_oldest() {
        let mut log = MessageLog::new(&CoreConfig::default());
        for i in 0..60 {
            log.log_sent("bob", &format!("m{i}"), TransportMode::Raw);
        }

        assert_eq!(log.len(), 50);
        assert_eq!(log.last().unwrap().text, "m59");
        assert_eq!(log.messages().last().unwrap().text, "m10");
    }

    #[test]
    fn test_filter_and_clear_contact() {
        let mut log = MessageLog::with_capacity(10);
        log.log_sent("bob", "to bob", TransportMode::Raw);
        log.log_sent("carol", "to carol", TransportMode::Raw);
        log.log_received("bob", "from bob", TransportMode::Raw);

        assert_eq!(log.messages_for("bob").count(), 2);
        assert_eq!(log.clear_contact("bob"), 2);
        assert_eq!(log.len(), 1);
        assert_eq!(log.messages_for("bob").count(), 0);

        log.clear();
        assert!(log.is_empty());
    }

    #[test]
    fn test_json_round_trip() {
        let mut log = MessageLog::with_capacity(5);
        log.log_sent("bob", "hello", TransportMode::Raw);
        log.log_received("bob", "hi", TransportMode::Raw);

        let json = log.to_json().unwrap();
        assert!(json.contains("\"received\""));
        assert_eq!(MessageLog::from_json(&json).unwrap(), log);
    }

    #[test]
    fn test_entry_ids_are_unique() {
        let mut log = MessageLog::with_capacity(3);
        let a = log.log_sent("bob", "x", TransportMode::Raw).id;
        let b = log.log_sent("bob", "x", TransportMode::Raw).id;
        assert_ne!(a, b);
    }
}
