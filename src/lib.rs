//! qkc-core: end-to-end encrypted messaging core
//!
//! X25519 key agreement, an HKDF-SHA256 symmetric ratchet per direction and
//! AES-256-GCM sealing, with out-of-order delivery, bounded key skipping and
//! resumable session state.
//!
//! ## Modules
//!
//! - `crypto` - Key pairs, key derivation, ratchet chains and the AEAD
//! - `session` - Per-peer ratchet sessions
//! - `envelope` - Ciphertext envelopes, JSON form and text armor
//! - `store` - Session records and persistence backends
//! - `registry` - Sessions for many peers behind one handle
//! - `contacts` - Contact book with key fingerprints
//! - `message_log` - Bounded message history
//! - `policy` - Time-lock and geofence checks
//! - `identity` - Device identity and shareable public key payload
//! - `config` - Tunables

pub mod config;
pub mod contacts;
pub mod crypto;
pub mod envelope;
pub mod error;
pub mod identity;
pub mod message_log;
pub mod policy;
pub mod registry;
pub mod session;
pub mod store;

mod encoding;

pub use config::CoreConfig;
pub use contacts::{Contact, ContactRegistry};
pub use crypto::{KeyPair, PeerPublicKey};
pub use envelope::{EncryptedEnvelope, EnvelopeMetadata, Geofence};
pub use error::{CryptoError, PolicyError, Result, StoreError};
pub use identity::{Identity, PublicKeyPayload};
pub use message_log::{Direction, LoggedMessage, MessageLog, TransportMode};
pub use policy::Location;
pub use registry::{PeerSummary, ReceivedMessage, SessionRegistry};
pub use session::{create_session, create_session_with_context, CryptoSession, SessionRole};
pub use store::{FileStore, MemoryStore, SessionRecord, SessionStore};
