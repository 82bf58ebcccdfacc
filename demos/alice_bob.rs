//! Alice/Bob Demo - Two devices exchanging encrypted messages.
//!
//! This example shows:
//! - Generating identities and swapping public key payloads
//! - Establishing sessions through a `SessionRegistry`
//! - Sending armored messages, including one delivered out of order
//! - Time-locked metadata checked before decrypting
//! - Restoring sessions from disk after a restart
//!
//! Run with: `cargo run --example alice_bob`

use chrono::{Duration, Utc};
use qkc_core::{
    policy, CoreConfig, EnvelopeMetadata, FileStore, Identity, MessageLog, PublicKeyPayload,
    SessionRegistry, TransportMode,
};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("=== qkc-core Alice/Bob Demo ===\n");

    let data_dir = std::env::temp_dir().join("qkc_demo");
    let config = CoreConfig::default();

    println!("🔑 Step 1: Creating identities...");
    let alice_id = Identity::generate();
    let bob_id = Identity::generate();
    let alice_payload = alice_id.public_payload()?;
    let bob_payload = bob_id.public_payload()?;
    println!("   Alice payload: {alice_payload}");
    println!("   Bob payload:   {bob_payload}\n");

    println!("🤝 Step 2: Scanning each other's payloads...");
    let (_, alice_public) = PublicKeyPayload::parse(&alice_payload)?;
    let (_, bob_public) = PublicKeyPayload::parse(&bob_payload)?;
    println!("   Bob's fingerprint as seen by Alice: {}", bob_public.fingerprint());

    let alice = SessionRegistry::in_memory(config.clone(), alice_id.key_pair().clone());
    let bob_store = FileStore::open(data_dir.join("bob"))?;
    let bob = SessionRegistry::new(config.clone(), bob_id.key_pair().clone(), Box::new(bob_store));

    let sid = alice.create_session("bob", &bob_public)?;
    bob.create_session("alice", &alice_public)?;
    println!("   Session id: {sid}\n");

    println!("🔒 Step 3: Alice sends two messages, delivered in reverse...");
    let mut log = MessageLog::new(&config);
    let first = alice.encrypt("bob", b"hello")?.armor()?;
    let second = alice.encrypt("bob", b"world")?.armor()?;
    log.log_sent("bob", "hello", TransportMode::Raw);
    log.log_sent("bob", "world", TransportMode::Raw);
    println!("   Armored: {}...", &second[..32]);

    for armored in [&second, &first] {
        let received = bob.decrypt_armored(armored)?;
        let text = String::from_utf8(received.plaintext)?;
        println!("   Bob ← {}: {text}", received.peer_id);
    }
    println!();

    println!("⏰ Step 4: A time-locked message...");
    let unlock_at = Utc::now() + Duration::minutes(10);
    let locked = alice
        .encrypt_with_metadata(
            "bob",
            b"see you later",
            EnvelopeMetadata::default().with_unlock_time(unlock_at.timestamp_millis()),
        )?
        .armor()?;
    let envelope = qkc_core::EncryptedEnvelope::dearmor(&locked)?;
    match policy::evaluate(envelope.metadata(), Utc::now(), None) {
        Ok(()) => println!("   Unlocked already?"),
        Err(e) => println!("   Bob must wait: {e}"),
    }
    match policy::evaluate(envelope.metadata(), unlock_at, None) {
        Ok(()) => {
            let received = bob.decrypt_armored(&locked)?;
            println!("   After the lock: {}", String::from_utf8(received.plaintext)?);
        }
        Err(e) => println!("   Still locked: {e}"),
    }
    println!();

    println!("💾 Step 5: Bob restarts...");
    drop(bob);
    let bob = SessionRegistry::new(
        config,
        bob_id.into_key_pair(),
        Box::new(FileStore::open(data_dir.join("bob"))?),
    );
    println!("   Restored {} session(s)", bob.restore_all()?);
    let reply = bob.encrypt("alice", b"back online")?;
    println!("   Alice ← bob: {}", String::from_utf8(alice.decrypt("bob", &reply)?)?);
    println!();

    println!("📨 Message log ({} entries):", log.len());
    for message in log.messages() {
        println!("   {:?} {} {}", message.direction, message.contact, message.text);
    }

    std::fs::remove_dir_all(&data_dir)?;
    println!("\n=== Demo Complete ===");
    Ok(())
}
