//! Single-direction symmetric ratchet.
//!
//! - Each step yields one message key bound to the current index
//! - The chain key is overwritten by its successor on every step
//! - Same starting key always yields the same key sequence

use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

use crate::config::DEFAULT_MAX_SKIP;
use crate::crypto::kdf::{self, message_label, KEY_LEN, LABEL_RATCHET};
use crate::error::{CryptoError, Result};

/// Current position of a one-directional ratchet.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct ChainKey([u8; KEY_LEN]);

impl ChainKey {
    pub fn from_bytes(bytes: [u8; KEY_LEN]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; KEY_LEN] {
        &self.0
    }
}

impl std::fmt::Debug for ChainKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("ChainKey([REDACTED])")
    }
}

/// One-time key for a single AEAD operation.
///
/// Not `Clone`: a message key lives in exactly one place and is
/// wiped when dropped.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct MessageKey {
    key: [u8; KEY_LEN],
    index: u64,
}

impl MessageKey {
    pub fn key(&self) -> &[u8; KEY_LEN] {
        &self.key
    }

    /// Chain index this key was derived at.
    pub fn index(&self) -> u64 {
        self.index
    }
}

impl std::fmt::Debug for MessageKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MessageKey")
            .field("index", &self.index)
            .field("key", &"[REDACTED]")
            .finish()
    }
}

/// Keys handed out by [`RatchetChain::step_to`] for the indices it jumped over.
pub type SkippedKeys = Vec<(u64, MessageKey)>;

/// A forward-only chain producing one message key per index.
#[derive(Debug)]
pub struct RatchetChain {
    current_key: ChainKey,
    index: u64,
    max_skip: u64,
}

impl RatchetChain {
    /// Start a chain at index 0.
    pub fn new(key: ChainKey) -> Self {
        Self::from_parts(key, 0)
    }

    /// Resume a chain at a stored position.
    pub fn from_parts(key: ChainKey, index: u64) -> Self {
        Self {
            current_key: key,
            index,
            max_skip: DEFAULT_MAX_SKIP,
        }
    }

    /// Override the largest gap [`step_to`](Self::step_to) will bridge.
    pub fn with_max_skip(mut self, max_skip: u64) -> Self {
        self.max_skip = max_skip;
        self
    }

    /// Index the next step will bind its message key to.
    pub fn index(&self) -> u64 {
        self.index
    }

    pub fn max_skip(&self) -> u64 {
        self.max_skip
    }

    pub(crate) fn chain_key(&self) -> &ChainKey {
        &self.current_key
    }

    /// Derive the message key for the current index and advance.
    pub fn step(&mut self) -> Result<(MessageKey, u64)> {
        if self.index == u64::MAX {
            return Err(CryptoError::ChainExhausted { index: self.index });
        }

        let message = Zeroizing::new(kdf::derive(
            self.current_key.as_bytes(),
            &message_label(self.index),
        )?);
        let mut next = kdf::derive(self.current_key.as_bytes(), LABEL_RATCHET)?;

        // Overwrite in place so no copy of the old chain key survives.
        self.current_key.0 = next;
        next.zeroize();

        let used = self.index;
        self.index += 1;
        Ok((MessageKey { key: *message, index: used }, used))
    }

    /// Advance until `target` has been consumed.
    ///
    /// Returns the keys for every index in `[self.index, target)` together
    /// with the key at `target`. Bounds are checked before the chain moves.
    pub fn step_to(&mut self, target: u64) -> Result<(SkippedKeys, MessageKey)> {
        if target < self.index {
            return Err(CryptoError::KeyNotFound { index: target });
        }
        if target == u64::MAX {
            return Err(CryptoError::ChainExhausted { index: target });
        }

        let gap = target - self.index;
        if gap > self.max_skip {
            return Err(CryptoError::SkipLimitExceeded {
                requested: gap,
                limit: self.max_skip,
            });
        }

        let mut skipped = Vec::with_capacity(gap as usize);
        while self.index < target {
            let (key, index) = self.step()?;
            skipped.push((index, key));
        }
        let (key, _) = self.step()?;
        Ok((skipped, key))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::collections::HashSet;

    fn test_chain() -> RatchetChain {
        let mut seed = [0u8; 32];
        for (i, byte) in seed.iter_mut().enumerate() {
            *byte = i as u8;
        }
        RatchetChain::new(ChainKey::from_bytes(seed))
    }

    #[test]
    fn test_new_chain_starts_at_zero() {
        assert_eq!(test_chain().index(), 0);
    }

    #[test]
    fn test_step_increments_index() {
        let mut chain = test_chain();

        let (k0, i0) = chain.step().unwrap();
        assert_eq!((i0, k0.index()), (0, 0));
        assert_eq!(chain.index(), 1);

        let (_, i1) = chain.step().unwrap();
        assert_eq!(i1, 1);
        assert_eq!(chain.index(), 2);
    }

    #[test]
    fn test_step_replaces_chain_key() {
        let mut chain = test_chain();
        let before = *chain.chain_key().as_bytes();
        chain.step().unwrap();
        assert_ne!(&before, chain.chain_key().as_bytes());
    }

    #[test]
    fn test_step_to_matches_sequential_steps() {
        let mut sequential = test_chain();
        let mut expected = Vec::new();
        for _ in 0..6 {
            expected.push(*sequential.step().unwrap().0.key());
        }

        let mut jumped = test_chain();
        let (skipped, key) = jumped.step_to(5).unwrap();

        assert_eq!(skipped.len(), 5);
        for (index, skipped_key) in &skipped {
            assert_eq!(skipped_key.key(), &expected[*index as usize]);
        }
        assert_eq!(key.key(), &expected[5]);
        assert_eq!(key.index(), 5);
        assert_eq!(jumped.index(), 6);
    }

    #[test]
    fn test_step_to_current_index_skips_nothing() {
        let mut chain = test_chain();
        let (skipped, key) = chain.step_to(0).unwrap();
        assert!(skipped.is_empty());
        assert_eq!(key.index(), 0);
        assert_eq!(chain.index(), 1);
    }

    #[test]
    fn test_step_to_rejects_past_index() {
        let mut chain = test_chain();
        chain.step_to(5).unwrap();

        match chain.step_to(3) {
            Err(CryptoError::KeyNotFound { index }) => assert_eq!(index, 3),
            other => panic!("expected KeyNotFound, got {other:?}"),
        }
    }

    #[test]
    fn test_step_to_limit_leaves_chain_untouched() {
        let mut chain = test_chain();
        let before = *chain.chain_key().as_bytes();

        let result = chain.step_to(DEFAULT_MAX_SKIP + 1);
        assert!(matches!(
            result,
            Err(CryptoError::SkipLimitExceeded { requested: 1001, limit: 1000 })
        ));
        assert_eq!(chain.index(), 0);
        assert_eq!(&before, chain.chain_key().as_bytes());
    }

    #[test]
    fn test_step_to_accepts_exact_limit() {
        let mut chain = test_chain().with_max_skip(10);
        let (skipped, key) = chain.step_to(10).unwrap();
        assert_eq!(skipped.len(), 10);
        assert_eq!(key.index(), 10);
    }

    #[test]
    fn test_exhausted_chain() {
        let mut chain = RatchetChain::from_parts(ChainKey::from_bytes([7u8; 32]), u64::MAX);
        assert!(matches!(chain.step(), Err(CryptoError::ChainExhausted { .. })));
    }

    #[test]
    fn test_resumed_chain_continues_sequence() {
        let mut original = test_chain();
        original.step().unwrap();
        original.step().unwrap();

        let mut resumed =
            RatchetChain::from_parts(original.chain_key().clone(), original.index());

        let (a, ia) = original.step().unwrap();
        let (b, ib) = resumed.step().unwrap();
        assert_eq!(ia, ib);
        assert_eq!(a.key(), b.key());
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(64))]

        #[test]
        fn prop_chain_is_deterministic(seed in any::<[u8; 32]>(), steps in 1usize..64) {
            let mut a = RatchetChain::new(ChainKey::from_bytes(seed));
            let mut b = RatchetChain::new(ChainKey::from_bytes(seed));
            for _ in 0..steps {
                let (ka, ia) = a.step().unwrap();
                let (kb, ib) = b.step().unwrap();
                prop_assert_eq!(ia, ib);
                prop_assert_eq!(ka.key(), kb.key());
            }
        }

        #[test]
        fn prop_chain_never_repeats_a_key(seed in any::<[u8; 32]>(), steps in 1usize..200) {
            let mut chain = RatchetChain::new(ChainKey::from_bytes(seed));
            let mut seen = HashSet::new();
            for _ in 0..steps {
                let (key, _) = chain.step().unwrap();
                prop_assert!(seen.insert(*key.key()));
            }
        }
    }
}
