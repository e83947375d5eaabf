//! Fingerprints and canonical state encodings.

use std::fmt;
use std::hash::{BuildHasher, Hasher};
use std::sync::Arc;

/// A fingerprint is a 64-bit hash identifying a canonical state.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Fingerprint(u64);

impl Fingerprint {
    #[inline]
    pub fn as_u64(self) -> u64 {
        self.0
    }

    #[inline]
    pub fn from_u64(v: u64) -> Self {
        Fingerprint(v)
    }
}

impl fmt::Debug for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Fingerprint({:016x})", self.0)
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

/// The word encoding a [`CanonicalSerializer`](crate::CanonicalSerializer)
/// produces for one state. Two states are equivalent iff their canonical
/// forms are equal; the fingerprint is a hash of the words.
///
/// Cloning is an atomic increment.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CanonicalForm {
    words: Arc<[u64]>,
    fp: Fingerprint,
}

impl CanonicalForm {
    pub fn new(words: Vec<u64>) -> Self {
        let fp = hash_words(&words);
        Self {
            words: Arc::from(words),
            fp,
        }
    }

    #[inline]
    pub fn fingerprint(&self) -> Fingerprint {
        self.fp
    }

    pub fn words(&self) -> &[u64] {
        &self.words
    }

    pub fn len(&self) -> usize {
        self.words.len()
    }

    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }

    /// Position of the first differing word, or `None` if equal.
    pub fn first_difference(&self, other: &CanonicalForm) -> Option<usize> {
        let common = self.words.len().min(other.words.len());
        (0..common)
            .find(|&i| self.words[i] != other.words[i])
            .or(if self.words.len() != other.words.len() {
                Some(common)
            } else {
                None
            })
    }
}

/// Keys for [`hash_words`]. A default `AHasher` draws random keys per
/// process, which would make fingerprints differ between a run and its
/// replay.
const FINGERPRINT_SEEDS: [u64; 4] = [
    0x7061_7468_7769_7365,
    0x6669_6e67_6572_7072,
    0x696e_7473_2d73_7461,
    0x7465_2d73_7061_6365,
];

/// AHash with fixed keys, so fingerprints are stable across runs.
fn hash_words(words: &[u64]) -> Fingerprint {
    let [k0, k1, k2, k3] = FINGERPRINT_SEEDS;
    let mut hasher = ahash::RandomState::with_seeds(k0, k1, k2, k3).build_hasher();
    hasher.write_usize(words.len());
    for &w in words {
        hasher.write_u64(w);
    }
    Fingerprint(hasher.finish())
}
