//! Bloom filter for lossy visited-state storage.
//!
//! Fixed memory. A false positive prunes a state that was never explored,
//! so a search using it can miss paths; it never reports a spurious one.

use pathwise_state::Fingerprint;

#[derive(Clone)]
pub struct BloomFilter {
    bits: Vec<u64>,
    num_bits: u64,
    num_hashes: u32,
    count: usize,
}

impl BloomFilter {
    /// `num_bits` bits probed by `num_hashes` hash functions. About eight
    /// bits per expected state with three hashes gives a 2% false positive
    /// rate.
    pub fn new(num_bits: usize, num_hashes: u32) -> Self {
        let num_bits = num_bits.max(64);
        Self {
            bits: vec![0; num_bits.div_ceil(64)],
            num_bits: num_bits as u64,
            num_hashes: num_hashes.max(1),
            count: 0,
        }
    }

    /// `from_log2_bits(20, 3)` is 2^20 bits (128 KiB) probed three times.
    pub fn from_log2_bits(log2_bits: u32, num_hashes: u32) -> Self {
        Self::new(1usize << log2_bits.min(40), num_hashes)
    }

    /// Returns true if `fp` was probably new.
    pub fn insert(&mut self, fp: Fingerprint) -> bool {
        let (h1, h2) = hash_pair(fp);
        let mut was_new = false;
        for i in 0..self.num_hashes {
            let pos = self.bit_position(h1, h2, i);
            let mask = 1u64 << (pos % 64);
            let word = &mut self.bits[pos / 64];
            if *word & mask == 0 {
                *word |= mask;
                was_new = true;
            }
        }
        if was_new {
            self.count += 1;
        }
        was_new
    }

    /// May return false positives, never false negatives.
    pub fn contains(&self, fp: Fingerprint) -> bool {
        let (h1, h2) = hash_pair(fp);
        (0..self.num_hashes).all(|i| {
            let pos = self.bit_position(h1, h2, i);
            self.bits[pos / 64] & (1u64 << (pos % 64)) != 0
        })
    }

    /// Number of inserts that set at least one bit.
    pub fn len(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    pub fn memory_bytes(&self) -> usize {
        self.bits.len() * 8
    }

    /// Expected false positive rate at the current fill level.
    pub fn estimated_fp_rate(&self) -> f64 {
        let n = self.count as f64;
        let m = self.num_bits as f64;
        let k = self.num_hashes as f64;
        (1.0 - (-k * n / m).exp()).powf(k)
    }

    pub fn clear(&mut self) {
        self.bits.fill(0);
        self.count = 0;
    }

    /// h_i(x) = (h1 + i * h2) mod num_bits
    #[inline]
    fn bit_position(&self, h1: u64, h2: u64, i: u32) -> usize {
        (h1.wrapping_add((i as u64).wrapping_mul(h2)) % self.num_bits) as usize
    }
}

#[inline]
fn hash_pair(fp: Fingerprint) -> (u64, u64) {
    let h1 = fp.as_u64();
    let h2 = h1.wrapping_mul(0x9E37_79B9_7F4A_7C15).wrapping_add(0x6A09_E667) | 1;
    (h1, h2)
}

impl std::fmt::Debug for BloomFilter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BloomFilter")
            .field("bits", &self.num_bits)
            .field("hashes", &self.num_hashes)
            .field("count", &self.count)
            .finish()
    }
}
