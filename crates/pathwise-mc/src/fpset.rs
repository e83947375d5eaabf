//! Open-addressing fingerprint set with linear probing.
//!
//! 8 bytes per visited state. The driver is single threaded, so the set
//! grows itself on insert instead of leaving resizing to the caller.

use pathwise_state::Fingerprint;

/// Sentinel value for empty slots.
const EMPTY: u64 = u64::MAX;

/// A set of 64-bit fingerprints.
///
/// Grows when load exceeds 37.5%. The fingerprint `u64::MAX` is remapped
/// to keep the empty sentinel free.
#[derive(Clone)]
pub struct FingerprintSet {
    slots: Vec<u64>,
    mask: u64,
    count: usize,
}

impl FingerprintSet {
    /// Slot count is at least three times `expected_capacity`, rounded up to
    /// a power of two.
    pub fn new(expected_capacity: usize) -> Self {
        let len = expected_capacity
            .saturating_mul(3)
            .max(1024)
            .next_power_of_two();
        Self {
            slots: vec![EMPTY; len],
            mask: (len - 1) as u64,
            count: 0,
        }
    }

    #[inline]
    fn remap(fp: Fingerprint) -> u64 {
        match fp.as_u64() {
            EMPTY => EMPTY - 1,
            v => v,
        }
    }

    #[inline]
    fn should_grow(&self) -> bool {
        self.count * 8 >= self.slots.len() * 3
    }

    fn grow(&mut self) {
        let new_len = self.slots.len() * 2;
        let new_mask = (new_len - 1) as u64;
        let mut new_slots = vec![EMPTY; new_len];
        for &val in self.slots.iter().filter(|&&v| v != EMPTY) {
            let mut idx = (val & new_mask) as usize;
            while new_slots[idx] != EMPTY {
                idx = ((idx as u64 + 1) & new_mask) as usize;
            }
            new_slots[idx] = val;
        }
        self.slots = new_slots;
        self.mask = new_mask;
    }

    /// Returns true if `fp` was not present.
    pub fn insert(&mut self, fp: Fingerprint) -> bool {
        if self.should_grow() {
            self.grow();
        }
        let val = Self::remap(fp);
        let mut idx = (val & self.mask) as usize;
        loop {
            match self.slots[idx] {
                current if current == val => return false,
                EMPTY => {
                    self.slots[idx] = val;
                    self.count += 1;
                    return true;
                }
                _ => idx = ((idx as u64 + 1) & self.mask) as usize,
            }
        }
    }

    pub fn contains(&self, fp: Fingerprint) -> bool {
        let val = Self::remap(fp);
        let mut idx = (val & self.mask) as usize;
        loop {
            match self.slots[idx] {
                current if current == val => return true,
                EMPTY => return false,
                _ => idx = ((idx as u64 + 1) & self.mask) as usize,
            }
        }
    }

    pub fn len(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Number of slots, filled or not.
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    pub fn memory_bytes(&self) -> usize {
        self.slots.len() * 8
    }

    pub fn clear(&mut self) {
        self.slots.fill(EMPTY);
        self.count = 0;
    }
}

impl std::fmt::Debug for FingerprintSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FingerprintSet")
            .field("len", &self.count)
            .field("capacity", &self.slots.len())
            .finish()
    }
}
