//! Lazily enumerated choice sets.
//!
//! Ranges and bit flips are never materialized; `get(i)` computes the i-th
//! value on demand.

use crate::error::{ChoiceError, ChoiceResult};
use crate::value::ChoiceValue;
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq)]
pub enum Choices {
    Bool {
        false_first: bool,
    },
    /// `start, start + delta, ...` with `count` elements.
    Range {
        start: i64,
        delta: i64,
        count: u64,
    },
    /// Explicit values in order; duplicates are distinct positions.
    List(Arc<[ChoiceValue]>),
    /// The unperturbed value, then every way of flipping `nbits` of the low
    /// `width` bits in combinatorial-number-system order.
    BitFlip {
        value: i64,
        width: u32,
        nbits: u32,
    },
}

impl Choices {
    pub fn list(values: Vec<ChoiceValue>) -> Self {
        Choices::List(Arc::from(values))
    }

    /// Values from `min` to `max` stepping by `delta`. Bounds given in the
    /// wrong order are swapped; a negative delta enumerates from `max` down.
    /// Ranges with more than `i64::MAX` elements are rejected.
    pub fn range(name: &str, min: i64, max: i64, delta: i64) -> ChoiceResult<Self> {
        if delta == 0 {
            return Err(ChoiceError::ZeroDelta {
                name: name.to_string(),
            });
        }
        let (lo, hi) = if min > max { (max, min) } else { (min, max) };
        let span = hi as i128 - lo as i128;
        let count = span / (delta as i128).abs() + 1;
        // Positions are indexed by usize and offset by i64 arithmetic.
        let count = u64::try_from(count)
            .ok()
            .filter(|&c| c <= i64::MAX as u64 && usize::try_from(c).is_ok())
            .ok_or_else(|| ChoiceError::RangeTooLarge {
                name: name.to_string(),
                min,
                max,
                delta,
            })?;
        let start = if delta > 0 { lo } else { hi };
        Ok(Choices::Range {
            start,
            delta,
            count,
        })
    }

    pub fn bit_flip(value: i64, width: u32, nbits: u32) -> ChoiceResult<Self> {
        if width == 0 || width > 64 || nbits == 0 || nbits > width {
            return Err(ChoiceError::InvalidBitFlip { width, nbits });
        }
        Ok(Choices::BitFlip {
            value,
            width,
            nbits,
        })
    }

    pub fn len(&self) -> usize {
        match self {
            Choices::Bool { .. } => 2,
            Choices::Range { count, .. } => *count as usize,
            Choices::List(values) => values.len(),
            Choices::BitFlip { width, nbits, .. } => {
                1 + binomial(*width as u64, *nbits as u64) as usize
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get(&self, idx: usize) -> Option<ChoiceValue> {
        if idx >= self.len() {
            return None;
        }
        let v = match self {
            Choices::Bool { false_first } => ChoiceValue::Bool((idx == 0) != *false_first),
            Choices::Range { start, delta, .. } => {
                ChoiceValue::Int(start.wrapping_add((idx as i64).wrapping_mul(*delta)))
            }
            Choices::List(values) => values[idx].clone(),
            Choices::BitFlip {
                value,
                width,
                nbits,
            } => {
                if idx == 0 {
                    ChoiceValue::Int(*value)
                } else {
                    let mask = unrank_combination(idx as u64 - 1, *nbits, *width);
                    ChoiceValue::Int(*value ^ mask as i64)
                }
            }
        };
        Some(v)
    }

    /// The same set enumerated back to front.
    pub fn reversed(&self) -> Self {
        match self {
            Choices::Bool { false_first } => Choices::Bool {
                false_first: !false_first,
            },
            Choices::Range {
                start,
                delta,
                count,
            } => Choices::Range {
                start: start.wrapping_add(((*count as i64) - 1).wrapping_mul(*delta)),
                delta: -delta,
                count: *count,
            },
            _ => {
                let mut values = self.to_vec();
                values.reverse();
                Choices::list(values)
            }
        }
    }

    pub fn to_vec(&self) -> Vec<ChoiceValue> {
        (0..self.len()).filter_map(|i| self.get(i)).collect()
    }
}

/// C(n, k), saturating at `u64::MAX`.
pub fn binomial(n: u64, k: u64) -> u64 {
    if k > n {
        return 0;
    }
    let k = k.min(n - k);
    let mut acc: u128 = 1;
    for i in 0..k {
        acc = acc * (n - i) as u128 / (i + 1) as u128;
        if acc > u64::MAX as u128 {
            return u64::MAX;
        }
    }
    acc as u64
}

/// The `rank`-th `k`-subset of `0..n` in combinatorial-number-system order,
/// as a bit mask. Rank 0 is `{0, .., k-1}`.
fn unrank_combination(mut rank: u64, k: u32, n: u32) -> u64 {
    let mut mask = 0u64;
    let mut upper = n as u64;
    for i in (1..=k as u64).rev() {
        // largest c < upper with C(c, i) <= rank
        let mut c = upper - 1;
        while binomial(c, i) > rank {
            c -= 1;
        }
        rank -= binomial(c, i);
        mask |= 1u64 << c;
        upper = c;
    }
    mask
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ints(c: &Choices) -> Vec<i64> {
        c.to_vec().iter().filter_map(ChoiceValue::as_int).collect()
    }

    #[test]
    fn test_range_ascending_and_descending() {
        assert_eq!(ints(&Choices::range("r", 0, 4, 1).unwrap()), vec![0, 1, 2, 3, 4]);
        assert_eq!(ints(&Choices::range("r", 0, 5, 2).unwrap()), vec![0, 2, 4]);
        assert_eq!(ints(&Choices::range("r", 0, 5, -2).unwrap()), vec![5, 3, 1]);
        assert_eq!(ints(&Choices::range("r", 3, 1, 1).unwrap()), vec![1, 2, 3]);
    }

    #[test]
    fn test_range_zero_delta() {
        assert_eq!(
            Choices::range("r", 0, 3, 0),
            Err(ChoiceError::ZeroDelta { name: "r".into() })
        );
    }

    #[test]
    fn test_range_over_whole_i64_is_rejected() {
        assert!(matches!(
            Choices::range("all", i64::MIN, i64::MAX, 1),
            Err(ChoiceError::RangeTooLarge { .. })
        ));
        assert!(matches!(
            Choices::range("all", i64::MAX, i64::MIN, -1),
            Err(ChoiceError::RangeTooLarge { .. })
        ));
        // 2^63 elements, one past the limit
        assert!(matches!(
            Choices::range("half", i64::MIN, i64::MAX, 2),
            Err(ChoiceError::RangeTooLarge { .. })
        ));
    }

    #[test]
    fn test_wide_range_with_large_step_reverses_exactly() {
        let r = Choices::range("r", i64::MIN, i64::MAX, 4).unwrap();
        assert_eq!(r.len() as u64, 1u64 << 62);
        assert_eq!(r.get(0), Some(ChoiceValue::Int(i64::MIN)));
        let back = r.reversed();
        assert_eq!(back.len(), r.len());
        assert_eq!(back.get(0), Some(ChoiceValue::Int(i64::MAX - 3)));
        assert_eq!(back.get(back.len() - 1), Some(ChoiceValue::Int(i64::MIN)));

        let extremes = Choices::range("r", i64::MIN, i64::MAX, i64::MAX).unwrap();
        assert_eq!(ints(&extremes), vec![i64::MIN, -1, i64::MAX - 1]);
        assert_eq!(ints(&extremes.reversed()), vec![i64::MAX - 1, -1, i64::MIN]);
    }

    #[test]
    fn test_range_reversed() {
        let r = Choices::range("r", 0, 5, 2).unwrap().reversed();
        assert_eq!(ints(&r), vec![4, 2, 0]);
    }

    #[test]
    fn test_bool_order() {
        let b = Choices::Bool { false_first: true };
        assert_eq!(b.get(0), Some(ChoiceValue::Bool(false)));
        assert_eq!(b.get(1), Some(ChoiceValue::Bool(true)));
        assert_eq!(b.get(2), None);
        assert_eq!(b.reversed().get(0), Some(ChoiceValue::Bool(true)));
    }

    #[test]
    fn test_binomial() {
        assert_eq!(binomial(5, 2), 10);
        assert_eq!(binomial(64, 1), 64);
        assert_eq!(binomial(3, 4), 0);
        assert_eq!(binomial(64, 32), 1_832_624_140_942_590_534);
    }

    #[test]
    fn test_single_bit_flip() {
        let c = Choices::bit_flip(0b1010, 4, 1).unwrap();
        assert_eq!(ints(&c), vec![0b1010, 0b1011, 0b1000, 0b1110, 0b0010]);
    }

    #[test]
    fn test_two_bit_flip_distinct() {
        let c = Choices::bit_flip(0, 5, 2).unwrap();
        let vals = ints(&c);
        assert_eq!(vals.len(), 11);
        assert_eq!(vals[0], 0);
        assert_eq!(vals[1], 0b00011);
        let mut flipped: Vec<i64> = vals[1..].to_vec();
        assert!(flipped.iter().all(|v| v.count_ones() == 2 && *v < 32));
        flipped.sort();
        flipped.dedup();
        assert_eq!(flipped.len(), 10);
    }

    #[test]
    fn test_invalid_bit_flip() {
        assert!(Choices::bit_flip(0, 8, 9).is_err());
        assert!(Choices::bit_flip(0, 65, 1).is_err());
        assert!(Choices::bit_flip(0, 8, 0).is_err());
    }
}
