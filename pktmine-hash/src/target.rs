//! Difficulty-to-target conversion and the share comparator
//!
//! Digests and targets are compared as big-endian 256-bit integers (see
//! `Hash256`). That choice is made once here and applied uniformly; the
//! tests below pin it down so a byte-order mixup cannot creep in.

use crate::hash_types::Hash256;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Share difficulty as assigned by the pool.
///
/// Values below 1 are invalid and are clamped to 1 on construction.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Difficulty(f64);

impl Difficulty {
    /// Create a difficulty, clamping invalid values (< 1, NaN) to 1.
    pub fn new(value: f64) -> Self {
        if value >= 1.0 {
            Self(value)
        } else {
            Self(1.0)
        }
    }

    /// Raw scalar value
    pub fn value(&self) -> f64 {
        self.0
    }
}

impl Default for Difficulty {
    fn default() -> Self {
        Self(1.0)
    }
}

impl fmt::Display for Difficulty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// High half of the difficulty-1 target, as a big-endian u128.
///
/// The full difficulty-1 target is four zero bytes followed by 28 `0xff`
/// bytes; a digest qualifies at difficulty 1 exactly when its leading four
/// bytes are zero.
const MAX_TARGET_HIGH: u128 = 0x0000_0000_ffff_ffff_ffff_ffff_ffff_ffff;

/// 256-bit share target derived from a difficulty
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Target([u8; 32]);

impl Target {
    /// Target for the given difficulty. Higher difficulty, smaller target.
    pub fn from_difficulty(difficulty: Difficulty) -> Self {
        // The division happens on the high 16 bytes; the low bytes only
        // stay saturated at difficulty 1 where the target is exact.
        let scaled = (MAX_TARGET_HIGH as f64 / difficulty.value()) as u128;
        let scaled = scaled.min(MAX_TARGET_HIGH);

        let mut bytes = [0u8; 32];
        bytes[..16].copy_from_slice(&scaled.to_be_bytes());
        if scaled == MAX_TARGET_HIGH {
            for b in &mut bytes[16..] {
                *b = 0xff;
            }
        }
        Self(bytes)
    }

    /// Does the digest qualify under this target?
    ///
    /// Pure and deterministic: a big-endian integer comparison, with
    /// equality counting as met.
    pub fn is_met(&self, digest: &Hash256) -> bool {
        digest.as_bytes() <= &self.0
    }

    /// Get as bytes
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn digest_with_prefix(prefix: [u8; 4], fill: u8) -> Hash256 {
        let mut bytes = [fill; 32];
        bytes[..4].copy_from_slice(&prefix);
        Hash256::from_bytes(bytes)
    }

    #[test]
    fn test_difficulty_clamped_to_one() {
        assert_eq!(Difficulty::new(0.25).value(), 1.0);
        assert_eq!(Difficulty::new(-3.0).value(), 1.0);
        assert_eq!(Difficulty::new(f64::NAN).value(), 1.0);
        assert_eq!(Difficulty::new(8.0).value(), 8.0);
    }

    #[test]
    fn test_difficulty_one_leading_zero_bytes() {
        let target = Target::from_difficulty(Difficulty::new(1.0));

        // Four leading zero bytes qualify regardless of the tail
        assert!(target.is_met(&digest_with_prefix([0, 0, 0, 0], 0xff)));
        assert!(target.is_met(&digest_with_prefix([0, 0, 0, 0], 0x00)));

        // All-ones prefix never qualifies
        assert!(!target.is_met(&digest_with_prefix([0xff, 0xff, 0xff, 0xff], 0x00)));
    }

    #[test]
    fn test_higher_difficulty_smaller_target() {
        let easy = Target::from_difficulty(Difficulty::new(1.0));
        let hard = Target::from_difficulty(Difficulty::new(4096.0));
        assert!(hard.as_bytes() < easy.as_bytes());

        // A digest just under the easy target fails the hard one
        let digest = digest_with_prefix([0, 0, 0, 0], 0xfe);
        assert!(easy.is_met(&digest));
        assert!(!hard.is_met(&digest));
    }

    #[test]
    fn test_meets_target_is_monotonic() {
        // If b qualifies and a < b then a qualifies too, at any difficulty
        for difficulty in [1.0, 2.0, 17.0, 1024.0, 1_000_000.0] {
            let target = Target::from_difficulty(Difficulty::new(difficulty));
            let mut below = [0u8; 32];
            below[..16].copy_from_slice(&target.as_bytes()[..16]);

            let b = Hash256::from_bytes(*target.as_bytes());
            let a = Hash256::from_bytes(below);
            assert!(a <= b);
            assert!(target.is_met(&b));
            assert!(target.is_met(&a), "monotonicity broken at {}", difficulty);
        }
    }

    #[test]
    fn test_equal_digest_meets() {
        let target = Target::from_difficulty(Difficulty::new(64.0));
        let digest = Hash256::from_bytes(*target.as_bytes());
        assert!(target.is_met(&digest));
    }
}
