//! Deterministic utilities for reproducible training
//!
//! Provides the LCG-based RNG and the seeded train/held-out split, so the
//! same upload and seed always produce the same partition and model.

use absence_ai_core::{PipelineError, Result};
use std::num::Wrapping;

/// Linear Congruential Generator for deterministic pseudo-randomness
/// Uses constants from Numerical Recipes (glibc)
#[derive(Clone, Debug)]
pub struct LcgRng {
    state: Wrapping<i64>,
}

impl LcgRng {
    // LCG constants (compatible with glibc)
    const MULTIPLIER: i64 = 1103515245;
    const INCREMENT: i64 = 12345;
    const MODULUS: i64 = 1 << 31;

    pub fn new(seed: u64) -> Self {
        Self {
            state: Wrapping((seed % Self::MODULUS as u64) as i64),
        }
    }

    /// Generate next random i64 in range [0, MODULUS)
    pub fn next_i64(&mut self) -> i64 {
        self.state = self.state * Wrapping(Self::MULTIPLIER) + Wrapping(Self::INCREMENT);
        self.state.0 & (Self::MODULUS - 1)
    }

    /// Generate random index in range [0, max)
    pub fn next_index(&mut self, max: usize) -> usize {
        if max == 0 {
            return 0;
        }
        (self.next_i64() as u64 % max as u64) as usize
    }

    /// In-place Fisher–Yates shuffle
    pub fn shuffle<T>(&mut self, items: &mut [T]) {
        for i in (1..items.len()).rev() {
            let j = self.next_index(i + 1);
            items.swap(i, j);
        }
    }
}

/// Row indices of the two partitions
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Split {
    pub train: Vec<usize>,
    pub holdout: Vec<usize>,
}

/// Shuffle `0..n` with `seed` and hold out `ceil(n * test_size)` rows,
/// clamped so both partitions keep at least one row
pub fn train_test_split(n: usize, test_size: f64, seed: u64) -> Result<Split> {
    if n < 2 {
        return Err(PipelineError::Schema(format!(
            "need at least 2 rows to train, got {}",
            n
        )));
    }
    if !(test_size > 0.0 && test_size < 1.0) {
        return Err(PipelineError::Config(format!(
            "test_size must be in (0, 1), got {}",
            test_size
        )));
    }

    let holdout_len = ((n as f64 * test_size).ceil() as usize).clamp(1, n - 1);

    let mut indices: Vec<usize> = (0..n).collect();
    LcgRng::new(seed).shuffle(&mut indices);

    let train = indices.split_off(holdout_len);
    Ok(Split {
        train,
        holdout: indices,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lcg_determinism() {
        let mut rng1 = LcgRng::new(42);
        let mut rng2 = LcgRng::new(42);

        for _ in 0..100 {
            assert_eq!(rng1.next_i64(), rng2.next_i64());
        }
    }

    #[test]
    fn test_lcg_range() {
        let mut rng = LcgRng::new(42);
        for _ in 0..100 {
            let val = rng.next_index(10);
            assert!(val < 10);
        }
    }

    #[test]
    fn test_shuffle_is_permutation() {
        let mut items: Vec<usize> = (0..50).collect();
        LcgRng::new(7).shuffle(&mut items);

        let mut sorted = items.clone();
        sorted.sort_unstable();
        assert_eq!(sorted, (0..50).collect::<Vec<_>>());
        assert_ne!(items, sorted);
    }

    #[test]
    fn test_split_sizes() {
        let split = train_test_split(100, 0.2, 42).unwrap();
        assert_eq!(split.holdout.len(), 20);
        assert_eq!(split.train.len(), 80);

        // ceil(11 * 0.2) = 3
        let split = train_test_split(11, 0.2, 42).unwrap();
        assert_eq!(split.holdout.len(), 3);
        assert_eq!(split.train.len(), 8);
    }

    #[test]
    fn test_split_reproducible() {
        assert_eq!(
            train_test_split(64, 0.25, 42).unwrap(),
            train_test_split(64, 0.25, 42).unwrap()
        );
        assert_ne!(
            train_test_split(64, 0.25, 42).unwrap(),
            train_test_split(64, 0.25, 43).unwrap()
        );
    }

    #[test]
    fn test_split_keeps_both_sides() {
        let split = train_test_split(2, 0.9, 42).unwrap();
        assert_eq!(split.holdout.len(), 1);
        assert_eq!(split.train.len(), 1);
    }

    #[test]
    fn test_split_too_few_rows() {
        assert!(matches!(
            train_test_split(1, 0.2, 42),
            Err(PipelineError::Schema(_))
        ));
    }
}
