//! Row and column selection strategies
//!
//! Every strategy works on an axis length and returns the positions to keep,
//! in ascending order. Columns are sampled with the same functions applied to
//! the column axis.

use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};

use dx_core::{Frame, FrameError};

/// How rows or columns are picked when a frame is too large
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SamplingStrategy {
    /// Leading positions
    First,
    /// Trailing positions
    Last,
    /// Positions around the middle
    Inner,
    /// Leading and trailing halves
    Outer,
    /// Seeded uniform sample without replacement
    Random,
}

impl SamplingStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            SamplingStrategy::First => "first",
            SamplingStrategy::Last => "last",
            SamplingStrategy::Inner => "inner",
            SamplingStrategy::Outer => "outer",
            SamplingStrategy::Random => "random",
        }
    }

    /// Positions to keep out of `len`, targeting `n`
    pub fn select(&self, len: usize, n: usize, seed: u64) -> Vec<usize> {
        match self {
            SamplingStrategy::First => first(len, n),
            SamplingStrategy::Last => last(len, n),
            SamplingStrategy::Inner => inner(len, n),
            SamplingStrategy::Outer => outer(len, n),
            SamplingStrategy::Random => random(len, n, seed),
        }
    }
}

impl std::str::FromStr for SamplingStrategy {
    /// The rejected value
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "first" => Ok(SamplingStrategy::First),
            "last" => Ok(SamplingStrategy::Last),
            "inner" => Ok(SamplingStrategy::Inner),
            "outer" => Ok(SamplingStrategy::Outer),
            "random" => Ok(SamplingStrategy::Random),
            _ => Err(s.to_string()),
        }
    }
}

impl std::fmt::Display for SamplingStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// `[0, n)`
pub fn first(len: usize, n: usize) -> Vec<usize> {
    (0..n.min(len)).collect()
}

/// `[len - n, len)`
pub fn last(len: usize, n: usize) -> Vec<usize> {
    (len.saturating_sub(n)..len).collect()
}

/// `[mid - n/2, mid + n/2)` with `mid = len/2`; odd `n` yields `n - 1` positions
pub fn inner(len: usize, n: usize) -> Vec<usize> {
    if n >= len {
        return (0..len).collect();
    }
    let mid = len / 2;
    let half = n / 2;
    (mid - half..mid + half).collect()
}

/// `[0, n/2)` followed by `[len - n/2, len)`; odd `n` yields `n - 1` positions
pub fn outer(len: usize, n: usize) -> Vec<usize> {
    if n >= len {
        return (0..len).collect();
    }
    let half = n / 2;
    (0..half).chain(len - half..len).collect()
}

/// Uniform sample of `n` positions, deterministic for a given seed
pub fn random(len: usize, n: usize, seed: u64) -> Vec<usize> {
    if n >= len {
        return (0..len).collect();
    }
    let mut rng = StdRng::seed_from_u64(seed);
    let mut positions = rand::seq::index::sample(&mut rng, len, n).into_vec();
    positions.sort_unstable();
    positions
}

/// Reproducible seed for a display slot: the sum of its character codes
pub fn seed_from_slot(slot: &str) -> u64 {
    slot.chars().map(|c| c as u64).sum()
}

/// Keep `n` rows of `frame`
pub fn sample_rows(
    frame: &Frame,
    strategy: SamplingStrategy,
    n: usize,
    seed: u64,
) -> Result<Frame, FrameError> {
    let positions = strategy.select(frame.num_rows(), n, seed);
    frame.take_rows(&positions)
}

/// Keep `n` columns of `frame`
pub fn sample_columns(
    frame: &Frame,
    strategy: SamplingStrategy,
    n: usize,
    seed: u64,
) -> Result<Frame, FrameError> {
    let positions = strategy.select(frame.num_columns(), n, seed);
    frame.select_columns(&positions)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_and_last() {
        assert_eq!(first(20, 3), vec![0, 1, 2]);
        assert_eq!(last(20, 3), vec![17, 18, 19]);
        assert_eq!(first(2, 5), vec![0, 1]);
        assert_eq!(last(2, 5), vec![0, 1]);
    }

    #[test]
    fn test_inner_middle_window() {
        assert_eq!(inner(20, 8), (6..14).collect::<Vec<_>>());
    }

    #[test]
    fn test_inner_odd_is_one_short() {
        // mid = 10, half = 3 -> [7, 13)
        assert_eq!(inner(20, 7), (7..13).collect::<Vec<_>>());
    }

    #[test]
    fn test_outer_edges() {
        let expected: Vec<usize> = (0..4).chain(16..20).collect();
        assert_eq!(outer(20, 8), expected);
        assert_eq!(outer(20, 7).len(), 6);
    }

    #[test]
    fn test_all_rows_when_n_exceeds_len() {
        for strategy in [
            SamplingStrategy::First,
            SamplingStrategy::Last,
            SamplingStrategy::Inner,
            SamplingStrategy::Outer,
            SamplingStrategy::Random,
        ] {
            assert_eq!(strategy.select(5, 5, 1), vec![0, 1, 2, 3, 4]);
            assert_eq!(strategy.select(5, 9, 1), vec![0, 1, 2, 3, 4]);
        }
    }

    #[test]
    fn test_random_is_seeded() {
        let a = random(1000, 50, 42);
        assert_eq!(a, random(1000, 50, 42));
        assert_ne!(a, random(1000, 50, 43));
        assert_eq!(a.len(), 50);
        assert!(a.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_seed_from_slot() {
        assert_eq!(seed_from_slot("ab"), 97 + 98);
        assert_eq!(seed_from_slot("slot-1"), seed_from_slot("slot-1"));
    }

    #[test]
    fn test_parse_strategy() {
        assert_eq!("Inner".parse::<SamplingStrategy>(), Ok(SamplingStrategy::Inner));
        assert_eq!("middle".parse::<SamplingStrategy>(), Err("middle".to_string()));
    }
}
