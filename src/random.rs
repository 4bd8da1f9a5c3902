//! Source of the random choices made while planning probe attempts

use rand::distributions::{Distribution, WeightedIndex};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Random choices needed by the driver
///
/// Implementations must return an index inside the slice or range they were handed
pub trait RandomSource {
    /// Pick an index with probability proportional to its weight
    fn weighted(&mut self, weights: &[u32]) -> usize;

    /// Pick an index in `0..len` uniformly
    fn index(&mut self, len: usize) -> usize;
}

/// [RandomSource] seeded from operating system entropy
pub struct EntropySource {
    rng: StdRng,
}

impl EntropySource {
    pub fn new() -> Self {
        Self {
            rng: StdRng::from_entropy(),
        }
    }

    /// Reproducible source for benchmarks and tests
    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }
}

impl Default for EntropySource {
    fn default() -> Self {
        Self::new()
    }
}

impl RandomSource for EntropySource {
    fn weighted(&mut self, weights: &[u32]) -> usize {
        // All-zero or empty weights have no meaningful choice, fall back to the first entry
        match WeightedIndex::new(weights) {
            Ok(distribution) => distribution.sample(&mut self.rng),
            Err(_) => 0,
        }
    }

    fn index(&mut self, len: usize) -> usize {
        if len == 0 {
            return 0;
        }
        self.rng.gen_range(0..len)
    }
}
