//! Presentation order
//!
//! One session seed drives every random decision. Block order and each
//! block's trial order draw from their own sub-stream, derived from the seed
//! and a stream number, so any order can be re-derived from the recorded seed
//! without replaying the rest of the session.
//!
//! Shuffling is Fisher-Yates (`SliceRandom::shuffle`) on `StdRng`; sampling
//! without replacement uses the partial variant. Orders are reproducible for a
//! given seed and `rand` release.

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{RngCore, SeedableRng};
use std::time::{SystemTime, UNIX_EPOCH};

/// Sub-stream used for block order
const BLOCK_ORDER_STREAM: u64 = 0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Randomizer {
    seed: u64,
}

impl Randomizer {
    pub fn new(seed: u64) -> Self {
        Self { seed }
    }

    /// Seed from wall-clock nanoseconds
    pub fn from_clock() -> Self {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos() as u64)
            .unwrap_or(0);
        Self::new(nanos)
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// Seed of an independent sub-stream
    pub fn sub_seed(&self, stream: u64) -> u64 {
        let mixed = self
            .seed
            .wrapping_add(stream.wrapping_mul(0x9E37_79B9_7F4A_7C15));
        StdRng::seed_from_u64(mixed).next_u64()
    }

    /// Permutation of `0..count` for block presentation
    pub fn block_order(&self, count: usize) -> (u64, Vec<usize>) {
        let seed = self.sub_seed(BLOCK_ORDER_STREAM);
        let mut order: Vec<usize> = (0..count).collect();
        order.shuffle(&mut StdRng::seed_from_u64(seed));
        (seed, order)
    }

    /// Main-trial order for the block at `block_slot` in the manifest
    ///
    /// With a cap below the set size this samples without replacement;
    /// otherwise it is a full permutation.
    pub fn trial_order(
        &self,
        block_slot: usize,
        stimuli: &[String],
        cap: Option<usize>,
    ) -> (u64, Vec<String>) {
        let seed = self.sub_seed(block_slot as u64 + 1);
        let mut rng = StdRng::seed_from_u64(seed);
        let mut pool = stimuli.to_vec();

        match cap {
            Some(n) if n < pool.len() => {
                let (chosen, _) = pool.partial_shuffle(&mut rng, n);
                (seed, chosen.to_vec())
            }
            _ => {
                pool.shuffle(&mut rng);
                (seed, pool)
            }
        }
    }
}
