//! XorShift32 generator used for tile spawns.
//!
//! Cheap and fully deterministic for a given seed, which keeps episode
//! trajectories reproducible across processes and platforms.

use rand::{RngCore, SeedableRng};

use crate::constants::DEFAULT_SEED;

/// Marsaglia's 32-bit xorshift (13, 17, 5).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct XorShift32 {
    state: u32,
}

impl XorShift32 {
    /// Creates a generator. A zero seed, which would lock the generator at
    /// zero, is replaced by [`DEFAULT_SEED`].
    pub const fn new(seed: u32) -> Self {
        XorShift32 {
            state: if seed == 0 { DEFAULT_SEED } else { seed },
        }
    }

    /// Returns a value in `0..n`, by modulo reduction.
    ///
    /// # Panics
    ///
    /// Panics if `n` is zero.
    #[inline]
    pub fn below(&mut self, n: u32) -> u32 {
        self.next_u32() % n
    }
}

impl Default for XorShift32 {
    fn default() -> Self {
        XorShift32::new(DEFAULT_SEED)
    }
}

impl RngCore for XorShift32 {
    #[inline]
    fn next_u32(&mut self) -> u32 {
        let mut x = self.state;
        x ^= x << 13;
        x ^= x >> 17;
        x ^= x << 5;
        self.state = x;
        x
    }

    #[inline]
    fn next_u64(&mut self) -> u64 {
        let hi = self.next_u32() as u64;
        let lo = self.next_u32() as u64;
        (hi << 32) | lo
    }

    fn fill_bytes(&mut self, dst: &mut [u8]) {
        for chunk in dst.chunks_mut(4) {
            let bytes = self.next_u32().to_le_bytes();
            chunk.copy_from_slice(&bytes[..chunk.len()]);
        }
    }
}

impl SeedableRng for XorShift32 {
    type Seed = [u8; 4];

    fn from_seed(seed: Self::Seed) -> Self {
        XorShift32::new(u32::from_le_bytes(seed))
    }
}
