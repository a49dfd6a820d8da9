//! Seeded Random Numbers
//!
//! Xorshift128+ seeded through SplitMix64. Bot decisions, bolt spread and
//! respawn points all draw from the world's single instance, so a seed
//! reproduces a session.

use serde::{Deserialize, Serialize};

/// Xorshift128+ generator.
///
/// ```
/// use arena_clash::core::rng::DeterministicRng;
///
/// let mut a = DeterministicRng::new(7);
/// let mut b = DeterministicRng::new(7);
/// assert_eq!(a.range_f32(-1.0, 1.0), b.range_f32(-1.0, 1.0));
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeterministicRng {
    s0: u64,
    s1: u64,
}

impl Default for DeterministicRng {
    fn default() -> Self {
        Self::new(0)
    }
}

impl DeterministicRng {
    /// Seed the generator. Any seed, including 0, gives a usable state.
    pub fn new(seed: u64) -> Self {
        let mut mix = seed;
        let s0 = splitmix64(&mut mix);
        let s1 = splitmix64(&mut mix);
        if s0 | s1 == 0 {
            return Self { s0: 1, s1: 1 };
        }
        Self { s0, s1 }
    }

    /// Raw 64 bits.
    #[inline]
    pub fn next_u64(&mut self) -> u64 {
        let (a, b) = (self.s0, self.s1);
        let out = a.wrapping_add(b);
        let x = b ^ a;
        self.s0 = a.rotate_left(24) ^ x ^ (x << 16);
        self.s1 = x.rotate_left(37);
        out
    }

    /// Integer in `[0, max)`; 0 when `max` is 0.
    #[inline]
    pub fn next_int(&mut self, max: u32) -> u32 {
        match max {
            0 => 0,
            m => (self.next_u64() % u64::from(m)) as u32,
        }
    }

    /// Uniform in `[0, 1)` from the top 24 bits.
    #[inline]
    pub fn next_f32(&mut self) -> f32 {
        const SCALE: f32 = 1.0 / (1u32 << 24) as f32;
        (self.next_u64() >> 40) as f32 * SCALE
    }

    /// Uniform in `[min, max)`. Returns `min` for an empty range.
    #[inline]
    pub fn range_f32(&mut self, min: f32, max: f32) -> f32 {
        if max <= min {
            return min;
        }
        min + (max - min) * self.next_f32()
    }

    /// Bernoulli trial.
    #[inline]
    pub fn chance(&mut self, probability: f32) -> bool {
        probability > 0.0 && self.next_f32() < probability.min(1.0)
    }

    /// -1.0 or 1.0.
    #[inline]
    pub fn sign(&mut self) -> f32 {
        if self.next_u64() >> 63 == 0 {
            -1.0
        } else {
            1.0
        }
    }

    /// Point `(x, z)` inside the square `[-extent, extent)²`.
    pub fn point_in_square(&mut self, extent: f32) -> (f32, f32) {
        let extent = extent.max(0.0);
        let x = self.range_f32(-extent, extent);
        let z = self.range_f32(-extent, extent);
        (x, z)
    }
}

#[inline]
fn splitmix64(state: &mut u64) -> u64 {
    *state = state.wrapping_add(0x9E37_79B9_7F4A_7C15);
    let mut z = *state;
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}
