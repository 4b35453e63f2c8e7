//! Deterministic noise helpers for synthetic pose streams.
//!
//! The functions here avoid `thread_rng` and do not depend on the internal
//! algorithm of `rand` RNGs. This keeps synthetic datasets stable across
//! versions and platforms.

use crate::{Real, Vec3};

/// Deterministic zero-mean Gaussian noise on 3-vectors.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GaussianNoise {
    /// Base seed controlling the pseudo-random sequence.
    pub seed: u64,
    /// Per-axis standard deviation.
    pub sigma: Real,
}

impl Default for GaussianNoise {
    fn default() -> Self {
        Self {
            seed: 0,
            sigma: 0.0,
        }
    }
}

impl GaussianNoise {
    pub fn new(seed: u64, sigma: Real) -> Self {
        Self { seed, sigma }
    }

    /// Sample a deterministic noise vector for a given `(stream, index)` key.
    pub fn sample(&self, stream: usize, index: usize) -> Vec3 {
        if self.sigma == 0.0 {
            return Vec3::zeros();
        }
        let key = mix_key(self.seed, stream, index);
        let mut out = Vec3::zeros();
        for axis in 0..3 {
            let k = key ^ (axis as u64 + 1).wrapping_mul(0xD6E8_FEB8_6659_FD93);
            let u1 = u64_to_unit_f64(splitmix64(k));
            let u2 = u64_to_unit_f64(splitmix64(k ^ 0x94D0_49BB_1331_11EB));
            // Box-Muller; shift u1 into (0, 1] so ln() stays finite.
            let r = (-2.0 * (1.0 - u1).ln()).sqrt();
            out[axis] = self.sigma * r * (2.0 * std::f64::consts::PI * u2).cos();
        }
        out
    }

    /// Apply deterministic noise to a vector.
    pub fn apply(&self, stream: usize, index: usize, v: Vec3) -> Vec3 {
        v + self.sample(stream, index)
    }
}

#[inline]
fn mix_key(seed: u64, stream: usize, index: usize) -> u64 {
    seed ^ (stream as u64).wrapping_mul(0x9E37_79B9_7F4A_7C15)
        ^ (index as u64).wrapping_mul(0xBF58_476D_1CE4_E5B9)
}

#[inline]
fn splitmix64(mut x: u64) -> u64 {
    x = x.wrapping_add(0x9E37_79B9_7F4A_7C15);
    let mut z = x;
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}

#[inline]
fn u64_to_unit_f64(x: u64) -> Real {
    // Top 53 bits to a double in [0, 1).
    let mantissa = x >> 11;
    (mantissa as Real) * (1.0 / ((1u64 << 53) as Real))
}
