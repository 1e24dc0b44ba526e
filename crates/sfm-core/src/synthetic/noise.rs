//! Deterministic noise helpers for synthetic scenes.
//!
//! The functions here avoid global RNG state and do not depend on the internal
//! algorithm of any RNG crate, so synthetic scenes stay stable across versions
//! and platforms.

use crate::{Real, Vec2};

/// Deterministic uniform pixel noise in `[-max_abs_px, +max_abs_px]`.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct UniformPixelNoise {
    /// Base seed controlling the pseudo-random sequence.
    pub seed: u64,
    /// Maximum absolute per-axis noise (pixels).
    pub max_abs_px: Real,
}

impl UniformPixelNoise {
    /// Sample a deterministic 2D noise vector for an `(image_idx, point_idx)` key.
    #[inline]
    pub fn sample(&self, image_idx: usize, point_idx: usize) -> Vec2 {
        let max_abs = self.max_abs_px.abs();
        if max_abs == 0.0 {
            return Vec2::zeros();
        }

        let key = mix_key(self.seed, image_idx, point_idx);
        let u = unit_sample(key);
        let v = unit_sample(key ^ 0x94D0_49BB_1331_11EB);

        Vec2::new((u - 0.5) * 2.0 * max_abs, (v - 0.5) * 2.0 * max_abs)
    }

    /// Apply deterministic noise to a pixel observation.
    #[inline]
    pub fn apply(&self, image_idx: usize, point_idx: usize, uv: Vec2) -> Vec2 {
        uv + self.sample(image_idx, point_idx)
    }
}

#[inline]
pub(crate) fn mix_key(seed: u64, a: usize, b: usize) -> u64 {
    seed ^ (a as u64).wrapping_mul(0x9E37_79B9_7F4A_7C15)
        ^ (b as u64).wrapping_mul(0xBF58_476D_1CE4_E5B9)
}

/// Uniform sample in `[0, 1)` derived from a key.
#[inline]
pub(crate) fn unit_sample(key: u64) -> Real {
    let mantissa = splitmix64(key) >> 11;
    (mantissa as Real) * (1.0 / ((1u64 << 53) as Real))
}

#[inline]
fn splitmix64(mut x: u64) -> u64 {
    x = x.wrapping_add(0x9E37_79B9_7F4A_7C15);
    let mut z = x;
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}
