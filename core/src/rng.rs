//! Deterministic random number generation.
//!
//! RULE: Nothing in the engine may call any platform RNG.
//! All randomness flows through TrialRng instances derived
//! from the master seed passed in by the caller.
//!
//! Each Monte Carlo trial gets its own stream, seeded from
//! (master_seed XOR stream_index * golden_ratio). This means:
//!   - A trial's draws never depend on how many trials ran before it.
//!   - Trials can run on any thread in any order and still be bit-identical.

use rand::{RngCore, SeedableRng};
use rand_pcg::Pcg64Mcg;

const GOLDEN_GAMMA: u64 = 0x9e37_79b9_7f4a_7c15;

/// A deterministic RNG for a single trial or stream.
pub struct TrialRng {
    pub index: u64,
    inner: Pcg64Mcg,
}

impl TrialRng {
    /// Create a stream from the master seed and a stable index.
    pub fn new(master_seed: u64, stream_index: u64) -> Self {
        let derived_seed = master_seed ^ stream_index.wrapping_mul(GOLDEN_GAMMA);
        Self {
            index: stream_index,
            inner: Pcg64Mcg::seed_from_u64(derived_seed),
        }
    }

    /// Roll a float in [0.0, 1.0).
    pub fn next_f64(&mut self) -> f64 {
        let bits = self.inner.next_u64();
        (bits >> 11) as f64 * (1.0 / (1u64 << 53) as f64)
    }

    /// Draw a raw u64 (full range).
    pub fn next_u64(&mut self) -> u64 {
        self.inner.next_u64()
    }

    /// Standard normal draw (Box-Muller, cosine branch only).
    /// Consumes exactly two uniforms so the stream layout stays fixed.
    pub fn standard_normal(&mut self) -> f64 {
        let u1 = self.next_f64().max(1e-300);
        let u2 = self.next_f64();
        (-2.0 * u1.ln()).sqrt() * (std::f64::consts::TAU * u2).cos()
    }

    /// Normal draw with the given mean and standard deviation.
    pub fn normal(&mut self, mean: f64, std_dev: f64) -> f64 {
        mean + std_dev * self.standard_normal()
    }
}
