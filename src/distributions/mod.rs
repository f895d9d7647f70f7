//! # Sampling Distributions
//!
//! Small sampling helpers shared by the compaction pickers (overlap and
//! file-count estimation) and the statistical read-path model.
//!
//! All sampling goes through an explicit `Pcg64` handle — the simulator
//! never touches thread-local RNG state, which is what keeps identical
//! seeds producing bit-identical traces.

// ------------------------------------------------------------------------------------------------
// Unit tests
// ------------------------------------------------------------------------------------------------


// ------------------------------------------------------------------------------------------------
// Includes
// ------------------------------------------------------------------------------------------------

use rand::Rng;
use rand_pcg::Pcg64;
use serde::{Deserialize, Serialize};

// ------------------------------------------------------------------------------------------------
// Distribution
// ------------------------------------------------------------------------------------------------

/// A one-dimensional sampling distribution.
///
/// Used for overlap fractions (values in `[0, 1]`), synthetic read
/// latencies (microseconds), and anywhere else the simulation draws a
/// scalar from a configured shape.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Distribution {
    /// Uniform over `[min, max]`.
    Uniform {
        /// Inclusive lower bound.
        min: f64,
        /// Inclusive upper bound.
        max: f64,
    },
    /// Exponential with the given mean (rate `1 / mean`).
    Exponential {
        /// Mean of the distribution; must be > 0.
        mean: f64,
    },
    /// Geometric number of trials until first success, scaled to `f64`.
    /// Samples are `≥ 1`.
    Geometric {
        /// Per-trial success probability, in `(0, 1]`.
        p: f64,
    },
    /// Degenerate distribution: every sample equals `value`.
    Fixed {
        /// The constant value.
        value: f64,
    },
}

impl Distribution {
    /// Draws one sample.
    pub fn sample(&self, rng: &mut Pcg64) -> f64 {
        match *self {
            Self::Uniform { min, max } => {
                if max <= min {
                    min
                } else {
                    rng.gen_range(min..=max)
                }
            }
            Self::Exponential { mean } => {
                // Inverse CDF; 1 - u keeps the argument strictly positive.
                let u: f64 = rng.gen_range(0.0..1.0);
                -mean * (1.0 - u).ln()
            }
            Self::Geometric { p } => Self::sample_geometric(rng, p) as f64,
            Self::Fixed { value } => value,
        }
    }

    /// Draws one sample clamped to `[0, 1]`, for fraction-valued uses.
    pub fn sample_fraction(&self, rng: &mut Pcg64) -> f64 {
        self.sample(rng).clamp(0.0, 1.0)
    }

    /// Number of trials until first success, `≥ 1`.
    pub fn sample_geometric(rng: &mut Pcg64, p: f64) -> u64 {
        let p = p.clamp(f64::EPSILON, 1.0);
        if p >= 1.0 {
            return 1;
        }
        let u: f64 = rng.gen_range(0.0..1.0);
        // Inverse CDF of the geometric distribution on {1, 2, ...}.
        let n = ((1.0 - u).ln() / (1.0 - p).ln()).floor() as u64 + 1;
        n.max(1)
    }

    /// Checks the distribution's parameters; returns a human-readable
    /// reason on failure.
    pub fn validate(&self) -> Result<(), String> {
        match *self {
            Self::Uniform { min, max } => {
                if !min.is_finite() || !max.is_finite() {
                    Err("uniform bounds must be finite".into())
                } else if max < min {
                    Err(format!("uniform max {max} < min {min}"))
                } else {
                    Ok(())
                }
            }
            Self::Exponential { mean } => {
                if mean > 0.0 && mean.is_finite() {
                    Ok(())
                } else {
                    Err(format!("exponential mean must be > 0, got {mean}"))
                }
            }
            Self::Geometric { p } => {
                if p > 0.0 && p <= 1.0 {
                    Ok(())
                } else {
                    Err(format!("geometric p must be in (0, 1], got {p}"))
                }
            }
            Self::Fixed { value } => {
                if value.is_finite() {
                    Ok(())
                } else {
                    Err("fixed value must be finite".into())
                }
            }
        }
    }
}
