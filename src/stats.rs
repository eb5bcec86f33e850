//! Derived statistics over the table's built-in operation counters.
//!
//! The table itself accumulates `(count, mean, sum of squared deviations)`
//! per tracked metric; the engine only reads those records and derives
//! variance and standard deviation. The square root goes through a
//! bit-pattern-seeded Newton refinement with a fixed step budget, the same
//! arithmetic a host with no square-root primitive can evaluate as one
//! non-looping expression.

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::memory::{get_f64_le, get_u64_le, MemoryAccessor};

/// Serialized size of one [`StatsSample`] record in table memory.
pub const STATS_SAMPLE_LEN: usize = 24;

/// Seed constant for the inverse-square-root bit trick on f64.
const INV_SQRT_MAGIC: u64 = 0x5FE6_EB50_C7B5_37A9;

/// Newton refinement steps. Fixed budget, never convergence-looped; four
/// steps give well under 1e-8 relative error across the variance magnitudes
/// seen here.
const INV_SQRT_STEPS: usize = 4;

/// The per-operation cost metrics a table tracks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum MetricKind {
    /// Probe cost of insertions.
    Insertion,
    /// Probe cost of lookups that found their key.
    SuccessfulLookup,
    /// Probe cost of lookups that missed.
    UnsuccessfulLookup,
}

impl MetricKind {
    /// Position of this metric's sample record within the stats block.
    pub fn block_index(self) -> usize {
        match self {
            MetricKind::Insertion => 0,
            MetricKind::SuccessfulLookup => 1,
            MetricKind::UnsuccessfulLookup => 2,
        }
    }
}

/// One metric's pre-aggregated counters, as stored by the table:
/// `count` observations with running `mean` and `sum_squared_deviation`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StatsSample {
    /// Number of observations.
    pub count: u64,
    /// Running mean.
    pub mean: f64,
    /// Sum of squared deviations from the mean.
    pub sum_squared_deviation: f64,
}

impl StatsSample {
    /// Decodes a 24-byte sample record.
    pub fn from_bytes(bytes: &[u8]) -> Self {
        Self {
            count: get_u64_le(bytes, 0),
            mean: get_f64_le(bytes, 8),
            sum_squared_deviation: get_f64_le(bytes, 16),
        }
    }

    /// Reads the sample for `metric` out of the stats block at `base`.
    pub fn read<A: MemoryAccessor + ?Sized>(
        accessor: &A,
        base: u64,
        metric: MetricKind,
    ) -> Result<Self> {
        let addr = base + (metric.block_index() * STATS_SAMPLE_LEN) as u64;
        let bytes = accessor.read_vec(addr, STATS_SAMPLE_LEN)?;
        Ok(Self::from_bytes(&bytes))
    }

    /// Fixture-side encoding of a sample record.
    pub fn to_bytes(&self) -> [u8; STATS_SAMPLE_LEN] {
        let mut out = [0u8; STATS_SAMPLE_LEN];
        out[0..8].copy_from_slice(&self.count.to_le_bytes());
        out[8..16].copy_from_slice(&self.mean.to_le_bytes());
        out[16..24].copy_from_slice(&self.sum_squared_deviation.to_le_bytes());
        out
    }
}

/// Quantities derived from one [`StatsSample`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DerivedStats {
    /// The sample's running mean, passed through.
    pub mean: f64,
    /// `sum_squared_deviation / count`, or 0 for an empty sample.
    pub variance: f64,
    /// `sqrt(variance)`, exactly 0 when the variance is 0.
    pub deviation: f64,
}

/// Derives mean, variance, and standard deviation from a sample.
///
/// A zero variance short-circuits to a deviation of exactly zero so no
/// division-by-zero or NaN can escape; otherwise the deviation is computed
/// as `variance * inv_sqrt(variance)`.
pub fn derive(sample: &StatsSample) -> DerivedStats {
    let variance = if sample.count > 0 {
        sample.sum_squared_deviation / sample.count as f64
    } else {
        0.0
    };
    let deviation = if variance == 0.0 {
        0.0
    } else {
        variance * inv_sqrt(variance)
    };
    DerivedStats {
        mean: sample.mean,
        variance,
        deviation,
    }
}

/// Approximate `1 / sqrt(x)` for positive finite `x`.
///
/// Reinterprets the float's bit pattern to seed Newton's method, then
/// applies exactly [`INV_SQRT_STEPS`] refinements.
pub fn inv_sqrt(x: f64) -> f64 {
    let seed_bits = INV_SQRT_MAGIC.wrapping_sub(x.to_bits() >> 1);
    let mut y = f64::from_bits(seed_bits);
    for _ in 0..INV_SQRT_STEPS {
        y = 0.5 * y * (3.0 - x * y * y);
    }
    y
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn rel_err(got: f64, want: f64) -> f64 {
        ((got - want) / want).abs()
    }

    #[test]
    fn inv_sqrt_hits_reference_points() {
        assert!(rel_err(inv_sqrt(4.0), 0.5) < 1e-8);
        assert!(rel_err(inv_sqrt(1.0), 1.0) < 1e-8);
        assert!(rel_err(inv_sqrt(0.25), 2.0) < 1e-8);
    }

    #[test]
    fn zero_spread_derives_exact_zeros() {
        let out = derive(&StatsSample {
            count: 5,
            mean: 2.5,
            sum_squared_deviation: 0.0,
        });
        assert_eq!(out.mean, 2.5);
        assert_eq!(out.variance, 0.0);
        assert_eq!(out.deviation, 0.0);
        assert!(out.deviation.is_finite());
    }

    #[test]
    fn empty_sample_derives_zeros() {
        let out = derive(&StatsSample {
            count: 0,
            mean: 0.0,
            sum_squared_deviation: 0.0,
        });
        assert_eq!(out.variance, 0.0);
        assert_eq!(out.deviation, 0.0);
    }

    #[test]
    fn deviation_is_root_of_variance() {
        let out = derive(&StatsSample {
            count: 4,
            mean: 10.0,
            sum_squared_deviation: 64.0,
        });
        assert_eq!(out.variance, 16.0);
        assert!(rel_err(out.deviation, 4.0) < 1e-8);
    }

    #[test]
    fn sample_record_roundtrip() {
        let sample = StatsSample {
            count: 123,
            mean: 1.75,
            sum_squared_deviation: 42.5,
        };
        assert_eq!(StatsSample::from_bytes(&sample.to_bytes()), sample);
    }

    proptest! {
        #[test]
        fn inv_sqrt_accurate_over_plausible_variances(x in 1e-6f64..1e9) {
            let want = 1.0 / x.sqrt();
            prop_assert!(rel_err(inv_sqrt(x), want) < 1e-8, "x = {x}");
        }

        #[test]
        fn derive_never_emits_nan_or_infinity(
            count in 0u64..1_000_000,
            mean in -1e6f64..1e6,
            ssd in 0f64..1e12,
        ) {
            let out = derive(&StatsSample { count, mean, sum_squared_deviation: ssd });
            prop_assert!(out.variance.is_finite());
            prop_assert!(out.deviation.is_finite());
        }
    }
}
