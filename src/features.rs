//! Histogram moments over a discretised field, at full resolution and on the
//! wavelet approximation subband.

use crate::error::SimResult;
use crate::wavelet::{decompose, WaveletDecomposition, WaveletFilter};
use corrosion_common::{FeatureTriple, FeatureVector};

/// Largest bin magnitude; values are clamped to `[-HISTOGRAM_LIMIT, HISTOGRAM_LIMIT]`.
pub const HISTOGRAM_LIMIT: i32 = 999;
const BIN_COUNT: usize = (2 * HISTOGRAM_LIMIT + 1) as usize;
/// Bins at or below this probability are left out of the entropy sum.
const ENTROPY_FLOOR: f64 = 1e-11;

/// Moments of one binned field, each rounded to 3 decimals.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct HistogramStats {
    pub mean: f64,
    pub std_dev: f64,
    pub skew: f64,
    pub energy: f64,
    pub entropy: f64,
}

impl HistogramStats {
    /// `entropy / energy`, or 0 for an empty histogram.
    pub fn ratio(&self) -> f64 {
        if self.energy > 0.0 {
            self.entropy / self.energy
        } else {
            0.0
        }
    }

    pub fn triple(&self) -> FeatureTriple {
        FeatureTriple {
            skew: self.skew,
            energy: self.energy,
            entropy: self.entropy,
            ratio: self.ratio(),
        }
    }
}

/// Rounds to 3 decimals. Adding 0.0 folds a `-0.0` result into `0.0`.
#[inline(always)]
fn round3(x: f64) -> f64 {
    (x * 1000.0).round() / 1000.0 + 0.0
}

#[inline(always)]
fn bin_of(value: f32) -> i32 {
    if value.is_nan() {
        return 0;
    }
    (value as f64)
        .round()
        .clamp(-(HISTOGRAM_LIMIT as f64), HISTOGRAM_LIMIT as f64) as i32
}

/// Bins `values` to the nearest integer and reduces the histogram to its moments.
/// A flat distribution (zero deviation) reports a skew of 0.
pub fn histogram_stats(values: &[f32]) -> HistogramStats {
    if values.is_empty() {
        return HistogramStats::default();
    }

    let mut counts = vec![0u64; BIN_COUNT];
    for &v in values {
        counts[(bin_of(v) + HISTOGRAM_LIMIT) as usize] += 1;
    }

    let total = values.len() as f64;
    let probabilities: Vec<(f64, f64)> = counts
        .iter()
        .enumerate()
        .filter(|(_, &n)| n > 0)
        .map(|(i, &n)| ((i as i32 - HISTOGRAM_LIMIT) as f64, n as f64 / total))
        .collect();

    let mut mean = 0.0;
    let mut energy = 0.0;
    let mut entropy = 0.0;
    for &(x, p) in &probabilities {
        mean += x * p;
        energy += p * p;
        if p > ENTROPY_FLOOR {
            entropy -= p * p.log2();
        }
    }

    let (mut variance, mut third) = (0.0, 0.0);
    for &(x, p) in &probabilities {
        let d = x - mean;
        variance += d * d * p;
        third += d * d * d * p;
    }
    let std_dev = variance.sqrt();
    let skew = if std_dev > 0.0 { third / std_dev.powi(3) } else { 0.0 };

    HistogramStats {
        mean: round3(mean),
        std_dev: round3(std_dev),
        skew: round3(skew),
        energy: round3(energy),
        entropy: round3(entropy),
    }
}

/// Result of one feature pass: the vector plus the intermediate products.
#[derive(Debug, Clone)]
pub struct FeatureExtraction {
    pub features: FeatureVector,
    pub full_stats: HistogramStats,
    pub subband_stats: HistogramStats,
    pub decomposition: WaveletDecomposition,
}

impl FeatureExtraction {
    pub fn subband(&self) -> Vec<f32> {
        self.decomposition.approximation()
    }
}

/// Runs the histogram on the field, decomposes it once and runs the histogram
/// again on the approximation subband.
pub fn extract_features(
    values: &[f32],
    rows: usize,
    cols: usize,
    filter: WaveletFilter,
) -> SimResult<FeatureExtraction> {
    let decomposition = decompose(values, rows, cols, filter)?;
    let full_stats = histogram_stats(values);
    let subband_stats = histogram_stats(&decomposition.approximation());

    Ok(FeatureExtraction {
        features: FeatureVector {
            full: full_stats.triple(),
            subband: subband_stats.triple(),
        },
        full_stats,
        subband_stats,
        decomposition,
    })
}
