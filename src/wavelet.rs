//! One level of a 2D separable discrete wavelet transform.

use crate::error::SimResult;
use corrosion_common::ConfigError;
use rayon::prelude::*;

// Literal coefficient tables, low-pass then high-pass.
const HAAR_LOW: [f64; 2] = [0.7071, 0.7071];
const HAAR_HIGH: [f64; 2] = [0.7071, -0.7071];

const D4_LOW: [f64; 4] = [0.4830, 0.8365, 0.2241, -0.1294];
const D4_HIGH: [f64; 4] = [-0.1294, -0.2241, 0.8365, -0.4830];

const D6_LOW: [f64; 6] = [0.3327, 0.8069, 0.4599, -0.1350, -0.0854, 0.0352];
const D6_HIGH: [f64; 6] = [0.0352, 0.0854, -0.1350, -0.4599, 0.8069, -0.3327];

const D8_LOW: [f64; 8] = [0.2304, 0.7148, 0.6309, -0.0280, -0.1870, 0.0308, 0.0329, -0.0106];
const D8_HIGH: [f64; 8] = [-0.0106, -0.0329, 0.0308, 0.1870, -0.0280, -0.6309, 0.7148, -0.2304];

/// Filter pair selected by tap count.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaveletFilter {
    Haar,
    Daubechies4,
    Daubechies6,
    Daubechies8,
}

impl WaveletFilter {
    pub fn from_length(len: usize) -> Result<Self, ConfigError> {
        match len {
            2 => Ok(WaveletFilter::Haar),
            4 => Ok(WaveletFilter::Daubechies4),
            6 => Ok(WaveletFilter::Daubechies6),
            8 => Ok(WaveletFilter::Daubechies8),
            other => Err(ConfigError::UnsupportedFilterLength(other)),
        }
    }

    pub fn taps(&self) -> usize {
        self.low_pass().len()
    }

    pub fn low_pass(&self) -> &'static [f64] {
        match self {
            WaveletFilter::Haar => &HAAR_LOW,
            WaveletFilter::Daubechies4 => &D4_LOW,
            WaveletFilter::Daubechies6 => &D6_LOW,
            WaveletFilter::Daubechies8 => &D8_LOW,
        }
    }

    pub fn high_pass(&self) -> &'static [f64] {
        match self {
            WaveletFilter::Haar => &HAAR_HIGH,
            WaveletFilter::Daubechies4 => &D4_HIGH,
            WaveletFilter::Daubechies6 => &D6_HIGH,
            WaveletFilter::Daubechies8 => &D8_HIGH,
        }
    }
}

/// Output of [`decompose`]: the full transformed buffer, laid out as
/// approximation (top-left), horizontal detail (top-right), vertical detail
/// (bottom-left) and diagonal detail (bottom-right).
#[derive(Debug, Clone, PartialEq)]
pub struct WaveletDecomposition {
    rows: usize,
    cols: usize,
    data: Vec<f32>,
}

impl WaveletDecomposition {
    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn data(&self) -> &[f32] {
        &self.data
    }

    /// `(rows / 2, cols / 2)`
    pub fn approximation_dims(&self) -> (usize, usize) {
        (self.rows / 2, self.cols / 2)
    }

    /// Copies out the top-left quadrant.
    pub fn approximation(&self) -> Vec<f32> {
        let (half_rows, half_cols) = self.approximation_dims();
        let mut out = Vec::with_capacity(half_rows * half_cols);
        for r in 0..half_rows {
            let start = r * self.cols;
            out.extend_from_slice(&self.data[start..start + half_cols]);
        }
        out
    }
}

/// Circular convolution of `coeffs` against a length-`n` signal starting at `base`.
#[inline(always)]
fn convolve<F: Fn(usize) -> f32>(coeffs: &[f64], base: usize, n: usize, sample: F) -> f32 {
    let offset = (coeffs.len() / 2) as isize;
    let mut acc = 0.0f64;
    for (tap, &w) in coeffs.iter().enumerate() {
        let idx = (base as isize + tap as isize - offset).rem_euclid(n as isize) as usize;
        acc += sample(idx) as f64 * w;
    }
    acc as f32
}

/// Row pass: low-pass response into the left half of each row, high-pass into the right.
fn analyze_rows(values: &[f32], rows: usize, cols: usize, filter: WaveletFilter) -> Vec<f32> {
    let half = cols / 2;
    let (low, high) = (filter.low_pass(), filter.high_pass());
    let mut out = vec![0.0f32; rows * cols];
    out.par_chunks_mut(cols)
        .zip(values.par_chunks(cols))
        .for_each(|(dst, row)| {
            for j in 0..half {
                dst[j] = convolve(low, 2 * j, cols, |k| row[k]);
                dst[half + j] = convolve(high, 2 * j, cols, |k| row[k]);
            }
        });
    out
}

/// Column pass over the row-transformed buffer: low-pass into the top half, high-pass into the bottom.
fn analyze_columns(values: &[f32], rows: usize, cols: usize, filter: WaveletFilter) -> Vec<f32> {
    let half = rows / 2;
    let (low, high) = (filter.low_pass(), filter.high_pass());
    let mut out = vec![0.0f32; rows * cols];
    out.par_chunks_mut(cols).enumerate().for_each(|(r, dst)| {
        let (coeffs, base) = if r < half { (low, 2 * r) } else { (high, 2 * (r - half)) };
        for (c, v) in dst.iter_mut().enumerate() {
            *v = convolve(coeffs, base, rows, |k| values[k * cols + c]);
        }
    });
    out
}

/// Applies one level of the separable transform to a row-major `rows x cols` field.
/// Both dimensions must be even. Holds no state, so repeated calls agree exactly.
pub fn decompose(
    values: &[f32],
    rows: usize,
    cols: usize,
    filter: WaveletFilter,
) -> SimResult<WaveletDecomposition> {
    if rows == 0 || cols == 0 {
        return Err(ConfigError::ZeroDimension { rows, cols }.into());
    }
    if rows % 2 != 0 || cols % 2 != 0 {
        return Err(ConfigError::OddDimension { rows, cols }.into());
    }
    if values.len() != rows * cols {
        return Err(ConfigError::FieldLength {
            expected: rows * cols,
            actual: values.len(),
        }
        .into());
    }

    let row_pass = analyze_rows(values, rows, cols, filter);
    let data = analyze_columns(&row_pass, rows, cols, filter);
    Ok(WaveletDecomposition { rows, cols, data })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SimError;

    const SQRT_2: f64 = std::f64::consts::SQRT_2;

    fn close(a: f32, b: f64, rel: f64) -> bool {
        ((a as f64) - b).abs() <= rel * b.abs().max(1.0)
    }

    #[test]
    fn filter_lengths_map_to_tables() {
        for len in [2, 4, 6, 8] {
            let f = WaveletFilter::from_length(len).unwrap();
            assert_eq!(f.taps(), len);
            assert_eq!(f.high_pass().len(), len);
        }
        assert_eq!(
            WaveletFilter::from_length(5),
            Err(ConfigError::UnsupportedFilterLength(5))
        );
    }

    #[test]
    fn haar_row_pass_scales_constant_field_by_sqrt2() {
        let v = 40.0f32;
        let field = vec![v; 4 * 6];
        let rows = analyze_rows(&field, 4, 6, WaveletFilter::Haar);
        for r in 0..4 {
            for c in 0..3 {
                assert!(close(rows[r * 6 + c], v as f64 * SQRT_2, 1e-4));
                // No detail in a constant signal.
                assert!(rows[r * 6 + 3 + c].abs() < 1e-3);
            }
        }
    }

    #[test]
    fn haar_subband_of_constant_field_is_uniform() {
        let v = 40.0f32;
        let field = vec![v; 8 * 8];
        let dec = decompose(&field, 8, 8, WaveletFilter::Haar).unwrap();
        let approx = dec.approximation();
        assert_eq!(approx.len(), 16);
        // sqrt(2) per separable pass.
        assert!(approx.iter().all(|&a| close(a, v as f64 * SQRT_2 * SQRT_2, 1e-4)));
    }

    #[test]
    fn smooth_filters_preserve_dc_gain() {
        // Every low-pass table sums to ~sqrt(2).
        for len in [4, 6, 8] {
            let f = WaveletFilter::from_length(len).unwrap();
            let field = vec![10.0f32; 8 * 8];
            let dec = decompose(&field, 8, 8, f).unwrap();
            assert!(dec.approximation().iter().all(|&a| close(a, 20.0, 1e-2)), "len {len}");
        }
    }

    #[test]
    fn decomposition_layout_and_idempotence() {
        let field: Vec<f32> = (0..6 * 4).map(|i| (i * 7 % 11) as f32).collect();
        let a = decompose(&field, 6, 4, WaveletFilter::Daubechies6).unwrap();
        let b = decompose(&field, 6, 4, WaveletFilter::Daubechies6).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.data().len(), 24);
        assert_eq!(a.approximation_dims(), (3, 2));
        assert_eq!(a.approximation()[..2], a.data()[..2]);
        assert_eq!(a.approximation()[2..4], a.data()[4..6]);
    }

    #[test]
    fn long_filters_wrap_on_tiny_fields() {
        let field = vec![1.0f32, 2.0, 3.0, 4.0];
        assert!(decompose(&field, 2, 2, WaveletFilter::Daubechies8).is_ok());
    }

    #[test]
    fn rejects_odd_or_mismatched_fields() {
        let field = vec![0.0f32; 9];
        assert_eq!(
            decompose(&field, 3, 3, WaveletFilter::Haar).unwrap_err(),
            SimError::Config(ConfigError::OddDimension { rows: 3, cols: 3 })
        );
        assert_eq!(
            decompose(&field, 4, 4, WaveletFilter::Haar).unwrap_err(),
            SimError::Config(ConfigError::FieldLength { expected: 16, actual: 9 })
        );
    }
}
