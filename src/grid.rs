use crate::error::SimResult;
use corrosion_common::{clamp, ChemistryBounds, ConfigError, DrivingInputs};
use rand::Rng;
use rayon::prelude::*;

/// Fully corroded / saturated severity.
pub const MAX_SEVERITY: f32 = 255.0;

/// Per-cell electrochemistry carried by grids in field mode.
#[derive(Debug, Clone)]
pub struct ChemistryFields {
    pub ph: Vec<f64>,
    pub potential: Vec<f64>,
    pub temperature: Vec<f64>,
    pub concentration: Vec<f64>,
}

impl ChemistryFields {
    /// Broadcasts the scalar inputs to every cell, clamped into `bounds`.
    fn broadcast(len: usize, inputs: &DrivingInputs, bounds: &ChemistryBounds) -> Self {
        Self {
            ph: vec![bounds.ph.clamp(inputs.ph); len],
            potential: vec![bounds.potential.clamp(inputs.potential); len],
            temperature: vec![bounds.temperature.clamp(inputs.temperature); len],
            concentration: vec![bounds.concentration.clamp(inputs.concentration); len],
        }
    }

    /// Whether every field value lies inside its physical range.
    pub fn within(&self, bounds: &ChemistryBounds) -> bool {
        self.ph.iter().all(|&v| bounds.ph.contains(v))
            && self.potential.iter().all(|&v| bounds.potential.contains(v))
            && self.temperature.iter().all(|&v| bounds.temperature.contains(v))
            && self.concentration.iter().all(|&v| bounds.concentration.contains(v))
    }
}

/// Disjoint borrows of the grid buffers for one transition step.
/// `halo` is the read-only pre-step snapshot; everything else is written.
pub(crate) struct StepView<'a> {
    pub halo: &'a [f32],
    pub severity: &'a mut [f32],
    pub activity: &'a mut [f32],
    pub chemistry: Option<&'a mut ChemistryFields>,
    pub seeds: Option<&'a mut [f32]>,
}

/// The corrosion surface: severity, activity, optional chemistry and the padded halo.
/// All fields are row-major buffers of `rows * cols` cells; the halo and the seed
/// field are `(rows + 2) * (cols + 2)`.
#[derive(Debug, Clone)]
pub struct Grid {
    rows: usize,
    cols: usize,
    severity: Vec<f32>,
    activity: Vec<f32>,
    chemistry: Option<ChemistryFields>,
    halo: Vec<f32>,
    seeds: Option<Vec<f32>>,
}

impl Grid {
    /// Allocates a pristine grid. Activity starts uniform in [0, 1]; chemistry
    /// fields, when requested, start at the broadcast inputs.
    pub fn new<R: Rng + ?Sized>(
        rows: usize,
        cols: usize,
        chemistry: Option<(&DrivingInputs, &ChemistryBounds)>,
        rng: &mut R,
    ) -> SimResult<Self> {
        if rows == 0 || cols == 0 {
            return Err(ConfigError::ZeroDimension { rows, cols }.into());
        }
        let len = rows * cols;
        let activity = (0..len).map(|_| rng.random::<f32>()).collect();
        let chemistry =
            chemistry.map(|(inputs, bounds)| ChemistryFields::broadcast(len, inputs, bounds));

        let mut grid = Self {
            rows,
            cols,
            severity: vec![0.0; len],
            activity,
            chemistry,
            halo: vec![0.0; (rows + 2) * (cols + 2)],
            seeds: None,
        };
        grid.rebuild_halo();
        Ok(grid)
    }

    /// Attaches the spontaneous nucleation seed field, initialised to `u - 0.1`.
    pub fn with_nucleation_seeds<R: Rng + ?Sized>(mut self, rng: &mut R) -> Self {
        let padded = (self.rows + 2) * (self.cols + 2);
        self.seeds = Some((0..padded).map(|_| rng.random::<f32>() - 0.1).collect());
        self
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    #[inline(always)]
    fn idx(&self, row: usize, col: usize) -> usize {
        row * self.cols + col
    }

    /// Severity of one cell. Indices must be in range.
    #[inline(always)]
    pub fn cell(&self, row: usize, col: usize) -> f32 {
        self.severity[self.idx(row, col)]
    }

    /// Writes one cell's severity as given. Indices must be in range.
    #[inline(always)]
    pub fn set_cell(&mut self, row: usize, col: usize, value: f32) {
        let i = self.idx(row, col);
        self.severity[i] = value;
    }

    pub fn severity(&self) -> &[f32] {
        &self.severity
    }

    pub fn activity(&self) -> &[f32] {
        &self.activity
    }

    pub fn chemistry(&self) -> Option<&ChemistryFields> {
        self.chemistry.as_ref()
    }

    pub fn seeds(&self) -> Option<&[f32]> {
        self.seeds.as_deref()
    }

    /// Replaces the severity field with caller-supplied values clamped into [0, 255].
    pub fn load_severity(&mut self, values: &[f32]) -> SimResult<()> {
        if values.len() != self.severity.len() {
            return Err(ConfigError::FieldLength {
                expected: self.severity.len(),
                actual: values.len(),
            }
            .into());
        }
        for (dst, &src) in self.severity.iter_mut().zip(values) {
            *dst = if src.is_nan() { 0.0 } else { clamp(src, 0.0, MAX_SEVERITY) };
        }
        self.rebuild_halo();
        Ok(())
    }

    /// Recomputes the zero-bordered snapshot of the current severity field.
    pub fn rebuild_halo(&mut self) {
        let cols = self.cols;
        let padded_cols = cols + 2;
        let last = self.rows + 1;
        let severity = &self.severity;

        self.halo
            .par_chunks_mut(padded_cols)
            .enumerate()
            .for_each(|(r, halo_row)| {
                if r == 0 || r == last {
                    halo_row.fill(0.0);
                    return;
                }
                halo_row[0] = 0.0;
                halo_row[padded_cols - 1] = 0.0;
                let src = &severity[(r - 1) * cols..r * cols];
                halo_row[1..=cols].copy_from_slice(src);
            });
    }

    pub fn halo(&self) -> &[f32] {
        &self.halo
    }

    /// Pre-step severity of a cell and its 8 neighbors, row-major:
    /// NW, N, NE, W, C, E, SW, S, SE. Cells past the edge read as 0.
    #[inline(always)]
    pub fn neighborhood(&self, row: usize, col: usize) -> [f32; 9] {
        neighborhood_in(&self.halo, self.cols + 2, row, col)
    }

    pub(crate) fn split_for_step(&mut self) -> StepView<'_> {
        StepView {
            halo: &self.halo,
            severity: &mut self.severity,
            activity: &mut self.activity,
            chemistry: self.chemistry.as_mut(),
            seeds: self.seeds.as_deref_mut(),
        }
    }
}

/// Reads the 3x3 block of a padded buffer centred on real cell `(row, col)`.
#[inline(always)]
pub(crate) fn neighborhood_in(padded: &[f32], padded_cols: usize, row: usize, col: usize) -> [f32; 9] {
    let mut out = [0.0f32; 9];
    for dy in 0..3 {
        let base = (row + dy) * padded_cols + col;
        out[dy * 3..dy * 3 + 3].copy_from_slice(&padded[base..base + 3]);
    }
    out
}
