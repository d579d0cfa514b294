use crate::error::{SimError, SimResult};
use crate::grid::{neighborhood_in, ChemistryFields, Grid, MAX_SEVERITY};
use crate::rules::{self, CellChemistry, CENTER};
use corrosion_common::{
    ChemistryBounds, DrivingInputs, EventCounts, SeverityScaling, SimParams, TransitionRule,
};
use log::trace;
use rand::Rng;
use rayon::prelude::*;

/// Probability that a cell's activity moves in a given step.
const ACTIVITY_DRIFT_PROBABILITY: f64 = 0.75;
/// Half-width of the activity perturbation.
const ACTIVITY_DRIFT: f32 = 0.1;
/// Severity above which chemistry deltas run at the full rate.
const DIFFUSION_THRESHOLD: f32 = 40.0;
/// Severity threshold of the growth event.
const GROWTH_THRESHOLD: f32 = 20.0;
/// Severity written into a cell spawned by the seed field.
const SEED_PIT_SEVERITY: f32 = 4.0;
const SEED_TRIGGER: f32 = 3.0;

/// Advances a [`Grid`] by one time step.
///
/// The engine itself holds only parameters; all mutable state lives in the grid
/// and the RNG passed to [`TransitionEngine::step`]. Grids built with chemistry
/// fields get per-cell diffusion, grids without them see the ambient inputs.
#[derive(Debug, Clone)]
pub struct TransitionEngine {
    inputs: DrivingInputs,
    scaling: Option<SeverityScaling>,
    ambient_jitter: bool,
    bounds: ChemistryBounds,
    rule: TransitionRule,
    modulate_by_activity: bool,
}

impl TransitionEngine {
    pub fn new(params: &SimParams) -> Self {
        Self {
            inputs: params.inputs,
            scaling: params.scaling,
            ambient_jitter: params.ambient_jitter,
            bounds: params.bounds,
            rule: params.rule,
            modulate_by_activity: params.modulate_by_activity,
        }
    }

    pub fn inputs(&self) -> &DrivingInputs {
        &self.inputs
    }

    pub fn bounds(&self) -> &ChemistryBounds {
        &self.bounds
    }

    /// Runs one CA step and returns the transitions it caused.
    ///
    /// Every cell reads its neighborhood from the halo rebuilt at the top of the
    /// step, so the result does not depend on visitation order. On error the
    /// step is abandoned part-way and the grid should be discarded.
    pub fn step<R: Rng + ?Sized>(&self, grid: &mut Grid, rng: &mut R) -> SimResult<EventCounts> {
        grid.rebuild_halo();

        let rows = grid.rows();
        let cols = grid.cols();
        let padded_cols = cols + 2;
        let mut view = grid.split_for_step();

        for r in 0..rows {
            for c in 0..cols {
                let i = r * cols + c;

                // --- 1. Activity drift (wraps, does not clamp) ---
                if rng.random_bool(ACTIVITY_DRIFT_PROBABILITY) {
                    let delta = rng.random_range(-ACTIVITY_DRIFT..ACTIVITY_DRIFT);
                    view.activity[i] = wrap_activity(view.activity[i] + delta);
                }

                let nbhd = neighborhood_in(view.halo, padded_cols, r, c);

                // --- 2. Local chemistry ---
                let chem = match view.chemistry.as_deref_mut() {
                    Some(fields) => self.diffuse(fields, i, nbhd[CENTER], rng),
                    None => self.ambient(rng),
                };
                if chem.temperature.is_nan() || chem.temperature <= 0.0 {
                    return Err(SimError::NumericDegeneracy {
                        row: r,
                        col: c,
                        quantity: "temperature",
                        value: chem.temperature,
                    });
                }

                // --- 3. Reaction rate ---
                let mut k = rules::reaction_rate(
                    &chem,
                    self.inputs.diffusion,
                    self.inputs.charge,
                    self.scaling.as_ref(),
                );
                if self.modulate_by_activity {
                    k *= view.activity[i] as f64;
                }
                if !k.is_finite() {
                    return Err(SimError::NumericDegeneracy {
                        row: r,
                        col: c,
                        quantity: "k",
                        value: k,
                    });
                }

                // --- 4. Cell update ---
                let next = match self.rule {
                    TransitionRule::NeighborWeighted => rules::neighbor_weighted(&nbhd, k, rng),
                    TransitionRule::Kinetic => rules::kinetic(&nbhd, &chem, rng),
                };
                view.severity[i] = next as f32;
            }
        }

        if let Some(seeds) = view.seeds.as_deref_mut() {
            nucleate_from_seeds(seeds, view.severity, rows, cols, rng);
        }

        let events = tally_events(view.halo, view.severity, rows, cols);
        trace!(
            "CA step: +{} nucleated, {} died, {} grew, {} saturated",
            events.nucleated,
            events.died,
            events.grew,
            events.saturated
        );
        Ok(events)
    }

    /// Drifts one cell's chemistry fields and returns the updated values.
    fn diffuse<R: Rng + ?Sized>(
        &self,
        fields: &mut ChemistryFields,
        i: usize,
        severity: f32,
        rng: &mut R,
    ) -> CellChemistry {
        // Weakly corroded sites react proportionally slower.
        let scale = if severity > DIFFUSION_THRESHOLD {
            4.0
        } else {
            severity as f64 / 10.0
        };
        let mut d_ph = rng.random::<f64>() / 200.0 * scale;
        let mut d_potential = rng.random::<f64>() / 2000.0 * scale;
        let mut d_concentration = rng.random::<f64>() / 800.0 * scale;
        let mut d_temperature = rng.random::<f64>() / 25.0 * scale;

        // An input given as exactly zero disables its channel.
        let inputs = &self.inputs;
        if inputs.ph == 0.0 {
            d_ph = 0.0;
        }
        if inputs.potential == 0.0 {
            d_potential = 0.0;
        }
        if inputs.temperature == 0.0 {
            d_temperature = 0.0;
        }
        if inputs.concentration == 0.0 {
            d_concentration = 0.0;
        }

        let b = &self.bounds;
        fields.ph[i] = b.ph.clamp(fields.ph[i] + d_ph);
        fields.potential[i] = b.potential.clamp(fields.potential[i] + d_potential);
        fields.temperature[i] = b.temperature.clamp(fields.temperature[i] + d_temperature);
        fields.concentration[i] = b.concentration.clamp(fields.concentration[i] + d_concentration);

        CellChemistry {
            ph: fields.ph[i],
            potential: fields.potential[i],
            temperature: fields.temperature[i],
            concentration: fields.concentration[i],
        }
    }

    /// Ambient inputs, jittered per cell when enabled.
    fn ambient<R: Rng + ?Sized>(&self, rng: &mut R) -> CellChemistry {
        let inputs = &self.inputs;
        if !self.ambient_jitter {
            return CellChemistry {
                ph: inputs.ph,
                potential: inputs.potential,
                temperature: inputs.temperature,
                concentration: inputs.concentration,
            };
        }
        let ph_offset = (rng.random::<f64>() - 0.5) / 2.0;
        let potential_offset = (rng.random::<f64>() - 0.5) / 10.0;
        let concentration_offset = (rng.random::<f64>() - 0.5) / 25.0;
        CellChemistry {
            ph: inputs.ph + ph_offset,
            potential: inputs.potential + potential_offset,
            temperature: inputs.temperature,
            concentration: inputs.concentration + concentration_offset,
        }
    }
}

/// Folds a drifted activity back into [0, 1] by wrapping around the unit circle.
#[inline(always)]
fn wrap_activity(mut activity: f32) -> f32 {
    if activity < 0.0 {
        activity += 1.0;
    }
    if activity > 1.0 {
        activity -= 1.0;
    }
    activity
}

/// Drifts the padded seed field and spawns pits in pristine cells whose seed
/// pressure crosses the trigger. The trigger reads the fully drifted field.
fn nucleate_from_seeds<R: Rng + ?Sized>(
    seeds: &mut [f32],
    severity: &mut [f32],
    rows: usize,
    cols: usize,
    rng: &mut R,
) {
    let pc = cols + 2;
    for r in 1..=rows {
        for c in 1..=cols {
            let s = &mut seeds[r * pc + c];
            if *s != 0.0 {
                *s += (rng.random::<f32>() - 0.43) / 10.0;
            }
        }
    }

    for r in 1..=rows {
        for c in 1..=cols {
            let i = r * pc + c;
            let pressure =
                seeds[i] + (seeds[i - pc] + seeds[i + pc] + seeds[i - 1] + seeds[i + 1]) / 6.0;
            let cell = &mut severity[(r - 1) * cols + (c - 1)];
            if pressure > SEED_TRIGGER && *cell < 0.01 {
                *cell = SEED_PIT_SEVERITY;
            }
        }
    }
}

/// Classifies each cell's pre/post transition. Rows are tallied in parallel.
pub(crate) fn tally_events(halo: &[f32], severity: &[f32], rows: usize, cols: usize) -> EventCounts {
    let pc = cols + 2;
    (0..rows)
        .into_par_iter()
        .map(|r| {
            let mut counts = EventCounts::default();
            let before = &halo[(r + 1) * pc + 1..(r + 1) * pc + 1 + cols];
            let after = &severity[r * cols..(r + 1) * cols];
            for (&pre, &post) in before.iter().zip(after) {
                if pre == 0.0 && post > 0.0 {
                    counts.nucleated += 1;
                }
                if pre > 0.0 && post == 0.0 {
                    counts.died += 1;
                }
                if pre <= GROWTH_THRESHOLD && post > GROWTH_THRESHOLD {
                    counts.grew += 1;
                    if pre < MAX_SEVERITY && post == MAX_SEVERITY {
                        counts.saturated += 1;
                    }
                }
            }
            counts
        })
        .reduce(EventCounts::default, |mut a, b| {
            a += b;
            a
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use corrosion_common::{ChemistryMode, SimulationConfig};
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn params(mode: ChemistryMode, ph: f64) -> SimParams {
        let mut config = SimulationConfig::default();
        config.grid.rows = 10;
        config.grid.cols = 10;
        config.chemistry.mode = mode;
        config.chemistry.ph = ph;
        config.chemistry.potential = 0.5;
        config.chemistry.temperature = 300.0;
        config.chemistry.concentration = 0.2;
        config.get_sim_params()
    }

    fn grid_for(p: &SimParams, rng: &mut StdRng) -> Grid {
        let chem = match p.mode {
            ChemistryMode::Fields => Some((&p.inputs, &p.bounds)),
            ChemistryMode::Ambient => None,
        };
        Grid::new(p.rows, p.cols, chem, rng).unwrap()
    }

    fn seeded_pits(grid: &mut Grid) {
        grid.set_cell(2, 2, 120.0);
        grid.set_cell(5, 6, 30.0);
        grid.set_cell(7, 1, 250.0);
        grid.set_cell(0, 9, 10.0);
    }

    #[test]
    fn all_zero_grid_never_nucleates() {
        let mut p = params(ChemistryMode::Ambient, 7.0);
        p.inputs.potential = 0.0;
        for seed in 0..20 {
            let mut rng = StdRng::seed_from_u64(seed);
            let mut grid = grid_for(&p, &mut rng);
            let engine = TransitionEngine::new(&p);
            for _ in 0..5 {
                let events = engine.step(&mut grid, &mut rng).unwrap();
                assert_eq!(events, EventCounts::default());
            }
            assert!(grid.severity().iter().all(|&v| v == 0.0), "seed {seed}");
        }
    }

    #[test]
    fn fields_stay_within_invariants() {
        for mode in [ChemistryMode::Ambient, ChemistryMode::Fields] {
            let p = params(mode, 3.0);
            let mut rng = StdRng::seed_from_u64(21);
            let mut grid = grid_for(&p, &mut rng);
            seeded_pits(&mut grid);
            let engine = TransitionEngine::new(&p);
            for _ in 0..30 {
                engine.step(&mut grid, &mut rng).unwrap();
                assert!(grid.severity().iter().all(|v| (0.0..=255.0).contains(v)));
                assert!(grid.activity().iter().all(|a| (0.0..=1.0).contains(a)));
                if let Some(chem) = grid.chemistry() {
                    assert!(chem.within(&p.bounds));
                }
            }
        }
    }

    #[test]
    fn active_regime_grows_existing_pits() {
        let p = params(ChemistryMode::Ambient, 2.0);
        let mut rng = StdRng::seed_from_u64(22);
        let mut grid = grid_for(&p, &mut rng);
        seeded_pits(&mut grid);
        let before: f32 = grid.severity().iter().sum();
        let engine = TransitionEngine::new(&p);
        let mut total = EventCounts::default();
        for _ in 0..10 {
            total += engine.step(&mut grid, &mut rng).unwrap();
        }
        let after: f32 = grid.severity().iter().sum();
        assert!(after > before);
        assert!(total.nucleated > 0);
    }

    #[test]
    fn step_is_reproducible_for_a_fixed_seed() {
        let p = params(ChemistryMode::Fields, 3.5);
        let run = || {
            let mut rng = StdRng::seed_from_u64(23);
            let mut grid = grid_for(&p, &mut rng);
            seeded_pits(&mut grid);
            let engine = TransitionEngine::new(&p);
            for _ in 0..5 {
                engine.step(&mut grid, &mut rng).unwrap();
            }
            grid.severity().to_vec()
        };
        assert_eq!(run(), run());
    }

    #[test]
    fn disabled_channel_does_not_diffuse() {
        let mut p = params(ChemistryMode::Fields, 3.5);
        p.inputs.concentration = 0.0;
        let mut rng = StdRng::seed_from_u64(24);
        let mut grid = grid_for(&p, &mut rng);
        grid.load_severity(&[100.0; 100]).unwrap();
        let start = grid.chemistry().unwrap().concentration[0];
        let start_ph = grid.chemistry().unwrap().ph[0];
        let engine = TransitionEngine::new(&p);
        engine.step(&mut grid, &mut rng).unwrap();
        let chem = grid.chemistry().unwrap();
        assert!(chem.concentration.iter().all(|&v| v == start));
        assert!(chem.ph.iter().any(|&v| v > start_ph));
    }

    #[test]
    fn pristine_cells_do_not_diffuse() {
        let p = params(ChemistryMode::Fields, 3.5);
        let mut rng = StdRng::seed_from_u64(25);
        let mut grid = grid_for(&p, &mut rng);
        let before = grid.chemistry().unwrap().clone();
        TransitionEngine::new(&p).step(&mut grid, &mut rng).unwrap();
        let after = grid.chemistry().unwrap();
        assert_eq!(before.ph, after.ph);
        assert_eq!(before.temperature, after.temperature);
    }

    #[test]
    fn non_positive_temperature_is_reported() {
        let mut p = params(ChemistryMode::Ambient, 3.0);
        p.inputs.temperature = 0.0;
        let mut rng = StdRng::seed_from_u64(26);
        let mut grid = grid_for(&p, &mut rng);
        let err = TransitionEngine::new(&p).step(&mut grid, &mut rng).unwrap_err();
        assert!(matches!(
            err,
            SimError::NumericDegeneracy { row: 0, col: 0, quantity: "temperature", .. }
        ));
    }

    #[test]
    fn nan_temperature_is_reported() {
        let mut p = params(ChemistryMode::Ambient, 3.0);
        p.inputs.temperature = f64::NAN;
        let mut rng = StdRng::seed_from_u64(27);
        let mut grid = grid_for(&p, &mut rng);
        let err = TransitionEngine::new(&p).step(&mut grid, &mut rng).unwrap_err();
        match err {
            SimError::NumericDegeneracy { quantity, value, .. } => {
                assert_eq!(quantity, "temperature");
                assert!(value.is_nan());
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn activity_wraps_instead_of_clamping() {
        assert!((wrap_activity(-0.05) - 0.95).abs() < 1e-6);
        assert!((wrap_activity(1.05) - 0.05).abs() < 1e-6);
        assert_eq!(wrap_activity(0.4), 0.4);
        assert_eq!(wrap_activity(0.0), 0.0);
        assert_eq!(wrap_activity(1.0), 1.0);
    }

    #[test]
    fn tally_classifies_transitions() {
        // 1x4 grid: nucleation, death, growth to saturation, plain growth.
        let halo = [
            0.0, 0.0, 0.0, 0.0, 0.0, 0.0, //
            0.0, 0.0, 5.0, 10.0, 15.0, 0.0, //
            0.0, 0.0, 0.0, 0.0, 0.0, 0.0,
        ];
        let severity = [3.0, 0.0, 255.0, 40.0];
        let events = tally_events(&halo, &severity, 1, 4);
        assert_eq!(
            events,
            EventCounts { nucleated: 1, died: 1, grew: 2, saturated: 1 }
        );
    }

    #[test]
    fn seed_field_spawns_pits_only_in_pristine_cells() {
        let (rows, cols) = (2, 2);
        let mut seeds = vec![0.0f32; 16];
        // Saturate the interior so every cell crosses the trigger.
        for r in 1..=2 {
            for c in 1..=2 {
                seeds[r * 4 + c] = 10.0;
            }
        }
        let mut severity = vec![0.0, 50.0, 0.0, 0.0];
        let mut rng = StdRng::seed_from_u64(27);
        nucleate_from_seeds(&mut seeds, &mut severity, rows, cols, &mut rng);
        assert_eq!(severity, vec![4.0, 50.0, 4.0, 4.0]);
    }
}
