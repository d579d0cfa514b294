use crate::engine::TransitionEngine;
use crate::error::{SimError, SimResult};
use crate::extents::pit_extents;
use crate::features::{extract_features, FeatureExtraction};
use crate::grid::Grid;
use crate::wavelet::WaveletFilter;
use corrosion_common::{
    ChemistryMode, EventCounts, FeatureVector, IterationRecord, SimParams, SimulationConfig,
};
use log::{debug, info, trace};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::atomic::{AtomicBool, Ordering};

/// Lifecycle of a run. `Complete` and `Interrupted` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    Idle,
    Running,
    Complete,
    Interrupted,
}

/// Everything a run has produced so far.
#[derive(Debug, Clone)]
pub struct RunState {
    /// Completed iterations.
    pub iteration: u32,
    /// Event totals over all completed iterations. Never reset mid-run.
    pub cumulative: EventCounts,
    pub records: Vec<IterationRecord>,
    pub status: RunStatus,
}

impl RunState {
    fn new() -> Self {
        Self {
            iteration: 0,
            cumulative: EventCounts::default(),
            records: Vec::new(),
            status: RunStatus::Idle,
        }
    }

    /// The feature time series, one vector per completed iteration.
    pub fn features(&self) -> Vec<FeatureVector> {
        self.records.iter().map(|r| r.features).collect()
    }

    /// Legacy one-line summaries (`skew,energy,entropy,ratio` at both scales).
    pub fn summaries(&self) -> Vec<String> {
        self.records.iter().map(|r| r.features.to_string()).collect()
    }
}

/// Drives a [`Grid`] through `iterations x substeps` CA steps, extracting
/// features after every iteration.
pub struct CorrosionSimulation<R: Rng = StdRng> {
    config: SimulationConfig,
    params: SimParams,
    engine: TransitionEngine,
    grid: Grid,
    rng: R,
    filter: WaveletFilter,
    state: RunState,
    last_extraction: Option<FeatureExtraction>,
}

impl CorrosionSimulation<StdRng> {
    /// Validates `config` and seeds the RNG from `grid.seed`, or from the OS when unset.
    pub fn new(config: SimulationConfig) -> SimResult<Self> {
        let rng = match config.grid.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };
        Self::with_rng(config, rng)
    }
}

impl<R: Rng> CorrosionSimulation<R> {
    /// Builds a run around a caller-supplied random source.
    pub fn with_rng(config: SimulationConfig, mut rng: R) -> SimResult<Self> {
        config.validate()?;
        let params = config.get_sim_params();
        let filter = WaveletFilter::from_length(params.wavelet_filter_length)?;

        let chemistry = match params.mode {
            ChemistryMode::Fields => Some((&params.inputs, &params.bounds)),
            ChemistryMode::Ambient => None,
        };
        let mut grid = Grid::new(params.rows, params.cols, chemistry, &mut rng)?;
        if params.nucleation {
            grid = grid.with_nucleation_seeds(&mut rng);
        }

        debug!(
            "Run prepared: {}x{} grid, {:?} chemistry, {:?} rule, filter {:?}",
            params.rows, params.cols, params.mode, params.rule, filter
        );

        Ok(Self {
            engine: TransitionEngine::new(&params),
            config,
            params,
            grid,
            rng,
            filter,
            state: RunState::new(),
            last_extraction: None,
        })
    }

    /// Replaces the pristine starting surface. Only allowed before the first iteration.
    pub fn with_initial_severity(mut self, values: &[f32]) -> SimResult<Self> {
        if self.state.status != RunStatus::Idle {
            return Err(SimError::InvalidState("initial severity after the run started"));
        }
        self.grid.load_severity(values)?;
        Ok(self)
    }

    /// Runs one iteration: `substeps` CA steps, one feature pass, one record.
    pub fn run_iteration(&mut self) -> SimResult<&IterationRecord> {
        self.advance(None)?
            .ok_or(SimError::InvalidState("iteration cancelled"))
    }

    /// Runs every remaining iteration.
    pub fn run(&mut self) -> SimResult<&RunState> {
        info!(
            "Running {} iterations of {} substeps on a {}x{} grid",
            self.params.iterations, self.params.substeps, self.params.rows, self.params.cols
        );
        while self.state.status != RunStatus::Complete {
            self.advance(None)?;
        }
        info!(
            "Run complete: {} iterations, cumulative events {:?}",
            self.state.iteration, self.state.cumulative
        );
        Ok(&self.state)
    }

    /// Like [`run`](Self::run), but checks `cancel` before every substep. A raised
    /// flag drops the in-flight iteration and leaves the run `Interrupted`.
    pub fn run_until_cancelled(&mut self, cancel: &AtomicBool) -> SimResult<RunStatus> {
        while self.state.status != RunStatus::Complete {
            if self.advance(Some(cancel))?.is_none() {
                info!(
                    "Run interrupted after {} completed iterations",
                    self.state.iteration
                );
                return Ok(RunStatus::Interrupted);
            }
        }
        Ok(RunStatus::Complete)
    }

    /// Returns `Ok(None)` when cancelled. Nothing is recorded unless the whole
    /// iteration succeeds.
    fn advance(&mut self, cancel: Option<&AtomicBool>) -> SimResult<Option<&IterationRecord>> {
        match self.state.status {
            RunStatus::Complete => return Err(SimError::InvalidState("run already complete")),
            RunStatus::Interrupted => return Err(SimError::InvalidState("run was interrupted")),
            RunStatus::Idle => self.state.status = RunStatus::Running,
            RunStatus::Running => {}
        }

        let iteration = self.state.iteration + 1;
        let mut events = EventCounts::default();
        for substep in 0..self.params.substeps {
            if cancel.is_some_and(|flag| flag.load(Ordering::Relaxed)) {
                self.state.status = RunStatus::Interrupted;
                return Ok(None);
            }
            let step_events = self.engine.step(&mut self.grid, &mut self.rng)?;
            trace!("Iteration {} substep {}: {:?}", iteration, substep + 1, step_events);
            events += step_events;
        }

        let extraction = extract_features(
            self.grid.severity(),
            self.grid.rows(),
            self.grid.cols(),
            self.filter,
        )?;
        let extents = pit_extents(&self.grid, &self.params.thresholds);

        self.state.cumulative += events;
        self.state.iteration = iteration;
        let record = IterationRecord {
            iteration,
            features: extraction.features,
            events,
            cumulative: self.state.cumulative,
            extents,
        };
        debug!("Iteration {}/{}: {}", iteration, self.params.iterations, record.features);
        self.state.records.push(record);
        self.last_extraction = Some(extraction);

        if iteration >= self.params.iterations {
            self.state.status = RunStatus::Complete;
        }
        Ok(self.state.records.last())
    }

    pub fn grid(&self) -> &Grid {
        &self.grid
    }

    pub fn state(&self) -> &RunState {
        &self.state
    }

    pub fn records(&self) -> &[IterationRecord] {
        &self.state.records
    }

    pub fn status(&self) -> RunStatus {
        self.state.status
    }

    /// Intermediate products (statistics and subband) of the latest feature pass.
    pub fn last_extraction(&self) -> Option<&FeatureExtraction> {
        self.last_extraction.as_ref()
    }

    pub fn params(&self) -> &SimParams {
        &self.params
    }

    pub fn config(&self) -> &SimulationConfig {
        &self.config
    }
}
