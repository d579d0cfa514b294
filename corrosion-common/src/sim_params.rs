use serde::{Deserialize, Serialize};
use crate::bounds::ChemistryBounds;
use crate::config::{ChemistryMode, TransitionRule};

/// Scalar electrochemical inputs fed to every CA step.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DrivingInputs {
    pub ph: f64,
    pub potential: f64,
    pub temperature: f64,
    pub concentration: f64,
    pub diffusion: f64,
    pub charge: f64,
}

/// Severity scaling modifier `(cs, sf)`, multiplies k by `cs^sf`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SeverityScaling {
    pub cs: f64,
    pub sf: i32,
}

impl SeverityScaling {
    #[inline(always)]
    pub fn factor(&self) -> f64 {
        self.cs.powi(self.sf)
    }
}

/// Severity levels whose cells are summarised as pit extents after each iteration.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ExtentThresholds {
    pub red: f32,
    pub green: f32,
    pub blue: f32,
}

/// Simulation parameters derived from the configuration, used frequently during simulation steps.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimParams {
    // Grid
    pub rows: usize,
    pub cols: usize,

    // Schedule
    pub iterations: u32,
    pub substeps: u32,

    // Chemistry
    pub inputs: DrivingInputs,
    pub scaling: Option<SeverityScaling>,
    pub mode: ChemistryMode,
    pub ambient_jitter: bool,
    pub bounds: ChemistryBounds,

    // Update rule
    pub rule: TransitionRule,
    pub modulate_by_activity: bool,
    pub nucleation: bool,

    // Features
    pub wavelet_filter_length: usize,
    pub thresholds: ExtentThresholds,
}
