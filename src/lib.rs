//! Probabilistic cellular-automaton model of pitting corrosion with per-iteration
//! histogram and wavelet feature extraction.

pub mod engine;
pub mod error;
pub mod extents;
pub mod features;
pub mod grid;
pub mod rules;
pub mod simulation;
pub mod wavelet;

pub use engine::TransitionEngine;
pub use error::{SimError, SimResult};
pub use extents::pit_extents;
pub use features::{extract_features, histogram_stats, FeatureExtraction, HistogramStats};
pub use grid::{ChemistryFields, Grid, MAX_SEVERITY};
pub use simulation::{CorrosionSimulation, RunState, RunStatus};
pub use wavelet::{decompose, WaveletDecomposition, WaveletFilter};
