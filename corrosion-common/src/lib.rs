pub mod bounds;
pub mod config;
pub mod sim_params;
pub mod snapshot;

// Re-export key types for easier use by dependent crates
pub use bounds::{clamp, ChemistryBounds, PhysicalRange};
pub use config::{
    ChemistryConfig, ChemistryMode, ConfigError, FeatureConfig, GridConfig, NucleationConfig,
    OutputConfig, RuleConfig, ScalingConfig, SimulationConfig, TimingConfig, TransitionRule,
    SUPPORTED_FILTER_LENGTHS,
};
pub use sim_params::{DrivingInputs, ExtentThresholds, SeverityScaling, SimParams};
pub use snapshot::{EventCounts, Extent, FeatureTriple, FeatureVector, IterationRecord, PitExtents};
