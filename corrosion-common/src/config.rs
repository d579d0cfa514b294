use serde::{Deserialize, Serialize};
use anyhow::Result;
use crate::bounds::ChemistryBounds;
use crate::sim_params::{DrivingInputs, ExtentThresholds, SeverityScaling, SimParams};
use std::{error::Error, fmt};
use std::path::Path;

/// Filter lengths with a coefficient table in the wavelet stage.
pub const SUPPORTED_FILTER_LENGTHS: [usize; 4] = [2, 4, 6, 8];

// Grid dimensions and randomness
#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct GridConfig {
    pub rows: usize,
    pub cols: usize,
    /// Seed for the run's RNG. Omit for a fresh OS-seeded run.
    #[serde(default)]
    pub seed: Option<u64>,
}

// Iteration schedule
#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct TimingConfig {
    pub iterations: u32,
    #[serde(default = "default_substeps")]
    pub substeps_per_iteration: u32,
}

fn default_substeps() -> u32 {
    5
}

#[derive(Deserialize, Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ChemistryMode {
    /// Every cell sees the same ambient inputs (optionally jittered per cell).
    Ambient,
    /// Every cell carries its own pH/potential/temperature/concentration fields.
    Fields,
}

// Electrochemical driving inputs
#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct ChemistryConfig {
    pub ph: f64,
    pub potential: f64,
    /// Kelvin.
    pub temperature: f64,
    pub concentration: f64,
    #[serde(default = "default_diffusion")]
    pub diffusion: f64,
    #[serde(default = "default_charge")]
    pub charge: f64,
    #[serde(default = "default_mode")]
    pub mode: ChemistryMode,
    /// Per-cell random offsets on pH, potential and concentration in ambient mode.
    #[serde(default = "default_true")]
    pub ambient_jitter: bool,
    #[serde(default)]
    pub bounds: ChemistryBounds,
}

fn default_diffusion() -> f64 {
    0.5
}

fn default_charge() -> f64 {
    3.0
}

fn default_mode() -> ChemistryMode {
    ChemistryMode::Ambient
}

fn default_true() -> bool {
    true
}

// Optional severity scaling, applied to k as cs^sf
#[derive(Deserialize, Serialize, Debug, Clone, Default)]
pub struct ScalingConfig {
    pub cs: f64,
    pub sf: i32,
}

#[derive(Deserialize, Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TransitionRule {
    /// Bell-curve neighbor weighting driven by the reaction-rate coefficient.
    NeighborWeighted,
    /// Birth/death/transition/growth rates derived from the local chemistry.
    Kinetic,
}

#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct RuleConfig {
    #[serde(default = "default_rule")]
    pub kind: TransitionRule,
    /// Scale k by the cell's activity value.
    #[serde(default)]
    pub modulate_by_activity: bool,
}

fn default_rule() -> TransitionRule {
    TransitionRule::NeighborWeighted
}

impl Default for RuleConfig {
    fn default() -> Self {
        RuleConfig {
            kind: default_rule(),
            modulate_by_activity: false,
        }
    }
}

#[derive(Deserialize, Serialize, Debug, Clone, Default)]
pub struct NucleationConfig {
    /// Enables the padded seed field that spawns pits in pristine cells.
    #[serde(default)]
    pub enabled: bool,
}

#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct FeatureConfig {
    #[serde(default = "default_filter_length")]
    pub wavelet_filter_length: usize,
    #[serde(default = "default_red_threshold")]
    pub red_threshold: f32,
    #[serde(default = "default_green_threshold")]
    pub green_threshold: f32,
    #[serde(default = "default_blue_threshold")]
    pub blue_threshold: f32,
}

fn default_filter_length() -> usize {
    6
}

fn default_red_threshold() -> f32 {
    200.0
}

fn default_green_threshold() -> f32 {
    100.0
}

fn default_blue_threshold() -> f32 {
    20.0
}

impl Default for FeatureConfig {
    fn default() -> Self {
        FeatureConfig {
            wavelet_filter_length: default_filter_length(),
            red_threshold: default_red_threshold(),
            green_threshold: default_green_threshold(),
            blue_threshold: default_blue_threshold(),
        }
    }
}

// Export settings, consumed by the driver binary only
#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct OutputConfig {
    pub base_filename: String,
    #[serde(default = "default_true")]
    pub save_features: bool,
    #[serde(default)]
    pub save_records: bool,
    #[serde(default)]
    pub save_final_grid: bool,
    pub format: Option<String>, // "json", "bincode", "messagepack"
}

impl Default for OutputConfig {
    fn default() -> Self {
        OutputConfig {
            base_filename: "corrosion".to_string(),
            save_features: true,
            save_records: false,
            save_final_grid: false,
            format: None,
        }
    }
}

// Main simulation configuration structure, loaded from config.toml.
#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct SimulationConfig {
    pub grid: GridConfig,
    pub timing: TimingConfig,
    pub chemistry: ChemistryConfig,
    #[serde(default)]
    pub scaling: ScalingConfig,
    #[serde(default)]
    pub rule: RuleConfig,
    #[serde(default)]
    pub nucleation: NucleationConfig,
    #[serde(default)]
    pub features: FeatureConfig,
    #[serde(default)]
    pub output: OutputConfig,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        SimulationConfig {
            grid: GridConfig {
                rows: 100,
                cols: 100,
                seed: None,
            },
            timing: TimingConfig {
                iterations: 10,
                substeps_per_iteration: default_substeps(),
            },
            chemistry: ChemistryConfig {
                ph: 3.0,
                potential: 0.5,
                temperature: 300.0,
                concentration: 0.2,
                diffusion: default_diffusion(),
                charge: default_charge(),
                mode: default_mode(),
                ambient_jitter: true,
                bounds: ChemistryBounds::default(),
            },
            scaling: ScalingConfig::default(),
            rule: RuleConfig::default(),
            nucleation: NucleationConfig::default(),
            features: FeatureConfig::default(),
            output: OutputConfig::default(),
        }
    }
}

/// Configuration rejected before any step runs.
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigError {
    ZeroDimension { rows: usize, cols: usize },
    OddDimension { rows: usize, cols: usize },
    ZeroIterations,
    ZeroSubsteps,
    UnsupportedFilterLength(usize),
    NonFiniteInput(&'static str),
    NonPositiveTemperature(f64),
    InvalidBounds(&'static str),
    FieldLength { expected: usize, actual: usize },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::ZeroDimension { rows, cols } => {
                write!(f, "grid dimensions must be positive (got {rows}x{cols})")
            }
            ConfigError::OddDimension { rows, cols } => write!(
                f,
                "grid dimensions must be even for wavelet features (got {rows}x{cols})"
            ),
            ConfigError::ZeroIterations => write!(f, "iterations must be at least 1"),
            ConfigError::ZeroSubsteps => write!(f, "substeps_per_iteration must be at least 1"),
            ConfigError::UnsupportedFilterLength(len) => write!(
                f,
                "wavelet filter length {len} is not one of {SUPPORTED_FILTER_LENGTHS:?}"
            ),
            ConfigError::NonFiniteInput(name) => write!(f, "input '{name}' must be finite"),
            ConfigError::NonPositiveTemperature(t) => {
                write!(f, "temperature must be positive (got {t})")
            }
            ConfigError::InvalidBounds(name) => {
                write!(f, "bounds for '{name}' must be finite with min <= max")
            }
            ConfigError::FieldLength { expected, actual } => write!(
                f,
                "field has {actual} values, {expected} expected"
            ),
        }
    }
}

impl Error for ConfigError {}

impl SimulationConfig {
    /// Loads the simulation configuration from a TOML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path_ref = path.as_ref();

        let config_str = std::fs::read_to_string(path_ref)
            .map_err(|e| anyhow::anyhow!("Failed to read config file '{}': {}", path_ref.display(), e))?;
        let config: SimulationConfig = toml::from_str(&config_str)
            .map_err(|e| anyhow::anyhow!("Failed to parse TOML from '{}': {}", path_ref.display(), e))?;

        config.validate()?;
        Ok(config)
    }

    /// Checks every constraint the engine relies on.
    pub fn validate(&self) -> std::result::Result<(), ConfigError> {
        let (rows, cols) = (self.grid.rows, self.grid.cols);
        if rows == 0 || cols == 0 {
            return Err(ConfigError::ZeroDimension { rows, cols });
        }
        // The orchestrator always extracts wavelet features.
        if rows % 2 != 0 || cols % 2 != 0 {
            return Err(ConfigError::OddDimension { rows, cols });
        }
        if self.timing.iterations == 0 {
            return Err(ConfigError::ZeroIterations);
        }
        if self.timing.substeps_per_iteration == 0 {
            return Err(ConfigError::ZeroSubsteps);
        }
        if !SUPPORTED_FILTER_LENGTHS.contains(&self.features.wavelet_filter_length) {
            return Err(ConfigError::UnsupportedFilterLength(
                self.features.wavelet_filter_length,
            ));
        }

        let c = &self.chemistry;
        for (name, value) in [
            ("ph", c.ph),
            ("potential", c.potential),
            ("temperature", c.temperature),
            ("concentration", c.concentration),
            ("diffusion", c.diffusion),
            ("charge", c.charge),
            ("cs", self.scaling.cs),
        ] {
            if !value.is_finite() {
                return Err(ConfigError::NonFiniteInput(name));
            }
        }

        let b = &c.bounds;
        for (name, range) in [
            ("ph", b.ph),
            ("potential", b.potential),
            ("temperature", b.temperature),
            ("concentration", b.concentration),
        ] {
            if !range.is_valid() {
                return Err(ConfigError::InvalidBounds(name));
            }
        }

        match c.mode {
            ChemistryMode::Ambient if c.temperature <= 0.0 => {
                Err(ConfigError::NonPositiveTemperature(c.temperature))
            }
            ChemistryMode::Fields if b.temperature.min <= 0.0 => {
                Err(ConfigError::NonPositiveTemperature(b.temperature.min))
            }
            _ => Ok(()),
        }
    }

    /// Converts the configuration into simulation parameters used at runtime.
    pub fn get_sim_params(&self) -> SimParams {
        let c = &self.chemistry;
        let scaling = if self.scaling.cs != 0.0 {
            Some(SeverityScaling {
                cs: self.scaling.cs,
                sf: self.scaling.sf,
            })
        } else {
            None
        };

        SimParams {
            rows: self.grid.rows,
            cols: self.grid.cols,
            iterations: self.timing.iterations,
            substeps: self.timing.substeps_per_iteration,
            inputs: DrivingInputs {
                ph: c.ph,
                potential: c.potential,
                temperature: c.temperature,
                concentration: c.concentration,
                diffusion: c.diffusion,
                charge: c.charge,
            },
            scaling,
            mode: c.mode,
            ambient_jitter: c.ambient_jitter,
            bounds: c.bounds,
            rule: self.rule.kind,
            modulate_by_activity: self.rule.modulate_by_activity,
            nucleation: self.nucleation.enabled,
            wavelet_filter_length: self.features.wavelet_filter_length,
            thresholds: ExtentThresholds {
                red: self.features.red_threshold,
                green: self.features.green_threshold,
                blue: self.features.blue_threshold,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
        [grid]
        rows = 10
        cols = 10
        seed = 7

        [timing]
        iterations = 3

        [chemistry]
        ph = 7.0
        potential = 0.0
        temperature = 300.0
        concentration = 0.2
    "#;

    #[test]
    fn minimal_toml_fills_defaults() {
        let config: SimulationConfig = toml::from_str(MINIMAL).unwrap();
        assert!(config.validate().is_ok());
        assert_eq!(config.timing.substeps_per_iteration, 5);
        assert_eq!(config.chemistry.diffusion, 0.5);
        assert_eq!(config.chemistry.charge, 3.0);
        assert_eq!(config.chemistry.mode, ChemistryMode::Ambient);
        assert_eq!(config.rule.kind, TransitionRule::NeighborWeighted);
        assert_eq!(config.features.wavelet_filter_length, 6);
        assert!(!config.nucleation.enabled);
        assert_eq!(config.grid.seed, Some(7));
    }

    #[test]
    fn enum_sections_parse_from_strings() {
        let text = format!(
            "{MINIMAL}\n[rule]\nkind = \"kinetic\"\n\n[scaling]\ncs = 1.5\nsf = 2\n"
        )
        .replace("concentration = 0.2", "concentration = 0.2\nmode = \"fields\"");
        let config: SimulationConfig = toml::from_str(&text).unwrap();
        assert_eq!(config.chemistry.mode, ChemistryMode::Fields);
        assert_eq!(config.rule.kind, TransitionRule::Kinetic);
        let params = config.get_sim_params();
        let scaling = params.scaling.expect("nonzero cs enables scaling");
        assert!((scaling.factor() - 2.25).abs() < 1e-12);
    }

    #[test]
    fn zero_cs_disables_scaling() {
        let params = SimulationConfig::default().get_sim_params();
        assert!(params.scaling.is_none());
    }

    #[test]
    fn validation_rejects_bad_dimensions() {
        let mut config = SimulationConfig::default();
        config.grid.rows = 0;
        assert_eq!(
            config.validate(),
            Err(ConfigError::ZeroDimension { rows: 0, cols: 100 })
        );
        config.grid.rows = 11;
        assert_eq!(
            config.validate(),
            Err(ConfigError::OddDimension { rows: 11, cols: 100 })
        );
    }

    #[test]
    fn validation_rejects_degenerate_schedule_and_inputs() {
        let mut config = SimulationConfig::default();
        config.timing.iterations = 0;
        assert_eq!(config.validate(), Err(ConfigError::ZeroIterations));

        let mut config = SimulationConfig::default();
        config.features.wavelet_filter_length = 3;
        assert_eq!(config.validate(), Err(ConfigError::UnsupportedFilterLength(3)));

        let mut config = SimulationConfig::default();
        config.chemistry.temperature = 0.0;
        assert_eq!(config.validate(), Err(ConfigError::NonPositiveTemperature(0.0)));

        // Field mode clamps temperature into bounds, so only the bound matters.
        config.chemistry.mode = ChemistryMode::Fields;
        assert!(config.validate().is_ok());
        config.chemistry.bounds.temperature.min = -1.0;
        assert_eq!(config.validate(), Err(ConfigError::NonPositiveTemperature(-1.0)));
    }
}
