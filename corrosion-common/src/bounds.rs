use serde::{Deserialize, Serialize};

/// Closed interval `[min, max]` a physical quantity is held inside.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PhysicalRange {
    pub min: f64,
    pub max: f64,
}

impl PhysicalRange {
    pub const fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    /// Clamps a value into the range.
    #[inline(always)]
    pub fn clamp(&self, value: f64) -> f64 {
        value.max(self.min).min(self.max)
    }

    #[inline(always)]
    pub fn contains(&self, value: f64) -> bool {
        value >= self.min && value <= self.max
    }

    pub fn is_valid(&self) -> bool {
        self.min.is_finite() && self.max.is_finite() && self.min <= self.max
    }
}

/// Physical ranges for the four per-cell chemistry fields.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ChemistryBounds {
    #[serde(default = "default_ph_range")]
    pub ph: PhysicalRange,
    #[serde(default = "default_potential_range")]
    pub potential: PhysicalRange,
    /// Kelvin. The lower bound must stay positive, `k` divides by it.
    #[serde(default = "default_temperature_range")]
    pub temperature: PhysicalRange,
    #[serde(default = "default_concentration_range")]
    pub concentration: PhysicalRange,
}

impl Default for ChemistryBounds {
    fn default() -> Self {
        Self {
            ph: default_ph_range(),
            potential: default_potential_range(),
            temperature: default_temperature_range(),
            concentration: default_concentration_range(),
        }
    }
}

fn default_ph_range() -> PhysicalRange {
    PhysicalRange::new(3.0, 5.0)
}

fn default_potential_range() -> PhysicalRange {
    PhysicalRange::new(0.4, 0.7)
}

fn default_temperature_range() -> PhysicalRange {
    PhysicalRange::new(250.0, 320.0)
}

fn default_concentration_range() -> PhysicalRange {
    PhysicalRange::new(0.1, 0.4)
}

/// Clamps an `f32` severity-like value between a minimum and maximum.
#[inline(always)]
pub fn clamp(value: f32, min: f32, max: f32) -> f32 {
    value.max(min).min(max)
}
