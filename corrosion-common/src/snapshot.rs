use serde::{Serialize, Deserialize};
use std::fmt;
use std::ops::AddAssign;

/// Cell transitions tallied by the transition engine.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventCounts {
    /// 0 -> >0
    pub nucleated: u64,
    /// >0 -> 0
    pub died: u64,
    /// <=20 -> >20
    pub grew: u64,
    /// Growth events that landed on 255.
    pub saturated: u64,
}

impl EventCounts {
    /// Whether every counter is at least the matching counter of `earlier`.
    pub fn dominates(&self, earlier: &EventCounts) -> bool {
        self.nucleated >= earlier.nucleated
            && self.died >= earlier.died
            && self.grew >= earlier.grew
            && self.saturated >= earlier.saturated
    }
}

impl AddAssign for EventCounts {
    fn add_assign(&mut self, rhs: Self) {
        self.nucleated += rhs.nucleated;
        self.died += rhs.died;
        self.grew += rhs.grew;
        self.saturated += rhs.saturated;
    }
}

/// Skew, energy, entropy and their ratio at one resolution.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FeatureTriple {
    pub skew: f64,
    pub energy: f64,
    pub entropy: f64,
    /// `entropy / energy`
    pub ratio: f64,
}

impl fmt::Display for FeatureTriple {
    /// Legacy `%3.3f,%3.3f,%3.3f,%3.3f` export format.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:.3},{:.3},{:.3},{:.3}",
            self.skew, self.energy, self.entropy, self.ratio
        )
    }
}

/// The 8-scalar descriptor of one iteration's grid.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FeatureVector {
    /// Statistics of the full-resolution field.
    pub full: FeatureTriple,
    /// Statistics of the wavelet approximation subband.
    pub subband: FeatureTriple,
}

impl FeatureVector {
    pub const CSV_HEADER: &'static str = "Skew,Energy,Entropy,Ratio1,Skew,Energy,Entropy,Ratio2";

    pub fn as_array(&self) -> [f64; 8] {
        [
            self.full.skew,
            self.full.energy,
            self.full.entropy,
            self.full.ratio,
            self.subband.skew,
            self.subband.energy,
            self.subband.entropy,
            self.subband.ratio,
        ]
    }
}

impl fmt::Display for FeatureVector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{}", self.full, self.subband)
    }
}

/// Cells at or above one severity threshold.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Extent {
    pub cells: u32,
    /// Bounding-box width in columns, 0 when no cell qualifies.
    pub width: u32,
    /// Bounding-box height in rows, 0 when no cell qualifies.
    pub height: u32,
    pub peak: f32,
}

/// Extents for the red, green and blue severity bands.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct PitExtents {
    pub red: Extent,
    pub green: Extent,
    pub blue: Extent,
}

/// Everything recorded at the end of one completed iteration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IterationRecord {
    /// 1-based iteration number.
    pub iteration: u32,
    pub features: FeatureVector,
    /// Events of this iteration's substeps only.
    pub events: EventCounts,
    /// Running totals after this iteration.
    pub cumulative: EventCounts,
    pub extents: PitExtents,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn feature_vector_renders_legacy_row() {
        let triple = FeatureTriple {
            skew: 1.5,
            energy: 0.25,
            entropy: 2.0,
            ratio: 8.0,
        };
        let fv = FeatureVector {
            full: triple,
            subband: FeatureTriple { skew: -0.1234, ..triple },
        };
        assert_eq!(triple.to_string(), "1.500,0.250,2.000,8.000");
        assert_eq!(fv.to_string(), "1.500,0.250,2.000,8.000,-0.123,0.250,2.000,8.000");
        assert_eq!(fv.as_array()[4], -0.1234);
    }

    #[test]
    fn event_counts_accumulate() {
        let mut total = EventCounts::default();
        let step = EventCounts { nucleated: 2, died: 1, grew: 3, saturated: 1 };
        total += step;
        total += step;
        assert_eq!(total, EventCounts { nucleated: 4, died: 2, grew: 6, saturated: 2 });
        assert!(total.dominates(&step));
        assert!(!step.dominates(&total));
    }
}
