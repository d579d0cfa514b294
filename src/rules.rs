//! Per-cell update rules of the corrosion automaton.
//!
//! Everything here is a pure function of a cell's pre-step 3x3 neighborhood,
//! its local chemistry and draws from the injected RNG.

use corrosion_common::SeverityScaling;
use rand::Rng;

// Neighborhood layout, row-major around the centre cell.
pub const NW: usize = 0;
pub const N: usize = 1;
pub const NE: usize = 2;
pub const W: usize = 3;
pub const CENTER: usize = 4;
pub const E: usize = 5;
pub const SW: usize = 6;
pub const S: usize = 7;
pub const SE: usize = 8;

/// Neighborhood sums below this never react.
pub const QUIESCENT_SUM: f64 = 0.1;

/// Chemistry seen by a single cell during one step.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CellChemistry {
    pub ph: f64,
    pub potential: f64,
    pub temperature: f64,
    pub concentration: f64,
}

/// Passive/active regime indicator: 0 for `4 < pH <= 8.5`, 1 otherwise.
#[inline(always)]
pub fn gate(ph: f64) -> f64 {
    if ph > 4.0 && ph <= 8.5 {
        0.0
    } else {
        1.0
    }
}

/// Reaction-rate coefficient
/// `k = (pH-7)^2 * gate(pH) * exp(E) * C * diffusion * charge / T`, times `cs^sf` when scaled.
#[inline(always)]
pub fn reaction_rate(
    chem: &CellChemistry,
    diffusion: f64,
    charge: f64,
    scaling: Option<&SeverityScaling>,
) -> f64 {
    let acidity = chem.ph - 7.0;
    let k = acidity * acidity
        * gate(chem.ph)
        * chem.potential.exp()
        * chem.concentration
        * diffusion
        * charge
        / chem.temperature;
    match scaling {
        Some(s) => k * s.factor(),
        None => k,
    }
}

/// Bell-shaped reactivity, peaking at severity 128.
#[inline(always)]
pub fn eff(x: f32) -> f64 {
    if x > 255.0 {
        5.0
    } else if x <= 0.0 {
        0.0
    } else {
        let d = x - 128.0;
        ((16384.0 - d * d) / 120.0) as f64
    }
}

/// One of the four equiprobable neighbor selections: an axis neighbor plus
/// the two diagonals adjacent to it, one of which is picked by a coin flip.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NeighborBand {
    pub axis: usize,
    pub diagonals: [usize; 2],
}

pub const BANDS: [NeighborBand; 4] = [
    NeighborBand { axis: N, diagonals: [NW, NE] },
    NeighborBand { axis: W, diagonals: [NW, SW] },
    NeighborBand { axis: E, diagonals: [NE, SE] },
    NeighborBand { axis: S, diagonals: [SW, SE] },
];

/// Maps a uniform draw in [0, 1) onto its band.
#[inline(always)]
pub fn select_band(u: f64) -> &'static NeighborBand {
    let i = ((u * BANDS.len() as f64) as usize).min(BANDS.len() - 1);
    &BANDS[i]
}

impl NeighborBand {
    /// Diagonal picked by the coin: first above one half, second otherwise.
    #[inline(always)]
    pub fn diagonal(&self, coin: f64) -> usize {
        if coin > 0.5 {
            self.diagonals[0]
        } else {
            self.diagonals[1]
        }
    }
}

/// Divisors applied to the centre, axis and diagonal contributions.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Divisors {
    pub center: f64,
    pub axis: f64,
    pub diagonal: f64,
}

/// Centre above 80.
pub const ADVANCED_DIVISORS: Divisors = Divisors { center: 1.5, axis: 2.0, diagonal: 3.0 };
/// Centre at or below 80.
pub const EARLY_DIVISORS: Divisors = Divisors { center: 2.5, axis: 2.8, diagonal: 4.0 };

/// Severity at or below which background nucleation noise applies.
const NOISE_CEILING: f64 = 200.0;
const NOISE_PROBABILITY: f64 = 0.05;
const NOISE_INCREMENT: f64 = 2.0;

/// Neighbor-weighted update: the cell's own bell-curve response plus one
/// randomly selected axis neighbor and diagonal, all scaled by `k`.
pub fn neighbor_weighted<R: Rng + ?Sized>(nbhd: &[f32; 9], k: f64, rng: &mut R) -> f64 {
    let sum: f64 = nbhd.iter().map(|&v| v as f64).sum();
    if sum < QUIESCENT_SUM {
        return 0.0;
    }

    let center = nbhd[CENTER];
    let div = if center > 80.0 { &ADVANCED_DIVISORS } else { &EARLY_DIVISORS };
    let mut next = center as f64 + eff(center) * k / div.center;

    let band = select_band(rng.random::<f64>());
    let coin = rng.random::<f64>();
    next += eff(nbhd[band.axis]) * k / div.axis;
    next += eff(nbhd[band.diagonal(coin)]) * k / div.diagonal;

    if next <= NOISE_CEILING && rng.random::<f64>() > 1.0 - NOISE_PROBABILITY {
        next += NOISE_INCREMENT;
    }
    next.clamp(0.0, 255.0)
}

// Kinetic-rule constants.
const FARADAY: f64 = 96454.0;
const AVOGADRO: f64 = 6.023e23;
const GAS_CONSTANT: f64 = 8.314;
/// Base of the rate exponentials, kept at the precision the rates were fitted with.
const E_FIT: f64 = 2.7182;

/// Per-step transition rates of the kinetic rule.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct KineticRates {
    /// Probability that a pristine cell nucleates.
    pub birth: f64,
    /// Probability that an early pit (severity 1..=6) repassivates.
    pub death: f64,
    /// Severity added to pits in 1..=20.
    pub transition: f64,
    /// Base severity added to pits above 20.
    pub growth: f64,
}

impl KineticRates {
    pub fn from_chemistry(chem: &CellChemistry) -> Self {
        let t = chem.temperature;
        let birth = (6.7572 * 60.0 * 1e-2)
            * chem.concentration
            * E_FIT.powf(0.5 * FARADAY / AVOGADRO / t * (chem.potential - 0.086))
            / 40.0;
        let death = (2.2137 * 60.0 * 1e13)
            * 10f64.powf(-14.0 + chem.ph)
            * E_FIT.powf(-0.5 * FARADAY / t / GAS_CONSTANT * (chem.potential - 0.001))
            * 2.0;
        let transition = (5.0 * 1e2 * 60.0) * E_FIT.powf(-30000.0 / GAS_CONSTANT / t) * 10.0;
        let growth =
            E_FIT.powf(13.409 - (5558.7 / t) - 0.087 * chem.ph + 0.56965 * chem.concentration)
                * 400.0;
        Self { birth, death, transition, growth }
    }
}

/// Kinetic update: nucleation, repassivation, early transition and growth
/// driven by rates of the local chemistry and the count of active neighbors.
pub fn kinetic<R: Rng + ?Sized>(nbhd: &[f32; 9], chem: &CellChemistry, rng: &mut R) -> f64 {
    let rates = KineticRates::from_chemistry(chem);
    let center = nbhd[CENTER];

    let count = |idx: [usize; 4], level: f32| idx.iter().filter(|&&i| nbhd[i] >= level).count();
    let axis_active = count([N, W, E, S], 1.0);
    let diag_active = count([NW, NE, SW, SE], 1.0);
    let axis_grown = count([N, W, E, S], 20.0) as f64;
    let diag_grown = count([NW, NE, SW, SE], 20.0) as f64;
    let active = axis_active + diag_active;

    let d = rng.random::<f64>();
    if center < 1.0 {
        return if d <= rates.birth || active >= 4 { 1.0 } else { 0.0 };
    }
    if center <= 6.0 && d < rates.death && active <= 4 {
        return 0.0;
    }
    if center <= 20.0 {
        return (center as f64 + rates.transition).min(255.0);
    }
    let increment = (rates.growth * (1.0 + 0.1 * axis_grown + 0.05 + diag_grown)).trunc();
    (center as f64 + increment).min(255.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn chem(ph: f64) -> CellChemistry {
        CellChemistry {
            ph,
            potential: 0.5,
            temperature: 300.0,
            concentration: 0.2,
        }
    }

    #[test]
    fn gate_separates_passive_band() {
        assert_eq!(gate(6.0), 0.0);
        assert_eq!(gate(2.0), 1.0);
        assert_eq!(gate(9.0), 1.0);
        // Band edges: 4 is active, 8.5 is passive.
        assert_eq!(gate(4.0), 1.0);
        assert_eq!(gate(8.5), 0.0);
    }

    #[test]
    fn reaction_rate_matches_closed_form() {
        let c = chem(2.0);
        let expected = 25.0 * 0.5f64.exp() * 0.2 * 0.5 * 3.0 / 300.0;
        assert!((reaction_rate(&c, 0.5, 3.0, None) - expected).abs() < 1e-12);

        let scaling = SeverityScaling { cs: 2.0, sf: 3 };
        assert!((reaction_rate(&c, 0.5, 3.0, Some(&scaling)) - expected * 8.0).abs() < 1e-12);
        assert_eq!(reaction_rate(&chem(6.0), 0.5, 3.0, None), 0.0);
    }

    #[test]
    fn eff_peaks_mid_range_and_clips_extremes() {
        assert_eq!(eff(0.0), 0.0);
        assert_eq!(eff(-3.0), 0.0);
        assert_eq!(eff(300.0), 5.0);
        // Evaluated in single precision, then widened.
        assert_eq!(eff(128.0), (16384.0f32 / 120.0) as f64);
        assert!((eff(128.0) - 16384.0 / 120.0).abs() < 1e-4);
        assert!(eff(128.0) > eff(60.0) && eff(128.0) > eff(200.0));
    }

    #[test]
    fn bands_cover_unit_interval() {
        assert_eq!(select_band(0.0).axis, N);
        assert_eq!(select_band(0.3).axis, W);
        assert_eq!(select_band(0.6).axis, E);
        assert_eq!(select_band(0.99).axis, S);
        assert_eq!(select_band(1.0).axis, S);
        for band in &BANDS {
            // Each band's diagonals flank its axis neighbor.
            assert!(band.diagonals.iter().all(|&d| d != band.axis && d != CENTER));
        }
        assert_eq!(BANDS[1].diagonal(0.7), NW);
        assert_eq!(BANDS[1].diagonal(0.2), SW);
    }

    #[test]
    fn quiescent_neighborhood_stays_zero_for_any_k() {
        let mut rng = StdRng::seed_from_u64(11);
        let nbhd = [0.0f32; 9];
        for _ in 0..1000 {
            assert_eq!(neighbor_weighted(&nbhd, 1e6, &mut rng), 0.0);
        }
    }

    #[test]
    fn zero_k_only_adds_background_noise() {
        let mut rng = StdRng::seed_from_u64(12);
        let mut nbhd = [0.0f32; 9];
        nbhd[CENTER] = 50.0;
        for _ in 0..500 {
            let v = neighbor_weighted(&nbhd, 0.0, &mut rng);
            assert!(v == 50.0 || v == 52.0, "unexpected {v}");
        }
    }

    #[test]
    fn neighbor_weighted_isolated_band_contribution() {
        // Only N and NE are active: band 0 with coin <= 0.5 picks (N, NE).
        let mut nbhd = [0.0f32; 9];
        nbhd[N] = 128.0;
        nbhd[NE] = 128.0;
        nbhd[CENTER] = 100.0;
        let k = 0.01;
        let expected = 100.0
            + eff(100.0) * k / ADVANCED_DIVISORS.center
            + eff(128.0) * k / ADVANCED_DIVISORS.axis
            + eff(128.0) * k / ADVANCED_DIVISORS.diagonal;

        let mut rng = StdRng::seed_from_u64(13);
        let mut hits = 0;
        for _ in 0..400 {
            let v = neighbor_weighted(&nbhd, k, &mut rng);
            if (v - expected).abs() < 1e-9 || (v - expected - 2.0).abs() < 1e-9 {
                hits += 1;
            }
        }
        // One band in four, half of its coin flips.
        assert!(hits > 20 && hits < 100, "hits = {hits}");
    }

    #[test]
    fn neighbor_weighted_is_clamped() {
        let mut rng = StdRng::seed_from_u64(14);
        let nbhd = [128.0f32; 9];
        for _ in 0..100 {
            assert_eq!(neighbor_weighted(&nbhd, 1e3, &mut rng), 255.0);
            assert_eq!(neighbor_weighted(&nbhd, -1e3, &mut rng), 0.0);
        }
    }

    #[test]
    fn kinetic_rates_are_positive_and_finite() {
        let rates = KineticRates::from_chemistry(&chem(4.0));
        for r in [rates.birth, rates.death, rates.transition, rates.growth] {
            assert!(r.is_finite() && r > 0.0);
        }
        // Spontaneous nucleation stays rare.
        assert!(rates.birth < 0.05);
    }

    #[test]
    fn kinetic_crowded_pristine_cell_nucleates() {
        let mut rng = StdRng::seed_from_u64(15);
        let mut nbhd = [5.0f32; 9];
        nbhd[CENTER] = 0.0;
        assert_eq!(kinetic(&nbhd, &chem(4.0), &mut rng), 1.0);
    }

    #[test]
    fn kinetic_grown_pit_keeps_growing() {
        let mut rng = StdRng::seed_from_u64(16);
        let mut nbhd = [30.0f32; 9];
        nbhd[CENTER] = 100.0;
        let v = kinetic(&nbhd, &chem(4.0), &mut rng);
        assert!(v >= 100.0 && v <= 255.0);
        assert_eq!(v.fract(), 0.0);
    }
}
