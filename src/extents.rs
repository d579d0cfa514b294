use crate::grid::Grid;
use corrosion_common::{Extent, ExtentThresholds, PitExtents};
use rayon::prelude::*;

/// Running bounding box of the cells that passed one threshold.
#[derive(Debug, Clone, Copy)]
struct BoxAccumulator {
    cells: u32,
    min_row: usize,
    max_row: usize,
    min_col: usize,
    max_col: usize,
    peak: f32,
}

impl BoxAccumulator {
    fn empty() -> Self {
        Self {
            cells: 0,
            min_row: usize::MAX,
            max_row: 0,
            min_col: usize::MAX,
            max_col: 0,
            peak: 0.0,
        }
    }

    #[inline(always)]
    fn add(&mut self, row: usize, col: usize, value: f32) {
        self.cells += 1;
        self.min_row = self.min_row.min(row);
        self.max_row = self.max_row.max(row);
        self.min_col = self.min_col.min(col);
        self.max_col = self.max_col.max(col);
        self.peak = self.peak.max(value);
    }

    fn merge(mut self, other: Self) -> Self {
        self.cells += other.cells;
        self.min_row = self.min_row.min(other.min_row);
        self.max_row = self.max_row.max(other.max_row);
        self.min_col = self.min_col.min(other.min_col);
        self.max_col = self.max_col.max(other.max_col);
        self.peak = self.peak.max(other.peak);
        self
    }

    fn finish(self) -> Extent {
        if self.cells == 0 {
            return Extent::default();
        }
        Extent {
            cells: self.cells,
            width: (self.max_col - self.min_col + 1) as u32,
            height: (self.max_row - self.min_row + 1) as u32,
            peak: self.peak,
        }
    }
}

type BandAccumulators = [BoxAccumulator; 3];

fn empty_bands() -> BandAccumulators {
    [BoxAccumulator::empty(); 3]
}

/// Measures the red (`>= red`), green (`>= green`) and blue (`> blue`) pit bands.
pub fn pit_extents(grid: &Grid, thresholds: &ExtentThresholds) -> PitExtents {
    let cols = grid.cols();
    let [red, green, blue] = grid
        .severity()
        .par_chunks(cols)
        .enumerate()
        .fold(empty_bands, |mut acc, (r, row)| {
            for (c, &v) in row.iter().enumerate() {
                if v >= thresholds.red {
                    acc[0].add(r, c, v);
                }
                if v >= thresholds.green {
                    acc[1].add(r, c, v);
                }
                if v > thresholds.blue {
                    acc[2].add(r, c, v);
                }
            }
            acc
        })
        .reduce(empty_bands, |a, b| {
            [a[0].merge(b[0]), a[1].merge(b[1]), a[2].merge(b[2])]
        });

    PitExtents {
        red: red.finish(),
        green: green.finish(),
        blue: blue.finish(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn thresholds() -> ExtentThresholds {
        ExtentThresholds {
            red: 200.0,
            green: 100.0,
            blue: 20.0,
        }
    }

    #[test]
    fn pristine_grid_has_no_pits() {
        let mut rng = StdRng::seed_from_u64(1);
        let grid = Grid::new(4, 4, None, &mut rng).unwrap();
        assert_eq!(pit_extents(&grid, &thresholds()), PitExtents::default());
    }

    #[test]
    fn bands_nest_and_measure_bounding_boxes() {
        let mut rng = StdRng::seed_from_u64(2);
        let mut grid = Grid::new(6, 8, None, &mut rng).unwrap();
        grid.set_cell(1, 2, 255.0);
        grid.set_cell(3, 5, 150.0);
        grid.set_cell(4, 1, 20.0);
        grid.set_cell(5, 7, 21.0);

        let ext = pit_extents(&grid, &thresholds());
        assert_eq!(ext.red, Extent { cells: 1, width: 1, height: 1, peak: 255.0 });
        assert_eq!(ext.green, Extent { cells: 2, width: 4, height: 3, peak: 255.0 });
        // 20 is not above the blue threshold.
        assert_eq!(ext.blue, Extent { cells: 3, width: 6, height: 5, peak: 255.0 });
    }

    #[test]
    fn thresholds_are_inclusive_for_red_and_green() {
        let mut rng = StdRng::seed_from_u64(3);
        let mut grid = Grid::new(2, 2, None, &mut rng).unwrap();
        grid.set_cell(0, 0, 200.0);
        grid.set_cell(1, 1, 100.0);
        let ext = pit_extents(&grid, &thresholds());
        assert_eq!(ext.red.cells, 1);
        assert_eq!(ext.green.cells, 2);
        assert_eq!(ext.green.width, 2);
    }
}
