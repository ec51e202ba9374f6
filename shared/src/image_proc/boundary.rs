//! Automatic location of the display's corners in a brightness map.
//!
//! The lit area of the display is segmented with a fixed cutoff and its
//! outline is fed to the Hough transform. Of the surviving edges only the
//! strongest on each side of the outline (top, bottom, left, right) is kept,
//! and the pairwise intersections of those become corner candidates. A
//! detection only succeeds when exactly four distinct candidates fall inside
//! the sampled grid; anything else is reported as a miss so the caller can
//! fall back to manual picking.

use std::f64::consts::PI;

use ndarray::ArrayView2;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::hough::{dedup_lines, hough_lines, intersection, HoughConfig, Line};
use super::thresholding::{apply_threshold, largest_component_outline};

/// Integer sample-space coordinate: `x` is the column, `y` the row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Corner {
    pub x: i64,
    pub y: i64,
}

impl Corner {
    pub fn new(x: i64, y: i64) -> Self {
        Self { x, y }
    }

    /// Squared distance from the grid origin.
    pub fn origin_distance_sq(&self) -> i128 {
        let (x, y) = (self.x as i128, self.y as i128);
        x * x + y * y
    }

    /// Whether the corner lies within `0..=cols` by `0..=rows`.
    pub fn within(&self, cols: usize, rows: usize) -> bool {
        (0..=cols as i64).contains(&self.x) && (0..=rows as i64).contains(&self.y)
    }
}

/// Parameters for [`locate_screen`].
#[derive(Debug, Clone, Copy)]
pub struct BoundaryConfig {
    /// Cells strictly brighter than this belong to the display
    pub cutoff: f64,
    /// Vote threshold as a fraction of the grid width
    pub vote_fraction: f64,
    /// Hough non-maximum suppression radius, in cells and degrees
    pub suppression_radius: u32,
    /// Maximum deviation of an edge from horizontal/vertical in radians
    pub angle_tolerance: f64,
    /// Lines closer than this in angle are merge candidates
    pub dedup_theta: f64,
    /// Lines closer than this in distance are merge candidates
    pub dedup_rho: f64,
}

impl Default for BoundaryConfig {
    fn default() -> Self {
        Self {
            cutoff: 50.0,
            vote_fraction: 0.2,
            suppression_radius: 2,
            angle_tolerance: PI / 8.0,
            dedup_theta: PI / 40.0,
            dedup_rho: 10.0,
        }
    }
}

impl BoundaryConfig {
    fn hough(&self, width: usize) -> HoughConfig {
        HoughConfig {
            min_votes: (width as f64 * self.vote_fraction).floor() as u32,
            suppression_radius: self.suppression_radius,
            angle_tolerance: self.angle_tolerance,
        }
    }
}

/// Outcome of automatic boundary detection.
#[derive(Debug, Clone, PartialEq)]
pub enum BoundaryDetection {
    /// Exactly four distinct corners were found
    Found([Corner; 4]),
    /// Any other number of corner candidates
    Miss { candidates: Vec<Corner> },
}

/// Mean position of the non-zero cells, `None` for an empty outline.
fn centroid(outline: &ArrayView2<f64>) -> Option<(f64, f64)> {
    let (mut sx, mut sy, mut n) = (0.0, 0.0, 0usize);
    for ((y, x), &v) in outline.indexed_iter() {
        if v > 0.0 {
            sx += x as f64;
            sy += y as f64;
            n += 1;
        }
    }
    (n > 0).then(|| (sx / n as f64, sy / n as f64))
}

/// Keep the first line on each side of `center`.
///
/// Horizontal lines are split by where they cross the centre column,
/// vertical ones by where they cross the centre row. With strongest-first
/// input this leaves at most one line per display edge.
fn strongest_per_side(lines: &[Line], (cx, cy): (f64, f64)) -> Vec<Line> {
    let mut sides: [Option<Line>; 4] = [None; 4];
    for line in lines {
        let (sin, cos) = line.theta.sin_cos();
        let side = if line.is_horizontal() {
            let y = (line.rho - cx * cos) / sin;
            if y < cy {
                0
            } else {
                1
            }
        } else {
            let x = (line.rho - cy * sin) / cos;
            if x < cx {
                2
            } else {
                3
            }
        };
        if sides[side].is_none() {
            sides[side] = Some(*line);
        }
    }
    sides.into_iter().flatten().collect()
}

/// Locate the four corners of the display in a normalized brightness grid.
///
/// Missing (NaN) cells count as dark. Intersections are kept when
/// `0 ≤ x ≤ cols` and `0 ≤ y ≤ rows`, after rounding to whole cells.
pub fn locate_screen(grid: &ArrayView2<f64>, config: &BoundaryConfig) -> BoundaryDetection {
    let (rows, cols) = grid.dim();
    let binary = apply_threshold(grid, config.cutoff);
    let outline = largest_component_outline(&binary.view());
    let Some(center) = centroid(&outline.view()) else {
        debug!("no lit region to outline");
        return BoundaryDetection::Miss {
            candidates: Vec::new(),
        };
    };

    let lines = hough_lines(&outline.view(), &config.hough(cols));
    let lines = dedup_lines(&lines, config.dedup_theta, config.dedup_rho);
    let lines = strongest_per_side(&lines, center);
    debug!("boundary detection kept {} lines: {:?}", lines.len(), lines);

    let mut candidates: Vec<Corner> = Vec::new();
    for (i, a) in lines.iter().enumerate() {
        for b in &lines[i + 1..] {
            let Some((x, y)) = intersection(a, b) else {
                continue;
            };
            let corner = Corner::new(x.round() as i64, y.round() as i64);
            if corner.within(cols, rows) && !candidates.contains(&corner) {
                candidates.push(corner);
            }
        }
    }

    match <[Corner; 4]>::try_from(candidates) {
        Ok(corners) => BoundaryDetection::Found(corners),
        Err(candidates) => {
            debug!("boundary detection found {} corner candidates", candidates.len());
            BoundaryDetection::Miss { candidates }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array2;

    fn lit_rectangle(rows: usize, cols: usize, top: usize, bottom: usize, left: usize, right: usize) -> Array2<f64> {
        Array2::from_shape_fn((rows, cols), |(y, x)| {
            if (top..=bottom).contains(&y) && (left..=right).contains(&x) {
                100.0
            } else {
                5.0
            }
        })
    }

    #[test]
    fn test_axis_aligned_rectangle() {
        let grid = lit_rectangle(30, 40, 5, 24, 8, 31);
        let BoundaryDetection::Found(corners) = locate_screen(&grid.view(), &BoundaryConfig::default())
        else {
            panic!("expected four corners");
        };

        let mut found = corners.to_vec();
        found.sort_by_key(|c| (c.y, c.x));
        assert_eq!(
            found,
            vec![
                Corner::new(8, 5),
                Corner::new(31, 5),
                Corner::new(8, 24),
                Corner::new(31, 24),
            ]
        );
    }

    #[test]
    fn test_dark_grid_is_a_miss() {
        let grid = Array2::from_elem((20, 20), 5.0);
        assert_eq!(
            locate_screen(&grid.view(), &BoundaryConfig::default()),
            BoundaryDetection::Miss {
                candidates: Vec::new()
            }
        );
    }

    #[test]
    fn test_grid_border_counts_as_an_edge() {
        let grid = Array2::from_elem((20, 30), 100.0);
        let BoundaryDetection::Found(corners) = locate_screen(&grid.view(), &BoundaryConfig::default())
        else {
            panic!("expected four corners");
        };
        let mut found = corners.to_vec();
        found.sort_by_key(|c| (c.y, c.x));
        assert_eq!(
            found,
            vec![
                Corner::new(0, 0),
                Corner::new(29, 0),
                Corner::new(0, 19),
                Corner::new(29, 19),
            ]
        );
    }

    #[test]
    fn test_small_fully_lit_grid() {
        // Few cells per edge, so tilted accumulator peaks come close to the
        // real edges in votes
        let grid = Array2::from_elem((8, 10), 100.0);
        let BoundaryDetection::Found(corners) = locate_screen(&grid.view(), &BoundaryConfig::default())
        else {
            panic!("expected four corners");
        };
        let mut found = corners.to_vec();
        found.sort_by_key(|c| (c.y, c.x));
        assert_eq!(
            found,
            vec![
                Corner::new(0, 0),
                Corner::new(9, 0),
                Corner::new(0, 7),
                Corner::new(9, 7),
            ]
        );
    }

    #[test]
    fn test_one_line_per_side() {
        let lines = [
            Line::new(5.0, PI / 2.0),
            Line::new(5.5, PI / 2.0 + 0.01),
            Line::new(24.0, PI / 2.0),
            Line::new(8.0, 0.0),
            Line::new(-31.0, PI - 0.01),
            Line::new(30.0, 0.0),
        ];
        let kept = strongest_per_side(&lines, (20.0, 15.0));
        assert_eq!(kept, vec![lines[0], lines[2], lines[3], lines[4]]);
    }

    #[test]
    fn test_one_sided_lines_are_a_miss() {
        // Only a bright band across the top: no bottom edge inside the grid
        let grid = lit_rectangle(20, 30, 0, 0, 0, 29);
        assert!(matches!(
            locate_screen(&grid.view(), &BoundaryConfig::default()),
            BoundaryDetection::Miss { .. }
        ));
    }

    #[test]
    fn test_corner_origin_distance() {
        assert_eq!(Corner::new(3, 4).origin_distance_sq(), 25);
        assert_eq!(
            Corner::new(4_000_000_000, 0).origin_distance_sq(),
            16_000_000_000_000_000_000
        );
    }

    #[test]
    fn test_corner_within_grid() {
        assert!(Corner::new(0, 0).within(30, 20));
        assert!(Corner::new(30, 20).within(30, 20));
        assert!(!Corner::new(31, 20).within(30, 20));
        assert!(!Corner::new(-1, 3).within(30, 20));
    }
}
