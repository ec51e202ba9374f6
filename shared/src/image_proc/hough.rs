//! Straight-line detection on region outlines.
//!
//! Lines are kept in Hesse normal form `x·cos θ + y·sin θ = ρ`, with `x` the
//! column and `y` the row of the grid and `θ ∈ [0, π)`. Only orientations near
//! horizontal or vertical are kept; a display edge is never diagonal in a
//! scan of a display lying roughly square on the gantry bed.
//!
//! Candidates come from `imageproc`'s Hough transform, whose accumulator
//! works in whole pixels and whole degrees. Each candidate is then refitted
//! to the outline pixels it explains, so an edge found a degree off axis
//! still yields the exact edge.

use std::f64::consts::{FRAC_PI_2, PI};

use image::{GrayImage, Luma};
use imageproc::hough::{detect_lines, LineDetectionOptions, PolarLine};
use ndarray::ArrayView2;
use tracing::debug;

/// Outline pixels within this distance of a line support it.
const INLIER_DISTANCE: f64 = 0.5;

/// Parameters for [`hough_lines`].
#[derive(Debug, Clone, Copy)]
pub struct HoughConfig {
    /// Minimum number of outline pixels on a line
    pub min_votes: u32,
    /// Accumulator peaks closer than this (in pixels and degrees) to a
    /// stronger one are dropped
    pub suppression_radius: u32,
    /// Maximum deviation from horizontal/vertical in radians
    pub angle_tolerance: f64,
}

impl Default for HoughConfig {
    fn default() -> Self {
        Self {
            min_votes: 10,
            suppression_radius: 2,
            angle_tolerance: PI / 8.0,
        }
    }
}

/// A detected line in Hesse normal form.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Line {
    pub rho: f64,
    pub theta: f64,
    pub votes: usize,
}

impl Line {
    pub fn new(rho: f64, theta: f64) -> Self {
        Self {
            rho,
            theta,
            votes: 0,
        }
    }

    /// Whether two lines describe the same edge.
    ///
    /// Angles are compared modulo π: `(ρ, θ)` and `(−ρ, θ ± π)` are the same
    /// line, so a vertical edge found just either side of `θ = 0` is merged.
    pub fn is_near(&self, other: &Line, theta_tolerance: f64, rho_tolerance: f64) -> bool {
        let mut dtheta = (self.theta - other.theta).abs();
        let mut other_rho = other.rho;
        if dtheta > PI / 2.0 {
            dtheta = PI - dtheta;
            other_rho = -other_rho;
        }
        dtheta < theta_tolerance && (self.rho - other_rho).abs() < rho_tolerance
    }

    /// Whether the line is closer to horizontal than to vertical.
    pub fn is_horizontal(&self) -> bool {
        (self.theta - FRAC_PI_2).abs() < PI / 4.0
    }

    /// Distance of `(x, y)` from the line.
    pub fn distance(&self, x: f64, y: f64) -> f64 {
        let (sin, cos) = self.theta.sin_cos();
        (x * cos + y * sin - self.rho).abs()
    }
}

impl From<PolarLine> for Line {
    fn from(line: PolarLine) -> Self {
        Line::new(line.r as f64, (line.angle_in_degrees as f64).to_radians())
    }
}

fn angle_allowed(theta: f64, tolerance: f64) -> bool {
    theta <= tolerance || (theta - FRAC_PI_2).abs() <= tolerance || PI - theta <= tolerance
}

/// Angular distance from the nearest axis.
fn axis_deviation(theta: f64) -> f64 {
    theta.min((theta - FRAC_PI_2).abs()).min(PI - theta)
}

fn to_gray_image(edges: &ArrayView2<f64>) -> GrayImage {
    let (height, width) = edges.dim();
    GrayImage::from_fn(width as u32, height as u32, |x, y| {
        Luma([if edges[[y as usize, x as usize]] > 0.0 { 255 } else { 0 }])
    })
}

/// Total least-squares line through `points`, `None` with fewer than two.
fn fit_line(points: &[(f64, f64)]) -> Option<Line> {
    if points.len() < 2 {
        return None;
    }
    let n = points.len() as f64;
    let mx = points.iter().map(|p| p.0).sum::<f64>() / n;
    let my = points.iter().map(|p| p.1).sum::<f64>() / n;
    let (mut sxx, mut syy, mut sxy) = (0.0, 0.0, 0.0);
    for &(x, y) in points {
        sxx += (x - mx) * (x - mx);
        syy += (y - my) * (y - my);
        sxy += (x - mx) * (y - my);
    }

    // The normal is perpendicular to the principal direction
    let direction = 0.5 * (2.0 * sxy).atan2(sxx - syy);
    let theta = (direction + FRAC_PI_2).rem_euclid(PI);
    let (sin, cos) = theta.sin_cos();
    Some(Line::new(mx * cos + my * sin, theta))
}

/// Refit a candidate to the outline pixels around it.
///
/// Pixels within [`INLIER_DISTANCE`] of the median projection at the
/// candidate's angle are fitted; the refitted line's votes are the pixels
/// within the same distance of it.
fn refine(candidate: Line, points: &[(f64, f64)]) -> Option<Line> {
    let (sin, cos) = candidate.theta.sin_cos();
    let mut projections: Vec<(f64, (f64, f64))> = points
        .iter()
        .map(|&(x, y)| (x * cos + y * sin, (x, y)))
        .filter(|(p, _)| (p - candidate.rho).abs() <= 1.0 + INLIER_DISTANCE)
        .collect();
    if projections.is_empty() {
        return None;
    }
    projections.sort_by(|a, b| a.0.total_cmp(&b.0));
    let median = projections[projections.len() / 2].0;

    let support: Vec<(f64, f64)> = projections
        .iter()
        .filter(|(p, _)| (p - median).abs() <= INLIER_DISTANCE)
        .map(|&(_, point)| point)
        .collect();
    let mut line = fit_line(&support)?;
    line.votes = points
        .iter()
        .filter(|&&(x, y)| line.distance(x, y) <= INLIER_DISTANCE)
        .count();
    Some(line)
}

/// Hough transform over the non-zero pixels of `edges`.
///
/// Returns refitted axis-near lines with at least `min_votes` supporting
/// pixels, strongest first. Equal votes put the line closer to an axis first.
pub fn hough_lines(edges: &ArrayView2<f64>, config: &HoughConfig) -> Vec<Line> {
    let points: Vec<(f64, f64)> = edges
        .indexed_iter()
        .filter(|(_, v)| **v > 0.0)
        .map(|((y, x), _)| (x as f64, y as f64))
        .collect();
    if points.is_empty() {
        return Vec::new();
    }

    let options = LineDetectionOptions {
        vote_threshold: config.min_votes,
        suppression_radius: config.suppression_radius,
    };
    let candidates = detect_lines(&to_gray_image(edges), options);
    debug!("Hough accumulator gave {} candidates", candidates.len());

    let mut lines: Vec<Line> = candidates
        .into_iter()
        .map(Line::from)
        .filter(|line| angle_allowed(line.theta, config.angle_tolerance))
        .filter_map(|line| refine(line, &points))
        .filter(|line| angle_allowed(line.theta, config.angle_tolerance))
        .filter(|line| line.votes >= config.min_votes as usize)
        .collect();

    lines.sort_by(|a, b| {
        b.votes
            .cmp(&a.votes)
            .then(axis_deviation(a.theta).total_cmp(&axis_deviation(b.theta)))
    });
    lines
}

/// Drop lines near an already kept one, keeping the first seen.
///
/// Input order matters: with [`hough_lines`] output the strongest line of
/// each cluster survives.
pub fn dedup_lines(lines: &[Line], theta_tolerance: f64, rho_tolerance: f64) -> Vec<Line> {
    let mut kept: Vec<Line> = Vec::new();
    for line in lines {
        if !kept
            .iter()
            .any(|k| k.is_near(line, theta_tolerance, rho_tolerance))
        {
            kept.push(*line);
        }
    }
    kept
}

/// Intersection point `(x, y)` of two lines, `None` when they are parallel.
pub fn intersection(a: &Line, b: &Line) -> Option<(f64, f64)> {
    let (sin_a, cos_a) = a.theta.sin_cos();
    let (sin_b, cos_b) = b.theta.sin_cos();
    let det = cos_a * sin_b - sin_a * cos_b;
    if det.abs() < 1e-9 {
        return None;
    }
    let x = (a.rho * sin_b - sin_a * b.rho) / det;
    let y = (cos_a * b.rho - cos_b * a.rho) / det;
    Some((x, y))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::Array2;

    fn rectangle_outline(
        height: usize,
        width: usize,
        top: usize,
        bottom: usize,
        left: usize,
        right: usize,
    ) -> Array2<f64> {
        Array2::from_shape_fn((height, width), |(y, x)| {
            let on_rows = y >= top && y <= bottom;
            let on_cols = x >= left && x <= right;
            let on_edge = (on_rows && (x == left || x == right)) || (on_cols && (y == top || y == bottom));
            if on_edge {
                1.0
            } else {
                0.0
            }
        })
    }

    #[test]
    fn test_rectangle_yields_four_axis_lines() {
        let edges = rectangle_outline(30, 40, 5, 24, 8, 31);
        let config = HoughConfig {
            min_votes: 40 / 5,
            ..Default::default()
        };
        let lines = dedup_lines(&hough_lines(&edges.view(), &config), PI / 40.0, 10.0);
        assert_eq!(lines.len(), 4, "lines: {lines:?}");

        let expected = [
            Line::new(8.0, 0.0),
            Line::new(31.0, 0.0),
            Line::new(5.0, PI / 2.0),
            Line::new(24.0, PI / 2.0),
        ];
        for want in &expected {
            assert!(
                lines.iter().any(|l| l.is_near(want, 1e-6, 1e-6)),
                "missing {want:?} in {lines:?}"
            );
        }
    }

    #[test]
    fn test_strongest_first() {
        let edges = rectangle_outline(30, 40, 5, 24, 8, 31);
        let lines = hough_lines(&edges.view(), &HoughConfig::default());
        assert!(lines.windows(2).all(|w| w[0].votes >= w[1].votes));
        // Horizontal edges are longer than vertical ones
        assert_abs_diff_eq!(lines[0].theta, PI / 2.0, epsilon = 1e-9);
        assert_eq!(lines[0].votes, 24);
    }

    #[test]
    fn test_edge_on_the_grid_border() {
        // Truncated accumulator distances put the bottom row one bin low;
        // refitting recovers it
        let edges = rectangle_outline(20, 30, 0, 19, 0, 29);
        let lines = dedup_lines(&hough_lines(&edges.view(), &HoughConfig::default()), PI / 40.0, 10.0);
        for want in [Line::new(19.0, PI / 2.0), Line::new(29.0, 0.0), Line::new(0.0, 0.0)] {
            assert!(
                lines.iter().any(|l| l.is_near(&want, 1e-6, 1e-6)),
                "missing {want:?} in {lines:?}"
            );
        }
    }

    #[test]
    fn test_slightly_tilted_edge_is_refitted() {
        // One-pixel step halfway along a horizontal edge
        let edges = Array2::from_shape_fn((20, 40), |(y, x)| {
            let row = if x < 20 { 10 } else { 11 };
            if y == row {
                1.0
            } else {
                0.0
            }
        });
        let lines = hough_lines(&edges.view(), &HoughConfig::default());
        assert!(!lines.is_empty());
        assert!(lines[0].is_horizontal());
        assert_abs_diff_eq!(lines[0].distance(0.0, 10.0), 0.0, epsilon = 0.5);
        assert_abs_diff_eq!(lines[0].distance(39.0, 11.0), 0.0, epsilon = 0.5);
    }

    #[test]
    fn test_diagonals_are_ignored() {
        let edges = Array2::from_shape_fn((30, 30), |(y, x)| if x == y { 1.0 } else { 0.0 });
        let lines = hough_lines(&edges.view(), &HoughConfig::default());
        assert!(lines.is_empty(), "unexpected {lines:?}");
    }

    #[test]
    fn test_empty_outline_has_no_lines() {
        let edges = Array2::<f64>::zeros((10, 10));
        assert!(hough_lines(&edges.view(), &HoughConfig::default()).is_empty());
    }

    #[test]
    fn test_polar_line_conversion() {
        let line = Line::from(PolarLine {
            r: 12.0,
            angle_in_degrees: 90,
        });
        assert_abs_diff_eq!(line.rho, 12.0);
        assert_abs_diff_eq!(line.theta, FRAC_PI_2, epsilon = 1e-12);
        assert!(line.is_horizontal());
        assert!(!Line::new(3.0, 0.1).is_horizontal());
    }

    #[test]
    fn test_near_identical_lines_collapse() {
        let lines = [
            Line::new(20.0, 0.50),
            Line::new(25.0, 0.50 + 3f64.to_radians()),
            Line::new(40.0, 0.50),
        ];
        let kept = dedup_lines(&lines, PI / 40.0, 10.0);
        assert_eq!(kept, vec![lines[0], lines[2]]);
    }

    #[test]
    fn test_lines_across_theta_wrap_are_same() {
        let a = Line::new(8.0, 0.0);
        let b = Line::new(-8.0, PI - 0.5f64.to_radians());
        assert!(a.is_near(&b, PI / 40.0, 10.0));
        assert_eq!(dedup_lines(&[a, b], PI / 40.0, 10.0).len(), 1);
    }

    #[test]
    fn test_intersection() {
        let vertical = Line::new(10.0, 0.0);
        let horizontal = Line::new(4.0, PI / 2.0);
        let (x, y) = intersection(&vertical, &horizontal).unwrap();
        assert_abs_diff_eq!(x, 10.0, epsilon = 1e-9);
        assert_abs_diff_eq!(y, 4.0, epsilon = 1e-9);

        assert!(intersection(&vertical, &Line::new(30.0, 0.0)).is_none());
    }
}
