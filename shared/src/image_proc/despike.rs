//! Sample cleaning ahead of boundary detection.
//!
//! The light sensor occasionally reports isolated overshoot values. Left in
//! place they distort both the binarised outline and the final mask, so every
//! map is despiked and clipped before anything else looks at it.

use ndarray::{s, Array2, ArrayView2};
use thiserror::Error;

use super::{finite_max, finite_mean};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum DespikeError {
    /// The neighbourhood must have a centre cell
    #[error("despike window must be odd, got {0}")]
    InvalidWindow(usize),
}

/// Parameters for peak replacement.
#[derive(Debug, Clone, Copy)]
pub struct DespikeConfig {
    /// Side of the square neighbourhood used for the replacement average,
    /// odd
    pub window: usize,
    /// Cells above `factor * mean(grid)` count as peaks
    pub factor: f64,
}

impl Default for DespikeConfig {
    fn default() -> Self {
        Self {
            window: 3,
            factor: 1.5,
        }
    }
}

/// Replace peaks with the local average of their neighbourhood.
///
/// Every interior cell (a `window / 2` border is left alone) whose value is
/// above `threshold` is replaced by the mean of the `window × window`
/// neighbourhood, leaving out every cell equal to the peak value. The scan
/// reads the original grid only, so replacements never feed into each other.
/// A neighbourhood holding nothing but the peak value keeps the cell as is.
///
/// # Errors
/// [`DespikeError::InvalidWindow`] for an even (or zero) `window`.
pub fn replace_peaks(
    grid: &ArrayView2<f64>,
    threshold: f64,
    window: usize,
) -> Result<Array2<f64>, DespikeError> {
    if window % 2 == 0 {
        return Err(DespikeError::InvalidWindow(window));
    }
    let mut result = grid.to_owned();
    let (height, width) = grid.dim();
    let half = window / 2;

    if height <= 2 * half || width <= 2 * half {
        return Ok(result);
    }

    for i in half..height - half {
        for j in half..width - half {
            let peak = grid[[i, j]];
            if peak.is_nan() || peak <= threshold {
                continue;
            }
            let neighbourhood = grid.slice(s![i - half..=i + half, j - half..=j + half]);
            if let Some(average) = finite_mean(neighbourhood.iter().filter(|&&v| v != peak)) {
                result[[i, j]] = average;
            }
        }
    }

    Ok(result)
}

/// Despike a raw map and clip it to `[low_threshold, max]`.
///
/// Peaks are detected relative to the mean of the finite cells. After
/// clipping, every cell sitting exactly at `low_threshold` is marked missing
/// (NaN) so it drops out of later statistics and renders as a gap.
pub fn normalize(
    grid: &ArrayView2<f64>,
    config: &DespikeConfig,
    low_threshold: f64,
) -> Result<Array2<f64>, DespikeError> {
    let Some(mean) = finite_mean(grid.iter()) else {
        return Ok(grid.to_owned());
    };

    let mut despiked = replace_peaks(grid, config.factor * mean, config.window)?;

    let max = finite_max(despiked.iter()).unwrap_or(low_threshold).max(low_threshold);
    despiked.mapv_inplace(|v| {
        if !v.is_finite() {
            return f64::NAN;
        }
        let clipped = v.clamp(low_threshold, max);
        if clipped == low_threshold {
            f64::NAN
        } else {
            clipped
        }
    });

    Ok(despiked)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::Array2;

    #[test]
    fn test_single_outlier_becomes_neighbourhood_value() {
        let mut grid = Array2::from_elem((5, 5), 10.0);
        grid[[2, 2]] = 1000.0;

        let mean = grid.mean().unwrap();
        let result = replace_peaks(&grid.view(), 1.5 * mean, 3).unwrap();

        assert_relative_eq!(result[[2, 2]], 10.0);
        for ((i, j), &v) in result.indexed_iter() {
            if (i, j) != (2, 2) {
                assert_eq!(v, 10.0);
            }
        }
    }

    #[test]
    fn test_border_peaks_untouched() {
        let mut grid = Array2::from_elem((4, 4), 10.0);
        grid[[0, 0]] = 500.0;
        let result = replace_peaks(&grid.view(), 20.0, 3).unwrap();
        assert_eq!(result[[0, 0]], 500.0);
    }

    #[test]
    fn test_replacement_reads_original_grid() {
        // Two adjacent peaks: each one's average must exclude only its own
        // value and still see the other peak as it was.
        let mut grid = Array2::from_elem((5, 5), 10.0);
        grid[[2, 2]] = 100.0;
        grid[[2, 3]] = 200.0;
        let result = replace_peaks(&grid.view(), 50.0, 3).unwrap();

        assert_relative_eq!(result[[2, 2]], (7.0 * 10.0 + 200.0) / 8.0);
        assert_relative_eq!(result[[2, 3]], (7.0 * 10.0 + 100.0) / 8.0);
    }

    #[test]
    fn test_plateau_of_peak_values_kept() {
        let mut grid = Array2::from_elem((5, 5), 1.0);
        grid.slice_mut(s![1..4, 1..4]).fill(100.0);
        let result = replace_peaks(&grid.view(), 50.0, 3).unwrap();
        assert_eq!(result[[2, 2]], 100.0);
    }

    #[test]
    fn test_uniform_grid_unchanged() {
        let grid = Array2::from_elem((4, 4), 100.0);
        let result = normalize(&grid.view(), &DespikeConfig::default(), 0.0).unwrap();
        assert_eq!(result, grid);
    }

    #[test]
    fn test_clipping_marks_threshold_cells_missing() {
        let grid = Array2::from_shape_vec((2, 3), vec![5.0, 10.0, 20.0, 30.0, 10.0, 40.0]).unwrap();
        let result = normalize(&grid.view(), &DespikeConfig::default(), 10.0).unwrap();

        // Below and exactly at the threshold are missing
        assert!(result[[0, 0]].is_nan());
        assert!(result[[0, 1]].is_nan());
        assert!(result[[1, 1]].is_nan());
        // Above the threshold survives untouched
        assert_eq!(result[[0, 2]], 20.0);
        assert_eq!(result[[1, 0]], 30.0);
        assert_eq!(result[[1, 2]], 40.0);
        assert!(result.iter().filter(|v| v.is_finite()).all(|&v| v >= 10.0));
    }

    #[test]
    fn test_missing_cells_stay_missing() {
        let mut grid = Array2::from_elem((3, 3), 50.0);
        grid[[1, 1]] = f64::NAN;
        let result = normalize(&grid.view(), &DespikeConfig::default(), 0.0).unwrap();
        assert!(result[[1, 1]].is_nan());
        assert_eq!(result[[0, 0]], 50.0);
    }

    #[test]
    fn test_even_window_is_rejected() {
        let grid = Array2::from_elem((6, 6), 10.0);
        assert_eq!(
            replace_peaks(&grid.view(), 5.0, 4),
            Err(DespikeError::InvalidWindow(4))
        );
        assert_eq!(
            replace_peaks(&grid.view(), 5.0, 0),
            Err(DespikeError::InvalidWindow(0))
        );

        let config = DespikeConfig {
            window: 2,
            ..Default::default()
        };
        assert!(normalize(&grid.view(), &config, 0.0).is_err());
    }
}
