//! Calibration engine for sampled display brightness maps.
//!
//! Every stage is pure and works on `Array2<f64>` grids indexed `[row, col]`,
//! with NaN as the "missing" marker.
//!
//! - **despike**: peak replacement and low-threshold clipping
//! - **thresholding**: binarisation, connected components and region outlines
//! - **hough**: axis-near straight lines from `imageproc`'s Hough transform
//! - **boundary**: automatic location of the display's four corners
//! - **rectify**: perspective correction onto the canonical screen grid
//! - **mask**: compensation mask derivation and PNG output
//! - **image**: ndarray ↔ image crate conversions

pub mod boundary;
pub mod despike;
pub mod hough;
pub mod image;
pub mod mask;
pub mod rectify;
pub mod thresholding;

pub use boundary::{locate_screen, BoundaryConfig, BoundaryDetection, Corner};
pub use despike::{normalize, replace_peaks, DespikeConfig, DespikeError};
pub use hough::{dedup_lines, hough_lines, intersection, HoughConfig, Line};
pub use mask::{derive_mask, CompensationMask, MaskError, MaskParams};
pub use rectify::{
    perspective, rectify, AngularOrderMatcher, CornerMatcher, OriginDistanceMatcher, RectifyError,
};
pub use thresholding::{apply_threshold, connected_components, largest_component_outline};

/// Mean of the finite cells, `None` when there are none.
pub(crate) fn finite_mean<'a>(values: impl IntoIterator<Item = &'a f64>) -> Option<f64> {
    let (sum, count) = values
        .into_iter()
        .filter(|v| v.is_finite())
        .fold((0.0, 0usize), |(sum, count), v| (sum + v, count + 1));
    (count > 0).then(|| sum / count as f64)
}

/// Largest finite cell, `None` when there are none.
pub(crate) fn finite_max<'a>(values: impl IntoIterator<Item = &'a f64>) -> Option<f64> {
    values
        .into_iter()
        .copied()
        .filter(|v| v.is_finite())
        .fold(None, |acc: Option<f64>, v| Some(acc.map_or(v, |m| m.max(v))))
}
