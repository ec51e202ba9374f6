//! Compensation pipeline: measurement in, mask out.
//!
//! ```text
//! Measurement ─▶ normalize ─▶ locate_screen ─┬─▶ rectify ─▶ derive_mask
//!                                   (miss)   │
//!                              CornerPicker ─┘
//! ```
//!
//! Every stage is pure; the only collaborator is the [`CornerPicker`] that is
//! consulted when automatic detection misses or is turned off.

use ndarray::ArrayView2;
use thiserror::Error;
use tracing::{info, warn};

use crate::dimensions::Dimensions;
use crate::image_proc::{
    derive_mask, locate_screen, normalize, rectify, BoundaryConfig, BoundaryDetection,
    CompensationMask, Corner, CornerMatcher, DespikeConfig, DespikeError, MaskError, MaskParams,
    RectifyError,
};
use crate::measurement::{Measurement, MeasurementError};

#[derive(Error, Debug)]
pub enum CalibrationError {
    #[error("invalid measurement: {0}")]
    Measurement(#[from] MeasurementError),

    #[error("despiking failed: {0}")]
    Despike(#[from] DespikeError),

    #[error("corner selection was cancelled")]
    CornerSelectionCancelled,

    #[error("picked corners are not four distinct points inside the grid: {0:?}")]
    InvalidCorners([Corner; 4]),

    #[error("rectification failed: {0}")]
    Rectify(#[from] RectifyError),

    #[error("mask derivation failed: {0}")]
    Mask(#[from] MaskError),
}

pub type CalibrationResult<T> = Result<T, CalibrationError>;

/// Manual fallback for locating the display.
///
/// Receives the normalized brightness grid (NaN marks missing cells) and
/// returns the display's four corners in grid coordinates, or `None` when the
/// user gives up.
pub trait CornerPicker {
    fn pick_corners(&mut self, grid: &ArrayView2<f64>) -> Option<[Corner; 4]>;
}

/// Settings for [`compensate`].
#[derive(Debug, Clone)]
pub struct CompensationConfig {
    /// Brightness receiving no compensation
    pub min_brightness: f64,
    /// Brightness receiving full compensation, observed maximum when `None`
    pub max_brightness: Option<f64>,
    /// Mask value at full compensation
    pub amount: u8,
    /// Native screen resolution in pixels
    pub screen: Dimensions<usize>,
    /// Cells at or below this are marked missing
    pub low_threshold: f64,
    /// Skip automatic detection and go straight to the picker
    pub manual: bool,
    pub despike: DespikeConfig,
    pub boundary: BoundaryConfig,
}

impl CompensationConfig {
    /// Configuration with the usual defaults for everything but the
    /// brightness range, strength and screen.
    pub fn new(screen: Dimensions<usize>, min_brightness: f64, amount: u8) -> Self {
        Self {
            min_brightness,
            max_brightness: None,
            amount,
            screen,
            low_threshold: 0.0,
            manual: false,
            despike: DespikeConfig::default(),
            boundary: BoundaryConfig::default(),
        }
    }
}

fn distinct(corners: &[Corner; 4]) -> bool {
    corners
        .iter()
        .enumerate()
        .all(|(i, a)| corners[i + 1..].iter().all(|b| a != b))
}

/// Build the compensation mask for a full-screen measurement.
///
/// # Errors
/// A malformed measurement, a cancelled or degenerate corner selection, and
/// an empty brightness range abort the run. A detection miss does not: it
/// hands over to `picker`.
pub fn compensate(
    measurement: &Measurement,
    config: &CompensationConfig,
    picker: &mut dyn CornerPicker,
    matcher: &dyn CornerMatcher,
) -> CalibrationResult<CompensationMask> {
    measurement.validate()?;

    let grid = normalize(
        &measurement.to_array().view(),
        &config.despike,
        config.low_threshold,
    )?;

    let detected = if config.manual {
        None
    } else {
        match locate_screen(&grid.view(), &config.boundary) {
            BoundaryDetection::Found(corners) => Some(corners),
            BoundaryDetection::Miss { candidates } => {
                warn!(
                    "automatic screen detection found {} corner candidates, falling back to manual selection",
                    candidates.len()
                );
                None
            }
        }
    };

    let corners = match detected {
        Some(corners) => corners,
        None => {
            let corners = picker
                .pick_corners(&grid.view())
                .ok_or(CalibrationError::CornerSelectionCancelled)?;
            let (rows, cols) = grid.dim();
            if !distinct(&corners) || !corners.iter().all(|c| c.within(cols, rows)) {
                return Err(CalibrationError::InvalidCorners(corners));
            }
            corners
        }
    };
    info!("screen corners: {:?}", corners);

    let rectified = rectify(
        &grid.view(),
        &corners,
        config.screen.width,
        config.screen.height,
        matcher,
    )?;

    let params = MaskParams {
        min: config.min_brightness,
        max: config.max_brightness,
        amount: config.amount,
    };
    Ok(derive_mask(&rectified.view(), &params)?)
}
