//! Compensation mask derivation.
//!
//! The rectified brightness map is turned into an 8-bit image that dims the
//! brighter parts of the display: a cell at `min` gets no compensation, a cell
//! at `max` (or above) gets the full `amount`.

use std::path::Path;

use ndarray::{Array2, ArrayView2};
use thiserror::Error;

use super::finite_max;
use super::image::{array2_to_gray_image, rotate_180};

#[derive(Error, Debug)]
pub enum MaskError {
    #[error("empty brightness range: max {max} is not above min {min}")]
    EmptyRange { min: f64, max: f64 },

    #[error("rectified map holds no finite samples")]
    NoSamples,

    #[error("failed to write mask image: {0}")]
    Image(#[from] image::ImageError),
}

/// Brightness range and strength of the compensation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MaskParams {
    /// Brightness receiving no compensation
    pub min: f64,
    /// Brightness receiving full compensation, the map's maximum when `None`
    pub max: Option<f64>,
    /// Mask value at full compensation
    pub amount: u8,
}

/// Single-channel 8-bit mask at the screen's native resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompensationMask {
    pixels: Array2<u8>,
}

impl CompensationMask {
    /// Mask values indexed `[row, col]`.
    pub fn pixels(&self) -> &Array2<u8> {
        &self.pixels
    }

    pub fn width(&self) -> usize {
        self.pixels.ncols()
    }

    pub fn height(&self) -> usize {
        self.pixels.nrows()
    }

    /// Write the mask as a grayscale PNG.
    pub fn save_png(&self, path: &Path) -> Result<(), MaskError> {
        array2_to_gray_image(&self.pixels.view()).save_with_format(path, image::ImageFormat::Png)?;
        Ok(())
    }
}

/// Derive the compensation mask from a rectified brightness map.
///
/// Each cell becomes `clip(v - min, 0, max - min) · amount / (max - min)`,
/// rounded to the nearest integer; the result is rotated by 180° to match
/// the way the display is mounted on the printer.
pub fn derive_mask(rectified: &ArrayView2<f64>, params: &MaskParams) -> Result<CompensationMask, MaskError> {
    let max = match params.max {
        Some(max) => max,
        None => finite_max(rectified.iter()).ok_or(MaskError::NoSamples)?,
    };
    let min = params.min;
    let span = max - min;
    if span.is_nan() || span <= 0.0 {
        return Err(MaskError::EmptyRange { min, max });
    }

    let amount = params.amount as f64;
    let scaled = rectified.mapv(|v| {
        if v.is_nan() {
            return 0;
        }
        let level = (v - min).clamp(0.0, span) * amount / span;
        level.round().clamp(0.0, amount) as u8
    });

    Ok(CompensationMask {
        pixels: rotate_180(&scaled.view()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_range_endpoints() {
        let map = array![[10.0, 20.0], [30.0, 40.0]];
        let params = MaskParams {
            min: 10.0,
            max: Some(40.0),
            amount: 90,
        };
        let mask = derive_mask(&map.view(), &params).unwrap();
        // Rotated by 180°: the min cell ends up bottom-right
        assert_eq!(mask.pixels(), &array![[90, 60], [30, 0]]);
    }

    #[test]
    fn test_values_stay_within_amount() {
        let map = array![[-100.0, 5.0, 1e9], [f64::NAN, 50.0, 75.0]];
        let params = MaskParams {
            min: 0.0,
            max: Some(100.0),
            amount: 200,
        };
        let mask = derive_mask(&map.view(), &params).unwrap();
        assert!(mask.pixels().iter().all(|&v| v <= 200));
        assert_eq!(mask.pixels()[[1, 2]], 0); // -100 clipped to min
        assert_eq!(mask.pixels()[[1, 0]], 200); // 1e9 clipped to max
        assert_eq!(mask.pixels()[[0, 0]], 150);
        assert_eq!(mask.pixels()[[0, 2]], 0); // missing
    }

    #[test]
    fn test_default_max_is_observed_max() {
        let map = array![[0.0, 50.0], [100.0, 25.0]];
        let params = MaskParams {
            min: 0.0,
            max: None,
            amount: 200,
        };
        let mask = derive_mask(&map.view(), &params).unwrap();
        assert_eq!(mask.pixels(), &array![[50, 200], [100, 0]]);
    }

    #[test]
    fn test_empty_range() {
        let map = array![[5.0, 5.0]];
        let params = MaskParams {
            min: 5.0,
            max: None,
            amount: 100,
        };
        assert!(matches!(
            derive_mask(&map.view(), &params),
            Err(MaskError::EmptyRange { .. })
        ));
    }

    #[test]
    fn test_save_png() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mask.png");
        let map = Array2::from_shape_fn((4, 6), |(y, x)| (x + y) as f64);
        let params = MaskParams {
            min: 0.0,
            max: Some(8.0),
            amount: 255,
        };
        let mask = derive_mask(&map.view(), &params).unwrap();
        mask.save_png(&path).unwrap();

        let img = image::open(&path).unwrap().to_luma8();
        assert_eq!((img.width(), img.height()), (6, 4));
        assert_eq!(img.get_pixel(5, 3)[0], mask.pixels()[[3, 5]]);
    }
}
