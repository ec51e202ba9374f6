//! Raw brightness map produced by a scan.
//!
//! A measurement is written once by the acquisition engine and read back,
//! possibly much later, by the calibration engine. It is persisted as JSON:
//!
//! ```text
//! {
//!   "sensor": "TSL2561",
//!   "size": [120.0, 68.0],
//!   "resolution": [40, 30],
//!   "measurements": [[12.5, 13.0, ...], ...]
//! }
//! ```
//!
//! `resolution` is `[cols, rows]`, `measurements` is indexed `[row][col]` and a
//! `null` cell marks a missing sample.

use std::fs;
use std::path::Path;

use ndarray::Array2;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error loading, saving or validating a measurement record.
#[derive(Error, Debug)]
pub enum MeasurementError {
    /// IO error during save/load
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Record is structurally invalid
    #[error("malformed measurement: {0}")]
    Malformed(String),
}

pub type MeasurementResult<T> = Result<T, MeasurementError>;

/// A brightness map of a display sampled on a regular grid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Measurement {
    /// Identifier of the sensor that produced the samples
    pub sensor: String,
    /// Scanned area `[width, height]` in millimetres
    pub size: [f64; 2],
    /// Sample grid `[cols, rows]`
    pub resolution: [usize; 2],
    /// Samples indexed `[row][col]`, `None` for a missing sample
    pub measurements: Vec<Vec<Option<f64>>>,
}

impl Measurement {
    /// Create a validated measurement.
    ///
    /// # Errors
    /// Returns `Malformed` if the sample grid does not match `resolution`,
    /// is empty, or holds non-finite values.
    pub fn new(
        sensor: impl Into<String>,
        size: [f64; 2],
        resolution: [usize; 2],
        measurements: Vec<Vec<Option<f64>>>,
    ) -> MeasurementResult<Self> {
        let measurement = Self {
            sensor: sensor.into(),
            size,
            resolution,
            measurements,
        };
        measurement.validate()?;
        Ok(measurement)
    }

    /// Number of sample columns.
    pub fn cols(&self) -> usize {
        self.resolution[0]
    }

    /// Number of sample rows.
    pub fn rows(&self) -> usize {
        self.resolution[1]
    }

    /// Check the structural invariants of the record.
    pub fn validate(&self) -> MeasurementResult<()> {
        let [cols, rows] = self.resolution;
        if cols == 0 || rows == 0 {
            return Err(MeasurementError::Malformed(format!(
                "empty resolution {cols}x{rows}"
            )));
        }
        if self.measurements.len() != rows {
            return Err(MeasurementError::Malformed(format!(
                "expected {rows} rows, found {}",
                self.measurements.len()
            )));
        }
        for (y, row) in self.measurements.iter().enumerate() {
            if row.len() != cols {
                return Err(MeasurementError::Malformed(format!(
                    "row {y} has {} samples, expected {cols}",
                    row.len()
                )));
            }
            if let Some(x) = row.iter().position(|v| matches!(v, Some(v) if !v.is_finite())) {
                return Err(MeasurementError::Malformed(format!(
                    "non-finite sample at ({x}, {y})"
                )));
            }
        }
        if self.size.iter().any(|s| !s.is_finite() || *s < 0.0) {
            return Err(MeasurementError::Malformed(format!(
                "invalid size {:?}",
                self.size
            )));
        }
        Ok(())
    }

    /// Samples as a `(rows, cols)` array, missing samples as NaN.
    pub fn to_array(&self) -> Array2<f64> {
        Array2::from_shape_fn((self.rows(), self.cols()), |(y, x)| {
            self.measurements[y][x].unwrap_or(f64::NAN)
        })
    }

    /// Save to JSON file
    pub fn save_to_file(&self, path: &Path) -> MeasurementResult<()> {
        let json = serde_json::to_string(self)?;
        fs::write(path, json)?;
        Ok(())
    }

    /// Load from JSON file, validating the record.
    pub fn load_from_file(path: &Path) -> MeasurementResult<Self> {
        let json = fs::read_to_string(path)?;
        let measurement: Self = serde_json::from_str(&json)?;
        measurement.validate()?;
        Ok(measurement)
    }
}
