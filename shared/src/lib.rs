//! Shared components for LCD brightness mapping.
//!
//! Holds the on-disk measurement record, command-line argument types and the
//! calibration engine that turns a raw brightness map into a compensation
//! mask. Nothing in this crate talks to hardware.

pub mod calibration;
pub mod dimensions;
pub mod heatmap;
pub mod image_proc;
pub mod measurement;

pub use calibration::{
    compensate, CalibrationError, CalibrationResult, CompensationConfig, CornerPicker,
};
pub use dimensions::Dimensions;
pub use heatmap::{render_heatmap, HeatmapConfig, HeatmapError};
pub use measurement::{Measurement, MeasurementError};
