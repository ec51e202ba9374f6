//! Raster acquisition of a display's brightness map.
//!
//! A run homes the gantry, walks the sensor over a `cols × rows` grid in
//! boustrophedon order and parks the head again:
//!
//! ```text
//! Init ──▶ Homed ──▶ Scanning { row } ──▶ Parked ──▶ Done
//!   └──────────┴─────────────┴──────────────▶ Error
//! ```
//!
//! Two strategies fill the grid:
//!
//! - **Conservative**: stop on every grid point, wait for the motion to
//!   settle and take a single-shot reading. Samples sit on the grid lines
//!   `x · w / (cols − 1)`.
//! - **Fast**: sweep each row at its vertical centre `(y + 0.5) · h / rows`
//!   while the firmware streams `cols` readings. A row with missed samples is
//!   retried 5% slower; a short row is retried unchanged. The slowdown
//!   persists for the rest of the run.
//!
//! The park sequence (return to origin, wait, disable motors) is attempted
//! after every run, successful or not.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use lcdmap_shared::measurement::{Measurement, MeasurementError};
use thiserror::Error;
use tracing::{debug, info, warn};

use super::link::{LinkError, LinkResult, MarlinLink, DEFAULT_TIMEOUT, MOTION_SETTLE_TIMEOUT, PARK_TIMEOUT};
use super::sensor::{Sensor, SensorError};

/// Feedrate factor applied after a row with missed samples.
pub const MISSED_SAMPLE_SLOWDOWN: f64 = 0.95;

/// Marker the firmware streams in place of a sample it could not take.
const MISSED_MARKER: &str = "Missed";

#[derive(Error, Debug)]
pub enum AcquisitionError {
    #[error("device link failed: {0}")]
    Link(#[from] LinkError),

    #[error(transparent)]
    Sensor(#[from] SensorError),

    #[error("empty response to '{command}'")]
    EmptyResponse { command: String },

    #[error("row {row} still incomplete after {attempts} attempts")]
    RowRetriesExhausted { row: usize, attempts: usize },

    #[error("scan interrupted")]
    Interrupted,

    #[error("invalid scan configuration: {0}")]
    InvalidConfig(String),

    #[error("scan produced an invalid measurement: {0}")]
    Measurement(#[from] MeasurementError),
}

pub type AcquisitionResult<T> = Result<T, AcquisitionError>;

/// How the grid is sampled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ScanStrategy {
    /// Stop and read at every grid point
    #[default]
    Conservative,
    /// Stream readings while sweeping each row
    Fast,
}

/// Where a run currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanState {
    Init,
    Homed,
    Scanning { row: usize },
    Parked,
    Done,
    Error,
}

/// Scan geometry and motion parameters.
#[derive(Debug, Clone)]
pub struct ScanConfig {
    /// Scanned area `[width, height]` in millimetres
    pub size_mm: [f64; 2],
    /// Sample grid `[cols, rows]`
    pub resolution: [usize; 2],
    /// Travel feedrate in mm/min
    pub feedrate: f64,
    pub strategy: ScanStrategy,
    /// Attempts per row before the fast strategy gives up
    pub max_row_attempts: usize,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            size_mm: [120.0, 68.0],
            resolution: [40, 30],
            feedrate: 3000.0,
            strategy: ScanStrategy::Conservative,
            max_row_attempts: 25,
        }
    }
}

impl ScanConfig {
    fn validate(&self) -> AcquisitionResult<()> {
        let [cols, rows] = self.resolution;
        if cols == 0 || rows == 0 {
            return Err(AcquisitionError::InvalidConfig(format!(
                "resolution must be non-zero, got {cols}x{rows}"
            )));
        }
        if self.size_mm.iter().any(|s| !s.is_finite() || *s < 0.0) {
            return Err(AcquisitionError::InvalidConfig(format!(
                "invalid size {:?}",
                self.size_mm
            )));
        }
        if !(self.feedrate.is_finite() && self.feedrate > 0.0) {
            return Err(AcquisitionError::InvalidConfig(format!(
                "feedrate must be positive, got {}",
                self.feedrate
            )));
        }
        if self.max_row_attempts == 0 {
            return Err(AcquisitionError::InvalidConfig(
                "max_row_attempts must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Grid line coordinate of sample `index` out of `count` spanning `extent`.
fn grid_coordinate(index: usize, count: usize, extent: f64) -> f64 {
    if count <= 1 {
        0.0
    } else {
        index as f64 * extent / (count - 1) as f64
    }
}

/// Column visiting order of a row: ascending on even rows, descending on odd.
pub fn boustrophedon_columns(row: usize, cols: usize) -> Vec<usize> {
    if row % 2 == 0 {
        (0..cols).collect()
    } else {
        (0..cols).rev().collect()
    }
}

/// Motors-on gantry head.
///
/// Disables the motors on drop unless the park sequence already ran, so a
/// panic mid-scan does not leave the steppers energised.
struct ScanHead<'a> {
    link: &'a mut MarlinLink,
    parked: bool,
}

impl<'a> ScanHead<'a> {
    fn new(link: &'a mut MarlinLink) -> Self {
        Self {
            link,
            parked: false,
        }
    }

    fn execute(&mut self, command: &str, timeout: std::time::Duration) -> LinkResult<Vec<String>> {
        self.link.execute(command, timeout)
    }

    /// Return to the origin, wait and disable the motors.
    ///
    /// Every step is attempted even if an earlier one fails; the first
    /// failure is returned.
    fn park(&mut self, feedrate: f64) -> LinkResult<()> {
        self.parked = true;
        let steps = [
            (format!("G0 X0 Y0 F{feedrate}"), DEFAULT_TIMEOUT),
            ("M400".to_string(), PARK_TIMEOUT),
            ("M18".to_string(), DEFAULT_TIMEOUT),
        ];
        let mut first_error = None;
        for (command, timeout) in steps {
            if let Err(e) = self.link.execute(&command, timeout) {
                warn!("Park step '{command}' failed: {e}");
                first_error.get_or_insert(e);
            }
        }
        first_error.map_or(Ok(()), Err)
    }
}

impl Drop for ScanHead<'_> {
    fn drop(&mut self) {
        if !self.parked {
            if let Err(e) = self.link.execute("M18", DEFAULT_TIMEOUT) {
                warn!("Failed to disable motors: {e}");
            }
        }
    }
}

/// Drives one acquisition run over a [`MarlinLink`].
pub struct Scanner {
    sensor: Sensor,
    config: ScanConfig,
    state: ScanState,
    feed_multiplier: f64,
    interrupt: Option<Arc<AtomicBool>>,
}

impl Scanner {
    pub fn new(sensor: Sensor, config: ScanConfig) -> Self {
        Self {
            sensor,
            config,
            state: ScanState::Init,
            feed_multiplier: 1.0,
            interrupt: None,
        }
    }

    /// Abort the run (after parking) once `flag` is set.
    pub fn with_interrupt(mut self, flag: Arc<AtomicBool>) -> Self {
        self.interrupt = Some(flag);
        self
    }

    pub fn state(&self) -> ScanState {
        self.state
    }

    /// Current fast-scan feedrate factor, `0.95^k` after `k` slowdowns.
    pub fn feed_multiplier(&self) -> f64 {
        self.feed_multiplier
    }

    pub fn config(&self) -> &ScanConfig {
        &self.config
    }

    /// Run a full acquisition and return the brightness map.
    ///
    /// # Errors
    /// Any link failure aborts the run; no partial measurement is returned.
    pub fn run(&mut self, link: &mut MarlinLink) -> AcquisitionResult<Measurement> {
        self.config.validate()?;
        self.state = ScanState::Init;
        self.feed_multiplier = 1.0;

        let feedrate = self.config.feedrate;
        let mut head = ScanHead::new(link);

        let scanned = self.home(&mut head).and_then(|()| self.scan(&mut head));
        let parked = head.park(feedrate);

        let rows = match (scanned, parked) {
            (Ok(rows), Ok(())) => rows,
            (Ok(_), Err(e)) => {
                self.state = ScanState::Error;
                return Err(e.into());
            }
            (Err(e), _) => {
                self.state = ScanState::Error;
                return Err(e);
            }
        };
        self.state = ScanState::Parked;

        let measurement = Measurement::new(self.sensor.id(), self.config.size_mm, self.config.resolution, rows)?;
        self.state = ScanState::Done;
        info!("Scan complete");
        Ok(measurement)
    }

    fn check_interrupt(&self) -> AcquisitionResult<()> {
        match &self.interrupt {
            Some(flag) if flag.load(Ordering::SeqCst) => Err(AcquisitionError::Interrupted),
            _ => Ok(()),
        }
    }

    fn home(&mut self, head: &mut ScanHead) -> AcquisitionResult<()> {
        info!("Homing");
        head.execute("M17", DEFAULT_TIMEOUT)?;
        head.execute("G28", DEFAULT_TIMEOUT)?;
        head.execute(&format!("G0 X0 Y0 F{}", self.config.feedrate), DEFAULT_TIMEOUT)?;
        self.state = ScanState::Homed;
        Ok(())
    }

    fn scan(&mut self, head: &mut ScanHead) -> AcquisitionResult<Vec<Vec<Option<f64>>>> {
        let rows = self.config.resolution[1];
        let mut measurements = Vec::with_capacity(rows);
        for y in 0..rows {
            self.check_interrupt()?;
            self.state = ScanState::Scanning { row: y };
            info!("Row {} / {}", y + 1, rows);
            let row = match self.config.strategy {
                ScanStrategy::Conservative => self.conservative_row(head, y)?,
                ScanStrategy::Fast => self.fast_row(head, y)?,
            };
            debug!("Row {y}: {row:?}");
            measurements.push(row.into_iter().map(Some).collect());
        }
        Ok(measurements)
    }

    fn conservative_row(&mut self, head: &mut ScanHead, y: usize) -> AcquisitionResult<Vec<f64>> {
        let [cols, rows] = self.config.resolution;
        let [width, height] = self.config.size_mm;
        let target_y = grid_coordinate(y, rows, height);

        let mut row = vec![0.0; cols];
        for x in boustrophedon_columns(y, cols) {
            self.check_interrupt()?;
            let target_x = grid_coordinate(x, cols, width);
            head.execute(
                &format!("G1 X{target_x} Y{target_y} F{}", self.config.feedrate),
                DEFAULT_TIMEOUT,
            )?;
            head.execute("M400", MOTION_SETTLE_TIMEOUT)?;

            let command = self.sensor.direct_command();
            let response = head.execute(command, DEFAULT_TIMEOUT)?;
            let token = response.first().ok_or_else(|| AcquisitionError::EmptyResponse {
                command: command.to_string(),
            })?;
            row[x] = self.sensor.interpret(token)?;
            debug!("{x}, {y}: {}", row[x]);
        }
        Ok(row)
    }

    fn fast_row(&mut self, head: &mut ScanHead, y: usize) -> AcquisitionResult<Vec<f64>> {
        let [cols, rows] = self.config.resolution;
        let [width, height] = self.config.size_mm;
        let feedrate = self.config.feedrate;
        let target_y = (y as f64 + 0.5) * height / rows as f64;
        let (start_x, end_x) = if y % 2 == 0 { (0.0, width) } else { (width, 0.0) };

        for _ in 0..self.config.max_row_attempts {
            self.check_interrupt()?;
            head.execute(&format!("G1 X{start_x} Y{target_y} F{feedrate}"), DEFAULT_TIMEOUT)?;
            head.execute("M400", DEFAULT_TIMEOUT)?;
            let values = head.execute(
                &format!(
                    "M6000 S{cols} P{} X{end_x} F{}",
                    self.sensor.stream_index(),
                    feedrate * self.feed_multiplier
                ),
                DEFAULT_TIMEOUT,
            )?;

            if values.iter().any(|v| v.contains(MISSED_MARKER)) {
                self.feed_multiplier *= MISSED_SAMPLE_SLOWDOWN;
                warn!(
                    "Missed samples in row {y}, lowering feedrate to {}",
                    feedrate * self.feed_multiplier
                );
                continue;
            }
            if values.len() != cols {
                warn!("Row {y} returned {} of {cols} samples, retrying", values.len());
                continue;
            }

            let mut row = values
                .iter()
                .map(|v| self.sensor.interpret(v))
                .collect::<Result<Vec<_>, _>>()?;
            if y % 2 == 1 {
                row.reverse();
            }
            return Ok(row);
        }

        Err(AcquisitionError::RowRetriesExhausted {
            row: y,
            attempts: self.config.max_row_attempts,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_boustrophedon_columns() {
        assert_eq!(boustrophedon_columns(0, 4), vec![0, 1, 2, 3]);
        assert_eq!(boustrophedon_columns(1, 4), vec![3, 2, 1, 0]);
        assert_eq!(boustrophedon_columns(2, 1), vec![0]);
    }

    #[test]
    fn test_grid_coordinate() {
        assert_eq!(grid_coordinate(0, 5, 100.0), 0.0);
        assert_eq!(grid_coordinate(4, 5, 100.0), 100.0);
        assert_eq!(grid_coordinate(1, 5, 100.0), 25.0);
        // A single sample sits at the origin
        assert_eq!(grid_coordinate(0, 1, 100.0), 0.0);
    }

    #[test]
    fn test_config_validation() {
        let config = ScanConfig {
            resolution: [0, 3],
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(AcquisitionError::InvalidConfig(_))));

        let config = ScanConfig {
            feedrate: 0.0,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(AcquisitionError::InvalidConfig(_))));

        assert!(ScanConfig::default().validate().is_ok());
    }
}
