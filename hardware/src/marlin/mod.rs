//! Marlin-driven XY gantry carrying a light sensor.
//!
//! # Layers
//!
//! - [`transport`]: raw line I/O over a serial port (or the in-memory mock)
//! - [`link`]: G-code request/response framing with per-call timeouts
//! - [`sensor`]: the closed set of supported light sensors
//! - [`scan`]: homing, raster scanning and parking

pub mod link;
pub mod mock;
pub mod scan;
pub mod sensor;
pub mod transport;

pub use link::{
    LinkError, LinkResult, MarlinLink, BOOT_QUIET_TIMEOUT, DEFAULT_BAUD, DEFAULT_PORT, DEFAULT_TIMEOUT,
    MOTION_SETTLE_TIMEOUT, PARK_TIMEOUT,
};
pub use mock::{CommandLog, MockMarlin};
pub use scan::{
    boustrophedon_columns, AcquisitionError, AcquisitionResult, ScanConfig, ScanState, ScanStrategy, Scanner,
};
pub use sensor::{Sensor, SensorError, SensorResult};
pub use transport::{SerialTransport, Transport};
