//! Light sensors mounted on the gantry head.
//!
//! The firmware exposes each sensor twice: a single-shot read command and a
//! channel index for the streaming `M6000` command. Readings arrive as text
//! tokens and are turned into one brightness value per sample.

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

/// Number of channels reported by one AS7341 reading.
pub const AS7341_CHANNELS: usize = 12;

/// Position of the broadband Clear channel in an AS7341 reading.
const AS7341_CLEAR_CHANNEL: usize = 10;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum SensorError {
    #[error("unknown sensor '{0}' (expected TSL2561 or AS7341)")]
    Unknown(String),

    #[error("cannot interpret {sensor} reading '{token}'")]
    Parse { sensor: Sensor, token: String },
}

pub type SensorResult<T> = Result<T, SensorError>;

/// Supported light sensors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Sensor {
    /// TAOS TSL2561 lux sensor
    Tsl2561,
    /// ams AS7341 11-channel spectral sensor
    As7341,
}

impl Sensor {
    /// Identifier stored in measurement records.
    pub fn id(&self) -> &'static str {
        match self {
            Sensor::Tsl2561 => "TSL2561",
            Sensor::As7341 => "AS7341",
        }
    }

    /// Single-shot read command.
    pub fn direct_command(&self) -> &'static str {
        match self {
            Sensor::Tsl2561 => "M5500",
            Sensor::As7341 => "M5501",
        }
    }

    /// Channel index for the streaming `M6000 P<index>` command.
    pub fn stream_index(&self) -> u8 {
        match self {
            Sensor::Tsl2561 => 0,
            Sensor::As7341 => 1,
        }
    }

    /// Turn one reading token into a brightness value.
    ///
    /// Accepts the single-shot format (`Data: <value>`, or `Data:` followed
    /// by all AS7341 channels) and the bare numbers streamed by `M6000`.
    pub fn interpret(&self, token: &str) -> SensorResult<f64> {
        let body = token.trim();
        let body = body.strip_prefix("Data:").unwrap_or(body).trim();
        let fields: Vec<&str> = body.split_whitespace().collect();

        let field = match (self, fields.len()) {
            (_, 1) => fields[0],
            (Sensor::As7341, AS7341_CHANNELS) => fields[AS7341_CLEAR_CHANNEL],
            _ => return Err(self.parse_error(token)),
        };

        match field.parse::<f64>() {
            Ok(value) if value.is_finite() => Ok(value),
            _ => Err(self.parse_error(token)),
        }
    }

    fn parse_error(&self, token: &str) -> SensorError {
        SensorError::Parse {
            sensor: *self,
            token: token.to_string(),
        }
    }
}

impl fmt::Display for Sensor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

impl FromStr for Sensor {
    type Err = SensorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "TSL2561" => Ok(Sensor::Tsl2561),
            // AS7625 is the name older measurement files use for the same board
            "AS7341" | "AS7625" => Ok(Sensor::As7341),
            _ => Err(SensorError::Unknown(s.to_string())),
        }
    }
}
