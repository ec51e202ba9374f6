//! Type-safe `WxH` argument for sizes and resolutions.
//!
//! Provides a clap-compatible type for command-line pairs such as a screen
//! resolution (`2560x1440`) or a physical size in millimetres (`120.9x68`).

use std::fmt;
use std::str::FromStr;

/// Parse a `WxH` pair into its two components.
///
/// Both components must parse as `T`. Whitespace around either component is
/// ignored, the separator is a single `x` (or `X`).
///
/// Invalid formats that return errors:
/// - "" - Empty specification
/// - "1920" - Missing second component
/// - "1920x1080x3" - Too many components
/// - "axb" - Non-numeric components
pub fn parse_dimensions<T: FromStr>(s: &str) -> Result<(T, T), String> {
    if s.trim().is_empty() {
        return Err(format!("'{s}' is not a valid WxH specification"));
    }

    let parts: Vec<&str> = s.split(['x', 'X']).collect();
    if parts.len() != 2 {
        return Err("Dimensions need to have two parts separated by 'x'".to_string());
    }

    let width = parts[0]
        .trim()
        .parse::<T>()
        .map_err(|_| format!("Invalid width '{}'", parts[0].trim()))?;
    let height = parts[1]
        .trim()
        .parse::<T>()
        .map_err(|_| format!("Invalid height '{}'", parts[1].trim()))?;

    Ok((width, height))
}

/// A `(width, height)` pair parsed from `WxH`.
///
/// Used for physical sizes (`Dimensions<f64>`, millimetres) and sample or
/// pixel resolutions (`Dimensions<usize>`).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Dimensions<T> {
    pub width: T,
    pub height: T,
}

impl<T> Dimensions<T> {
    pub fn new(width: T, height: T) -> Self {
        Self { width, height }
    }
}

impl<T: Copy> Dimensions<T> {
    /// Components as a `[width, height]` array, the measurement file layout.
    pub fn to_array(&self) -> [T; 2] {
        [self.width, self.height]
    }
}

impl<T: FromStr> FromStr for Dimensions<T> {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (width, height) = parse_dimensions(s)?;
        Ok(Self { width, height })
    }
}

impl<T: fmt::Display> fmt::Display for Dimensions<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}
