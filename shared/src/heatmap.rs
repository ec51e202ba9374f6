//! PNG heatmap rendering of brightness maps.
//!
//! Each sample becomes a square cell coloured from blue (dimmest) to red
//! (brightest). Missing samples are left blank so gaps in the scan stay
//! visible.

use std::path::Path;

use ndarray::ArrayView2;
use plotters::prelude::*;
use plotters::style::HSLColor;
use thiserror::Error;

use crate::image_proc::finite_max;

#[derive(Error, Debug)]
pub enum HeatmapError {
    #[error("nothing to render: the map holds no finite samples")]
    NoSamples,

    #[error("drawing failed: {0}")]
    Draw(String),
}

/// Heatmap layout configuration
#[derive(Debug, Clone)]
pub struct HeatmapConfig {
    /// Side of one sample cell in pixels
    pub cell_size: u32,
    /// Optional caption drawn above the map
    pub title: Option<String>,
}

impl Default for HeatmapConfig {
    fn default() -> Self {
        Self {
            cell_size: 16,
            title: None,
        }
    }
}

const TITLE_HEIGHT: u32 = 40;

fn draw_error<E: std::error::Error + Send + Sync>(err: DrawingAreaErrorKind<E>) -> HeatmapError {
    HeatmapError::Draw(err.to_string())
}

/// Colour for a value normalised to `[0, 1]`.
fn cell_color(t: f64) -> HSLColor {
    HSLColor((1.0 - t.clamp(0.0, 1.0)) * 2.0 / 3.0, 1.0, 0.5)
}

/// Render `grid` (indexed `[row, col]`, NaN = missing) to a PNG at `path`.
pub fn render_heatmap(grid: &ArrayView2<f64>, path: &Path, config: &HeatmapConfig) -> Result<(), HeatmapError> {
    let max = finite_max(grid.iter()).ok_or(HeatmapError::NoSamples)?;
    let min = grid
        .iter()
        .copied()
        .filter(|v| v.is_finite())
        .fold(max, f64::min);
    let span = if max > min { max - min } else { 1.0 };

    let (rows, cols) = grid.dim();
    let cell = config.cell_size.max(1);
    let title_height = if config.title.is_some() { TITLE_HEIGHT } else { 0 };
    let size = (cols as u32 * cell, rows as u32 * cell + title_height);

    let root = BitMapBackend::new(path, size).into_drawing_area();
    root.fill(&WHITE).map_err(draw_error)?;

    let area = match &config.title {
        Some(title) => root.titled(title, ("sans-serif", 24)).map_err(draw_error)?,
        None => root.clone(),
    };

    for ((y, x), &value) in grid.indexed_iter() {
        if !value.is_finite() {
            continue;
        }
        let x0 = (x as u32 * cell) as i32;
        let y0 = (y as u32 * cell) as i32;
        let rect = Rectangle::new(
            [(x0, y0), (x0 + cell as i32, y0 + cell as i32)],
            cell_color((value - min) / span).filled(),
        );
        area.draw(&rect).map_err(draw_error)?;
    }

    root.present().map_err(draw_error)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_missing_cells_are_gaps() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("heatmap.png");
        let grid = array![[10.0, 20.0, f64::NAN], [30.0, 40.0, 50.0]];
        let config = HeatmapConfig {
            cell_size: 8,
            title: None,
        };
        render_heatmap(&grid.view(), &path, &config).unwrap();

        let img = image::open(&path).unwrap().to_rgb8();
        assert_eq!((img.width(), img.height()), (24, 16));
        assert_eq!(img.get_pixel(20, 4).0, [255, 255, 255]);
        assert_ne!(img.get_pixel(4, 4).0, [255, 255, 255]);
        assert_ne!(img.get_pixel(4, 4), img.get_pixel(20, 12));
    }

    #[test]
    fn test_empty_map_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let grid = array![[f64::NAN]];
        let result = render_heatmap(&grid.view(), &dir.path().join("x.png"), &HeatmapConfig::default());
        assert!(matches!(result, Err(HeatmapError::NoSamples)));
    }
}
