//! Perspective correction of the display quadrilateral onto the screen grid.
//!
//! The four detected (or picked) corners are paired with the corners of the
//! canonical `W×H` screen rectangle by a [`CornerMatcher`], a projection is
//! solved from the four pairs and the brightness grid is warped through it
//! with `imageproc`.

use image::{ImageBuffer, Luma};
use imageproc::geometric_transformations::{warp_into, Interpolation, Projection};
use ndarray::{Array2, ArrayView2};
use thiserror::Error;
use tracing::debug;

use super::boundary::Corner;

/// How far, in screen cells, a solved projection may miss a control point.
const CONTROL_POINT_TOLERANCE: f32 = 1e-2;

/// Errors from perspective rectification.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RectifyError {
    /// The corner pairs do not define an invertible perspective transform
    #[error("degenerate corner configuration: no perspective transform through {0:?}")]
    DegenerateCorners([Corner; 4]),

    #[error("screen resolution must be non-zero, got {width}x{height}")]
    EmptyScreen { width: usize, height: usize },
}

/// A 2D point `(x, y)` in grid or screen coordinates.
pub type Point = (f64, f64);

type GridImage = ImageBuffer<Luma<f32>, Vec<f32>>;

/// Solve the projection mapping each `source[i]` onto `destination[i]`.
///
/// Returns `None` when the points are degenerate (three of them collinear,
/// repeated points), including solutions that do not actually reproduce the
/// control points.
pub fn perspective(source: &[Point; 4], destination: &[Point; 4]) -> Option<Projection> {
    let from: [(f32, f32); 4] = std::array::from_fn(|i| (source[i].0 as f32, source[i].1 as f32));
    let to: [(f32, f32); 4] = std::array::from_fn(|i| (destination[i].0 as f32, destination[i].1 as f32));
    let projection = Projection::from_control_points(from, to)?;

    let scale = to
        .iter()
        .fold(1.0f32, |m, &(u, v)| m.max(u.abs()).max(v.abs()));
    let reproduces = from.iter().zip(to.iter()).all(|(&p, &(u, v))| {
        let (x, y) = projection * p;
        x.is_finite()
            && y.is_finite()
            && (x - u).abs() <= CONTROL_POINT_TOLERANCE * scale
            && (y - v).abs() <= CONTROL_POINT_TOLERANCE * scale
    });
    reproduces.then_some(projection)
}

/// Pairs detected corners with the canonical screen corners.
pub trait CornerMatcher {
    /// Return `(source, destination)` pairs for a `width × height` screen
    /// whose canonical corners are `(0,0)`, `(0,H)`, `(W,0)` and `(W,H)`.
    fn match_corners(&self, corners: &[Corner; 4], width: f64, height: f64) -> [(Point, Point); 4];
}

/// Pairs corners by their distance from the origin.
///
/// Both the detected corners and the canonical corners are sorted by squared
/// distance from `(0, 0)` and paired in that order. Works for a display lying
/// roughly upright in the scan; a rotated or near-square display can pair the
/// two off-diagonal corners the wrong way round.
#[derive(Debug, Default, Clone, Copy)]
pub struct OriginDistanceMatcher;

impl CornerMatcher for OriginDistanceMatcher {
    fn match_corners(&self, corners: &[Corner; 4], width: f64, height: f64) -> [(Point, Point); 4] {
        let mut source = *corners;
        source.sort_by_key(Corner::origin_distance_sq);

        let mut canonical = [(0.0, 0.0), (0.0, height), (width, 0.0), (width, height)];
        canonical.sort_by(|a, b| (a.0 * a.0 + a.1 * a.1).total_cmp(&(b.0 * b.0 + b.1 * b.1)));

        std::array::from_fn(|i| ((source[i].x as f64, source[i].y as f64), canonical[i]))
    }
}

/// Pairs corners by walking the quadrilateral around its centroid.
///
/// Corners are ordered by angle about their centroid (clockwise on screen,
/// since `y` grows downwards), starting from the corner with the smallest
/// `x + y`, and paired with top-left, top-right, bottom-right, bottom-left.
/// Insensitive to the display's aspect ratio.
#[derive(Debug, Default, Clone, Copy)]
pub struct AngularOrderMatcher;

impl CornerMatcher for AngularOrderMatcher {
    fn match_corners(&self, corners: &[Corner; 4], width: f64, height: f64) -> [(Point, Point); 4] {
        let points: Vec<Point> = corners.iter().map(|c| (c.x as f64, c.y as f64)).collect();
        let cx = points.iter().map(|p| p.0).sum::<f64>() / 4.0;
        let cy = points.iter().map(|p| p.1).sum::<f64>() / 4.0;

        let mut ordered = points;
        ordered.sort_by(|a, b| (a.1 - cy).atan2(a.0 - cx).total_cmp(&(b.1 - cy).atan2(b.0 - cx)));
        let start = ordered
            .iter()
            .enumerate()
            .min_by(|(_, a), (_, b)| (a.0 + a.1).total_cmp(&(b.0 + b.1)))
            .map_or(0, |(i, _)| i);
        ordered.rotate_left(start);

        let canonical = [(0.0, 0.0), (width, 0.0), (width, height), (0.0, height)];
        std::array::from_fn(|i| (ordered[i], canonical[i]))
    }
}

/// Copy `grid` into an image with a one-cell border of zeros.
///
/// Bilinear interpolation in `imageproc` gives up on a sample whose
/// neighbours leave the image, so the border lets samples on the grid edge
/// blend with zeros instead. Missing cells become 0 as well.
fn to_padded_image(grid: &ArrayView2<f64>) -> GridImage {
    let (rows, cols) = grid.dim();
    ImageBuffer::from_fn(cols as u32 + 2, rows as u32 + 2, |x, y| {
        let value = if x == 0 || y == 0 {
            0.0
        } else {
            grid.get([y as usize - 1, x as usize - 1])
                .copied()
                .filter(|v| v.is_finite())
                .unwrap_or(0.0)
        };
        Luma([value as f32])
    })
}

/// Resample the quadrilateral spanned by `corners` onto a `width × height`
/// grid.
///
/// Output cell `[row, col]` takes the bilinear sample of `grid` at the
/// preimage of screen point `(col, row)`. Missing cells and points outside
/// the sampled area contribute 0.
pub fn rectify(
    grid: &ArrayView2<f64>,
    corners: &[Corner; 4],
    width: usize,
    height: usize,
    matcher: &dyn CornerMatcher,
) -> Result<Array2<f64>, RectifyError> {
    if width == 0 || height == 0 {
        return Err(RectifyError::EmptyScreen { width, height });
    }

    let pairs = matcher.match_corners(corners, width as f64, height as f64);
    // Source corners are shifted onto the padded image
    let source: [Point; 4] = std::array::from_fn(|i| (pairs[i].0 .0 + 1.0, pairs[i].0 .1 + 1.0));
    let destination: [Point; 4] = std::array::from_fn(|i| pairs[i].1);
    let projection =
        perspective(&source, &destination).ok_or(RectifyError::DegenerateCorners(*corners))?;
    debug!("rectifying {:?} onto {}x{}", corners, width, height);

    let padded = to_padded_image(grid);
    let mut warped = GridImage::new(width as u32, height as u32);
    warp_into(&padded, &projection, Interpolation::Bilinear, Luma([0.0]), &mut warped);

    Ok(Array2::from_shape_fn((height, width), |(row, col)| {
        warped.get_pixel(col as u32, row as u32)[0] as f64
    }))
}
