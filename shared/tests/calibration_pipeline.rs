//! End-to-end checks of the calibration engine on synthetic scans.

use approx::assert_abs_diff_eq;
use ndarray::{Array2, ArrayView2};

use lcdmap_shared::image_proc::{
    locate_screen, normalize, rectify, BoundaryConfig, BoundaryDetection, Corner, DespikeConfig,
    OriginDistanceMatcher,
};
use lcdmap_shared::{compensate, CompensationConfig, CornerPicker, Dimensions, Measurement};

const BACKGROUND: f64 = 5.0;
const LIT: f64 = 100.0;

/// A display seen under perspective: a convex quad, corners clockwise on screen.
const QUAD: [(f64, f64); 4] = [(20.0, 15.0), (80.0, 12.0), (84.0, 86.0), (16.0, 83.0)];

fn inside_quad(x: f64, y: f64) -> bool {
    (0..4).all(|i| {
        let (ax, ay) = QUAD[i];
        let (bx, by) = QUAD[(i + 1) % 4];
        (bx - ax) * (y - ay) - (by - ay) * (x - ax) >= 0.0
    })
}

fn warped_canvas() -> Array2<f64> {
    Array2::from_shape_fn((100, 100), |(y, x)| {
        if inside_quad(x as f64, y as f64) {
            LIT
        } else {
            BACKGROUND
        }
    })
}

fn canvas_measurement() -> Measurement {
    let canvas = warped_canvas();
    let samples = canvas
        .rows()
        .into_iter()
        .map(|row| row.iter().map(|&v| Some(v)).collect())
        .collect();
    Measurement::new("TSL2561", [150.0, 150.0], [100, 100], samples).unwrap()
}

struct NoPicker;

impl CornerPicker for NoPicker {
    fn pick_corners(&mut self, _grid: &ArrayView2<f64>) -> Option<[Corner; 4]> {
        panic!("automatic detection should have succeeded");
    }
}

#[test]
fn test_detects_warped_rectangle() {
    let canvas = warped_canvas();
    let BoundaryDetection::Found(corners) = locate_screen(&canvas.view(), &BoundaryConfig::default())
    else {
        panic!("expected four corners");
    };

    for &(qx, qy) in &QUAD {
        let nearest = corners
            .iter()
            .map(|c| ((c.x as f64 - qx).powi(2) + (c.y as f64 - qy).powi(2)).sqrt())
            .fold(f64::INFINITY, f64::min);
        assert!(nearest <= 3.0, "no corner near ({qx}, {qy}): {corners:?}");
    }
}

#[test]
fn test_rectification_recovers_canonical_rectangle() {
    let canvas = warped_canvas();
    let BoundaryDetection::Found(corners) = locate_screen(&canvas.view(), &BoundaryConfig::default())
    else {
        panic!("expected four corners");
    };

    let rectified = rectify(&canvas.view(), &corners, 40, 30, &OriginDistanceMatcher).unwrap();
    assert_eq!(rectified.dim(), (30, 40));

    let margin = 4;
    for row in margin..30 - margin {
        for col in margin..40 - margin {
            assert_abs_diff_eq!(rectified[[row, col]], LIT, epsilon = 1e-3);
        }
    }
}

#[test]
fn test_compensate_full_screen_scan() {
    let config = CompensationConfig::new(Dimensions::new(40, 30), 50.0, 180);

    let mask = compensate(&canvas_measurement(), &config, &mut NoPicker, &OriginDistanceMatcher).unwrap();
    assert_eq!((mask.width(), mask.height()), (40, 30));
    assert!(mask.pixels().iter().all(|&v| v <= 180));
    // Uniformly lit display: the whole interior gets full compensation
    assert_eq!(mask.pixels()[[15, 20]], 180);
}

#[test]
fn test_uniform_map_passes_through_normalize() {
    let measurement = Measurement::new("TSL2561", [40.0, 40.0], [4, 4], vec![vec![Some(100.0); 4]; 4]).unwrap();
    let grid = measurement.to_array();
    let normalized = normalize(&grid.view(), &DespikeConfig::default(), 0.0).unwrap();
    assert_eq!(normalized, grid);
}

#[test]
fn test_measurement_file_round_trip_through_pipeline() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("scan.json");
    canvas_measurement().save_to_file(&path).unwrap();

    let loaded = Measurement::load_from_file(&path).unwrap();
    let config = CompensationConfig::new(Dimensions::new(40, 30), 50.0, 180);
    let mask = compensate(&loaded, &config, &mut NoPicker, &OriginDistanceMatcher).unwrap();

    let out = dir.path().join("mask.png");
    mask.save_png(&out).unwrap();
    assert!(out.exists());
}
