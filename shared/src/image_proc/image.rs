//! Conversions between ndarray grids and the image crate.
//!
//! # Coordinate System Conversions
//!
//! - **ndarray**: Uses matrix indexing [row, col] = [y, x] with (height, width) dimensions
//! - **image crate**: Uses graphics indexing (x, y) with (width, height) dimensions

use image::{GrayImage, Luma};
use ndarray::{s, Array2, ArrayView2};

/// Convert u8 Array2 to GrayImage without scaling.
pub fn array2_to_gray_image(arr: &ArrayView2<u8>) -> GrayImage {
    let (height, width) = arr.dim();
    let mut img = GrayImage::new(width as u32, height as u32);

    for ((y, x), &value) in arr.indexed_iter() {
        img.put_pixel(x as u32, y as u32, Luma([value]));
    }

    img
}

/// Rotate a grid by 180 degrees.
///
/// Element `[y, x]` moves to `[rows - 1 - y, cols - 1 - x]`.
pub fn rotate_180<T: Clone>(arr: &ArrayView2<T>) -> Array2<T> {
    arr.slice(s![..;-1, ..;-1]).to_owned()
}
