//! Binary segmentation of brightness maps.
//!
//! Converts a brightness grid into the lit region of the display and extracts
//! that region's outline, which is what the line detector votes on.
//!
//! # Key Algorithms
//!
//! ## Connected Components
//! Two-pass connected component labeling with union-find optimization.
//! Groups connected pixels into distinct regions with unique labels.
//! Uses 4-connectivity (horizontal/vertical neighbors only).
//!
//! ## Outline extraction
//! The outline of a region is every region pixel with at least one
//! 4-neighbour outside the region (or outside the grid).

use ndarray::{Array2, ArrayView2};

/// Apply binary threshold to create a segmentation mask.
///
/// Pixels strictly above the threshold become 1.0, everything else
/// (including missing NaN cells) becomes 0.0.
pub fn apply_threshold(image: &ArrayView2<f64>, threshold: f64) -> Array2<f64> {
    image.mapv(|pixel| if pixel > threshold { 1.0 } else { 0.0 })
}

/// Find the root label in a disjoint-set (union-find) data structure
fn find_root(labels: &mut [usize], label: usize) -> usize {
    let mut current = label;

    while current != labels[current] {
        // Path compression - make the parent point to the grandparent
        labels[current] = labels[labels[current]];
        current = labels[current];
    }

    current
}

/// Union two labels in a disjoint-set data structure, returning the merged root
fn union_labels(labels: &mut [usize], label1: usize, label2: usize) -> usize {
    let root1 = find_root(labels, label1);
    let root2 = find_root(labels, label2);

    if root1 == root2 {
        return root1;
    }

    // Smaller label becomes the parent (canonical form)
    if root1 < root2 {
        labels[root2] = root1;
        root1
    } else {
        labels[root1] = root2;
        root2
    }
}

/// Connected component labeling using a two-pass algorithm with union-find.
///
/// # Returns
/// Labeled image where:
/// - Background pixels = 0
/// - Each connected region gets a unique label starting from 1
/// - Labels are consecutive integers
pub fn connected_components(binary_image: &ArrayView2<f64>) -> Array2<usize> {
    let (height, width) = binary_image.dim();
    let mut labels = Array2::zeros((height, width));
    let mut label_count = 0;

    // Label 0 is background
    let mut parent_table = vec![0];

    for i in 0..height {
        for j in 0..width {
            if binary_image[[i, j]] <= 0.0 {
                continue;
            }

            let up = if i > 0 { labels[[i - 1, j]] } else { 0 };
            let left = if j > 0 { labels[[i, j - 1]] } else { 0 };

            match (up, left) {
                (0, 0) => {
                    label_count += 1;
                    labels[[i, j]] = label_count;
                    parent_table.push(label_count);
                }
                (label, 0) | (0, label) => labels[[i, j]] = label,
                (up, left) => {
                    labels[[i, j]] = up.min(left);
                    if up != left {
                        union_labels(&mut parent_table, up, left);
                    }
                }
            }
        }
    }

    for i in 1..parent_table.len() {
        find_root(&mut parent_table, i);
    }

    // Map roots to consecutive labels
    let mut relabel_map = vec![0; parent_table.len()];
    let mut next_label = 1;
    for i in 1..parent_table.len() {
        let root = find_root(&mut parent_table, i);
        if relabel_map[root] == 0 {
            relabel_map[root] = next_label;
            next_label += 1;
        }
        relabel_map[i] = relabel_map[root];
    }

    labels.mapv_inplace(|label| relabel_map[label]);
    labels
}

/// Outline of the largest connected region of a binary image.
///
/// Returns a binary image (1.0 on the outline) the same size as the input.
/// An image without foreground yields an all-zero outline. Ties between
/// equally large regions go to the lowest label, i.e. the one reached first
/// in row-major order.
pub fn largest_component_outline(binary_image: &ArrayView2<f64>) -> Array2<f64> {
    let labels = connected_components(binary_image);
    let (height, width) = labels.dim();

    let max_label = labels.iter().copied().max().unwrap_or(0);
    let mut sizes = vec![0usize; max_label + 1];
    for &label in labels.iter() {
        sizes[label] += 1;
    }

    let mut outline = Array2::zeros((height, width));
    let Some(largest) = (1..=max_label).max_by(|&a, &b| sizes[a].cmp(&sizes[b]).then(b.cmp(&a)))
    else {
        return outline;
    };

    let inside = |i: isize, j: isize| -> bool {
        i >= 0
            && j >= 0
            && (i as usize) < height
            && (j as usize) < width
            && labels[[i as usize, j as usize]] == largest
    };

    for ((i, j), &label) in labels.indexed_iter() {
        if label != largest {
            continue;
        }
        let (i, j) = (i as isize, j as isize);
        let on_edge = !inside(i - 1, j) || !inside(i + 1, j) || !inside(i, j - 1) || !inside(i, j + 1);
        if on_edge {
            outline[[i as usize, j as usize]] = 1.0;
        }
    }

    outline
}
