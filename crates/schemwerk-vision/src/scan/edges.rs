// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Sobel edge map shared by layout analysis and line detection.

use image::{GrayImage, Luma};
use imageproc::gradients::{horizontal_sobel, vertical_sobel};
use tracing::{debug, instrument};

/// Edge pixel value in maps returned by [`edge_map`].
pub const EDGE: u8 = 255;

/// Binary edge map: 3×3 Sobel in x and y, magnitude `sqrt(gx² + gy²)`,
/// pixels strictly above `threshold` set to [`EDGE`], the rest 0.
#[instrument(skip(gray), fields(width = gray.width(), height = gray.height()))]
pub fn edge_map(gray: &GrayImage, threshold: f32) -> GrayImage {
    let (width, height) = gray.dimensions();
    if width == 0 || height == 0 {
        return GrayImage::new(width, height);
    }

    let gx = horizontal_sobel(gray);
    let gy = vertical_sobel(gray);

    let edges = GrayImage::from_fn(width, height, |x, y| {
        let dx = gx.get_pixel(x, y).0[0] as f32;
        let dy = gy.get_pixel(x, y).0[0] as f32;
        let magnitude = (dx * dx + dy * dy).sqrt();
        Luma([if magnitude > threshold { EDGE } else { 0 }])
    });

    debug!(
        edge_pixels = edges.pixels().filter(|p| p.0[0] == EDGE).count(),
        threshold,
        "Edge map computed"
    );
    edges
}
