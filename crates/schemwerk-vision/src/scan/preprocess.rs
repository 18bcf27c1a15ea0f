// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Pixel preprocessing: tiled adaptive equalization, morphological opening,
// and Otsu binarization of scanned drawings.

use image::{GrayImage, Luma};
use imageproc::morphology::{Mask, grayscale_open};
use schemwerk_core::PipelineConfig;
use tracing::{debug, info, instrument};

use crate::image::PixelBuffer;

/// Cleans a drawing raster before analysis.
///
/// Each step consumes `self` and returns the transformed preprocessor, so the
/// stages chain the same way regardless of which ones a caller needs:
///
/// ```ignore
/// let binary = Preprocessor::from_buffer(&buffer)
///     .equalize(2.0, 8)
///     .open()
///     .binarize()
///     .into_gray();
/// ```
///
/// All steps are pure functions of their input; identical input always
/// produces identical bytes.
pub struct Preprocessor {
    /// The working image, always single channel.
    image: GrayImage,
}

impl Preprocessor {
    // -- Construction ---------------------------------------------------------

    /// Start from a job's pixel buffer (converted to luminance).
    pub fn from_buffer(buffer: &PixelBuffer) -> Self {
        Self {
            image: buffer.to_luma(),
        }
    }

    pub fn from_gray(image: GrayImage) -> Self {
        Self { image }
    }

    // -- Accessors ------------------------------------------------------------

    pub fn into_gray(self) -> GrayImage {
        self.image
    }

    // -- Steps ----------------------------------------------------------------

    /// Tiled adaptive histogram equalization with clipping.
    ///
    /// The image is cut into `tile_size` × `tile_size` tiles (edge tiles may
    /// be smaller). Each tile's histogram is clipped at
    /// `clip_limit × tile_pixels / 256`, the clipped mass is spread evenly
    /// over all 256 bins, and every pixel is replaced by the tile's
    /// cumulative distribution at its value, scaled to 0–255.
    #[instrument(skip(self))]
    pub fn equalize(self, clip_limit: f32, tile_size: u32) -> Self {
        let (width, height) = self.image.dimensions();
        if width == 0 || height == 0 || tile_size == 0 {
            return self;
        }
        info!(clip_limit, tile_size, "Applying tiled adaptive equalization");

        let mut output = self.image.clone();
        for tile_y in (0..height).step_by(tile_size as usize) {
            for tile_x in (0..width).step_by(tile_size as usize) {
                let tile_w = tile_size.min(width - tile_x);
                let tile_h = tile_size.min(height - tile_y);
                let lut = tile_lookup(&self.image, tile_x, tile_y, tile_w, tile_h, clip_limit);
                for y in tile_y..tile_y + tile_h {
                    for x in tile_x..tile_x + tile_w {
                        let value = self.image.get_pixel(x, y).0[0];
                        output.put_pixel(x, y, Luma([lut[value as usize]]));
                    }
                }
            }
        }

        debug!("Equalization complete");
        Self { image: output }
    }

    /// Morphological opening with a 3×3 cross: erosion then dilation.
    ///
    /// Removes isolated specks smaller than the structuring element while
    /// keeping strokes of text and line-work connected.
    #[instrument(skip(self))]
    pub fn open(self) -> Self {
        if self.image.width() == 0 || self.image.height() == 0 {
            return self;
        }
        info!("Applying morphological opening (3x3 cross)");
        let image = grayscale_open(&self.image, &Mask::diamond(1));
        Self { image }
    }

    /// Global binarization at the Otsu threshold.
    ///
    /// Pixels below the threshold become 0 (ink); the rest become 255.
    #[instrument(skip(self))]
    pub fn binarize(self) -> Self {
        let threshold = otsu_threshold(&histogram(&self.image));
        info!(threshold, "Applying Otsu binarization");

        let (width, height) = self.image.dimensions();
        let output = GrayImage::from_fn(width, height, |x, y| {
            let value = self.image.get_pixel(x, y).0[0];
            Luma([if value < threshold { 0u8 } else { 255u8 }])
        });
        Self { image: output }
    }
}

/// Run the full preprocessing chain with thresholds from `config`.
#[instrument(skip_all, fields(width = buffer.width(), height = buffer.height()))]
pub fn preprocess(buffer: &PixelBuffer, config: &PipelineConfig) -> GrayImage {
    Preprocessor::from_buffer(buffer)
        .equalize(config.clip_limit, config.tile_size)
        .open()
        .binarize()
        .into_gray()
}

// -- Equalization helpers -----------------------------------------------------

/// Build the 256-entry mapping for one tile.
fn tile_lookup(
    image: &GrayImage,
    tile_x: u32,
    tile_y: u32,
    tile_w: u32,
    tile_h: u32,
    clip_limit: f32,
) -> [u8; 256] {
    let mut bins = [0f64; 256];
    for y in tile_y..tile_y + tile_h {
        for x in tile_x..tile_x + tile_w {
            bins[image.get_pixel(x, y).0[0] as usize] += 1.0;
        }
    }

    let total = (tile_w as u64 * tile_h as u64) as f64;
    let limit = clip_limit as f64 * total / 256.0;

    let mut excess = 0.0;
    for bin in bins.iter_mut() {
        if *bin > limit {
            excess += *bin - limit;
            *bin = limit;
        }
    }
    let share = excess / 256.0;

    let mut lut = [0u8; 256];
    let mut cumulative = 0.0;
    for (value, bin) in bins.iter().enumerate() {
        cumulative += bin + share;
        lut[value] = (cumulative / total * 255.0).round().clamp(0.0, 255.0) as u8;
    }
    lut
}

// -- Otsu helpers -------------------------------------------------------------

/// 256-bin luminance histogram of the whole image.
pub fn histogram(gray: &GrayImage) -> [u64; 256] {
    let mut histogram = [0u64; 256];
    for pixel in gray.pixels() {
        histogram[pixel.0[0] as usize] += 1;
    }
    histogram
}

/// Compute the Otsu threshold for a luminance histogram.
///
/// For each candidate `t` in 1..=255 the two classes are `v < t` and
/// `v >= t`. Class weights and means come from running prefix sums, and the
/// first `t` with the largest between-class variance wins. When no split
/// separates anything (uniform or empty image) the threshold is 0.
pub fn otsu_threshold(histogram: &[u64; 256]) -> u8 {
    let total_pixels: u64 = histogram.iter().sum();
    if total_pixels == 0 {
        return 0;
    }

    let sum_total: f64 = histogram
        .iter()
        .enumerate()
        .map(|(i, &count)| i as f64 * count as f64)
        .sum();

    let mut sum_below: f64 = 0.0;
    let mut weight_below: u64 = 0;
    let mut max_variance: f64 = 0.0;
    let mut best_threshold: u8 = 0;

    for t in 1..256usize {
        let count = histogram[t - 1];
        weight_below += count;
        sum_below += (t - 1) as f64 * count as f64;

        if weight_below == 0 {
            continue;
        }
        let weight_above = total_pixels - weight_below;
        if weight_above == 0 {
            break;
        }

        let mean_below = sum_below / weight_below as f64;
        let mean_above = (sum_total - sum_below) / weight_above as f64;
        let between_variance =
            weight_below as f64 * weight_above as f64 * (mean_below - mean_above).powi(2);

        if between_variance > max_variance {
            max_variance = between_variance;
            best_threshold = t as u8;
        }
    }

    best_threshold
}

// -- Tests --------------------------------------------------------------------
