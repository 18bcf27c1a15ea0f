// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Pixel buffer: decoding, channel layout, grayscale conversion and cropping.
// Operates on in-memory images using the `image` crate.

use image::{DynamicImage, GrayImage, RgbaImage};
use schemwerk_core::BoundingBox;
use schemwerk_core::error::PipelineError;
use tracing::{debug, instrument};

/// Channel layout of a [`PixelBuffer`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelLayout {
    Gray,
    Rgba,
}

/// Decoded raster owned by a single job.
///
/// Drawings arrive as encoded bytes (PNG, JPEG, TIFF, …). Colour input is kept
/// as RGBA until a stage asks for luminance; grayscale input stays single
/// channel.
#[derive(Debug, Clone)]
pub struct PixelBuffer {
    pixels: Pixels,
}

#[derive(Debug, Clone)]
enum Pixels {
    Gray(GrayImage),
    Rgba(RgbaImage),
}

impl PixelBuffer {
    // -- Construction ---------------------------------------------------------

    /// Decode raw encoded bytes.
    ///
    /// Fails with [`PipelineError::InvalidInput`] for undecodable or empty
    /// images.
    #[instrument(skip(data), fields(data_len = data.len()))]
    pub fn decode(data: &[u8]) -> Result<Self, PipelineError> {
        if data.is_empty() {
            return Err(PipelineError::InvalidInput("empty image payload".into()));
        }
        let img = image::load_from_memory(data).map_err(|err| {
            PipelineError::InvalidInput(format!("failed to decode image: {}", err))
        })?;
        if img.width() == 0 || img.height() == 0 {
            return Err(PipelineError::InvalidInput(format!(
                "image has no pixels ({}x{})",
                img.width(),
                img.height()
            )));
        }
        debug!(
            width = img.width(),
            height = img.height(),
            "Image decoded from bytes"
        );
        Ok(Self::from_dynamic(img))
    }

    /// Wrap an already-decoded `DynamicImage`.
    pub fn from_dynamic(image: DynamicImage) -> Self {
        let pixels = match image {
            DynamicImage::ImageLuma8(gray) => Pixels::Gray(gray),
            other => Pixels::Rgba(other.to_rgba8()),
        };
        Self { pixels }
    }

    pub fn from_gray(image: GrayImage) -> Self {
        Self {
            pixels: Pixels::Gray(image),
        }
    }

    // -- Accessors ------------------------------------------------------------

    pub fn width(&self) -> u32 {
        match &self.pixels {
            Pixels::Gray(img) => img.width(),
            Pixels::Rgba(img) => img.width(),
        }
    }

    pub fn height(&self) -> u32 {
        match &self.pixels {
            Pixels::Gray(img) => img.height(),
            Pixels::Rgba(img) => img.height(),
        }
    }

    pub fn layout(&self) -> ChannelLayout {
        match &self.pixels {
            Pixels::Gray(_) => ChannelLayout::Gray,
            Pixels::Rgba(_) => ChannelLayout::Rgba,
        }
    }

    /// Luminance view of the buffer. Gray input is cloned as-is.
    pub fn to_luma(&self) -> GrayImage {
        match &self.pixels {
            Pixels::Gray(img) => img.clone(),
            Pixels::Rgba(img) => DynamicImage::ImageRgba8(img.clone()).to_luma8(),
        }
    }

    /// Consume the buffer and return its luminance.
    pub fn into_luma(self) -> GrayImage {
        match self.pixels {
            Pixels::Gray(img) => img,
            Pixels::Rgba(img) => DynamicImage::ImageRgba8(img).to_luma8(),
        }
    }
}

/// Copy a rectangular region out of a grayscale image.
///
/// The box is clamped to image bounds; a box entirely outside the image
/// yields an empty image.
pub fn crop_gray(image: &GrayImage, bbox: &BoundingBox) -> GrayImage {
    let (img_w, img_h) = image.dimensions();
    if bbox.x >= img_w || bbox.y >= img_h {
        return GrayImage::new(0, 0);
    }
    let safe_w = bbox.width.min(img_w - bbox.x);
    let safe_h = bbox.height.min(img_h - bbox.y);
    image::imageops::crop_imm(image, bbox.x, bbox.y, safe_w, safe_h).to_image()
}
