// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Text recognition: the seam to an external OCR engine and the adapter that
// normalises its output into `TextLine`s.
//
// The engine itself is opaque: anything that can turn a grayscale raster into
// lines with boxes (or polygons), a 0–100 confidence and optionally a baseline
// can implement [`TextRecognizer`].

pub mod adapter;
pub mod fixed;

#[cfg(feature = "ocr")]
pub mod ocrs;

use async_trait::async_trait;
use image::GrayImage;
use schemwerk_core::error::Result;
use schemwerk_core::{BoundingBox, Point};

pub use adapter::{TextRecognitionAdapter, infer_direction, normalize_line};
pub use fixed::{StaticRecognizer, UnavailableRecognizer};

#[cfg(feature = "ocr")]
pub use self::ocrs::{OcrConfig, OcrsRecognizer};

/// Hints passed along with every recognition request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecognitionHint {
    /// Language / script code, e.g. `"eng"`.
    pub language: String,
    /// Clockwise rotation (degrees) already applied to the image by the caller.
    pub rotation: u16,
}

impl RecognitionHint {
    pub fn new(language: impl Into<String>) -> Self {
        Self {
            language: language.into(),
            rotation: 0,
        }
    }
}

/// Geometry reported by an engine for one line.
#[derive(Debug, Clone, PartialEq)]
pub enum RecognizedShape {
    Box(BoundingBox),
    Polygon(Vec<Point>),
}

/// A line exactly as the engine reports it, before normalisation.
#[derive(Debug, Clone, PartialEq)]
pub struct RecognizedLine {
    pub text: String,
    pub shape: RecognizedShape,
    /// Engine confidence on a 0–100 scale.
    pub confidence: f32,
    /// Start and end of the text baseline, if the engine reports one.
    pub baseline: Option<(Point, Point)>,
}

/// An external text-recognition engine.
///
/// Returning zero lines is valid (the image has no text). Engines that cannot
/// start at all should fail with
/// [`PipelineError::RecognitionUnavailable`](schemwerk_core::PipelineError::RecognitionUnavailable)
/// so the pipeline can continue without text.
#[async_trait]
pub trait TextRecognizer: Send + Sync {
    /// Short engine name for logs.
    fn name(&self) -> &str;

    async fn recognize(
        &self,
        image: &GrayImage,
        hint: &RecognitionHint,
    ) -> Result<Vec<RecognizedLine>>;
}
