// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Recognisers that need no engine: a fixed transcript and an always-missing
// engine. Used when no OCR backend is configured and in tests.

use async_trait::async_trait;
use image::GrayImage;
use schemwerk_core::error::{PipelineError, Result};
use schemwerk_core::{BoundingBox, Point};

use super::{RecognitionHint, RecognizedLine, RecognizedShape, TextRecognizer};

/// Returns the same lines for every call, clipped to the requested image.
///
/// Lines whose geometry falls entirely outside the image are left out and the
/// rest are cropped, so region-level calls behave like a real engine looking
/// only at the crop it was given.
#[derive(Debug, Clone, Default)]
pub struct StaticRecognizer {
    lines: Vec<RecognizedLine>,
}

impl StaticRecognizer {
    pub fn new(lines: Vec<RecognizedLine>) -> Self {
        Self { lines }
    }
}

#[async_trait]
impl TextRecognizer for StaticRecognizer {
    fn name(&self) -> &str {
        "static"
    }

    async fn recognize(
        &self,
        image: &GrayImage,
        _hint: &RecognitionHint,
    ) -> Result<Vec<RecognizedLine>> {
        let frame = BoundingBox::new(0, 0, image.width(), image.height());
        Ok(self
            .lines
            .iter()
            .filter_map(|line| {
                let bbox = match &line.shape {
                    RecognizedShape::Box(bbox) => *bbox,
                    RecognizedShape::Polygon(points) => BoundingBox::from_points(points)?,
                };
                let clipped = clip(&bbox, &frame)?;
                Some(RecognizedLine {
                    shape: RecognizedShape::Box(clipped),
                    baseline: line.baseline.filter(|(a, b)| inside(a, &frame) && inside(b, &frame)),
                    ..line.clone()
                })
            })
            .collect())
    }
}

fn inside(point: &Point, frame: &BoundingBox) -> bool {
    point.x >= 0.0
        && point.y >= 0.0
        && point.x <= frame.width as f32
        && point.y <= frame.height as f32
}

fn clip(bbox: &BoundingBox, frame: &BoundingBox) -> Option<BoundingBox> {
    let x0 = bbox.x.max(frame.x);
    let y0 = bbox.y.max(frame.y);
    let x1 = bbox.right().min(frame.right());
    let y1 = bbox.bottom().min(frame.bottom());
    (x1 > x0 && y1 > y0).then(|| BoundingBox::new(x0, y0, x1 - x0, y1 - y0))
}

/// An engine that could not be started.
#[derive(Debug, Clone)]
pub struct UnavailableRecognizer {
    reason: String,
}

impl UnavailableRecognizer {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

#[async_trait]
impl TextRecognizer for UnavailableRecognizer {
    fn name(&self) -> &str {
        "unavailable"
    }

    async fn recognize(
        &self,
        _image: &GrayImage,
        _hint: &RecognitionHint,
    ) -> Result<Vec<RecognizedLine>> {
        Err(PipelineError::RecognitionUnavailable(self.reason.clone()))
    }
}
