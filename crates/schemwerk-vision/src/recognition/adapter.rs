// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Normalisation of raw engine output into `TextLine`s.

use std::sync::Arc;

use image::GrayImage;
use schemwerk_core::error::Result;
use schemwerk_core::{BoundingBox, Point, TextDirection, TextLine};
use tracing::{debug, instrument};

use super::{RecognitionHint, RecognizedLine, RecognizedShape, TextRecognizer};
use crate::image::crop_gray;

/// Width/height ratio under which a line without baseline counts as vertical.
const VERTICAL_ASPECT: f32 = 0.3;

/// Runs a [`TextRecognizer`] and turns its output into ordered `TextLine`s in
/// source-image coordinates.
#[derive(Clone)]
pub struct TextRecognitionAdapter {
    recognizer: Arc<dyn TextRecognizer>,
    hint: RecognitionHint,
}

impl TextRecognitionAdapter {
    pub fn new(recognizer: Arc<dyn TextRecognizer>, hint: RecognitionHint) -> Self {
        Self { recognizer, hint }
    }

    pub fn recognizer_name(&self) -> &str {
        self.recognizer.name()
    }

    /// Recognise every line in `image`.
    #[instrument(skip_all, fields(engine = self.recognizer.name(), width = image.width(), height = image.height()))]
    pub async fn recognize(&self, image: &GrayImage) -> Result<Vec<TextLine>> {
        let raw = self.recognizer.recognize(image, &self.hint).await?;
        let lines = normalize_all(raw, 0, 0);
        debug!(lines = lines.len(), "Recognition normalised");
        Ok(lines)
    }

    /// Recognise the lines inside `bbox`, reporting boxes in the coordinates
    /// of the full image.
    pub async fn recognize_region(
        &self,
        image: &GrayImage,
        bbox: &BoundingBox,
    ) -> Result<Vec<TextLine>> {
        let crop = crop_gray(image, bbox);
        if crop.width() == 0 || crop.height() == 0 {
            return Ok(Vec::new());
        }
        let raw = self.recognizer.recognize(&crop, &self.hint).await?;
        Ok(normalize_all(raw, bbox.x, bbox.y))
    }
}

/// Normalise and order a batch of engine lines.
fn normalize_all(raw: Vec<RecognizedLine>, dx: u32, dy: u32) -> Vec<TextLine> {
    let mut lines: Vec<TextLine> = raw
        .into_iter()
        .filter_map(|line| normalize_line(line, dx, dy))
        .collect();
    lines.sort_by_key(|line| (line.bbox.y, line.bbox.x));
    lines
}

/// Convert one engine line.
///
/// Polygons collapse to their enclosing box, boxes move by `(dx, dy)`,
/// confidence is mapped from 0–100 to 0–1 and direction/angle are derived.
/// Blank lines yield `None`.
pub fn normalize_line(raw: RecognizedLine, dx: u32, dy: u32) -> Option<TextLine> {
    let text = raw.text.trim();
    if text.is_empty() {
        return None;
    }

    let local = match &raw.shape {
        RecognizedShape::Box(bbox) => *bbox,
        RecognizedShape::Polygon(points) => BoundingBox::from_points(points)?,
    };
    let bbox = local.offset(dx, dy);

    let confidence = if raw.confidence.is_finite() {
        (raw.confidence / 100.0).clamp(0.0, 1.0)
    } else {
        0.0
    };
    let (direction, angle) = infer_direction(&local, raw.baseline);

    Some(TextLine {
        text: text.to_string(),
        bbox,
        confidence,
        direction,
        angle,
    })
}

/// Derive reading direction and angle.
///
/// With a baseline the angle is `atan2(dy, dx)` folded into [0°, 180°):
/// within 10° of the x-axis is horizontal, 80°–100° vertical, anything else
/// rotated. Without one, boxes narrower than 0.3 × their height are vertical
/// (90°), the rest horizontal (0°).
pub fn infer_direction(bbox: &BoundingBox, baseline: Option<(Point, Point)>) -> (TextDirection, f32) {
    match baseline {
        Some((start, end)) if start != end => {
            let angle = (end.y - start.y)
                .atan2(end.x - start.x)
                .to_degrees()
                .rem_euclid(180.0);
            let direction = if angle <= 10.0 || angle >= 170.0 {
                TextDirection::Horizontal
            } else if (80.0..=100.0).contains(&angle) {
                TextDirection::Vertical
            } else {
                TextDirection::Rotated
            };
            (direction, angle)
        }
        _ => {
            if bbox.aspect_ratio() < VERTICAL_ASPECT {
                (TextDirection::Vertical, 90.0)
            } else {
                (TextDirection::Horizontal, 0.0)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recognition::StaticRecognizer;
    use image::Luma;

    fn raw(text: &str, bbox: BoundingBox, confidence: f32) -> RecognizedLine {
        RecognizedLine {
            text: text.into(),
            shape: RecognizedShape::Box(bbox),
            confidence,
            baseline: None,
        }
    }

    #[test]
    fn confidence_is_normalised() {
        let line = normalize_line(raw("P-101", BoundingBox::new(0, 0, 50, 12), 87.0), 0, 0).unwrap();
        assert!((line.confidence - 0.87).abs() < 1e-6);
        let over = normalize_line(raw("P-101", BoundingBox::new(0, 0, 50, 12), 140.0), 0, 0).unwrap();
        assert_eq!(over.confidence, 1.0);
        let nan = normalize_line(raw("P-101", BoundingBox::new(0, 0, 50, 12), f32::NAN), 0, 0).unwrap();
        assert_eq!(nan.confidence, 0.0);
    }

    #[test]
    fn blank_lines_are_dropped() {
        assert!(normalize_line(raw("   ", BoundingBox::new(0, 0, 5, 5), 90.0), 0, 0).is_none());
    }

    #[test]
    fn polygon_becomes_box_and_is_offset() {
        let line = RecognizedLine {
            text: "TK-3".into(),
            shape: RecognizedShape::Polygon(vec![
                Point::new(2.0, 3.0),
                Point::new(42.0, 3.0),
                Point::new(42.0, 15.0),
                Point::new(2.0, 15.0),
            ]),
            confidence: 50.0,
            baseline: None,
        };
        let out = normalize_line(line, 100, 200).unwrap();
        assert_eq!(out.bbox, BoundingBox::new(102, 203, 40, 12));
    }

    #[test]
    fn direction_from_baseline() {
        let bbox = BoundingBox::new(0, 0, 100, 20);
        let flat = infer_direction(&bbox, Some((Point::new(0.0, 10.0), Point::new(100.0, 12.0))));
        assert_eq!(flat.0, TextDirection::Horizontal);
        assert!(flat.1 < 2.0);

        let slight = infer_direction(&bbox, Some((Point::new(0.0, 12.0), Point::new(100.0, 10.0))));
        assert_eq!(slight.0, TextDirection::Horizontal);
        assert!(slight.1 > 170.0);

        let up = infer_direction(&bbox, Some((Point::new(10.0, 100.0), Point::new(10.0, 0.0))));
        assert_eq!(up.0, TextDirection::Vertical);

        let tilted = infer_direction(&bbox, Some((Point::new(0.0, 0.0), Point::new(50.0, 50.0))));
        assert_eq!(tilted.0, TextDirection::Rotated);
        assert!((tilted.1 - 45.0).abs() < 1e-3);
    }

    #[test]
    fn direction_from_aspect_without_baseline() {
        let tall = infer_direction(&BoundingBox::new(0, 0, 10, 80), None);
        assert_eq!(tall, (TextDirection::Vertical, 90.0));
        let wide = infer_direction(&BoundingBox::new(0, 0, 80, 10), None);
        assert_eq!(wide, (TextDirection::Horizontal, 0.0));
    }

    #[tokio::test]
    async fn lines_are_sorted_top_to_bottom() {
        let recognizer = StaticRecognizer::new(vec![
            raw("second", BoundingBox::new(5, 40, 30, 10), 90.0),
            raw("first", BoundingBox::new(5, 10, 30, 10), 90.0),
        ]);
        let adapter = TextRecognitionAdapter::new(Arc::new(recognizer), RecognitionHint::new("eng"));
        let image = GrayImage::from_pixel(60, 60, Luma([255]));
        let lines = adapter.recognize(&image).await.unwrap();
        let texts: Vec<_> = lines.iter().map(|l| l.text.as_str()).collect();
        assert_eq!(texts, ["first", "second"]);
    }

    #[tokio::test]
    async fn empty_region_yields_no_lines() {
        let recognizer = StaticRecognizer::new(vec![raw("X", BoundingBox::new(0, 0, 5, 5), 90.0)]);
        let adapter = TextRecognitionAdapter::new(Arc::new(recognizer), RecognitionHint::new("eng"));
        let image = GrayImage::from_pixel(20, 20, Luma([255]));
        let lines = adapter
            .recognize_region(&image, &BoundingBox::new(50, 50, 5, 5))
            .await
            .unwrap();
        assert!(lines.is_empty());
    }
}
