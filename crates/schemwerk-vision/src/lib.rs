// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// schemwerk-vision — Image analysis stages for the Schemwerk pipeline.
//
// Decodes drawings into pixel buffers, cleans them up (tiled equalisation,
// morphological opening, Otsu binarisation), and extracts layout regions,
// straight line-work, table grids, text (through a pluggable recogniser) and
// equipment tags.

pub mod image;
pub mod recognition;
pub mod scan;
pub mod tagger;

pub use image::PixelBuffer;
pub use recognition::{
    RecognitionHint, RecognizedLine, RecognizedShape, StaticRecognizer, TextRecognitionAdapter,
    TextRecognizer, UnavailableRecognizer,
};
pub use scan::{Preprocessor, analyze_layout, detect_grid, detect_lines, preprocess};
pub use tagger::ComponentTagger;

#[cfg(feature = "ocr")]
pub use recognition::{OcrConfig, OcrsRecognizer};
