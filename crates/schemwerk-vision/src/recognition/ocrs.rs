// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// `ocrs` backend for the text recogniser seam.
//
// `ocrs` is a pure-Rust OCR engine running neural network models through
// `rten`. It needs two model files in one directory:
//
// - `text-detection.rten`, which locates words.
// - `text-recognition.rten`, which decodes characters along each line.
//
// Running `ocrs-cli` once downloads both into `$XDG_CACHE_HOME/ocrs`
// (usually `~/.cache/ocrs`), which is where [`OcrConfig::default`] looks.
//
// Only compiled with the `ocr` feature.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use image::{DynamicImage, GrayImage};
use ocrs::{ImageSource, OcrEngine, OcrEngineParams, TextItem};
use rten::Model;
use schemwerk_core::error::{PipelineError, Result};
use schemwerk_core::BoundingBox;
use tracing::{debug, info, instrument, warn};

use super::{RecognitionHint, RecognizedLine, RecognizedShape, TextRecognizer};

const DETECTION_MODEL_FILENAME: &str = "text-detection.rten";
const RECOGNITION_MODEL_FILENAME: &str = "text-recognition.rten";

/// `ocrs` reports no per-line score; recognised lines carry this value (0–100).
const OCRS_LINE_CONFIDENCE: f32 = 100.0;

/// `$XDG_CACHE_HOME/ocrs`, then `~/.cache/ocrs`, then `./ocrs-models`.
fn default_model_dir() -> PathBuf {
    if let Ok(xdg) = std::env::var("XDG_CACHE_HOME") {
        PathBuf::from(xdg).join("ocrs")
    } else if let Ok(home) = std::env::var("HOME") {
        PathBuf::from(home).join(".cache").join("ocrs")
    } else {
        PathBuf::from("ocrs-models")
    }
}

/// Where to find the detection and recognition models.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OcrConfig {
    pub detection_model_path: PathBuf,
    pub recognition_model_path: PathBuf,
}

impl Default for OcrConfig {
    fn default() -> Self {
        Self::from_dir(default_model_dir())
    }
}

impl OcrConfig {
    /// Both models inside `dir` under their well-known filenames.
    pub fn from_dir(dir: impl AsRef<Path>) -> Self {
        let dir = dir.as_ref();
        Self {
            detection_model_path: dir.join(DETECTION_MODEL_FILENAME),
            recognition_model_path: dir.join(RECOGNITION_MODEL_FILENAME),
        }
    }

    /// Fails with `RecognitionUnavailable` naming the first missing file.
    pub fn validate(&self) -> Result<()> {
        for (what, path) in [
            ("detection", &self.detection_model_path),
            ("recognition", &self.recognition_model_path),
        ] {
            if !path.exists() {
                return Err(PipelineError::RecognitionUnavailable(format!(
                    "{what} model not found at {}; run `ocrs-cli` once to download models",
                    path.display()
                )));
            }
        }
        Ok(())
    }
}

/// Text recogniser backed by a loaded `ocrs` engine.
///
/// Model loading is the expensive part; build one recogniser and share it.
/// Recognition runs on the blocking thread pool.
pub struct OcrsRecognizer {
    engine: Arc<OcrEngine>,
}

impl OcrsRecognizer {
    #[instrument(skip_all, fields(
        detection = %config.detection_model_path.display(),
        recognition = %config.recognition_model_path.display(),
    ))]
    pub fn new(config: &OcrConfig) -> Result<Self> {
        config.validate()?;

        let load = |path: &Path| {
            Model::load_file(path).map_err(|err| {
                PipelineError::RecognitionUnavailable(format!(
                    "failed to load model from {}: {err}",
                    path.display()
                ))
            })
        };

        info!("Loading OCR models");
        let engine = OcrEngine::new(OcrEngineParams {
            detection_model: Some(load(&config.detection_model_path)?),
            recognition_model: Some(load(&config.recognition_model_path)?),
            ..Default::default()
        })
        .map_err(|err| {
            PipelineError::RecognitionUnavailable(format!("failed to initialise OCR engine: {err}"))
        })?;

        info!("OCR engine ready");
        Ok(Self {
            engine: Arc::new(engine),
        })
    }

    pub fn from_model_dir(dir: impl AsRef<Path>) -> Result<Self> {
        Self::new(&OcrConfig::from_dir(dir))
    }
}

#[async_trait]
impl TextRecognizer for OcrsRecognizer {
    fn name(&self) -> &str {
        "ocrs"
    }

    async fn recognize(
        &self,
        image: &GrayImage,
        hint: &RecognitionHint,
    ) -> Result<Vec<RecognizedLine>> {
        if hint.language != "eng" {
            warn!(language = %hint.language, "ocrs models are Latin-script only; hint ignored");
        }

        let engine = Arc::clone(&self.engine);
        let rgb = DynamicImage::ImageLuma8(image.clone()).to_rgb8();

        tokio::task::spawn_blocking(move || run_engine(&engine, &rgb))
            .await
            .map_err(|err| PipelineError::Recognition(format!("OCR task failed: {err}")))?
    }
}

fn run_engine(engine: &OcrEngine, rgb: &image::RgbImage) -> Result<Vec<RecognizedLine>> {
    let (width, height) = rgb.dimensions();
    let source = ImageSource::from_bytes(rgb.as_raw(), (width, height)).map_err(|err| {
        PipelineError::Recognition(format!("invalid image source ({width}x{height}): {err}"))
    })?;
    let input = engine
        .prepare_input(source)
        .map_err(|err| PipelineError::Recognition(format!("OCR preprocessing failed: {err}")))?;

    let words = engine
        .detect_words(&input)
        .map_err(|err| PipelineError::Recognition(format!("word detection failed: {err}")))?;
    let line_rects = engine.find_text_lines(&input, &words);
    let texts = engine
        .recognize_text(&input, &line_rects)
        .map_err(|err| PipelineError::Recognition(format!("line recognition failed: {err}")))?;

    let lines: Vec<RecognizedLine> = texts
        .iter()
        .flatten()
        .map(|line| {
            let rect = line.bounding_rect();
            let left = rect.left().max(0) as u32;
            let top = rect.top().max(0) as u32;
            let right = (rect.right().max(0) as u32).max(left);
            let bottom = (rect.bottom().max(0) as u32).max(top);
            RecognizedLine {
                text: line.to_string(),
                shape: RecognizedShape::Box(BoundingBox::new(left, top, right - left, bottom - top)),
                confidence: OCRS_LINE_CONFIDENCE,
                baseline: None,
            }
        })
        .collect();

    debug!(words = words.len(), lines = lines.len(), "ocrs pass complete");
    Ok(lines)
}
