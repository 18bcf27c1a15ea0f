// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Text recognizer selection.

use std::path::Path;
use std::sync::Arc;

use schemwerk_vision::{TextRecognizer, UnavailableRecognizer};
#[cfg(feature = "ocr")]
use tracing::info;
use tracing::warn;

/// Build the recognizer for this run.
///
/// With the `ocr` feature the ocrs engine is loaded from `model_dir` (or its
/// default model directory). When the engine cannot be loaded, or the feature
/// is off, recognition is reported as unavailable and the remaining stages
/// still run.
pub fn build_recognizer(model_dir: Option<&Path>) -> Arc<dyn TextRecognizer> {
    match load_engine(model_dir) {
        Ok(recognizer) => recognizer,
        Err(reason) => {
            warn!(%reason, "Text recognition disabled");
            Arc::new(UnavailableRecognizer::new(reason))
        }
    }
}

#[cfg(feature = "ocr")]
fn load_engine(model_dir: Option<&Path>) -> Result<Arc<dyn TextRecognizer>, String> {
    use schemwerk_vision::{OcrConfig, OcrsRecognizer};

    let config = model_dir.map(OcrConfig::from_dir).unwrap_or_default();
    let recognizer = OcrsRecognizer::new(&config).map_err(|e| e.to_string())?;
    info!(
        detection = %config.detection_model_path.display(),
        "ocrs engine loaded"
    );
    Ok(Arc::new(recognizer))
}

#[cfg(not(feature = "ocr"))]
fn load_engine(model_dir: Option<&Path>) -> Result<Arc<dyn TextRecognizer>, String> {
    if let Some(dir) = model_dir {
        warn!(dir = %dir.display(), "Model directory ignored: built without the `ocr` feature");
    }
    Err("built without the `ocr` feature".into())
}
