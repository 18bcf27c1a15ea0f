// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// The local analysis pipeline.
//
//   decode ─► preprocess ─┬─► layout ─► tables ─┐
//                         ├─► recognition ──────┼─► tagging ─► payload
//                         └─► lines ────────────┘
//
// CPU-bound stages run on the blocking pool, recognition is awaited, and the
// three branches are joined before tagging. Each stage yields a
// `StageOutcome` so a missing OCR engine degrades the job instead of failing it.

use std::sync::Arc;

use image::GrayImage;
use schemwerk_core::error::{PipelineError, Result};
use schemwerk_core::{
    AnalysisPayload, LayoutRegion, PipelineConfig, RegionKind, Stage, StageReport, StageStatus,
    TableCell, TextLine,
};
use schemwerk_vision::recognition::{RecognitionHint, TextRecognitionAdapter, TextRecognizer};
use schemwerk_vision::scan::{analyze_layout, detect_grid, detect_lines, preprocess, read_cell_text};
use schemwerk_vision::{ComponentTagger, PixelBuffer};
use tracing::{debug, info, instrument, warn};

use crate::progress::JobProgress;

/// What a stage produced.
#[derive(Debug, Clone, PartialEq)]
pub enum StageOutcome<T> {
    Complete(T),
    /// Partial output; `reason` says what is missing.
    Degraded { value: T, reason: String },
    /// No output.
    Failed { reason: String },
}

impl<T: Default> StageOutcome<T> {
    pub fn report(&self, stage: Stage) -> StageReport {
        let (status, detail) = match self {
            Self::Complete(_) => (StageStatus::Complete, None),
            Self::Degraded { reason, .. } => (StageStatus::Degraded, Some(reason.clone())),
            Self::Failed { reason } => (StageStatus::Failed, Some(reason.clone())),
        };
        StageReport { stage, status, detail }
    }

    /// The produced value; empty for a failed stage.
    pub fn into_value(self) -> T {
        match self {
            Self::Complete(value) | Self::Degraded { value, .. } => value,
            Self::Failed { .. } => T::default(),
        }
    }
}

/// Result of a local run.
#[derive(Debug, Clone, PartialEq)]
pub struct LocalOutput {
    pub payload: AnalysisPayload,
    pub stages: Vec<StageReport>,
}

/// Runs every analysis stage on this machine.
#[derive(Clone)]
pub struct LocalPipeline {
    config: Arc<PipelineConfig>,
    adapter: TextRecognitionAdapter,
    tagger: ComponentTagger,
}

impl LocalPipeline {
    pub fn new(config: Arc<PipelineConfig>, recognizer: Arc<dyn TextRecognizer>) -> Self {
        let hint = RecognitionHint::new(config.language_hint.clone());
        Self {
            adapter: TextRecognitionAdapter::new(recognizer, hint),
            tagger: ComponentTagger::new(&config),
            config,
        }
    }

    /// Analyse an already decoded image.
    ///
    /// Fails only when preprocessing itself fails; every later stage reports
    /// its own outcome in [`LocalOutput::stages`].
    #[instrument(skip_all, fields(job_id = %progress.job_id(), width = buffer.width(), height = buffer.height()))]
    pub async fn run(&self, buffer: Arc<PixelBuffer>, progress: &mut JobProgress) -> Result<LocalOutput> {
        let config = Arc::clone(&self.config);
        let gray = match blocking(move || preprocess(&buffer, &config)).await {
            StageOutcome::Complete(gray) => Arc::new(gray),
            StageOutcome::Degraded { value, .. } => Arc::new(value),
            StageOutcome::Failed { reason } => {
                return Err(PipelineError::InvalidInput(format!("preprocessing failed: {reason}")));
            }
        };
        progress.advance(0.2, "preprocessed");

        let lines_task = {
            let gray = Arc::clone(&gray);
            let config = Arc::clone(&self.config);
            blocking(move || detect_lines(&gray, &config))
        };
        let ((layout, tables), recognition, lines) = tokio::join!(
            self.layout_branch(Arc::clone(&gray)),
            self.recognition_branch(&gray),
            lines_task,
        );
        progress.advance(0.8, "layout, text and lines extracted");

        let mut stages = vec![
            StageReport {
                stage: Stage::Preprocess,
                status: StageStatus::Complete,
                detail: None,
            },
            layout.report(Stage::Layout),
            tables,
            recognition.report(Stage::Recognition),
            lines.report(Stage::Lines),
        ];

        let regions = layout.into_value();
        let text_lines = recognition.into_value();
        let lines = lines.into_value();

        let components = self.tagger.tag(&text_lines, &regions);
        stages.push(StageReport {
            stage: Stage::Tagging,
            status: StageStatus::Complete,
            detail: None,
        });
        progress.advance(0.95, "components tagged");

        info!(
            regions = regions.len(),
            text_lines = text_lines.len(),
            lines = lines.len(),
            components = components.len(),
            "Local pipeline complete"
        );

        Ok(LocalOutput {
            payload: AnalysisPayload {
                text_lines,
                regions,
                lines,
                components,
            },
            stages,
        })
    }

    /// Layout, then table grids and cell text for every table region.
    async fn layout_branch(&self, gray: Arc<GrayImage>) -> (StageOutcome<Vec<LayoutRegion>>, StageReport) {
        let layout = {
            let gray = Arc::clone(&gray);
            let config = Arc::clone(&self.config);
            blocking(move || analyze_layout(&gray, &config)).await
        };

        let mut regions = match layout {
            StageOutcome::Failed { reason } => {
                let skipped = StageReport {
                    stage: Stage::Tables,
                    status: StageStatus::Skipped,
                    detail: Some("no layout".into()),
                };
                return (StageOutcome::Failed { reason }, skipped);
            }
            other => other.into_value(),
        };

        let table_boxes: Vec<_> = regions
            .iter()
            .filter(|region| region.kind == RegionKind::Table)
            .map(|region| region.bbox)
            .collect();
        if table_boxes.is_empty() {
            return (StageOutcome::Complete(regions), table_report(StageStatus::Complete, None));
        }

        let grids = {
            let gray = Arc::clone(&gray);
            let config = Arc::clone(&self.config);
            blocking(move || {
                table_boxes
                    .iter()
                    .map(|bbox| detect_grid(&gray, bbox, &config))
                    .collect::<Vec<Vec<TableCell>>>()
            })
            .await
        };
        let mut grids = match grids {
            StageOutcome::Failed { reason } => {
                return (
                    StageOutcome::Complete(regions),
                    table_report(StageStatus::Failed, Some(reason)),
                );
            }
            other => other.into_value(),
        };

        let mut text_error: Option<String> = None;
        for cells in grids.iter_mut() {
            if text_error.is_some() {
                break;
            }
            if let Err(err) = read_cell_text(cells, &gray, &self.adapter).await {
                warn!(error = %err, "Table cell text unavailable");
                text_error = Some(err.to_string());
            }
        }

        let tables = regions
            .iter_mut()
            .filter(|region| region.kind == RegionKind::Table);
        for (region, cells) in tables.zip(grids) {
            debug!(bbox = ?region.bbox, cells = cells.len(), "Table structure recognised");
            region.cells = Some(cells);
        }

        let report = match text_error {
            Some(reason) => table_report(StageStatus::Degraded, Some(reason)),
            None => table_report(StageStatus::Complete, None),
        };
        (StageOutcome::Complete(regions), report)
    }

    async fn recognition_branch(&self, gray: &GrayImage) -> StageOutcome<Vec<TextLine>> {
        match self.adapter.recognize(gray).await {
            Ok(lines) => StageOutcome::Complete(lines),
            Err(err) => {
                warn!(
                    engine = self.adapter.recognizer_name(),
                    error = %err,
                    "Text recognition unavailable; continuing without text"
                );
                StageOutcome::Degraded {
                    value: Vec::new(),
                    reason: err.to_string(),
                }
            }
        }
    }
}

fn table_report(status: StageStatus, detail: Option<String>) -> StageReport {
    StageReport {
        stage: Stage::Tables,
        status,
        detail,
    }
}

/// Run a CPU-bound stage on the blocking pool.
async fn blocking<T, F>(f: F) -> StageOutcome<T>
where
    T: Send + 'static,
    F: FnOnce() -> T + Send + 'static,
{
    match tokio::task::spawn_blocking(f).await {
        Ok(value) => StageOutcome::Complete(value),
        Err(err) => StageOutcome::Failed {
            reason: format!("stage task failed: {err}"),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::ProgressHub;
    use image::Luma;
    use schemwerk_core::{BoundingBox, EquipmentKind, JobId};
    use schemwerk_vision::recognition::{
        RecognizedLine, RecognizedShape, StaticRecognizer, UnavailableRecognizer,
    };

    /// Draw a 2 px rectangular outline with corners `(x0, y0)` and `(x1, y1)`.
    fn outline(img: &mut GrayImage, (x0, y0): (u32, u32), (x1, y1): (u32, u32)) {
        for y in y0..=y1 {
            for x in x0..=x1 {
                if y <= y0 + 1 || y + 1 >= y1 || x <= x0 + 1 || x + 1 >= x1 {
                    img.put_pixel(x, y, Luma([0]));
                }
            }
        }
    }

    /// A page with a ruled 2×3 table, a framed tag label and a long rule
    /// across the bottom.
    fn drawing() -> Arc<PixelBuffer> {
        let mut img = GrayImage::from_pixel(320, 240, Luma([255]));
        let (x0, y0, cell_w, cell_h, rule) = (40u32, 30u32, 50u32, 45u32, 2u32);
        let width = 3 * (cell_w + rule) + rule;
        let height = 2 * (cell_h + rule) + rule;
        for y in 0..height {
            for x in 0..width {
                if y % (cell_h + rule) < rule || x % (cell_w + rule) < rule {
                    img.put_pixel(x0 + x, y0 + y, Luma([0]));
                }
            }
        }
        outline(&mut img, (224, 94), (296, 120));
        for x in 10..310 {
            for y in 200..202 {
                img.put_pixel(x, y, Luma([0]));
            }
        }
        Arc::new(PixelBuffer::from_gray(img))
    }

    fn conveyor_recognizer() -> Arc<StaticRecognizer> {
        Arc::new(StaticRecognizer::new(vec![RecognizedLine {
            text: "CONV_07".into(),
            shape: RecognizedShape::Box(BoundingBox::new(230, 100, 60, 14)),
            confidence: 92.0,
            baseline: None,
        }]))
    }

    fn status_of(stages: &[StageReport], stage: Stage) -> StageStatus {
        stages
            .iter()
            .find(|r| r.stage == stage)
            .map(|r| r.status)
            .expect("stage reported")
    }

    #[tokio::test]
    async fn full_local_run() {
        let pipeline = LocalPipeline::new(Arc::new(PipelineConfig::default()), conveyor_recognizer());
        let mut progress = JobProgress::new(ProgressHub::new(), JobId::new("local"));
        let out = pipeline.run(drawing(), &mut progress).await.unwrap();

        assert_eq!(out.payload.text_lines.len(), 1);
        assert!(
            out.payload
                .regions
                .iter()
                .any(|r| r.kind.is_textual() && r.bbox.contains(&out.payload.text_lines[0].bbox)),
            "label frame yields a text region around the line"
        );
        assert_eq!(out.payload.components.len(), 1);
        assert_eq!(out.payload.components[0].kind, EquipmentKind::Conveyor);
        assert_eq!(out.payload.components[0].identifier, "07");
        assert!(!out.payload.lines.is_empty());

        let table = out
            .payload
            .regions
            .iter()
            .find(|r| r.kind == RegionKind::Table)
            .expect("table region");
        let cells = table.cells.as_ref().expect("table cells");
        assert_eq!(cells.len(), 6);
        assert!(cells.iter().all(|c| c.row_span == 1 && c.col_span == 1));
        assert!(out.stages.iter().all(|r| r.status == StageStatus::Complete));
    }

    #[tokio::test]
    async fn missing_engine_degrades_instead_of_failing() {
        let pipeline = LocalPipeline::new(
            Arc::new(PipelineConfig::default()),
            Arc::new(UnavailableRecognizer::new("no models")),
        );
        let mut progress = JobProgress::new(ProgressHub::new(), JobId::new("degraded"));
        let out = pipeline.run(drawing(), &mut progress).await.unwrap();

        assert!(out.payload.text_lines.is_empty());
        assert!(out.payload.components.is_empty());
        assert_eq!(status_of(&out.stages, Stage::Recognition), StageStatus::Degraded);
        assert!(!out.payload.lines.is_empty(), "line-work does not depend on text");
    }

    #[tokio::test]
    async fn repeated_runs_are_identical() {
        let pipeline = LocalPipeline::new(Arc::new(PipelineConfig::default()), conveyor_recognizer());
        let hub = ProgressHub::new();
        let buffer = drawing();

        let mut p1 = JobProgress::new(hub.clone(), JobId::new("a"));
        let first = pipeline.run(Arc::clone(&buffer), &mut p1).await.unwrap();
        let mut p2 = JobProgress::new(hub, JobId::new("b"));
        let second = pipeline.run(buffer, &mut p2).await.unwrap();

        assert_eq!(first, second);
    }

    #[test]
    fn failed_outcome_yields_default() {
        let failed: StageOutcome<Vec<u8>> = StageOutcome::Failed { reason: "boom".into() };
        assert_eq!(failed.report(Stage::Lines).status, StageStatus::Failed);
        assert!(failed.into_value().is_empty());
    }
}
