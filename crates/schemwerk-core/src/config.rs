// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Pipeline configuration. One value is handed to every stage so results are
// reproducible without global state.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{PipelineError, Result};

/// Thresholds and limits for one analysis run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    // -- Preprocessing --
    /// Histogram clip limit for tiled equalization, relative to the mean bin.
    pub clip_limit: f32,
    /// Side length of an equalization tile in pixels.
    pub tile_size: u32,

    // -- Edges and layout --
    /// Sobel magnitude above which a pixel counts as an edge.
    pub edge_threshold: f32,
    /// Components whose longer side is shorter than this are noise.
    pub min_region_size: u32,
    /// Bounding-box area (px²) from which a component counts as "large".
    pub large_region_area: u64,

    // -- Line detection --
    pub hough_vote_threshold: u32,
    /// Vote count that maps to confidence 1.0.
    pub hough_confidence_cap: u32,
    /// Neighbourhood (in accumulator cells) for local-maximum suppression;
    /// 0 keeps every cell above the threshold.
    pub hough_suppression_radius: u32,

    // -- Tables --
    /// Fraction of dark pixels that marks a row or column as a grid line.
    pub table_line_density: f32,
    /// Gaps between grid lines thinner than this are not cells.
    pub min_cell_size: u32,

    // -- Tagging --
    /// Centre distance (px) under which two candidates are related.
    pub nearby_radius: f32,
    /// Grid (px) used to round candidate positions when merging results.
    pub merge_position_grid: f32,
    /// Tag lines that fall inside no layout region at all.
    pub tag_unregioned_lines: bool,

    // -- Recognition --
    pub language_hint: String,

    // -- Routing --
    pub remote_timeout_ms: u64,
    pub probe_timeout_ms: u64,
    /// Inputs larger than this are candidates for remote processing.
    pub size_threshold_bytes: u64,
    pub min_local_cores: usize,
    pub min_local_memory_mb: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            clip_limit: 2.0,
            tile_size: 8,
            edge_threshold: 50.0,
            min_region_size: 10,
            large_region_area: 10_000,
            hough_vote_threshold: 50,
            hough_confidence_cap: 100,
            hough_suppression_radius: 0,
            table_line_density: 0.7,
            min_cell_size: 3,
            nearby_radius: 200.0,
            merge_position_grid: 10.0,
            tag_unregioned_lines: false,
            language_hint: "eng".into(),
            remote_timeout_ms: 30_000,
            probe_timeout_ms: 2_000,
            size_threshold_bytes: 5 * 1024 * 1024,
            min_local_cores: 2,
            min_local_memory_mb: 2048,
        }
    }
}

impl PipelineConfig {
    /// Parse a JSON document; missing fields take their defaults.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Load a JSON config file.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path.as_ref())?;
        Self::from_json_str(&raw)
    }

    pub fn remote_timeout(&self) -> Duration {
        Duration::from_millis(self.remote_timeout_ms)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }

    /// Reject values that would make a stage meaningless.
    pub fn validate(&self) -> Result<()> {
        if self.tile_size == 0 {
            return Err(PipelineError::Config("tile_size must be at least 1".into()));
        }
        if self.clip_limit.is_nan() || self.clip_limit <= 0.0 {
            return Err(PipelineError::Config(format!(
                "clip_limit must be positive, got {}",
                self.clip_limit
            )));
        }
        if self.table_line_density.is_nan()
            || self.table_line_density <= 0.0
            || self.table_line_density > 1.0
        {
            return Err(PipelineError::Config(format!(
                "table_line_density must be in (0, 1], got {}",
                self.table_line_density
            )));
        }
        if self.hough_confidence_cap == 0 {
            return Err(PipelineError::Config(
                "hough_confidence_cap must be at least 1".into(),
            ));
        }
        if self.merge_position_grid.is_nan() || self.merge_position_grid <= 0.0 {
            return Err(PipelineError::Config(
                "merge_position_grid must be positive".into(),
            ));
        }
        if self.remote_timeout_ms == 0 || self.probe_timeout_ms == 0 {
            return Err(PipelineError::Config("timeouts must be non-zero".into()));
        }
        Ok(())
    }
}
