// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Layout analysis: segments a preprocessed drawing into typed regions from
// the connected components of its edge map.

use std::collections::BTreeMap;

use image::{GrayImage, Luma};
use imageproc::region_labelling::{Connectivity, connected_components};
use schemwerk_core::{BoundingBox, LayoutRegion, PipelineConfig, RegionKind};
use tracing::{debug, info, instrument};

use super::edges::edge_map;

/// Per-component accumulator.
#[derive(Debug, Clone, Copy)]
struct ComponentStats {
    min_x: u32,
    min_y: u32,
    max_x: u32,
    max_y: u32,
    pixels: u64,
}

impl ComponentStats {
    fn new(x: u32, y: u32) -> Self {
        Self {
            min_x: x,
            min_y: y,
            max_x: x,
            max_y: y,
            pixels: 0,
        }
    }

    fn add(&mut self, x: u32, y: u32) {
        self.min_x = self.min_x.min(x);
        self.min_y = self.min_y.min(y);
        self.max_x = self.max_x.max(x);
        self.max_y = self.max_y.max(y);
        self.pixels += 1;
    }

    fn bbox(&self) -> BoundingBox {
        BoundingBox::new(
            self.min_x,
            self.min_y,
            self.max_x - self.min_x + 1,
            self.max_y - self.min_y + 1,
        )
    }
}

/// Segment a preprocessed image into layout regions.
///
/// Edge pixels are grouped by 4-connectivity; components whose longer side is
/// below `min_region_size` are discarded as noise and the rest are classified
/// by [`classify_region`]. Regions come back in reading order (top to bottom,
/// then left to right).
#[instrument(skip_all, fields(width = gray.width(), height = gray.height()))]
pub fn analyze_layout(gray: &GrayImage, config: &PipelineConfig) -> Vec<LayoutRegion> {
    let edges = edge_map(gray, config.edge_threshold);
    let labels = connected_components(&edges, Connectivity::Four, Luma([0u8]));

    let mut components: BTreeMap<u32, ComponentStats> = BTreeMap::new();
    for (x, y, label) in labels.enumerate_pixels() {
        let label = label.0[0];
        if label == 0 {
            continue;
        }
        components
            .entry(label)
            .or_insert_with(|| ComponentStats::new(x, y))
            .add(x, y);
    }
    debug!(components = components.len(), "Connected components labelled");

    let mut regions: Vec<LayoutRegion> = components
        .values()
        .filter_map(|stats| {
            let bbox = stats.bbox();
            if bbox.width.max(bbox.height) < config.min_region_size {
                return None;
            }
            let density = (stats.pixels as f64 / bbox.area() as f64) as f32;
            let kind = classify_region(&bbox, density, config.large_region_area);
            Some(LayoutRegion {
                kind,
                bbox,
                confidence: (0.5 + 0.5 * density).min(1.0),
                density,
                cells: None,
            })
        })
        .collect();

    regions.sort_by_key(|region| (region.bbox.y, region.bbox.x));

    info!(
        regions = regions.len(),
        tables = regions.iter().filter(|r| r.kind == RegionKind::Table).count(),
        "Layout analysis complete"
    );
    regions
}

/// One-pass heuristic classification of a component.
///
/// Rules are tried in order; the first match wins:
///
/// | rule | kind |
/// |---|---|
/// | aspect > 3 and density > 0.3 | Title |
/// | 0.5 ≤ aspect ≤ 2 and large | Table |
/// | density < 0.2 and large | Figure |
/// | aspect < 0.3 | List |
/// | otherwise | Text |
pub fn classify_region(bbox: &BoundingBox, density: f32, large_area: u64) -> RegionKind {
    let aspect = bbox.aspect_ratio();
    let large = bbox.area() >= large_area;

    if aspect > 3.0 && density > 0.3 {
        RegionKind::Title
    } else if (0.5..=2.0).contains(&aspect) && large {
        RegionKind::Table
    } else if density < 0.2 && large {
        RegionKind::Figure
    } else if aspect < 0.3 {
        RegionKind::List
    } else {
        RegionKind::Text
    }
}
