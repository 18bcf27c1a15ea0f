// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Table structure recognition: finds the ruled grid inside a table region
// and reads each cell's text through the recogniser.

use image::GrayImage;
use schemwerk_core::error::Result;
use schemwerk_core::{BoundingBox, PipelineConfig, TableCell};
use tracing::{debug, instrument};

use crate::image::crop_gray;
use crate::recognition::TextRecognitionAdapter;

/// Pixels darker than this count as ink when looking for rulings.
const DARK_LEVEL: u8 = 128;

/// A run of grid-line pixels `[start, end)` along one axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Ruling {
    start: u32,
    end: u32,
}

/// Find the cell grid of a table region.
///
/// Rows (and columns) whose dark fraction exceeds `table_line_density` are
/// rulings; the region's own edges are rulings too. Adjacent ruling rows
/// collapse into one line and every gap of at least `min_cell_size` pixels
/// between consecutive lines is a band. Cells are the cartesian product of
/// row and column bands, row-major, with empty text and spans of 1.
#[instrument(skip(gray, config))]
pub fn detect_grid(gray: &GrayImage, region: &BoundingBox, config: &PipelineConfig) -> Vec<TableCell> {
    let crop = crop_gray(gray, region);
    let (width, height) = crop.dimensions();
    if width == 0 || height == 0 {
        return Vec::new();
    }

    let dark = |x: u32, y: u32| crop.get_pixel(x, y).0[0] < DARK_LEVEL;
    let density = config.table_line_density;

    let row_rulings = rulings(height, |y| {
        let count = (0..width).filter(|&x| dark(x, y)).count();
        count as f32 / width as f32 > density
    });
    let col_rulings = rulings(width, |x| {
        let count = (0..height).filter(|&y| dark(x, y)).count();
        count as f32 / height as f32 > density
    });

    let rows = bands(&row_rulings, config.min_cell_size);
    let cols = bands(&col_rulings, config.min_cell_size);

    let mut cells = Vec::with_capacity(rows.len() * cols.len());
    for (row, &(y0, y1)) in rows.iter().enumerate() {
        for (col, &(x0, x1)) in cols.iter().enumerate() {
            cells.push(TableCell {
                row: row as u32,
                col: col as u32,
                row_span: 1,
                col_span: 1,
                bbox: BoundingBox::new(region.x + x0, region.y + y0, x1 - x0, y1 - y0),
                text: String::new(),
            });
        }
    }

    debug!(rows = rows.len(), cols = cols.len(), "Table grid detected");
    cells
}

/// Collapse positions `0..len` accepted by `is_ruling` into runs, bracketed by
/// the implicit rulings at both ends.
fn rulings(len: u32, is_ruling: impl Fn(u32) -> bool) -> Vec<Ruling> {
    let mut runs = vec![Ruling { start: 0, end: 0 }];
    for pos in 0..len {
        if !is_ruling(pos) {
            continue;
        }
        match runs.last_mut() {
            Some(last) if last.end == pos => last.end = pos + 1,
            _ => runs.push(Ruling {
                start: pos,
                end: pos + 1,
            }),
        }
    }
    match runs.last() {
        Some(last) if last.end == len => {}
        _ => runs.push(Ruling { start: len, end: len }),
    }
    runs
}

/// Gaps between consecutive rulings that are at least `min_size` wide.
fn bands(rulings: &[Ruling], min_size: u32) -> Vec<(u32, u32)> {
    rulings
        .windows(2)
        .filter_map(|pair| {
            let (start, end) = (pair[0].end, pair[1].start);
            (end > start && end - start >= min_size).then_some((start, end))
        })
        .collect()
}

/// Read each cell's text, joining the recognised lines with a space.
///
/// Stops at the first recogniser error; cells not yet read keep empty text.
pub async fn read_cell_text(
    cells: &mut [TableCell],
    gray: &GrayImage,
    adapter: &TextRecognitionAdapter,
) -> Result<()> {
    for cell in cells.iter_mut() {
        let lines = adapter.recognize_region(gray, &cell.bbox).await?;
        cell.text = lines
            .iter()
            .map(|line| line.text.as_str())
            .collect::<Vec<_>>()
            .join(" ");
    }
    Ok(())
}
