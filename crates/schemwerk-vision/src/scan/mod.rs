// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Scanning stages: pixel preprocessing, edge maps, layout regions, Hough
// line-work and table grids.

pub mod edges;
pub mod layout;
pub mod lines;
pub mod preprocess;
pub mod table;

pub use layout::{analyze_layout, classify_region};
pub use lines::detect_lines;
pub use preprocess::{Preprocessor, otsu_threshold, preprocess};
pub use table::{detect_grid, read_cell_text};
