// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Image module: decoding, channel layout and cropping of job-owned rasters.

pub mod buffer;

pub use buffer::{ChannelLayout, PixelBuffer, crop_gray};
