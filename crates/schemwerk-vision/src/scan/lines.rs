// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Line detection: Sobel edges fed into a discretised Hough transform to
// recover the straight line-work of schematics and P&IDs.

use image::GrayImage;
use schemwerk_core::{LineOrientation, LineSegment, PipelineConfig, Point};
use tracing::{debug, info, instrument, warn};

use super::edges::{EDGE, edge_map};

/// Angular resolution of the accumulator: one bucket per degree in [0, 180).
const THETA_BUCKETS: usize = 180;

/// Hough vote accumulator over `(round(rho), theta)` cells.
///
/// `rho` ranges over `[-diagonal, diagonal]`, stored with an offset so every
/// index is non-negative.
struct Accumulator {
    votes: Vec<u32>,
    rho_offset: i32,
    rho_buckets: usize,
}

impl Accumulator {
    fn new(width: u32, height: u32) -> Self {
        let diagonal = ((width as f64).powi(2) + (height as f64).powi(2)).sqrt().ceil() as i32;
        let rho_buckets = (2 * diagonal + 1) as usize;
        Self {
            votes: vec![0; rho_buckets * THETA_BUCKETS],
            rho_offset: diagonal,
            rho_buckets,
        }
    }

    fn index(&self, rho_bucket: usize, theta: usize) -> usize {
        rho_bucket * THETA_BUCKETS + theta
    }

    fn get(&self, rho_bucket: usize, theta: usize) -> u32 {
        self.votes[self.index(rho_bucket, theta)]
    }

    fn rho(&self, rho_bucket: usize) -> i32 {
        rho_bucket as i32 - self.rho_offset
    }
}

/// Detect straight lines in a preprocessed image.
///
/// Every edge pixel votes for all lines through it at 1° resolution; cells
/// with more than `hough_vote_threshold` votes become segments clipped to the
/// image bounds. Results are ordered by votes (strongest first).
#[instrument(skip_all, fields(width = gray.width(), height = gray.height()))]
pub fn detect_lines(gray: &GrayImage, config: &PipelineConfig) -> Vec<LineSegment> {
    let (width, height) = gray.dimensions();
    if width == 0 || height == 0 {
        return Vec::new();
    }

    let edges = edge_map(gray, config.edge_threshold);
    let accumulator = vote(&edges);

    let threshold = config.hough_vote_threshold;
    let radius = config.hough_suppression_radius as usize;

    let mut segments = Vec::new();
    for rho_bucket in 0..accumulator.rho_buckets {
        for theta in 0..THETA_BUCKETS {
            let votes = accumulator.get(rho_bucket, theta);
            if votes <= threshold {
                continue;
            }
            if radius > 0 && !is_local_maximum(&accumulator, rho_bucket, theta, radius) {
                continue;
            }
            let rho = accumulator.rho(rho_bucket);
            let Some((start, end)) = clip_to_bounds(rho, theta, width, height) else {
                warn!(rho, theta, "Line does not cross the image; skipping");
                continue;
            };
            let angle = ((theta + 90) % 180) as f32;
            segments.push(LineSegment {
                start,
                end,
                orientation: LineOrientation::from_angle(angle),
                angle,
                rho,
                theta: theta as u32,
                votes,
                thickness: run_thickness(&accumulator, rho_bucket, theta, threshold) as f32,
                confidence: (votes as f32 / config.hough_confidence_cap as f32).min(1.0),
            });
        }
    }

    segments.sort_by(|a, b| {
        b.votes
            .cmp(&a.votes)
            .then(a.theta.cmp(&b.theta))
            .then(a.rho.cmp(&b.rho))
    });

    info!(
        segments = segments.len(),
        threshold,
        "Line detection complete"
    );
    segments
}

/// Fill the accumulator from an edge map.
fn vote(edges: &GrayImage) -> Accumulator {
    let (width, height) = edges.dimensions();
    let mut accumulator = Accumulator::new(width, height);

    let trig: Vec<(f64, f64)> = (0..THETA_BUCKETS)
        .map(|theta| {
            let radians = (theta as f64).to_radians();
            (radians.cos(), radians.sin())
        })
        .collect();

    let mut edge_pixels = 0usize;
    for (x, y, pixel) in edges.enumerate_pixels() {
        if pixel.0[0] != EDGE {
            continue;
        }
        edge_pixels += 1;
        for (theta, &(cos, sin)) in trig.iter().enumerate() {
            let rho = (x as f64 * cos + y as f64 * sin).round() as i32;
            let rho_bucket = (rho + accumulator.rho_offset) as usize;
            let idx = accumulator.index(rho_bucket, theta);
            accumulator.votes[idx] += 1;
        }
    }

    debug!(edge_pixels, "Hough voting complete");
    accumulator
}

/// True if no cell within `radius` has more votes. Ties go to the cell that
/// comes first in scan order.
fn is_local_maximum(acc: &Accumulator, rho_bucket: usize, theta: usize, radius: usize) -> bool {
    let votes = acc.get(rho_bucket, theta);
    let rho_lo = rho_bucket.saturating_sub(radius);
    let rho_hi = (rho_bucket + radius).min(acc.rho_buckets - 1);
    let theta_lo = theta.saturating_sub(radius);
    let theta_hi = (theta + radius).min(THETA_BUCKETS - 1);

    for r in rho_lo..=rho_hi {
        for t in theta_lo..=theta_hi {
            if (r, t) == (rho_bucket, theta) {
                continue;
            }
            let other = acc.get(r, t);
            if other > votes || (other == votes && (r, t) < (rho_bucket, theta)) {
                return false;
            }
        }
    }
    true
}

/// Number of adjacent above-threshold rho cells at the same angle, including
/// this one.
fn run_thickness(acc: &Accumulator, rho_bucket: usize, theta: usize, threshold: u32) -> usize {
    let mut run = 1;
    let mut r = rho_bucket;
    while r > 0 && acc.get(r - 1, theta) > threshold {
        run += 1;
        r -= 1;
    }
    let mut r = rho_bucket;
    while r + 1 < acc.rho_buckets && acc.get(r + 1, theta) > threshold {
        run += 1;
        r += 1;
    }
    run
}

/// Intersect the line `x·cosθ + y·sinθ = rho` with the image rectangle and
/// return the two most distant intersection points.
fn clip_to_bounds(rho: i32, theta: usize, width: u32, height: u32) -> Option<(Point, Point)> {
    const EPS: f64 = 1e-9;
    let radians = (theta as f64).to_radians();
    let (cos, sin) = (radians.cos(), radians.sin());
    let rho = rho as f64;
    let max_x = (width - 1) as f64;
    let max_y = (height - 1) as f64;

    let mut points: Vec<(f64, f64)> = Vec::with_capacity(4);
    if sin.abs() > EPS {
        points.push((0.0, rho / sin));
        points.push((max_x, (rho - max_x * cos) / sin));
    }
    if cos.abs() > EPS {
        points.push((rho / cos, 0.0));
        points.push(((rho - max_y * sin) / cos, max_y));
    }

    let tolerance = 0.5;
    let inside: Vec<(f64, f64)> = points
        .into_iter()
        .filter(|&(x, y)| {
            x >= -tolerance && x <= max_x + tolerance && y >= -tolerance && y <= max_y + tolerance
        })
        .map(|(x, y)| (x.clamp(0.0, max_x), y.clamp(0.0, max_y)))
        .collect();

    let mut best: Option<((f64, f64), (f64, f64), f64)> = None;
    for (i, &a) in inside.iter().enumerate() {
        for &b in &inside[i + 1..] {
            let dist = (a.0 - b.0).powi(2) + (a.1 - b.1).powi(2);
            if best.is_none_or(|(_, _, d)| dist > d) {
                best = Some((a, b, dist));
            }
        }
    }

    best.map(|(a, b, _)| {
        (
            Point::new(a.0 as f32, a.1 as f32),
            Point::new(b.0 as f32, b.1 as f32),
        )
    })
}
