// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Core domain types for the Schemwerk analysis pipeline.
//
// Everything here is immutable value data produced once per job and handed
// back to the caller. Coordinates are source-image pixels.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Caller-supplied identifier for an analysis job.
///
/// Only used to correlate progress events; the pipeline keeps no state keyed
/// by it once the job has finished.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct JobId(pub String);

impl JobId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generate a fresh random id for callers that have none.
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

// -- Geometry -----------------------------------------------------------------

/// A point in image space.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    /// Euclidean distance to another point.
    pub fn distance(&self, other: &Point) -> f32 {
        ((self.x - other.x).powi(2) + (self.y - other.y).powi(2)).sqrt()
    }
}

/// Axis-aligned rectangle, `x`/`y` being the top-left corner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl BoundingBox {
    pub fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Smallest box enclosing all `points`, clamped at zero.
    ///
    /// Returns `None` for an empty slice.
    pub fn from_points(points: &[Point]) -> Option<Self> {
        let first = points.first()?;
        let (mut min_x, mut min_y, mut max_x, mut max_y) = (first.x, first.y, first.x, first.y);
        for p in &points[1..] {
            min_x = min_x.min(p.x);
            min_y = min_y.min(p.y);
            max_x = max_x.max(p.x);
            max_y = max_y.max(p.y);
        }
        let left = min_x.max(0.0).floor() as u32;
        let top = min_y.max(0.0).floor() as u32;
        let right = max_x.max(0.0).ceil() as u32;
        let bottom = max_y.max(0.0).ceil() as u32;
        Some(Self::new(left, top, right.saturating_sub(left), bottom.saturating_sub(top)))
    }

    /// Exclusive right edge.
    pub fn right(&self) -> u32 {
        self.x + self.width
    }

    /// Exclusive bottom edge.
    pub fn bottom(&self) -> u32 {
        self.y + self.height
    }

    pub fn area(&self) -> u64 {
        self.width as u64 * self.height as u64
    }

    pub fn center(&self) -> Point {
        Point::new(
            self.x as f32 + self.width as f32 / 2.0,
            self.y as f32 + self.height as f32 / 2.0,
        )
    }

    /// Width divided by height; zero-height boxes report `f32::INFINITY`.
    pub fn aspect_ratio(&self) -> f32 {
        if self.height == 0 {
            f32::INFINITY
        } else {
            self.width as f32 / self.height as f32
        }
    }

    /// True if `other` lies entirely inside `self` (edges may touch).
    pub fn contains(&self, other: &BoundingBox) -> bool {
        other.x >= self.x
            && other.y >= self.y
            && other.right() <= self.right()
            && other.bottom() <= self.bottom()
    }

    /// Translate the box by a sub-region origin.
    pub fn offset(&self, dx: u32, dy: u32) -> Self {
        Self::new(self.x + dx, self.y + dy, self.width, self.height)
    }

    /// Smallest box covering both.
    pub fn union(&self, other: &BoundingBox) -> Self {
        let x = self.x.min(other.x);
        let y = self.y.min(other.y);
        let right = self.right().max(other.right());
        let bottom = self.bottom().max(other.bottom());
        Self::new(x, y, right - x, bottom - y)
    }
}

// -- Text ---------------------------------------------------------------------

/// Reading direction of a recognised line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TextDirection {
    Horizontal,
    Vertical,
    Rotated,
}

/// One recognised line of text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextLine {
    pub text: String,
    pub bbox: BoundingBox,
    /// Normalised to 0.0..=1.0.
    pub confidence: f32,
    pub direction: TextDirection,
    /// Degrees, 0 for left-to-right text.
    pub angle: f32,
}

// -- Layout -------------------------------------------------------------------

/// Classification of a layout region.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RegionKind {
    Text,
    Title,
    List,
    Table,
    Figure,
    Seal,
}

impl RegionKind {
    /// Regions whose text is fed to the component tagger.
    pub fn is_textual(&self) -> bool {
        matches!(self, Self::Text | Self::Title)
    }
}

/// A typed annotation over part of the image.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayoutRegion {
    pub kind: RegionKind,
    pub bbox: BoundingBox,
    pub confidence: f32,
    /// Fraction of the box covered by edge pixels.
    pub density: f32,
    /// Cell grid, filled only for table regions.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cells: Option<Vec<TableCell>>,
}

/// One cell of a recognised table grid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableCell {
    pub row: u32,
    pub col: u32,
    pub row_span: u32,
    pub col_span: u32,
    pub bbox: BoundingBox,
    pub text: String,
}

// -- Line-work ----------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LineOrientation {
    Horizontal,
    Vertical,
    Diagonal,
}

impl LineOrientation {
    /// Classify a line by its direction angle in degrees (0..180).
    pub fn from_angle(angle: f32) -> Self {
        if angle <= 10.0 || angle >= 170.0 {
            Self::Horizontal
        } else if (80.0..=100.0).contains(&angle) {
            Self::Vertical
        } else {
            Self::Diagonal
        }
    }
}

/// A straight line detected by the voting transform.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineSegment {
    pub start: Point,
    pub end: Point,
    pub orientation: LineOrientation,
    /// Direction of the line relative to the x-axis, degrees in 0..180.
    pub angle: f32,
    /// Accumulator cell that produced this line.
    pub rho: i32,
    pub theta: u32,
    pub votes: u32,
    pub thickness: f32,
    pub confidence: f32,
}

// -- Components ---------------------------------------------------------------

/// Equipment family recognised from a tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EquipmentKind {
    Conveyor,
    Motor,
    Pump,
    Valve,
    Tank,
    Sensor,
    Fan,
    Hopper,
}

impl EquipmentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Conveyor => "conveyor",
            Self::Motor => "motor",
            Self::Pump => "pump",
            Self::Valve => "valve",
            Self::Tank => "tank",
            Self::Sensor => "sensor",
            Self::Fan => "fan",
            Self::Hopper => "hopper",
        }
    }
}

impl std::fmt::Display for EquipmentKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A piece of equipment inferred from drawing text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComponentCandidate {
    pub id: String,
    pub kind: EquipmentKind,
    /// The captured number, e.g. `"07"` for `CONV_07`.
    pub identifier: String,
    /// The matched tag text.
    pub tag: String,
    /// Full text of the line the tag came from.
    pub source_text: String,
    pub bbox: BoundingBox,
    /// Ids of candidates within the proximity radius.
    pub nearby: Vec<String>,
    pub confidence: f32,
}

// -- Routing ------------------------------------------------------------------

/// Where the router decided to run a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessingLocation {
    Local,
    Remote,
    Hybrid,
}

impl std::str::FromStr for ProcessingLocation {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "local" => Ok(Self::Local),
            "remote" => Ok(Self::Remote),
            "hybrid" => Ok(Self::Hybrid),
            other => Err(format!("unknown processing location `{other}`")),
        }
    }
}

/// Router states. `Deciding` is transient; the others are where a job ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RouterState {
    Deciding,
    Local,
    Remote,
    Hybrid,
    FallbackLocal,
}

impl From<ProcessingLocation> for RouterState {
    fn from(location: ProcessingLocation) -> Self {
        match location {
            ProcessingLocation::Local => Self::Local,
            ProcessingLocation::Remote => Self::Remote,
            ProcessingLocation::Hybrid => Self::Hybrid,
        }
    }
}

/// Reason code recorded with a routing decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionReason {
    ExplicitOverride,
    PrivacyPreferred,
    NetworkUnreachable,
    LargeInputLimitedDevice,
    LargeInput,
    LimitedDevice,
    Default,
}

/// How and why a job was routed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessingDecision {
    pub location: ProcessingLocation,
    pub reason: DecisionReason,
    /// The state the job finished in; `FallbackLocal` after a remote failure.
    pub executed: RouterState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remote_error: Option<String>,
    pub decided_at: DateTime<Utc>,
}

// -- Results ------------------------------------------------------------------

/// Pipeline stages reported in [`StageReport`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Preprocess,
    Layout,
    Recognition,
    Lines,
    Tables,
    Tagging,
    Remote,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageStatus {
    Complete,
    Degraded,
    Failed,
    Skipped,
}

/// Outcome of one stage, kept for observability.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageReport {
    pub stage: Stage,
    pub status: StageStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

/// Analysis output shared by the local pipeline and the remote endpoint.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnalysisPayload {
    #[serde(default)]
    pub text_lines: Vec<TextLine>,
    #[serde(default)]
    pub regions: Vec<LayoutRegion>,
    #[serde(default)]
    pub lines: Vec<LineSegment>,
    #[serde(default)]
    pub components: Vec<ComponentCandidate>,
}

/// Everything a caller gets back for one job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub job_id: JobId,
    /// SHA-256 of the submitted bytes, hex encoded.
    pub input_sha256: String,
    pub image_width: u32,
    pub image_height: u32,
    pub text_lines: Vec<TextLine>,
    pub regions: Vec<LayoutRegion>,
    pub lines: Vec<LineSegment>,
    pub components: Vec<ComponentCandidate>,
    pub decision: ProcessingDecision,
    pub stages: Vec<StageReport>,
}

impl AnalysisResult {
    /// Table regions with their cell grids.
    pub fn tables(&self) -> impl Iterator<Item = &LayoutRegion> {
        self.regions
            .iter()
            .filter(|region| region.kind == RegionKind::Table)
    }
}

// -- Progress -----------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProgressKind {
    Running,
    Completed,
    Failed,
}

impl ProgressKind {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Running)
    }
}

/// A progress notification for one job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressEvent {
    pub job_id: JobId,
    /// 0.0..=1.0, never decreasing within a job.
    pub fraction: f32,
    pub status: String,
    pub kind: ProgressKind,
}
