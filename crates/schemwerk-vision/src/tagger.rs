// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Component tagging: equipment tags such as `CONV_07` or `P-101` found in
// recognised text, linked to the candidates drawn near them.

use std::collections::HashMap;
use std::ops::Range;
use std::sync::LazyLock;

use regex::Regex;
use schemwerk_core::{
    ComponentCandidate, EquipmentKind, LayoutRegion, PipelineConfig, TextLine,
};
use tracing::{debug, info, instrument};

/// Tag patterns in priority order. Group 1 is the identifier.
static TAG_PATTERNS: LazyLock<Vec<(EquipmentKind, Regex)>> = LazyLock::new(|| {
    [
        (EquipmentKind::Conveyor, r"(?i)\b(?:CONVEYOR|CONV|CV)[ _-]?(\d{1,4}[A-Z]?)\b"),
        (EquipmentKind::Motor, r"(?i)\b(?:MOTOR|MTR|M)[ _-]?(\d{1,4}[A-Z]?)\b"),
        (EquipmentKind::Pump, r"(?i)\b(?:PUMP|PMP|P)[ _-]?(\d{1,4}[A-Z]?)\b"),
        (EquipmentKind::Valve, r"(?i)\b(?:VALVE|VLV|XV|HV|V)[ _-]?(\d{1,4}[A-Z]?)\b"),
        (EquipmentKind::Tank, r"(?i)\b(?:TANK|TK|T)[ _-]?(\d{1,4}[A-Z]?)\b"),
        (EquipmentKind::Sensor, r"(?i)\b(?:SENSOR|[PTLF][TSE])[ _-]?(\d{1,4}[A-Z]?)\b"),
        (EquipmentKind::Fan, r"(?i)\b(?:FAN|F)[ _-]?(\d{1,4}[A-Z]?)\b"),
        (EquipmentKind::Hopper, r"(?i)\b(?:HOPPER|HOP|HP)[ _-]?(\d{1,4}[A-Z]?)\b"),
    ]
    .into_iter()
    .map(|(kind, pattern)| (kind, Regex::new(pattern).expect("tag pattern compiles")))
    .collect()
});

/// Extracts equipment candidates from text lines.
#[derive(Debug, Clone)]
pub struct ComponentTagger {
    nearby_radius: f32,
    tag_unregioned_lines: bool,
}

impl ComponentTagger {
    pub fn new(config: &PipelineConfig) -> Self {
        Self {
            nearby_radius: config.nearby_radius,
            tag_unregioned_lines: config.tag_unregioned_lines,
        }
    }

    /// Tag every eligible line, then link candidates by proximity.
    ///
    /// A line belongs to a region when its box is fully contained in the
    /// region box. Lines in a Text or Title region are tagged. Lines in no
    /// region are tagged only when `tag_unregioned_lines` is set.
    #[instrument(skip_all, fields(lines = lines.len(), regions = regions.len()))]
    pub fn tag(&self, lines: &[TextLine], regions: &[LayoutRegion]) -> Vec<ComponentCandidate> {
        let mut counters: HashMap<EquipmentKind, u32> = HashMap::new();
        let mut candidates = Vec::new();

        for line in lines.iter().filter(|line| self.is_eligible(line, regions)) {
            for (kind, identifier, tag) in match_tags(&line.text) {
                let n = counters.entry(kind).or_insert(0);
                *n += 1;
                candidates.push(ComponentCandidate {
                    id: format!("{kind}-{n}"),
                    kind,
                    identifier,
                    tag,
                    source_text: line.text.clone(),
                    bbox: line.bbox,
                    nearby: Vec::new(),
                    confidence: line.confidence,
                });
            }
        }

        link_nearby(&mut candidates, self.nearby_radius);
        info!(candidates = candidates.len(), "Component tagging complete");
        candidates
    }

    fn is_eligible(&self, line: &TextLine, regions: &[LayoutRegion]) -> bool {
        let mut containing = regions
            .iter()
            .filter(|region| region.bbox.contains(&line.bbox))
            .peekable();

        if containing.peek().is_none() {
            return self.tag_unregioned_lines;
        }
        containing.any(|region| region.kind.is_textual())
    }
}

/// Every tag in `text` as `(kind, identifier, matched text)`.
///
/// Patterns run in priority order; a match overlapping a span already taken
/// by an earlier pattern is dropped. Results are ordered by pattern, then by
/// position in the text.
pub fn match_tags(text: &str) -> Vec<(EquipmentKind, String, String)> {
    let mut claimed: Vec<Range<usize>> = Vec::new();
    let mut found = Vec::new();

    for (kind, pattern) in TAG_PATTERNS.iter() {
        for caps in pattern.captures_iter(text) {
            let (Some(whole), Some(identifier)) = (caps.get(0), caps.get(1)) else {
                continue;
            };
            let span = whole.range();
            if claimed
                .iter()
                .any(|taken| span.start < taken.end && taken.start < span.end)
            {
                debug!(tag = whole.as_str(), %kind, "Tag overlaps an earlier match; skipping");
                continue;
            }
            claimed.push(span);
            found.push((*kind, identifier.as_str().to_string(), whole.as_str().to_string()));
        }
    }
    found
}

/// Fill each candidate's `nearby` with the ids of all other candidates whose
/// box centre lies within `radius` pixels of its own.
pub fn link_nearby(candidates: &mut [ComponentCandidate], radius: f32) {
    let centres: Vec<_> = candidates.iter().map(|c| (c.id.clone(), c.bbox.center())).collect();
    for (i, candidate) in candidates.iter_mut().enumerate() {
        let own = centres[i].1;
        candidate.nearby = centres
            .iter()
            .enumerate()
            .filter(|&(j, (_, centre))| j != i && own.distance(centre) <= radius)
            .map(|(_, (id, _))| id.clone())
            .collect();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use schemwerk_core::{BoundingBox, RegionKind, TextDirection};

    fn line(text: &str, x: u32, y: u32) -> TextLine {
        TextLine {
            text: text.into(),
            bbox: BoundingBox::new(x, y, 60, 12),
            confidence: 0.9,
            direction: TextDirection::Horizontal,
            angle: 0.0,
        }
    }

    fn region(kind: RegionKind, bbox: BoundingBox) -> LayoutRegion {
        LayoutRegion {
            kind,
            bbox,
            confidence: 0.8,
            density: 0.4,
            cells: None,
        }
    }

    fn tagger() -> ComponentTagger {
        ComponentTagger::new(&PipelineConfig::default())
    }

    /// One text region covering the whole sheet.
    fn sheet() -> [LayoutRegion; 1] {
        [region(RegionKind::Text, BoundingBox::new(0, 0, 2000, 2000))]
    }

    #[test]
    fn conv_07_is_one_conveyor() {
        let candidates = tagger().tag(&[line("CONV_07", 10, 10)], &sheet());
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].kind, EquipmentKind::Conveyor);
        assert_eq!(candidates[0].identifier, "07");
        assert_eq!(candidates[0].id, "conveyor-1");
        assert_eq!(candidates[0].tag, "CONV_07");
    }

    #[test]
    fn several_families_on_one_line() {
        let tags = match_tags("P-101 feeds TK-3 via XV-12");
        let kinds: Vec<_> = tags.iter().map(|(kind, id, _)| (*kind, id.as_str())).collect();
        assert_eq!(
            kinds,
            [
                (EquipmentKind::Pump, "101"),
                (EquipmentKind::Valve, "12"),
                (EquipmentKind::Tank, "3"),
            ]
        );
    }

    #[test]
    fn sensor_tags_are_not_pumps_or_tanks() {
        let tags = match_tags("PT-204");
        assert_eq!(tags.len(), 1);
        assert_eq!(tags[0].0, EquipmentKind::Sensor);
        assert_eq!(tags[0].1, "204");
    }

    #[test]
    fn plain_words_yield_nothing() {
        assert!(match_tags("Feed line to packing station").is_empty());
    }

    #[test]
    fn ids_count_per_family_in_emission_order() {
        let lines = [line("M-1 M-2", 0, 0), line("CONV 3", 0, 400)];
        let candidates = tagger().tag(&lines, &sheet());
        let ids: Vec<_> = candidates.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, ["motor-1", "motor-2", "conveyor-1"]);
    }

    #[test]
    fn only_lines_in_textual_regions_are_tagged() {
        let regions = [
            region(RegionKind::Table, BoundingBox::new(0, 0, 100, 100)),
            region(RegionKind::Text, BoundingBox::new(0, 200, 100, 100)),
        ];
        let lines = [
            line("P-1", 10, 40),  // inside the table
            line("P-2", 10, 240), // inside the text region
            line("P-3", 10, 500), // outside every region
        ];

        let candidates = tagger().tag(&lines, &regions);
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].identifier, "2");

        let lenient = ComponentTagger::new(&PipelineConfig {
            tag_unregioned_lines: true,
            ..Default::default()
        });
        let candidates = lenient.tag(&lines, &regions);
        let idents: Vec<_> = candidates.iter().map(|c| c.identifier.as_str()).collect();
        assert_eq!(idents, ["2", "3"]);
    }

    #[test]
    fn line_crossing_a_region_edge_is_not_inside_it() {
        let regions = [region(RegionKind::Text, BoundingBox::new(0, 0, 130, 40))];
        // Centre (120, 16) is inside the region, the right end is not.
        let straddling = line("P-101", 90, 10);
        assert!(tagger().tag(&[straddling], &regions).is_empty());

        let inside = line("P-102", 60, 10);
        let candidates = tagger().tag(&[inside], &regions);
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].identifier, "102");
    }

    #[test]
    fn textual_region_among_nested_regions_counts() {
        let regions = [
            region(RegionKind::Figure, BoundingBox::new(0, 0, 500, 500)),
            region(RegionKind::Text, BoundingBox::new(50, 50, 100, 40)),
        ];
        let candidates = tagger().tag(&[line("FAN 4", 60, 60)], &regions);
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].kind, EquipmentKind::Fan);
    }

    #[test]
    fn framed_label_found_by_layout_is_tagged() {
        use crate::scan::analyze_layout;
        use image::{GrayImage, Luma};

        // A tag bubble: 2 px frame around the label, white elsewhere.
        let img = GrayImage::from_fn(200, 120, |x, y| {
            let on_x = (14..=86).contains(&x);
            let on_y = (14..=40).contains(&y);
            let frame = (on_x && (y <= 15 || y >= 39) && on_y) || (on_y && (x <= 15 || x >= 85) && on_x);
            if frame { Luma([0]) } else { Luma([255]) }
        });
        let config = PipelineConfig::default();
        let regions = analyze_layout(&img, &config);
        assert!(regions.iter().any(|r| r.kind == RegionKind::Text));

        let label = line("CONV_07", 20, 20);
        let outside = line("P-9", 120, 60);
        let candidates = ComponentTagger::new(&config).tag(&[label, outside], &regions);
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].kind, EquipmentKind::Conveyor);
        assert_eq!(candidates[0].identifier, "07");
    }

    #[test]
    fn nearby_links_are_symmetric_and_radius_bound() {
        let lines = [line("P-1", 0, 0), line("P-2", 100, 0), line("P-3", 1000, 1000)];
        let candidates = tagger().tag(&lines, &sheet());
        assert_eq!(candidates[0].nearby, ["pump-2"]);
        assert_eq!(candidates[1].nearby, ["pump-1"]);
        assert!(candidates[2].nearby.is_empty());
    }

    #[test]
    fn nearby_is_order_independent() {
        let forward = [line("P-1", 0, 0), line("TK-1", 50, 50)];
        let mut a = tagger().tag(&forward, &sheet());
        link_nearby(&mut a, 200.0);

        let mut b = a.clone();
        b.reverse();
        link_nearby(&mut b, 200.0);
        b.reverse();

        for (x, y) in a.iter().zip(&b) {
            let mut nx = x.nearby.clone();
            let mut ny = y.nearby.clone();
            nx.sort();
            ny.sort();
            assert_eq!(nx, ny);
        }
    }
}
