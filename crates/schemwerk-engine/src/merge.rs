// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Merging of local and remote results for hybrid jobs.

use std::collections::{HashMap, HashSet};

use schemwerk_core::{AnalysisPayload, ComponentCandidate, EquipmentKind, PipelineConfig};
use schemwerk_vision::tagger::link_nearby;
use tracing::debug;

/// Identity of a candidate for merging: its family and its centre rounded to
/// the merge grid.
type MergeKey = (EquipmentKind, i64, i64);

fn merge_key(candidate: &ComponentCandidate, grid: f32) -> MergeKey {
    let centre = candidate.bbox.center();
    let grid = if grid > 0.0 { grid } else { 1.0 };
    (
        candidate.kind,
        (centre.x / grid).round() as i64,
        (centre.y / grid).round() as i64,
    )
}

/// Merge remote candidates into the local list.
///
/// Candidates are grouped by key. Every key with at least one remote
/// candidate takes all of its remote candidates, in remote order, at the
/// position of the first local candidate with that key; local candidates
/// under such a key are dropped. Keys only the remote side has are appended.
/// Ids are made unique (suffix `-remote`) and proximity links recomputed. An
/// empty remote list returns `local` untouched.
pub fn merge_candidates(
    local: Vec<ComponentCandidate>,
    remote: Vec<ComponentCandidate>,
    config: &PipelineConfig,
) -> Vec<ComponentCandidate> {
    if remote.is_empty() {
        return local;
    }
    let grid = config.merge_position_grid;

    let mut remote_groups: HashMap<MergeKey, Vec<ComponentCandidate>> = HashMap::new();
    let mut remote_order: Vec<MergeKey> = Vec::new();
    for candidate in remote {
        let key = merge_key(&candidate, grid);
        let group = remote_groups.entry(key).or_default();
        if group.is_empty() {
            remote_order.push(key);
        }
        group.push(candidate);
    }

    let mut overridden: HashSet<MergeKey> = HashSet::new();
    let mut replaced = 0usize;
    let mut merged: Vec<ComponentCandidate> = Vec::new();
    for candidate in local {
        let key = merge_key(&candidate, grid);
        if let Some(group) = remote_groups.remove(&key) {
            overridden.insert(key);
            merged.extend(group);
        }
        if overridden.contains(&key) {
            replaced += 1;
        } else {
            merged.push(candidate);
        }
    }
    for key in remote_order {
        if let Some(group) = remote_groups.remove(&key) {
            merged.extend(group);
        }
    }

    make_ids_unique(&mut merged);
    link_nearby(&mut merged, config.nearby_radius);

    debug!(total = merged.len(), replaced, "Candidates merged");
    merged
}

fn make_ids_unique(candidates: &mut [ComponentCandidate]) {
    let mut seen: HashSet<String> = HashSet::new();
    for candidate in candidates.iter_mut() {
        if seen.contains(&candidate.id) {
            let base = format!("{}-remote", candidate.id);
            let mut id = base.clone();
            let mut n = 2;
            while seen.contains(&id) {
                id = format!("{base}-{n}");
                n += 1;
            }
            candidate.id = id;
        }
        seen.insert(candidate.id.clone());
    }
}

/// Combine a local and a remote payload.
///
/// Regions and line segments come from the local pass. Text lines are the
/// union of both sides (remote lines not already present locally are added,
/// then re-sorted in reading order). Candidates go through
/// [`merge_candidates`].
pub fn merge_payloads(
    local: AnalysisPayload,
    remote: AnalysisPayload,
    config: &PipelineConfig,
) -> AnalysisPayload {
    let mut text_lines = local.text_lines;
    let before = text_lines.len();
    for line in remote.text_lines {
        if !text_lines
            .iter()
            .any(|existing| existing.text == line.text && existing.bbox == line.bbox)
        {
            text_lines.push(line);
        }
    }
    if text_lines.len() != before {
        text_lines.sort_by_key(|line| (line.bbox.y, line.bbox.x));
    }

    AnalysisPayload {
        text_lines,
        regions: local.regions,
        lines: local.lines,
        components: merge_candidates(local.components, remote.components, config),
    }
}
