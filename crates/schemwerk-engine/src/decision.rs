// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Routing decision table.
//
// Rules are evaluated top to bottom; the first whose guard holds picks the
// processing location and the reason code recorded with the job.

use schemwerk_core::{DecisionReason, ProcessingLocation};

use crate::connectivity::Reachability;

/// Facts the decision is made from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecisionContext {
    pub location_override: Option<ProcessingLocation>,
    pub prefer_privacy: bool,
    pub remote_configured: bool,
    pub reachability: Reachability,
    pub input_bytes: u64,
    pub size_threshold_bytes: u64,
    pub limited_device: bool,
}

impl DecisionContext {
    fn large_input(&self) -> bool {
        self.input_bytes > self.size_threshold_bytes
    }

    /// Whether any rule after the caller-preference rules can fire, i.e.
    /// whether a reachability probe is worth making.
    pub fn needs_probe(&self) -> bool {
        self.remote_configured && self.location_override.is_none() && !self.prefer_privacy
    }
}

/// One guard/outcome row.
struct Rule {
    reason: DecisionReason,
    outcome: fn(&DecisionContext) -> Option<ProcessingLocation>,
}

const RULES: &[Rule] = &[
    Rule {
        reason: DecisionReason::ExplicitOverride,
        outcome: |ctx| ctx.location_override,
    },
    Rule {
        reason: DecisionReason::PrivacyPreferred,
        outcome: |ctx| ctx.prefer_privacy.then_some(ProcessingLocation::Local),
    },
    Rule {
        reason: DecisionReason::NetworkUnreachable,
        outcome: |ctx| {
            (!ctx.remote_configured || ctx.reachability != Reachability::Reachable)
                .then_some(ProcessingLocation::Local)
        },
    },
    Rule {
        reason: DecisionReason::LargeInputLimitedDevice,
        outcome: |ctx| (ctx.large_input() && ctx.limited_device).then_some(ProcessingLocation::Remote),
    },
    Rule {
        reason: DecisionReason::LargeInput,
        outcome: |ctx| ctx.large_input().then_some(ProcessingLocation::Hybrid),
    },
    Rule {
        reason: DecisionReason::LimitedDevice,
        outcome: |ctx| ctx.limited_device.then_some(ProcessingLocation::Hybrid),
    },
];

/// Pick where to run a job and why.
pub fn decide(ctx: &DecisionContext) -> (ProcessingLocation, DecisionReason) {
    RULES
        .iter()
        .find_map(|rule| (rule.outcome)(ctx).map(|location| (location, rule.reason)))
        .unwrap_or((ProcessingLocation::Local, DecisionReason::Default))
}
