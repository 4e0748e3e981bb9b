use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::events::roles::{CLOSED_HAT, KICK, SNARE};
use crate::extract::matrix::BeatPositionMatrix;

/// A slot a role hits in most bars.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnchorCandidate {
    pub role: String,
    pub slot: u32,
    pub consistency: f64,
    pub hit_bars: u32,
}

/// Expected anchors of a named style, on its own grid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnchorReference {
    pub name: String,
    pub grid_resolution: u32,
    pub anchors: BTreeMap<String, Vec<u32>>,
}

impl AnchorReference {
    /// Straight rock/pop backbeat: kick on 1 and 3, snare on 2 and 4, eighth-note hats.
    pub fn pop_rock_basic() -> Self {
        Self {
            name: "PopRockBasic".to_string(),
            grid_resolution: 16,
            anchors: BTreeMap::from([
                (KICK.to_string(), vec![0, 8]),
                (SNARE.to_string(), vec![4, 12]),
                (CLOSED_HAT.to_string(), vec![0, 2, 4, 6, 8, 10, 12, 14]),
            ]),
        }
    }

    /// Built-in references, looked up by name (case-insensitive).
    pub fn builtin(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().replace(['-', '_'], "").as_str() {
            "poprockbasic" => Some(Self::pop_rock_basic()),
            _ => None,
        }
    }

    /// Reference anchors rescaled onto `grid_resolution`.
    fn anchor_set(&self, grid_resolution: u32) -> BTreeSet<(String, u32)> {
        self.anchors
            .iter()
            .flat_map(|(role, slots)| {
                slots.iter().map(move |&slot| {
                    let scaled = if self.grid_resolution == 0 {
                        slot
                    } else {
                        slot * grid_resolution / self.grid_resolution
                    };
                    (role.clone(), scaled)
                })
            })
            .collect()
    }
}

/// Observed anchors compared with a reference template.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnchorVariance {
    pub reference_name: String,
    pub matched: Vec<(String, u32)>,
    pub missing: Vec<(String, u32)>,
    pub extra: Vec<(String, u32)>,
    /// 1 − Jaccard(observed, expected): 0 = exact match, 1 = nothing in common.
    pub variance: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnchorCandidateResult {
    pub threshold: f64,
    pub total_bars: u32,
    /// Per role, one consistency ratio per grid slot.
    pub slot_consistency: BTreeMap<String, Vec<f64>>,
    /// Per role, anchors in slot order.
    pub candidates: BTreeMap<String, Vec<AnchorCandidate>>,
    pub reference_comparison: Option<AnchorVariance>,
}

impl AnchorCandidateResult {
    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }

    pub fn anchor_count(&self) -> usize {
        self.candidates.values().map(Vec::len).sum()
    }

    pub fn is_anchor(&self, role: &str, slot: u32) -> bool {
        self.candidates
            .get(role)
            .is_some_and(|c| c.iter().any(|a| a.slot == slot))
    }
}

/// Consistency = bars where the role hits the slot / total bars.
/// Slots at or above `threshold` are anchor candidates.
pub fn extract(
    matrices: &BTreeMap<String, BeatPositionMatrix>,
    threshold: f64,
    reference: Option<&AnchorReference>,
) -> AnchorCandidateResult {
    let total_bars = matrices.values().map(|m| m.total_bars).max().unwrap_or(0);
    let mut result = AnchorCandidateResult {
        threshold,
        total_bars,
        ..AnchorCandidateResult::default()
    };
    let mut grid_resolution = 0;
    for (role, matrix) in matrices.iter().filter(|_| total_bars > 0) {
        grid_resolution = grid_resolution.max(matrix.grid_resolution);
        let mut hit_bars = vec![0u32; matrix.grid_resolution as usize];
        for bar in 1..=matrix.total_bars {
            for slot in matrix.get_hit_positions(bar) {
                hit_bars[slot as usize] += 1;
            }
        }

        let consistency: Vec<f64> = hit_bars
            .iter()
            .map(|&n| n as f64 / total_bars as f64)
            .collect();
        let anchors: Vec<AnchorCandidate> = consistency
            .iter()
            .enumerate()
            .filter(|(_, c)| **c >= threshold)
            .map(|(slot, &c)| AnchorCandidate {
                role: role.clone(),
                slot: slot as u32,
                consistency: c,
                hit_bars: hit_bars[slot],
            })
            .collect();

        if !anchors.is_empty() {
            result.candidates.insert(role.clone(), anchors);
        }
        result.slot_consistency.insert(role.clone(), consistency);
    }

    // A silent track still compares against the template, on the template's own grid
    if let Some(reference) = reference {
        if grid_resolution == 0 {
            grid_resolution = reference.grid_resolution;
        }
        result.reference_comparison = Some(compare(&result, reference, grid_resolution));
    }

    log::debug!(
        "Anchors: {} candidates across {} roles",
        result.anchor_count(),
        result.candidates.len()
    );
    result
}

fn compare(
    result: &AnchorCandidateResult,
    reference: &AnchorReference,
    grid_resolution: u32,
) -> AnchorVariance {
    let observed: BTreeSet<(String, u32)> = result
        .candidates
        .values()
        .flatten()
        .map(|a| (a.role.clone(), a.slot))
        .collect();
    let expected = reference.anchor_set(grid_resolution);

    let matched: Vec<_> = observed.intersection(&expected).cloned().collect();
    let missing: Vec<_> = expected.difference(&observed).cloned().collect();
    let extra: Vec<_> = observed.difference(&expected).cloned().collect();

    let union = matched.len() + missing.len() + extra.len();
    let variance = if union == 0 {
        0.0
    } else {
        1.0 - matched.len() as f64 / union as f64
    };

    AnchorVariance {
        reference_name: reference.name.clone(),
        matched,
        missing,
        extra,
        variance,
    }
}
