use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use super::{calculate_grid_position, clamp_grid_resolution};
use crate::events::{BarTrack, DrumEvent};

/// One occupied cell of a beat-position matrix.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SlotHit {
    pub velocity: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timing_offset_ticks: Option<i32>,
}

/// Bar × grid-slot occupancy for a single role.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BeatPositionMatrix {
    pub role: String,
    pub total_bars: u32,
    pub grid_resolution: u32,
    /// `bar_slots[bar - 1][slot]`
    pub bar_slots: Vec<Vec<Option<SlotHit>>>,
}

impl BeatPositionMatrix {
    pub fn new(role: &str, total_bars: u32, grid_resolution: u32) -> Self {
        let grid_resolution = clamp_grid_resolution(grid_resolution);
        Self {
            role: role.to_string(),
            total_bars,
            grid_resolution,
            bar_slots: vec![vec![None; grid_resolution as usize]; total_bars as usize],
        }
    }

    /// Cell at (1-based bar, slot). Anything out of range is simply empty.
    pub fn get_slot(&self, bar_number: u32, slot: u32) -> Option<&SlotHit> {
        if bar_number == 0 {
            return None;
        }
        self.bar_slots
            .get(bar_number as usize - 1)
            .and_then(|slots| slots.get(slot as usize))
            .and_then(Option::as_ref)
    }

    /// Occupied slot indices of a bar, ascending.
    pub fn get_hit_positions(&self, bar_number: u32) -> Vec<u32> {
        if bar_number == 0 {
            return Vec::new();
        }
        self.bar_slots
            .get(bar_number as usize - 1)
            .map(|slots| {
                slots
                    .iter()
                    .enumerate()
                    .filter(|(_, cell)| cell.is_some())
                    .map(|(i, _)| i as u32)
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Occupancy of a bar as a bitmask (bit n = slot n hit).
    pub fn hit_mask(&self, bar_number: u32) -> u64 {
        self.get_hit_positions(bar_number)
            .into_iter()
            .fold(0u64, |mask, slot| mask | (1u64 << slot))
    }

    pub fn hit_count(&self) -> usize {
        self.bar_slots.iter().flatten().filter(|c| c.is_some()).count()
    }

    /// Mean velocity over occupied cells; 0 for an empty matrix.
    pub fn get_average_velocity(&self) -> f64 {
        let (sum, n) = self
            .bar_slots
            .iter()
            .flatten()
            .flatten()
            .fold((0u64, 0u64), |(sum, n), hit| (sum + hit.velocity as u64, n + 1));
        if n == 0 { 0.0 } else { sum as f64 / n as f64 }
    }

    fn set(&mut self, bar_number: u32, slot: u32, hit: SlotHit) -> bool {
        if bar_number == 0 {
            return false;
        }
        match self
            .bar_slots
            .get_mut(bar_number as usize - 1)
            .and_then(|slots| slots.get_mut(slot as usize))
        {
            Some(cell) => {
                *cell = Some(hit);
                true
            }
            None => false,
        }
    }
}

/// Build the matrix for one role. Duplicate onsets in a cell: last write wins.
pub fn build(
    events: &[DrumEvent],
    ruler: &BarTrack,
    role: &str,
    grid_resolution: u32,
) -> BeatPositionMatrix {
    let mut matrix = BeatPositionMatrix::new(role, ruler.total_bars(), grid_resolution);
    let mut unplaced = 0usize;

    for event in events.iter().filter(|e| e.role == role) {
        let slot = calculate_grid_position(
            event.beat,
            ruler.beats_per_bar(event.bar_number),
            matrix.grid_resolution,
        );
        let hit = SlotHit {
            velocity: event.velocity,
            timing_offset_ticks: event.timing_offset_ticks,
        };
        if !matrix.set(event.bar_number, slot, hit) {
            unplaced += 1;
        }
    }

    if unplaced > 0 {
        log::debug!("{}: {} event(s) outside the ruler's bars", role, unplaced);
    }
    matrix
}

/// One matrix per role present in `events`, keyed by role name.
pub fn build_all(
    events: &[DrumEvent],
    ruler: &BarTrack,
    grid_resolution: u32,
) -> BTreeMap<String, BeatPositionMatrix> {
    let roles: BTreeSet<&str> = events.iter().map(|e| e.role.as_str()).collect();
    roles
        .into_iter()
        .map(|role| (role.to_string(), build(events, ruler, role, grid_resolution)))
        .collect()
}

/// (bar, slot) cells where two matrices disagree on occupancy or velocity.
/// Covers the larger of the two shapes; cells missing from one side count as empty.
pub fn find_differences(a: &BeatPositionMatrix, b: &BeatPositionMatrix) -> Vec<(u32, u32)> {
    let bars = a.total_bars.max(b.total_bars);
    let slots = a.grid_resolution.max(b.grid_resolution);
    let mut diffs = Vec::new();

    for bar in 1..=bars {
        for slot in 0..slots {
            let differs = match (a.get_slot(bar, slot), b.get_slot(bar, slot)) {
                (None, None) => false,
                (Some(x), Some(y)) => x.velocity != y.velocity,
                _ => true,
            };
            if differs {
                diffs.push((bar, slot));
            }
        }
    }
    diffs
}
