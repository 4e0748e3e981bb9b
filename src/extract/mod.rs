pub mod fingerprint;
pub mod matrix;
pub mod stats;

use std::collections::BTreeMap;

use rayon::prelude::*;

use crate::events::{BarTrack, DrumEvent, DEFAULT_BEATS_PER_BAR};
use fingerprint::BarPatternFingerprint;
use stats::BarOnsetStats;

/// Sixteenth-note grid in 4/4.
pub const DEFAULT_GRID_RESOLUTION: u32 = 16;
/// Bitmasks are u64, so a bar can have at most 64 slots.
pub const MAX_GRID_RESOLUTION: u32 = 64;

/// Quantize a 1-based beat position to a grid slot:
/// `round((beat - 1) * grid_resolution / beats_per_bar)`, clamped into `[0, grid_resolution)`.
///
/// Positions that round past the last slot (a late hit just before the next bar) or
/// before the first land on the edge slot so the onset is still counted.
pub fn calculate_grid_position(beat: f64, beats_per_bar: u32, grid_resolution: u32) -> u32 {
    let grid_resolution = clamp_grid_resolution(grid_resolution);
    let beats_per_bar = if beats_per_bar == 0 {
        DEFAULT_BEATS_PER_BAR
    } else {
        beats_per_bar
    };
    let raw = ((beat - 1.0) * grid_resolution as f64 / beats_per_bar as f64).round();
    if !raw.is_finite() || raw <= 0.0 {
        return 0;
    }
    (raw as u32).min(grid_resolution - 1)
}

pub fn clamp_grid_resolution(grid_resolution: u32) -> u32 {
    grid_resolution.clamp(1, MAX_GRID_RESOLUTION)
}

/// Events grouped by bar number. Bars keep their events in input order.
pub fn group_events_by_bar(events: &[DrumEvent]) -> BTreeMap<u32, Vec<&DrumEvent>> {
    let mut by_bar: BTreeMap<u32, Vec<&DrumEvent>> = BTreeMap::new();
    for event in events {
        by_bar.entry(event.bar_number).or_default().push(event);
    }
    by_bar
}

/// Fingerprint and stats for every bar of the ruler, in bar order.
///
/// Bars are independent, so they are extracted in parallel; the indexed collect
/// keeps the output in bar order regardless of scheduling.
pub fn extract_bars(
    events: &[DrumEvent],
    ruler: &BarTrack,
    grid_resolution: u32,
) -> (Vec<BarPatternFingerprint>, Vec<BarOnsetStats>) {
    let by_bar = group_events_by_bar(events);
    let empty: Vec<&DrumEvent> = Vec::new();

    (1..=ruler.total_bars())
        .into_par_iter()
        .map(|bar_number| {
            let bar_events = by_bar.get(&bar_number).unwrap_or(&empty);
            let beats_per_bar = ruler.beats_per_bar(bar_number);
            log::trace!("Extracting bar {} ({} events)", bar_number, bar_events.len());
            (
                fingerprint::extract(bar_events, bar_number, beats_per_bar, grid_resolution),
                stats::build(bar_events, bar_number, beats_per_bar),
            )
        })
        .unzip()
}
