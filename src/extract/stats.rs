use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::events::{DrumEvent, DEFAULT_BEATS_PER_BAR};

/// Aggregate onset statistics for one bar.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BarOnsetStats {
    pub bar_number: u32,
    pub total_hits: u32,
    pub hits_per_role: BTreeMap<String, u32>,
    pub velocity_min: u8,
    pub velocity_max: u8,
    pub velocity_avg: f64,
    pub avg_velocity_per_role: BTreeMap<String, f64>,
    /// None when no event in the bar carries a timing offset.
    pub timing_offset_min: Option<i32>,
    pub timing_offset_max: Option<i32>,
    pub timing_offset_avg: Option<f64>,
    /// Hit count per beat; length = beats per bar.
    pub hits_per_beat: Vec<u32>,
    /// Share of hits that fall between beats.
    pub offbeat_ratio: f64,
}

/// Build the stats for one bar. Every event is counted, including ones whose
/// beat lies outside the bar's beat range (they go to the nearest beat bucket).
pub fn build(events: &[&DrumEvent], bar_number: u32, beats_per_bar: u32) -> BarOnsetStats {
    let beats_per_bar = if beats_per_bar == 0 {
        DEFAULT_BEATS_PER_BAR
    } else {
        beats_per_bar
    };
    let mut stats = BarOnsetStats {
        bar_number,
        hits_per_beat: vec![0; beats_per_bar as usize],
        ..BarOnsetStats::default()
    };
    if events.is_empty() {
        return stats;
    }

    let mut velocity_sum = 0u64;
    let mut velocity_min = u8::MAX;
    let mut velocity_max = u8::MIN;
    let mut role_velocity_sums: BTreeMap<String, u64> = BTreeMap::new();
    let mut offsets: Vec<i32> = Vec::new();
    let mut offbeat = 0u32;

    for event in events {
        stats.total_hits += 1;
        *stats.hits_per_role.entry(event.role.clone()).or_default() += 1;
        *role_velocity_sums.entry(event.role.clone()).or_default() += event.velocity as u64;

        velocity_sum += event.velocity as u64;
        velocity_min = velocity_min.min(event.velocity);
        velocity_max = velocity_max.max(event.velocity);

        if let Some(offset) = event.timing_offset_ticks {
            offsets.push(offset);
        }
        if event.is_offbeat() {
            offbeat += 1;
        }

        let beat_idx = (event.beat - 1.0).floor().max(0.0) as usize;
        stats.hits_per_beat[beat_idx.min(beats_per_bar as usize - 1)] += 1;
    }

    stats.velocity_min = velocity_min;
    stats.velocity_max = velocity_max;
    stats.velocity_avg = velocity_sum as f64 / stats.total_hits as f64;
    stats.avg_velocity_per_role = role_velocity_sums
        .into_iter()
        .map(|(role, sum)| {
            let count = stats.hits_per_role[&role];
            (role, sum as f64 / count as f64)
        })
        .collect();

    if !offsets.is_empty() {
        stats.timing_offset_min = offsets.iter().min().copied();
        stats.timing_offset_max = offsets.iter().max().copied();
        stats.timing_offset_avg =
            Some(offsets.iter().map(|&o| o as f64).sum::<f64>() / offsets.len() as f64);
    }
    stats.offbeat_ratio = offbeat as f64 / stats.total_hits as f64;

    stats
}
