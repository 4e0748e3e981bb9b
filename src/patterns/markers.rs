use serde::{Deserialize, Serialize};

use crate::config::AnalysisConfig;
use crate::events::roles::CRASH;
use crate::extract::fingerprint::BarPatternFingerprint;
use crate::extract::stats::BarOnsetStats;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DensityChange {
    /// Markedly busier than the surrounding bars; suggests a fill.
    Spike,
    /// Markedly sparser; suggests a breakdown.
    Drop,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DensityMarker {
    pub bar_number: u32,
    pub hit_count: u32,
    pub surrounding_average: f64,
    pub change: DensityChange,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StructuralMarkerResult {
    pub crash_bars: Vec<u32>,
    pub density_markers: Vec<DensityMarker>,
    pub total_marker_count: usize,
}

impl StructuralMarkerResult {
    pub fn is_empty(&self) -> bool {
        self.total_marker_count == 0
    }

    pub fn fill_candidates(&self) -> Vec<u32> {
        self.bars_with(DensityChange::Spike)
    }

    pub fn breakdown_candidates(&self) -> Vec<u32> {
        self.bars_with(DensityChange::Drop)
    }

    fn bars_with(&self, change: DensityChange) -> Vec<u32> {
        self.density_markers
            .iter()
            .filter(|m| m.change == change)
            .map(|m| m.bar_number)
            .collect()
    }
}

/// Flag crash bars and bars whose hit count departs sharply from their neighbours.
/// Both slices are in bar order.
pub fn detect(
    fingerprints: &[BarPatternFingerprint],
    stats: &[BarOnsetStats],
    config: &AnalysisConfig,
) -> StructuralMarkerResult {
    let crash_bars: Vec<u32> = fingerprints
        .iter()
        .filter(|fp| fp.has_role(CRASH))
        .map(|fp| fp.bar_number)
        .collect();

    let counts: Vec<f64> = stats.iter().map(|s| s.total_hits as f64).collect();
    let mut density_markers = Vec::new();

    for (i, bar) in stats.iter().enumerate() {
        let Some(avg) = surrounding_average(&counts, i, config.density_window) else {
            continue;
        };
        // Silent neighbourhood gives no baseline to compare against
        if avg <= 0.0 {
            continue;
        }
        let hits = counts[i];
        if (hits - avg).abs() < config.min_density_delta {
            continue;
        }

        let change = if hits >= avg * config.spike_ratio {
            DensityChange::Spike
        } else if hits <= avg * config.drop_ratio {
            DensityChange::Drop
        } else {
            continue;
        };
        density_markers.push(DensityMarker {
            bar_number: bar.bar_number,
            hit_count: bar.total_hits,
            surrounding_average: avg,
            change,
        });
    }

    let total_marker_count = crash_bars.len() + density_markers.len();
    StructuralMarkerResult {
        crash_bars,
        density_markers,
        total_marker_count,
    }
}

/// Mean of up to `window` bars on each side, excluding bar `i` itself.
fn surrounding_average(counts: &[f64], i: usize, window: usize) -> Option<f64> {
    let start = i.saturating_sub(window);
    let end = (i + window + 1).min(counts.len());
    let neighbours: Vec<f64> = (start..end).filter(|&j| j != i).map(|j| counts[j]).collect();
    if neighbours.is_empty() {
        None
    } else {
        Some(neighbours.iter().sum::<f64>() / neighbours.len() as f64)
    }
}
