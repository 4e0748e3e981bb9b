pub mod roles;

use serde::{Deserialize, Serialize};

/// Beats per bar assumed when a bar's time signature is degenerate or missing.
pub const DEFAULT_BEATS_PER_BAR: u32 = 4;

/// A single drum onset, placed in a bar. Immutable once produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DrumEvent {
    /// 1-based bar number.
    pub bar_number: u32,
    /// 1-based beat position within the bar (1.0 = downbeat, 1.5 = the "and" of 1).
    pub beat: f64,
    pub role: String,
    pub note_number: u8,
    pub velocity: u8,
    pub duration_ticks: u32,
    pub absolute_time_ticks: i64,
    /// Signed deviation from the nearest grid slot. Positive = late.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timing_offset_ticks: Option<i32>,
}

impl DrumEvent {
    /// True when the onset falls between beats rather than on one.
    pub fn is_offbeat(&self) -> bool {
        self.beat.fract().abs() > 1e-6
    }
}

/// One raw note from the upstream event source.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PartTrackNote {
    pub note_number: u8,
    pub absolute_time_ticks: i64,
    pub duration_ticks: u32,
    pub velocity: u8,
}

/// Ordered note source for one drum part.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PartTrack {
    pub notes: Vec<PartTrackNote>,
}

impl PartTrack {
    pub fn new(mut notes: Vec<PartTrackNote>) -> Self {
        notes.sort_by_key(|n| (n.absolute_time_ticks, n.note_number));
        Self { notes }
    }

    pub fn is_empty(&self) -> bool {
        self.notes.is_empty()
    }
}

/// Timing of one bar on the ruler.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BarInfo {
    pub bar_number: u32,
    pub start_tick: i64,
    pub length_ticks: i64,
    pub beats_per_bar: u32,
}

impl BarInfo {
    pub fn end_tick(&self) -> i64 {
        self.start_tick + self.length_ticks
    }

    pub fn contains_tick(&self, tick: i64) -> bool {
        tick >= self.start_tick && tick < self.end_tick()
    }

    /// Ticks per beat, using the fallback beat count for degenerate bars.
    pub fn ticks_per_beat(&self) -> f64 {
        self.length_ticks as f64 / self.effective_beats_per_bar() as f64
    }

    pub fn effective_beats_per_bar(&self) -> u32 {
        if self.beats_per_bar == 0 {
            DEFAULT_BEATS_PER_BAR
        } else {
            self.beats_per_bar
        }
    }

    pub fn is_degenerate(&self) -> bool {
        self.beats_per_bar == 0 || self.length_ticks <= 0
    }
}

/// Bar-timing ruler: start tick, length and beat count for every bar of a track.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BarTrack {
    bars: Vec<BarInfo>,
}

impl BarTrack {
    /// Build a ruler from explicit bars. Bars are renumbered 1..=n in start-tick order.
    pub fn from_bars(mut bars: Vec<BarInfo>) -> Self {
        bars.sort_by_key(|b| b.start_tick);
        for (i, bar) in bars.iter_mut().enumerate() {
            bar.bar_number = i as u32 + 1;
        }
        Self { bars }
    }

    /// A ruler of `total_bars` bars sharing one time signature.
    pub fn uniform(total_bars: u32, ticks_per_quarter: u32, beats_per_bar: u32) -> Self {
        let length_ticks = ticks_per_quarter as i64 * beats_per_bar as i64;
        let bars = (0..total_bars)
            .map(|i| BarInfo {
                bar_number: i + 1,
                start_tick: i as i64 * length_ticks,
                length_ticks,
                beats_per_bar,
            })
            .collect();
        Self { bars }
    }

    pub fn total_bars(&self) -> u32 {
        self.bars.len() as u32
    }

    pub fn bars(&self) -> &[BarInfo] {
        &self.bars
    }

    /// Lookup by 1-based bar number.
    pub fn bar(&self, bar_number: u32) -> Option<&BarInfo> {
        if bar_number == 0 {
            return None;
        }
        self.bars.get(bar_number as usize - 1)
    }

    pub fn beats_per_bar(&self, bar_number: u32) -> u32 {
        self.bar(bar_number)
            .map(BarInfo::effective_beats_per_bar)
            .unwrap_or(DEFAULT_BEATS_PER_BAR)
    }

    /// The bar containing `tick`, if any.
    pub fn bar_at_tick(&self, tick: i64) -> Option<&BarInfo> {
        let idx = self.bars.partition_point(|b| b.start_tick <= tick);
        if idx == 0 {
            return None;
        }
        let bar = &self.bars[idx - 1];
        bar.contains_tick(tick).then_some(bar)
    }

    /// Most common beats-per-bar across the ruler (ties go to the smaller count).
    pub fn dominant_beats_per_bar(&self) -> u32 {
        let mut counts: std::collections::BTreeMap<u32, usize> = std::collections::BTreeMap::new();
        for bar in &self.bars {
            *counts.entry(bar.effective_beats_per_bar()).or_default() += 1;
        }
        counts
            .into_iter()
            .fold(None, |best: Option<(u32, usize)>, (beats, n)| match best {
                Some((_, best_n)) if best_n >= n => best,
                _ => Some((beats, n)),
            })
            .map(|(beats, _)| beats)
            .unwrap_or(DEFAULT_BEATS_PER_BAR)
    }
}
