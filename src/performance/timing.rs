use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::mean_std;
use crate::events::DrumEvent;

/// Offbeat fractions counted as the second eighth of a beat for swing.
/// Straight eighths sit at 0.5, triplet swing at 0.667; the straight 16th "a" (0.75) is excluded.
const SWING_WINDOW: (f64, f64) = (0.45, 0.72);

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum TimingFeel {
    #[default]
    OnTop,
    /// Notes land late on average.
    LaidBack,
    /// Notes land early on average.
    Pushed,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RoleTiming {
    pub count: u32,
    pub average_offset_ticks: f64,
    pub std_dev_ticks: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TimingFeelResult {
    pub role_timings: BTreeMap<String, RoleTiming>,
    /// Mean offset in ticks over all timed onsets. Positive = behind the beat.
    pub ahead_behind_score: f64,
    pub feel: TimingFeel,
    /// 1 / (1 + σ of all offsets): 1 = perfectly steady.
    pub consistency_score: f64,
    /// Long/short ratio of the two halves of a beat. 1.0 = straight, 2.0 = triplet swing.
    pub swing_ratio: f64,
    pub sample_count: u32,
}

impl TimingFeelResult {
    pub fn is_empty(&self) -> bool {
        self.sample_count == 0
    }

    pub fn is_laid_back(&self) -> bool {
        self.feel == TimingFeel::LaidBack
    }

    pub fn is_pushed(&self) -> bool {
        self.feel == TimingFeel::Pushed
    }
}

/// Timing feel from the recorded offsets. Events without an offset are ignored
/// for the offset metrics but still count toward swing.
pub fn extract(events: &[DrumEvent], feel_threshold_ticks: f64) -> TimingFeelResult {
    let mut by_role: BTreeMap<&str, Vec<f64>> = BTreeMap::new();
    let mut all_offsets = Vec::new();
    for event in events {
        if let Some(offset) = event.timing_offset_ticks {
            by_role
                .entry(event.role.as_str())
                .or_default()
                .push(offset as f64);
            all_offsets.push(offset as f64);
        }
    }

    let role_timings = by_role
        .iter()
        .map(|(role, offsets)| {
            let (average_offset_ticks, std_dev_ticks) = mean_std(offsets);
            let timing = RoleTiming {
                count: offsets.len() as u32,
                average_offset_ticks,
                std_dev_ticks,
            };
            (role.to_string(), timing)
        })
        .collect();

    let swing_ratio = swing_ratio(events);
    if all_offsets.is_empty() {
        return TimingFeelResult {
            swing_ratio,
            ..TimingFeelResult::default()
        };
    }

    let (ahead_behind_score, spread) = mean_std(&all_offsets);
    let feel = if ahead_behind_score > feel_threshold_ticks {
        TimingFeel::LaidBack
    } else if ahead_behind_score < -feel_threshold_ticks {
        TimingFeel::Pushed
    } else {
        TimingFeel::OnTop
    };

    log::debug!(
        "Timing: mean offset {:+.1} ticks ({:?}), σ {:.1}, swing {:.2}",
        ahead_behind_score,
        feel,
        spread,
        swing_ratio
    );

    TimingFeelResult {
        role_timings,
        ahead_behind_score,
        feel,
        consistency_score: 1.0 / (1.0 + spread),
        swing_ratio,
        sample_count: all_offsets.len() as u32,
    }
}

/// Mean position `f` of the second eighth within the beat, as `f / (1 - f)`.
/// No offbeat eighths = straight (1.0).
fn swing_ratio(events: &[DrumEvent]) -> f64 {
    let positions: Vec<f64> = events
        .iter()
        .map(|e| e.beat.fract())
        .filter(|f| (SWING_WINDOW.0..=SWING_WINDOW.1).contains(f))
        .collect();
    if positions.is_empty() {
        return 1.0;
    }
    let (mean, _) = mean_std(&positions);
    mean / (1.0 - mean)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_event(role: &str, beat: f64, offset: Option<i32>) -> DrumEvent {
        DrumEvent {
            bar_number: 1,
            beat,
            role: role.to_string(),
            note_number: 0,
            velocity: 100,
            duration_ticks: 60,
            absolute_time_ticks: 0,
            timing_offset_ticks: offset,
        }
    }

    #[test]
    fn test_laid_back() {
        let events = vec![
            make_event("Snare", 2.0, Some(12)),
            make_event("Snare", 4.0, Some(8)),
            make_event("Kick", 1.0, Some(4)),
        ];
        let result = extract(&events, 5.0);
        assert!((result.ahead_behind_score - 8.0).abs() < 1e-12);
        assert!(result.is_laid_back());
        assert!((result.role_timings["Snare"].average_offset_ticks - 10.0).abs() < 1e-12);
        assert!((result.role_timings["Snare"].std_dev_ticks - 2.0).abs() < 1e-12);
        assert_eq!(result.sample_count, 3);
    }

    #[test]
    fn test_pushed_and_on_top() {
        let pushed = extract(&[make_event("ClosedHat", 1.5, Some(-9))], 5.0);
        assert!(pushed.is_pushed());
        let on_top = extract(&[make_event("ClosedHat", 1.5, Some(-3))], 5.0);
        assert_eq!(on_top.feel, TimingFeel::OnTop);
        // Threshold itself is not exceeded
        let edge = extract(&[make_event("ClosedHat", 1.5, Some(5))], 5.0);
        assert_eq!(edge.feel, TimingFeel::OnTop);
    }

    #[test]
    fn test_consistency() {
        let steady = extract(&[make_event("Kick", 1.0, Some(4)), make_event("Kick", 3.0, Some(4))], 5.0);
        assert!((steady.consistency_score - 1.0).abs() < 1e-12);
        let loose = extract(&[make_event("Kick", 1.0, Some(-10)), make_event("Kick", 3.0, Some(10))], 5.0);
        assert!((loose.consistency_score - 1.0 / 11.0).abs() < 1e-12);
        assert_eq!(loose.feel, TimingFeel::OnTop);
    }

    #[test]
    fn test_swing_ratio() {
        let straight = vec![make_event("Ride", 1.0, None), make_event("Ride", 1.5, None)];
        assert!((extract(&straight, 5.0).swing_ratio - 1.0).abs() < 1e-12);

        let swung = vec![
            make_event("Ride", 1.0, None),
            make_event("Ride", 1.0 + 2.0 / 3.0, None),
            make_event("Ride", 2.0, None),
            make_event("Ride", 2.0 + 2.0 / 3.0, None),
        ];
        assert!((extract(&swung, 5.0).swing_ratio - 2.0).abs() < 1e-9);

        // Straight sixteenths: the "a" is outside the swing window
        let sixteenths = vec![
            make_event("ClosedHat", 1.25, None),
            make_event("ClosedHat", 1.5, None),
            make_event("ClosedHat", 1.75, None),
        ];
        assert!((extract(&sixteenths, 5.0).swing_ratio - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_no_offsets() {
        let result = extract(&[make_event("Kick", 1.0, None)], 5.0);
        assert!(result.is_empty());
        assert_eq!(result.feel, TimingFeel::OnTop);
        assert_eq!(result.consistency_score, 0.0);
        assert!(result.role_timings.is_empty());
    }
}
