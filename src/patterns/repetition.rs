use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::extract::fingerprint::BarPatternFingerprint;

/// A pattern hash and every bar it occurs in.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatternOccurrence {
    pub pattern_hash: String,
    pub bar_numbers: Vec<u32>,
    pub occurrence_count: usize,
}

/// Maximal stretch of consecutive bars sharing one pattern.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsecutiveRun {
    pub pattern_hash: String,
    pub start_bar: u32,
    pub end_bar: u32,
    pub length: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PatternRepetitionResult {
    pub total_bars: usize,
    pub unique_pattern_count: usize,
    /// Hash → bars, in hash order.
    pub pattern_occurrences: BTreeMap<String, Vec<u32>>,
    /// Most common first; ties broken by first appearance.
    pub ranked_patterns: Vec<PatternOccurrence>,
    pub consecutive_runs: Vec<ConsecutiveRun>,
    /// Share of bars whose pattern appears more than once.
    pub repetition_ratio: f64,
}

impl PatternRepetitionResult {
    pub fn is_empty(&self) -> bool {
        self.total_bars == 0
    }

    pub fn most_common(&self) -> Option<&PatternOccurrence> {
        self.ranked_patterns.first()
    }

    pub fn longest_run(&self) -> Option<&ConsecutiveRun> {
        self.consecutive_runs
            .iter()
            .max_by(|a, b| a.length.cmp(&b.length).then(b.start_bar.cmp(&a.start_bar)))
    }
}

/// Group bars by pattern hash, rank patterns and find consecutive repeats.
/// Fingerprints must be in bar order.
pub fn detect(fingerprints: &[BarPatternFingerprint]) -> PatternRepetitionResult {
    if fingerprints.is_empty() {
        return PatternRepetitionResult::default();
    }

    let mut pattern_occurrences: BTreeMap<String, Vec<u32>> = BTreeMap::new();
    for fp in fingerprints {
        pattern_occurrences
            .entry(fp.pattern_hash.clone())
            .or_default()
            .push(fp.bar_number);
    }

    let mut ranked_patterns: Vec<PatternOccurrence> = pattern_occurrences
        .iter()
        .map(|(hash, bars)| PatternOccurrence {
            pattern_hash: hash.clone(),
            bar_numbers: bars.clone(),
            occurrence_count: bars.len(),
        })
        .collect();
    ranked_patterns.sort_by(|a, b| {
        b.occurrence_count
            .cmp(&a.occurrence_count)
            .then(a.bar_numbers[0].cmp(&b.bar_numbers[0]))
    });

    let repeated_bars: usize = ranked_patterns
        .iter()
        .filter(|p| p.occurrence_count > 1)
        .map(|p| p.occurrence_count)
        .sum();

    PatternRepetitionResult {
        total_bars: fingerprints.len(),
        unique_pattern_count: pattern_occurrences.len(),
        consecutive_runs: find_consecutive_runs(fingerprints),
        repetition_ratio: repeated_bars as f64 / fingerprints.len() as f64,
        pattern_occurrences,
        ranked_patterns,
    }
}

/// Runs of ≥ 2 adjacent bars with the same hash. A gap in bar numbers ends a run.
fn find_consecutive_runs(fingerprints: &[BarPatternFingerprint]) -> Vec<ConsecutiveRun> {
    let mut runs = Vec::new();
    let mut current: Vec<&BarPatternFingerprint> = Vec::new();

    for fp in fingerprints {
        let continues = current.last().is_some_and(|prev| {
            prev.pattern_hash == fp.pattern_hash && prev.bar_number + 1 == fp.bar_number
        });
        if !continues {
            push_run(&mut runs, &current);
            current.clear();
        }
        current.push(fp);
    }

    // Don't forget the last run
    push_run(&mut runs, &current);
    runs
}

fn push_run(runs: &mut Vec<ConsecutiveRun>, current: &[&BarPatternFingerprint]) {
    if current.len() < 2 {
        return;
    }
    let first = current[0];
    let last = current[current.len() - 1];
    runs.push(ConsecutiveRun {
        pattern_hash: first.pattern_hash.clone(),
        start_bar: first.bar_number,
        end_bar: last.bar_number,
        length: current.len(),
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_fp(bar: u32, hash: &str) -> BarPatternFingerprint {
        BarPatternFingerprint {
            bar_number: bar,
            beats_per_bar: 4,
            grid_resolution: 16,
            role_onset_bitmasks: BTreeMap::new(),
            role_velocities: BTreeMap::new(),
            role_event_counts: BTreeMap::new(),
            pattern_hash: hash.to_string(),
        }
    }

    fn sequence(hashes: &[&str]) -> Vec<BarPatternFingerprint> {
        hashes
            .iter()
            .enumerate()
            .map(|(i, h)| make_fp(i as u32 + 1, h))
            .collect()
    }

    #[test]
    fn test_empty_input() {
        let result = detect(&[]);
        assert!(result.is_empty());
        assert_eq!(result.unique_pattern_count, 0);
        assert!(result.ranked_patterns.is_empty());
        assert!(result.consecutive_runs.is_empty());
    }

    #[test]
    fn test_single_pattern_track() {
        let result = detect(&sequence(&["a", "a", "a", "a"]));
        assert_eq!(result.unique_pattern_count, 1);
        assert_eq!(result.consecutive_runs.len(), 1);
        let run = &result.consecutive_runs[0];
        assert_eq!((run.start_bar, run.end_bar, run.length), (1, 4, 4));
        assert!((result.repetition_ratio - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_ranking() {
        let result = detect(&sequence(&["b", "a", "a", "c", "b", "a"]));
        let order: Vec<&str> = result.ranked_patterns.iter().map(|p| p.pattern_hash.as_str()).collect();
        assert_eq!(order, vec!["a", "b", "c"]);
        assert_eq!(result.most_common().unwrap().bar_numbers, vec![2, 3, 6]);
        assert_eq!(result.pattern_occurrences["b"], vec![1, 5]);
        // 5 of 6 bars belong to a repeated pattern
        assert!((result.repetition_ratio - 5.0 / 6.0).abs() < 1e-12);
    }

    #[test]
    fn test_ties_rank_by_first_appearance() {
        let result = detect(&sequence(&["z", "y", "z", "y"]));
        assert_eq!(result.ranked_patterns[0].pattern_hash, "z");
        assert_eq!(result.ranked_patterns[1].pattern_hash, "y");
    }

    #[test]
    fn test_multiple_runs() {
        let result = detect(&sequence(&["a", "a", "b", "c", "c", "c", "a"]));
        assert_eq!(result.consecutive_runs.len(), 2);
        assert_eq!(result.consecutive_runs[0].length, 2);
        assert_eq!(result.consecutive_runs[1].start_bar, 4);
        assert_eq!(result.longest_run().unwrap().pattern_hash, "c");
    }

    #[test]
    fn test_no_runs_when_alternating() {
        let result = detect(&sequence(&["a", "b", "a", "b"]));
        assert!(result.consecutive_runs.is_empty());
        assert_eq!(result.unique_pattern_count, 2);
    }

    #[test]
    fn test_gap_in_bar_numbers_breaks_run() {
        let fps = vec![make_fp(1, "a"), make_fp(2, "a"), make_fp(5, "a")];
        let result = detect(&fps);
        assert_eq!(result.consecutive_runs.len(), 1);
        assert_eq!(result.consecutive_runs[0].end_bar, 2);
    }
}
